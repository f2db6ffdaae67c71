//! Continuity-preserving filtering (C6). Treats array mutation as "compute
//! the mask, then rebuild" rather than mutating in place: `continuous` only
//! computes which requested removals are safe, while `keep`/`remove`
//! perform the actual array rebuild, keeping "decide" and "apply" separate.

use super::{SegmentGeometry, Segments};
use crate::error::{Error, Result};
use log::{info, warn};

/// How a caller identifies which segments a selection refers to.
pub enum SelectionType {
    /// Segment IDs.
    Ids(Vec<i64>),
    /// Positions in the current `ids()`/`segments()` ordering.
    Indices(Vec<usize>),
    /// One boolean per segment in the current ordering.
    Mask(Vec<bool>),
}

impl Segments {
    /// Converts a selection into a "requested for removal" boolean mask
    /// over the current segment ordering. When `remove` is false the
    /// selection names the segments to *keep*, so the mask is inverted.
    fn selection_mask(&self, selection: &SelectionType, remove: bool) -> Result<Vec<bool>> {
        let n = self.size();
        let included = match selection {
            SelectionType::Mask(m) => {
                if m.len() != n {
                    return Err(Error::Range {
                        name: "selection",
                        value: format!("{} entries", m.len()),
                        expected: format!("exactly {n} entries, one per current segment"),
                    });
                }
                m.clone()
            }
            SelectionType::Indices(idxs) => {
                let mut mask = vec![false; n];
                for &i in idxs {
                    if i >= n {
                        return Err(Error::Range {
                            name: "selection index",
                            value: i.to_string(),
                            expected: format!("< {n}"),
                        });
                    }
                    mask[i] = true;
                }
                mask
            }
            SelectionType::Ids(ids) => {
                let mut mask = vec![false; n];
                for &id in ids {
                    mask[self.index_of(id)?] = true;
                }
                mask
            }
        };
        Ok(if remove {
            included
        } else {
            included.into_iter().map(|b| !b).collect()
        })
    }

    /// Returns, per current segment, whether it may be removed without
    /// breaking flow continuity: iteratively peels segments off the
    /// upstream/downstream edge of their local network, relaxing the
    /// parent/child tables after each accepted removal so previously
    /// interior segments can become edge segments in a later round.
    pub fn continuous(
        &self,
        selection: &SelectionType,
        remove: bool,
        keep_upstream: bool,
        keep_downstream: bool,
    ) -> Result<Vec<bool>> {
        let requested = self.selection_mask(selection, remove)?;
        let n = self.size();

        let mut working_child = self.child.clone();
        let mut working_parents = self.parents.clone();
        let mut approved = vec![false; n];
        let mut warned = vec![false; n];

        loop {
            let mut changed = false;
            for i in 0..n {
                if approved[i] || !requested[i] {
                    continue;
                }
                let is_upstream_edge = working_parents[i].is_empty();
                let is_downstream_edge = working_child[i] == -1;
                if !is_upstream_edge && !is_downstream_edge {
                    continue;
                }
                if is_upstream_edge && keep_upstream {
                    if !warned[i] {
                        warn!("continuous: segment index {i} is exempted by keep_upstream");
                        warned[i] = true;
                    }
                    continue;
                }
                if is_downstream_edge && keep_downstream {
                    if !warned[i] {
                        warn!("continuous: segment index {i} is exempted by keep_downstream");
                        warned[i] = true;
                    }
                    continue;
                }

                approved[i] = true;
                changed = true;

                let child = working_child[i];
                if child != -1 {
                    working_parents[child as usize].retain(|&p| p != i as i64);
                }
                for p in working_parents[i].clone() {
                    working_child[p as usize] = -1;
                }
            }
            if !changed {
                break;
            }
        }

        Ok(approved)
    }

    /// Removes the selected segments, rebuilding every graph array and
    /// renumbering the surviving segments 1..M. Does not itself enforce
    /// continuity — callers that need that guarantee should filter the
    /// selection through `continuous()` first.
    pub fn remove(&mut self, selection: &SelectionType) -> Result<()> {
        let mask = self.selection_mask(selection, true)?;
        self.apply_removal(&mask)
    }

    /// Keeps only the selected segments; equivalent to `remove` on the
    /// complement of the selection.
    pub fn keep(&mut self, selection: &SelectionType) -> Result<()> {
        let mask = self.selection_mask(selection, false)?;
        self.apply_removal(&mask)
    }

    fn apply_removal(&mut self, to_remove: &[bool]) -> Result<()> {
        let n = self.size();
        let removed_count = to_remove.iter().filter(|&&b| b).count();
        if removed_count == 0 {
            return Ok(());
        }

        let mut relaxed_child = self.child.clone();
        let mut relaxed_parents = self.parents.clone();
        for i in 0..n {
            if !to_remove[i] {
                continue;
            }
            let child = self.child[i];
            if child != -1 && !to_remove[child as usize] {
                relaxed_parents[child as usize].retain(|&p| p != i as i64);
            }
            for &p in &self.parents[i] {
                if !to_remove[p as usize] {
                    relaxed_child[p as usize] = -1;
                }
            }
        }

        let mut new_index = vec![-1i64; n];
        let mut next = 0i64;
        for i in 0..n {
            if !to_remove[i] {
                new_index[i] = next;
                next += 1;
            }
        }

        let survivors: Vec<usize> = (0..n).filter(|&i| !to_remove[i]).collect();
        let ids: Vec<i64> = (1..=survivors.len() as i64).collect();
        let geometry: Vec<SegmentGeometry> = survivors.iter().map(|&i| self.geometry[i].clone()).collect();
        let npixels: Vec<u64> = survivors.iter().map(|&i| self.npixels[i]).collect();
        let child: Vec<i64> = survivors
            .iter()
            .map(|&i| {
                let c = relaxed_child[i];
                if c == -1 || to_remove[c as usize] {
                    -1
                } else {
                    new_index[c as usize]
                }
            })
            .collect();
        let parents: Vec<Vec<i64>> = survivors
            .iter()
            .map(|&i| {
                relaxed_parents[i]
                    .iter()
                    .filter(|&&p| !to_remove[p as usize])
                    .map(|&p| new_index[p as usize])
                    .collect()
            })
            .collect();

        let lost_terminal = (0..n).any(|i| to_remove[i] && self.child[i] == -1);
        let basins = if lost_terminal { None } else { self.basins_cached().cloned() };

        info!(
            "filter: removed {} of {} segments ({} survive, terminal cache {})",
            removed_count,
            n,
            survivors.len(),
            if lost_terminal { "invalidated" } else { "retained" }
        );

        self.rebuild_from(ids, geometry, npixels, child, parents, basins);
        Ok(())
    }
}
