//! The segment graph (C3): an integer-indexed DAG of stream segments with
//! flat `child`/`parents` arrays and per-segment pixel-index lists. No
//! node objects or back-pointers are used, per §9's design note — the
//! network is represented exactly as two parallel arrays plus a
//! pixel-index list, the same flat-buffer discipline used for the D8
//! pointer and accumulation grids rather than a graph of owned nodes.

mod filter;

pub use filter::SelectionType;

use crate::error::{Error, Result};
use crate::flow::{self, catchment_size};
use crate::raster::{AffineTransform, Crs, Raster, Units};
use log::info;
use std::rc::Rc;

/// A single stream segment's static shape: its polyline (in pixel space,
/// including the shared junction pixel at both ends so that
/// parent/child coordinate continuity holds) and its owned pixel list
/// (after the split-pixel rule, used for per-pixel statistics).
#[derive(Clone, Debug)]
pub struct SegmentGeometry {
    pub polyline_pixels: Vec<(isize, isize)>,
    pub pixel_indices: Vec<(isize, isize)>,
}

/// The segment graph itself. `child[i]`/`parents[i]` are indices into the
/// parallel arrays (`ids`, `geometry`, `npixels`), not segment IDs.
pub struct Segments {
    flow: Rc<Raster>,
    ids: Vec<i64>,
    geometry: Vec<SegmentGeometry>,
    npixels: Vec<u64>,
    child: Vec<i64>,
    parents: Vec<Vec<i64>>,
    basins: Option<Rc<Raster>>,
}

impl Segments {
    /// Builds a new Segments object from a flow-direction raster, a
    /// channel mask, and a maximum segment length, per 4.3's five
    /// construction steps.
    pub fn new(flow: Raster, mask: &Raster, max_length: f64, units: Units) -> Result<Segments> {
        let raw = flow::network(&flow, mask, max_length, units)?;
        let n = raw.len();

        let geometry: Vec<SegmentGeometry> = raw
            .iter()
            .map(|s| SegmentGeometry {
                polyline_pixels: s.polyline_pixels.clone(),
                pixel_indices: s.owned_pixels.clone(),
            })
            .collect();

        let ids: Vec<i64> = (1..=n as i64).collect();
        let mut child = vec![-1i64; n];
        let mut parents: Vec<Vec<i64>> = vec![Vec::new(); n];

        let starts: Vec<(isize, isize)> = geometry.iter().map(|g| g.polyline_pixels[0]).collect();
        let ends: Vec<(isize, isize)> = geometry
            .iter()
            .map(|g| *g.polyline_pixels.last().unwrap())
            .collect();

        for i in 0..n {
            for j in 0..n {
                if i != j && ends[j] == starts[i] {
                    parents[i].push(j as i64);
                    child[j] = i as i64;
                }
            }
        }

        let mut npixels = vec![0u64; n];
        for i in 0..n {
            let (r, c) = ends[i];
            npixels[i] = catchment_size(&flow, r, c) as u64;
        }

        info!("Segments::new: built {} segments ({} terminal)", n, child.iter().filter(|&&c| c == -1).count());

        Ok(Segments {
            flow: Rc::new(flow),
            ids,
            geometry,
            npixels,
            child,
            parents,
            basins: None,
        })
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn nlocal(&self) -> usize {
        self.child.iter().filter(|&&c| c == -1).count()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn terminal_ids(&self) -> Vec<i64> {
        self.child
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == -1)
            .map(|(i, _)| self.ids[i])
            .collect()
    }

    pub fn npixels(&self) -> &[u64] {
        &self.npixels
    }

    pub fn raster_shape(&self) -> (usize, usize) {
        (self.flow.rows(), self.flow.columns())
    }

    pub fn transform(&self) -> Option<&AffineTransform> {
        self.flow.transform()
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.flow.crs()
    }

    pub fn flow(&self) -> &Raster {
        &self.flow
    }

    pub fn polyline_world(&self, index: usize) -> Vec<(f64, f64)> {
        let t = self.flow.transform().expect("flow raster always carries a transform");
        self.geometry[index]
            .polyline_pixels
            .iter()
            .map(|&(r, c)| t.apply(r as f64, c as f64))
            .collect()
    }

    pub fn pixel_indices(&self, index: usize) -> &[(isize, isize)] {
        &self.geometry[index].pixel_indices
    }

    /// The pixels a segment owns (per the split-pixel rule), by ID. Used
    /// by the summariser's `summary()` and by catchment iteration.
    pub fn pixels(&self, id: i64) -> Result<Vec<(isize, isize)>> {
        let i = self.index_of(id)?;
        Ok(self.geometry[i].pixel_indices.clone())
    }

    /// The full raw pixel walk of a segment (including the shared
    /// junction pixels at either end), by ID. Used for arc-length and
    /// confinement statistics, which need the ordered walk rather than
    /// the owned-pixel set.
    pub fn polyline_pixels(&self, id: i64) -> Result<Vec<(isize, isize)>> {
        let i = self.index_of(id)?;
        Ok(self.geometry[i].polyline_pixels.clone())
    }

    /// Upstream-to-downstream world-coordinate polyline, by ID.
    pub fn polyline(&self, id: i64) -> Result<Vec<(f64, f64)>> {
        let i = self.index_of(id)?;
        Ok(self.polyline_world(i))
    }

    pub fn index_of(&self, id: i64) -> Result<usize> {
        self.ids
            .iter()
            .position(|&x| x == id)
            .ok_or_else(|| Error::Range {
                name: "id",
                value: id.to_string(),
                expected: format!("one of the {} segment IDs currently in the network", self.ids.len()),
            })
    }

    pub fn isterminal(&self, id: i64) -> Result<bool> {
        let i = self.index_of(id)?;
        Ok(self.child[i] == -1)
    }

    pub fn parents(&self, id: i64) -> Result<Vec<i64>> {
        let i = self.index_of(id)?;
        Ok(self.parents[i].iter().map(|&p| self.ids[p as usize]).collect())
    }

    pub fn child(&self, id: i64) -> Result<Option<i64>> {
        let i = self.index_of(id)?;
        Ok(if self.child[i] == -1 {
            None
        } else {
            Some(self.ids[self.child[i] as usize])
        })
    }

    /// All upstream ancestors of `id`, nearest first. Iteration is capped
    /// at `size()` steps; exceeding that bound means the parent/child
    /// tables have become inconsistent, which is reported as an internal
    /// invariant violation rather than looping forever.
    pub fn ancestors(&self, id: i64) -> Result<Vec<i64>> {
        let mut result = Vec::new();
        let mut frontier = vec![self.index_of(id)?];
        let mut steps = 0usize;
        while let Some(i) = frontier.pop() {
            for &p in &self.parents[i] {
                result.push(self.ids[p as usize]);
                frontier.push(p as usize);
            }
            steps += 1;
            if steps > self.size() + 1 {
                return Err(Error::InternalInvariant(
                    "ancestors() exceeded the segment count while walking parents".into(),
                ));
            }
        }
        Ok(result)
    }

    /// All downstream descendants of `id`, nearest first.
    pub fn descendents(&self, id: i64) -> Result<Vec<i64>> {
        let mut result = Vec::new();
        let mut i = self.index_of(id)?;
        let mut steps = 0usize;
        while self.child[i] != -1 {
            i = self.child[i] as usize;
            result.push(self.ids[i]);
            steps += 1;
            if steps > self.size() + 1 {
                return Err(Error::InternalInvariant(
                    "descendents() exceeded the segment count while walking children".into(),
                ));
            }
        }
        Ok(result)
    }

    /// The terminal outlet of `id`'s local drainage network, plus every
    /// ancestor of that terminal (i.e. the whole local network).
    pub fn family(&self, id: i64) -> Result<Vec<i64>> {
        let mut descendents = self.descendents(id)?;
        let terminal = descendents.pop().unwrap_or(id);
        let mut family = self.ancestors(terminal)?;
        family.push(terminal);
        Ok(family)
    }

    /// The terminal ID that `id` ultimately drains to.
    pub fn terminus(&self, id: i64) -> Result<i64> {
        let i = self.index_of(id)?;
        let mut cur = i;
        let mut steps = 0usize;
        while self.child[cur] != -1 {
            cur = self.child[cur] as usize;
            steps += 1;
            if steps > self.size() + 1 {
                return Err(Error::InternalInvariant("terminus() exceeded the segment count".into()));
            }
        }
        Ok(self.ids[cur])
    }

    pub fn termini(&self, ids: &[i64]) -> Result<Vec<i64>> {
        ids.iter().map(|&id| self.terminus(id)).collect()
    }

    /// Pixel (row, col) of either the terminal outlet (default) or the
    /// segment's own last pixel (`segment_outlets = true`).
    pub fn outlet(&self, id: i64, segment_outlets: bool) -> Result<(isize, isize)> {
        let i = self.index_of(id)?;
        let target = if segment_outlets {
            i
        } else {
            let terminus = self.terminus(id)?;
            self.index_of(terminus)?
        };
        Ok(*self.geometry[target].polyline_pixels.last().unwrap())
    }

    /// Whether each segment's local network terminus is nested inside a
    /// different terminal's basin, i.e. a more-downstream terminal's
    /// catchment swallows this one's outlet. Materialises the basin
    /// raster (C4) if it isn't already cached. Defaults to every
    /// terminal segment when `ids` is `None`.
    pub fn isnested(&mut self, ids: Option<&[i64]>) -> Result<Vec<bool>> {
        if self.basins.is_none() {
            let raster = crate::basin::build(self)?;
            self.basins = Some(Rc::new(raster));
        }
        let basin = self.basins.as_ref().unwrap().clone();

        let targets: Vec<i64> = match ids {
            Some(ids) => ids.to_vec(),
            None => self.terminal_ids(),
        };
        targets
            .iter()
            .map(|&id| {
                let terminus = self.terminus(id)?;
                let outlet = self.outlet(terminus, false)?;
                let labelled = basin.get(outlet.0, outlet.1) as i64;
                Ok(labelled != terminus)
            })
            .collect()
    }

    pub fn basins_cached(&self) -> Option<&Rc<Raster>> {
        self.basins.as_ref()
    }

    pub fn set_basins_cache(&mut self, raster: Rc<Raster>) {
        self.basins = Some(raster);
    }

    pub fn invalidate_basins_cache(&mut self) {
        self.basins = None;
    }

    /// Deep-copies the graph arrays while sharing the underlying immutable
    /// flow raster (and any already-built basin cache), per 4.6's `copy`.
    pub fn copy(&self) -> Segments {
        Segments {
            flow: Rc::clone(&self.flow),
            ids: self.ids.clone(),
            geometry: self.geometry.clone(),
            npixels: self.npixels.clone(),
            child: self.child.clone(),
            parents: self.parents.clone(),
            basins: self.basins.clone(),
        }
    }

    pub(crate) fn ids_vec(&self) -> &[i64] {
        &self.ids
    }

    pub(crate) fn child_vec(&self) -> &[i64] {
        &self.child
    }

    pub(crate) fn parents_vec(&self) -> &[Vec<i64>] {
        &self.parents
    }

    pub(crate) fn geometry_vec(&self) -> &[SegmentGeometry] {
        &self.geometry
    }

    pub(crate) fn npixels_vec(&self) -> &[u64] {
        &self.npixels
    }

    pub(crate) fn rebuild_from(
        &mut self,
        ids: Vec<i64>,
        geometry: Vec<SegmentGeometry>,
        npixels: Vec<u64>,
        child: Vec<i64>,
        parents: Vec<Vec<i64>>,
        basins: Option<Rc<Raster>>,
    ) {
        self.ids = ids;
        self.geometry = geometry;
        self.npixels = npixels;
        self.child = child;
        self.parents = parents;
        self.basins = basins;
    }
}
