//! Stream-segment network extraction (4.2's `network`): seeds a stack with
//! zero-inflow headwater pixels, walks each one downstream along D8
//! directions recording vertices, and stops (pushing the landing pixel
//! back onto the stack) whenever it reaches a confluence. Pixel indices are
//! kept as the primary representation (rather than round-tripping through
//! world coordinates and back), and the max-length bisection is performed
//! explicitly instead of delegating it to a downstream GIS tool.

use crate::error::{Error, Result};
use crate::flow::d8;
use crate::raster::{AffineTransform, Raster, Units};
use log::info;
use std::collections::{HashSet, VecDeque};

/// One extracted stream segment: the full raw pixel walk (used to derive
/// the world-coordinate polyline, which must include the shared junction
/// pixel at both ends to satisfy the "last coord of parent == first coord
/// of child" continuity invariant) and the split-pixel-rule-adjusted pixel
/// ownership list (used for catchment/statistic iteration, where every
/// pixel must belong to exactly one segment).
#[derive(Clone, Debug)]
pub struct RawSegment {
    pub polyline_pixels: Vec<(isize, isize)>,
    pub owned_pixels: Vec<(isize, isize)>,
}

fn in_bounds(r: isize, c: isize, rows: isize, cols: isize) -> bool {
    r >= 0 && c >= 0 && r < rows && c < cols
}

fn is_mask_true(mask: &Raster, r: isize, c: isize) -> bool {
    let v = mask.get_or_nan(r, c);
    !v.is_nan() && v != 0.0
}

fn step_length(from: (isize, isize), to: (isize, isize), transform: &AffineTransform) -> f64 {
    let dr = to.0 - from.0;
    let dc = to.1 - from.1;
    if dr != 0 && dc != 0 {
        transform.pixel_diagonal()
    } else if dr != 0 {
        transform.pixel_height().abs()
    } else {
        transform.pixel_width().abs()
    }
}

/// Extracts the ordered list of stream segments from `flow` restricted to
/// `mask`, splitting any run longer than `max_length` (given in `units`)
/// into equal-length pieces.
pub fn network(flow: &Raster, mask: &Raster, max_length: f64, units: Units) -> Result<Vec<RawSegment>> {
    let transform = flow.require_transform()?;
    flow.require_crs()?;

    let max_length_base = units.to_base(max_length);
    let diag = transform.pixel_diagonal();
    if max_length_base < diag {
        return Err(Error::Range {
            name: "max_length",
            value: format!("{max_length_base}"),
            expected: format!(">= pixel diagonal ({diag})"),
        });
    }

    let rows = flow.rows() as isize;
    let cols = flow.columns() as isize;

    // in-degree within the mask-true subgraph: counts mask-true neighbours
    // whose flow direction points at this pixel.
    let mut inflow = vec![0u8; (rows * cols) as usize];
    let idx = |r: isize, c: isize| (r * cols + c) as usize;
    for r in 0..rows {
        for c in 0..cols {
            if !is_mask_true(mask, r, c) {
                continue;
            }
            let val = flow.get(r, c);
            if let Some((dr, dc)) = d8::downstream_of(r, c, val) {
                if in_bounds(dr, dc, rows, cols) && is_mask_true(mask, dr, dc) {
                    inflow[idx(dr, dc)] += 1;
                }
            }
        }
    }

    let mut worklist: VecDeque<(isize, isize)> = VecDeque::new();
    for r in 0..rows {
        for c in 0..cols {
            if is_mask_true(mask, r, c) && inflow[idx(r, c)] == 0 {
                worklist.push_back((r, c));
            }
        }
    }

    let mut visited_starts: HashSet<(isize, isize)> = HashSet::new();
    let mut segments = Vec::new();

    while let Some(start) = worklist.pop_front() {
        if !visited_starts.insert(start) {
            continue;
        }

        // Walk the full arc: a run of pixels with no internal branching,
        // ending either at a true boundary (mask-false/no-flow) or at a
        // confluence pixel (which becomes the start of its own segment). The
        // confluence pixel itself is appended as the arc's last vertex so
        // that this segment's polyline ends exactly where its child's
        // polyline starts; `split_arc` then strips that shared vertex from
        // `owned_pixels` so the child, not this segment, owns it.
        let mut arc = vec![start];
        let mut cur = start;
        let mut ends_at_confluence = false;
        loop {
            let val = flow.get(cur.0, cur.1);
            let next = match d8::downstream_of(cur.0, cur.1, val) {
                Some(n) if in_bounds(n.0, n.1, rows, cols) && is_mask_true(mask, n.0, n.1) => n,
                _ => break,
            };
            if inflow[idx(next.0, next.1)] > 1 {
                arc.push(next);
                worklist.push_back(next);
                ends_at_confluence = true;
                break;
            }
            arc.push(next);
            cur = next;
        }

        segments.extend(split_arc(&arc, transform, max_length_base, ends_at_confluence));
    }

    info!("network: extracted {} segments", segments.len());
    Ok(segments)
}

fn split_arc(arc: &[(isize, isize)], transform: &AffineTransform, max_length: f64, ends_at_confluence: bool) -> Vec<RawSegment> {
    let mut cumulative = vec![0.0f64; arc.len()];
    for i in 1..arc.len() {
        cumulative[i] = cumulative[i - 1] + step_length(arc[i - 1], arc[i], transform);
    }
    let total_length = *cumulative.last().unwrap_or(&0.0);

    let num_pieces = if total_length <= max_length || arc.len() < 2 {
        1
    } else {
        (total_length / max_length).ceil() as usize
    };
    let piece_target = total_length / num_pieces as f64;

    let mut boundaries = vec![0usize];
    for k in 1..num_pieces {
        let target = k as f64 * piece_target;
        let mut cut = boundaries[boundaries.len() - 1] + 1;
        while cut < arc.len() - 1 && cumulative[cut] < target {
            cut += 1;
        }
        boundaries.push(cut);
    }
    boundaries.push(arc.len() - 1);

    let mut out = Vec::with_capacity(num_pieces);
    for k in 0..num_pieces {
        let start = boundaries[k];
        let end = boundaries[k + 1];
        let piece: Vec<(isize, isize)> = arc[start..=end].to_vec();
        let has_child = k + 1 < num_pieces || ends_at_confluence;
        let owned = if has_child && piece.len() > 1 {
            piece[..piece.len() - 1].to_vec()
        } else {
            piece.clone()
        };
        out.push(RawSegment {
            polyline_pixels: piece,
            owned_pixels: owned,
        });
    }
    out
}
