//! Catchment delineation (4.2): an iterative inverse walk (BFS) from a
//! target pixel, following only *incoming* flow edges, building the
//! upstream reachability set one D8 step at a time.

use crate::flow::d8;
use crate::raster::{DataType, Raster};
use std::collections::VecDeque;

/// Returns a boolean H×W raster whose True cells are the upstream set of
/// `(row, col)` under D8 routing (inclusive of the target pixel itself).
pub fn catchment(flow: &Raster, row: isize, col: isize) -> Raster {
    let rows = flow.rows() as isize;
    let cols = flow.columns() as isize;
    let mut in_catchment = vec![false; (rows * cols) as usize];
    let idx = |r: isize, c: isize| (r * cols + c) as usize;

    if row < 0 || col < 0 || row >= rows || col >= cols {
        return bool_raster(flow, in_catchment, rows, cols);
    }

    let mut queue = VecDeque::new();
    queue.push_back((row, col));
    in_catchment[idx(row, col)] = true;

    while let Some((r, c)) = queue.pop_front() {
        for dr in -1..=1 {
            for dc in -1..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let (nr, nc) = (r + dr, c + dc);
                if nr < 0 || nc < 0 || nr >= rows || nc >= cols {
                    continue;
                }
                if in_catchment[idx(nr, nc)] {
                    continue;
                }
                let val = flow.get(nr, nc);
                if d8::flows_into(nr, nc, val, r, c) {
                    in_catchment[idx(nr, nc)] = true;
                    queue.push_back((nr, nc));
                }
            }
        }
    }

    bool_raster(flow, in_catchment, rows, cols)
}

fn bool_raster(flow: &Raster, values: Vec<bool>, rows: isize, cols: isize) -> Raster {
    let data: Vec<f64> = values.into_iter().map(|b| if b { 1.0 } else { 0.0 }).collect();
    Raster::new(
        rows as usize,
        cols as usize,
        data,
        Some(0.0),
        DataType::Bool,
        flow.crs().cloned(),
        flow.transform().copied(),
    )
    .expect("catchment buffer always matches declared shape")
}

/// Cardinality of the catchment of `(row, col)`, without materialising the
/// full raster — used by `Segments::npixels` to avoid allocating an H×W
/// buffer per segment when only the count is needed.
pub fn catchment_size(flow: &Raster, row: isize, col: isize) -> usize {
    let rows = flow.rows() as isize;
    let cols = flow.columns() as isize;
    if row < 0 || col < 0 || row >= rows || col >= cols {
        return 0;
    }
    let mut visited = vec![false; (rows * cols) as usize];
    let idx = |r: isize, c: isize| (r * cols + c) as usize;
    let mut queue = VecDeque::new();
    queue.push_back((row, col));
    visited[idx(row, col)] = true;
    let mut count = 0usize;
    while let Some((r, c)) = queue.pop_front() {
        count += 1;
        for dr in -1..=1 {
            for dc in -1..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let (nr, nc) = (r + dr, c + dc);
                if nr < 0 || nc < 0 || nr >= rows || nc >= cols || visited[idx(nr, nc)] {
                    continue;
                }
                let val = flow.get(nr, nc);
                if d8::flows_into(nr, nc, val, r, c) {
                    visited[idx(nr, nc)] = true;
                    queue.push_back((nr, nc));
                }
            }
        }
    }
    count
}
