//! Terminal-basin raster builder (C4). Stamps an ID per outlet onto a
//! shared grid by walking catchments one at a time, resolving nested basins
//! (the most-downstream terminal wins), and offers a worker-thread parallel
//! path over disjoint terminal groups using `thread::spawn` +
//! `mpsc::channel` (an `Arc`-shared read-only input, one `tx.clone()` per
//! worker) rather than `rayon`.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::flow::{self, d8};
use crate::raster::{DataType, Raster};
use crate::segments::Segments;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::thread;

#[derive(Clone, Copy)]
struct Terminal {
    id: i64,
    outlet: (isize, isize),
}

fn collect_terminals(segments: &Segments) -> Result<Vec<Terminal>> {
    let mut terminals: Vec<Terminal> = segments
        .terminal_ids()
        .into_iter()
        .map(|id| segments.outlet(id, false).map(|outlet| Terminal { id, outlet }))
        .collect::<Result<Vec<_>>>()?;
    terminals.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(terminals)
}

/// Walks downstream from `from` along D8 directions; true if `to` is
/// reached before running off the grid or exceeding the pixel count (a
/// bound against a malformed, cyclic flow field, which should be
/// impossible by construction but is never assumed).
fn drains_into(flow: &Raster, from: (isize, isize), to: (isize, isize)) -> bool {
    if from == to {
        return true;
    }
    let rows = flow.rows() as isize;
    let cols = flow.columns() as isize;
    let limit = flow.num_cells() + 1;
    let mut cur = from;
    for _ in 0..limit {
        let val = flow.get(cur.0, cur.1);
        let next = match d8::downstream_of(cur.0, cur.1, val) {
            Some(n) => n,
            None => return false,
        };
        if next == to {
            return true;
        }
        if next.0 < 0 || next.1 < 0 || next.0 >= rows || next.1 >= cols {
            return false;
        }
        cur = next;
    }
    false
}

/// `table[i][j]` is true when terminal `i`'s outlet drains into terminal
/// `j`'s outlet (terminal `i`'s basin nests inside terminal `j`'s).
fn nesting_table(flow: &Raster, outlets: &[(isize, isize)]) -> Vec<Vec<bool>> {
    let n = outlets.len();
    let mut table = vec![vec![false; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                table[i][j] = drains_into(flow, outlets[i], outlets[j]);
            }
        }
    }
    table
}

/// Resolves a conflict between the terminal already stamped at a pixel and
/// a candidate terminal that also claims it: the more-downstream one wins.
/// When neither drains into the other the pixel is left as the incumbent
/// (the two basins should never legitimately overlap there).
fn resolve(incumbent: i64, candidate: i64, id_index: &HashMap<i64, usize>, nesting: &[Vec<bool>]) -> i64 {
    if incumbent == 0 {
        return candidate;
    }
    if incumbent == candidate {
        return incumbent;
    }
    let (Some(&i), Some(&j)) = (id_index.get(&incumbent), id_index.get(&candidate)) else {
        return incumbent;
    };
    if nesting[i][j] {
        candidate
    } else {
        incumbent
    }
}

fn stamp_group(flow: &Raster, terminals: &[Terminal], id_index: &HashMap<i64, usize>, nesting: &[Vec<bool>]) -> Vec<i64> {
    let mut buffer = vec![0i64; flow.num_cells()];
    for t in terminals {
        let mask = flow::catchment(flow, t.outlet.0, t.outlet.1);
        for (idx, v) in mask.raw_data().iter().enumerate() {
            if *v == 0.0 {
                continue;
            }
            buffer[idx] = resolve(buffer[idx], t.id, id_index, nesting);
        }
    }
    buffer
}

fn to_raster(flow: &Raster, buffer: Vec<i64>) -> Result<Raster> {
    let data: Vec<f64> = buffer.into_iter().map(|v| v as f64).collect();
    Raster::new(
        flow.rows(),
        flow.columns(),
        data,
        Some(0.0),
        DataType::I32,
        flow.crs().cloned(),
        flow.transform().copied(),
    )
}

/// Builds the terminal-basin raster serially, in descending terminal-ID
/// order, per 4.4.
pub fn build(segments: &Segments) -> Result<Raster> {
    let flow = segments.flow();
    let terminals = collect_terminals(segments)?;
    let outlets: Vec<_> = terminals.iter().map(|t| t.outlet).collect();
    let nesting = nesting_table(flow, &outlets);
    let id_index: HashMap<i64, usize> = terminals.iter().enumerate().map(|(i, t)| (t.id, i)).collect();

    let buffer = stamp_group(flow, &terminals, &id_index, &nesting);

    info!("basin: painted {} terminal basins", terminals.len());
    to_raster(flow, buffer)
}

/// Builds the terminal-basin raster using worker threads, one per disjoint
/// group of terminals; each worker paints a private buffer and the
/// reduction (picking the most-downstream terminal per pixel via the same
/// nesting table) runs serially so the result is bit-identical to `build`.
///
/// Must be invoked from a top-level program entry point, not an
/// interactive session, per 4.4's parallelisation contract.
pub fn build_parallel(segments: &Segments, config: &EngineConfig) -> Result<Raster> {
    let flow = segments.flow();
    let terminals = collect_terminals(segments)?;
    if terminals.is_empty() {
        return to_raster(flow, vec![0i64; flow.num_cells()]);
    }

    let outlets: Vec<_> = terminals.iter().map(|t| t.outlet).collect();
    let nesting = Arc::new(nesting_table(flow, &outlets));
    let id_index: Arc<HashMap<i64, usize>> =
        Arc::new(terminals.iter().enumerate().map(|(i, t)| (t.id, i)).collect());
    let flow = Arc::new(flow.clone());

    let worker_count = config.worker_count().max(1).min(terminals.len());
    let mut groups: Vec<Vec<Terminal>> = vec![Vec::new(); worker_count];
    for (i, t) in terminals.iter().enumerate() {
        groups[i % worker_count].push(*t);
    }

    let (tx, rx) = mpsc::channel();
    for (worker_idx, group) in groups.into_iter().enumerate() {
        let tx = tx.clone();
        let flow = flow.clone();
        let id_index = id_index.clone();
        let nesting = nesting.clone();
        thread::spawn(move || {
            debug!("basin: worker {worker_idx} painting {} terminals", group.len());
            let buffer = stamp_group(&flow, &group, &id_index, &nesting);
            tx.send(buffer).expect("basin worker channel receiver dropped early");
        });
    }
    drop(tx);

    let mut reduced = vec![0i64; flow.num_cells()];
    for worker_buffer in rx {
        for idx in 0..reduced.len() {
            if worker_buffer[idx] != 0 {
                reduced[idx] = resolve(reduced[idx], worker_buffer[idx], &id_index, &nesting);
            }
        }
    }

    info!("basin: painted {} terminal basins across {} workers", terminals.len(), worker_count);
    to_raster(&flow, reduced)
}
