//! Flow accumulation (4.2): iterative Kahn-style reverse-topological queue
//! processing. In-degree is computed from flow directions, a stack is
//! seeded with zero-inflow pixels, and accumulation relaxes downstream in a
//! single pass.

use crate::flow::d8;
use crate::raster::{DataType, Raster};
use log::debug;
use std::collections::VecDeque;

/// Computes `A[p] = sum of w[q]` over every upstream pixel `q` that flows
/// into `p` (including `p` itself). `weights` defaults per 4.2: with no
/// weights, weight is 1 for mask-True pixels and 0 elsewhere (1 everywhere
/// if no mask either). With weights given, NoData/NaN weight cells
/// contribute 0 when `omitnan` is true; when `omitnan` is false their NaN
/// poisons every downstream accumulation value (f64 arithmetic already
/// propagates NaN through the relaxation sum, so no special case is
/// needed beyond seeding the NaN).
pub fn accumulation(flow: &Raster, weights: Option<&Raster>, mask: Option<&Raster>, omitnan: bool) -> Raster {
    let rows = flow.rows() as isize;
    let cols = flow.columns() as isize;

    let mut acc = vec![0.0f64; (rows * cols) as usize];
    let mut indegree = vec![0u32; (rows * cols) as usize];
    let idx = |r: isize, c: isize| (r * cols + c) as usize;

    for r in 0..rows {
        for c in 0..cols {
            let w = match weights {
                Some(wr) => {
                    let v = wr.get_or_nan(r, c);
                    if v.is_nan() {
                        if omitnan {
                            0.0
                        } else {
                            f64::NAN
                        }
                    } else {
                        v
                    }
                }
                None => match mask {
                    Some(m) => {
                        if m.get_or_nan(r, c) != 0.0 && !m.get_or_nan(r, c).is_nan() {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    None => 1.0,
                },
            };
            let w = if let (Some(_), Some(m)) = (weights, mask) {
                let in_mask = m.get_or_nan(r, c) != 0.0 && !m.get_or_nan(r, c).is_nan();
                if in_mask {
                    w
                } else {
                    0.0
                }
            } else {
                w
            };
            acc[idx(r, c)] = w;
        }
    }

    for r in 0..rows {
        for c in 0..cols {
            let val = flow.get(r, c);
            if let Some((dr, dc)) = d8::downstream_of(r, c, val) {
                if dr >= 0 && dr < rows && dc >= 0 && dc < cols {
                    indegree[idx(dr, dc)] += 1;
                }
            }
        }
    }

    let mut queue: VecDeque<(isize, isize)> = VecDeque::new();
    for r in 0..rows {
        for c in 0..cols {
            if indegree[idx(r, c)] == 0 {
                queue.push_back((r, c));
            }
        }
    }
    debug!("accumulation: seeded {} zero-indegree pixels", queue.len());

    let mut processed = 0usize;
    while let Some((r, c)) = queue.pop_front() {
        processed += 1;
        let val = flow.get(r, c);
        if let Some((dr, dc)) = d8::downstream_of(r, c, val) {
            if dr >= 0 && dr < rows && dc >= 0 && dc < cols {
                acc[idx(dr, dc)] += acc[idx(r, c)];
                indegree[idx(dr, dc)] -= 1;
                if indegree[idx(dr, dc)] == 0 {
                    queue.push_back((dr, dc));
                }
            }
        }
    }
    debug!("accumulation: relaxed {} pixels", processed);

    Raster::new(
        rows as usize,
        cols as usize,
        acc,
        Some(f64::NAN),
        DataType::F64,
        flow.crs().cloned(),
        flow.transform().copied(),
    )
    .expect("accumulation buffer always matches declared shape")
}

#[cfg(test)]
mod tests {
    use super::*;

    // A single 1x3 east-flowing channel: col0 -> col1 -> col2.
    fn single_channel() -> Raster {
        Raster::new(1, 3, vec![1.0, 1.0, -1.0], Some(-1.0), DataType::F64, None, None).unwrap()
    }

    #[test]
    fn unweighted_unmasked_accumulation_counts_upstream_pixels() {
        let flow = single_channel();
        let acc = accumulation(&flow, None, None, false);
        assert_eq!(acc.get(0, 0), 1.0);
        assert_eq!(acc.get(0, 1), 2.0);
        assert_eq!(acc.get(0, 2), 3.0);
    }

    #[test]
    fn mask_false_pixels_contribute_zero_weight() {
        let flow = single_channel();
        let mask = Raster::new(1, 3, vec![0.0, 1.0, 1.0], Some(-1.0), DataType::Bool, None, None).unwrap();
        let acc = accumulation(&flow, None, Some(&mask), false);
        assert_eq!(acc.get(0, 2), 2.0);
    }

    #[test]
    fn nan_weight_poisons_downstream_when_not_omitted() {
        let flow = single_channel();
        let weights = Raster::new(1, 3, vec![1.0, f64::NAN, 1.0], None, DataType::F64, None, None).unwrap();
        let acc = accumulation(&flow, Some(&weights), None, false);
        assert!(acc.get(0, 2).is_nan());
    }

    #[test]
    fn nan_weight_is_skipped_when_omitnan_is_true() {
        let flow = single_channel();
        let weights = Raster::new(1, 3, vec![1.0, f64::NAN, 1.0], None, DataType::F64, None, None).unwrap();
        let acc = accumulation(&flow, Some(&weights), None, true);
        assert_eq!(acc.get(0, 2), 2.0);
    }
}
