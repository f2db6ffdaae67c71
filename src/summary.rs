//! Summary statistics over segments and catchments (C5). Reduces a raster
//! to per-feature numbers via a single pass, the same shape as a zonal
//! statistics tool, but driven by the segment graph's own pixel lists and
//! catchments instead of a separate zone raster.

use crate::error::{Error, Result};
use crate::flow;
use crate::raster::{DataType, Raster, Units};
use crate::segments::Segments;

/// The engine's full enumerated statistic set; no others are supported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Statistic {
    Outlet,
    Min,
    Max,
    Mean,
    Median,
    Std,
    Sum,
    Var,
    NanMin,
    NanMax,
    NanMean,
    NanMedian,
    NanStd,
    NanSum,
    NanVar,
}

#[derive(Clone, Copy)]
enum BasicStat {
    Min,
    Max,
    Sum,
    Mean,
    Median,
    Var,
    Std,
}

impl Statistic {
    fn basic(self) -> Option<(BasicStat, bool)> {
        use BasicStat::*;
        match self {
            Statistic::Outlet => None,
            Statistic::Min => Some((Min, false)),
            Statistic::Max => Some((Max, false)),
            Statistic::Mean => Some((Mean, false)),
            Statistic::Median => Some((Median, false)),
            Statistic::Std => Some((Std, false)),
            Statistic::Sum => Some((Sum, false)),
            Statistic::Var => Some((Var, false)),
            Statistic::NanMin => Some((Min, true)),
            Statistic::NanMax => Some((Max, true)),
            Statistic::NanMean => Some((Mean, true)),
            Statistic::NanMedian => Some((Median, true)),
            Statistic::NanStd => Some((Std, true)),
            Statistic::NanSum => Some((Sum, true)),
            Statistic::NanVar => Some((Var, true)),
        }
    }

    /// Additive statistics get the two-accumulation fast path (4.5's
    /// algorithmic policy) instead of materialising a catchment mask.
    fn is_additive(self) -> bool {
        matches!(
            self,
            Statistic::Sum | Statistic::Mean | Statistic::NanSum | Statistic::NanMean
        )
    }

    fn omits_nan(self) -> bool {
        matches!(
            self,
            Statistic::NanMin
                | Statistic::NanMax
                | Statistic::NanMean
                | Statistic::NanMedian
                | Statistic::NanStd
                | Statistic::NanSum
                | Statistic::NanVar
        )
    }
}

fn reduce(kind: BasicStat, values: &[f64], omit_nan: bool) -> f64 {
    let filtered: Vec<f64> = if omit_nan {
        values.iter().copied().filter(|v| !v.is_nan()).collect()
    } else {
        values.to_vec()
    };
    if !omit_nan && filtered.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    if filtered.is_empty() {
        return f64::NAN;
    }
    match kind {
        BasicStat::Min => filtered.iter().copied().fold(f64::INFINITY, f64::min),
        BasicStat::Max => filtered.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        BasicStat::Sum => filtered.iter().sum(),
        BasicStat::Mean => filtered.iter().sum::<f64>() / filtered.len() as f64,
        BasicStat::Median => {
            let mut sorted = filtered.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let n = sorted.len();
            if n % 2 == 1 {
                sorted[n / 2]
            } else {
                (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
            }
        }
        BasicStat::Var => {
            let mean = filtered.iter().sum::<f64>() / filtered.len() as f64;
            filtered.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / filtered.len() as f64
        }
        BasicStat::Std => {
            let mean = filtered.iter().sum::<f64>() / filtered.len() as f64;
            let var = filtered.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / filtered.len() as f64;
            var.sqrt()
        }
    }
}

fn outlet_value(segments: &Segments, id: i64, values: &Raster) -> Result<f64> {
    let (r, c) = segments.outlet(id, true)?;
    Ok(values.get_or_nan(r, c))
}

/// One value per segment, computed over the segment's own pixel list.
pub fn summary(segments: &Segments, statistic: Statistic, values: &Raster) -> Result<Vec<f64>> {
    segments
        .ids()
        .iter()
        .map(|&id| match statistic.basic() {
            None => outlet_value(segments, id, values),
            Some((kind, omit_nan)) => {
                let pixels = segments.pixels(id)?;
                let sample: Vec<f64> = pixels.iter().map(|&(r, c)| values.get_or_nan(r, c)).collect();
                Ok(reduce(kind, &sample, omit_nan))
            }
        })
        .collect()
}

/// One value per segment (or per terminal, if `terminal` is true), computed
/// over the segment's full upstream catchment, optionally restricted by a
/// boolean `mask`.
pub fn catchment_summary(
    segments: &Segments,
    statistic: Statistic,
    values: &Raster,
    mask: Option<&Raster>,
    terminal: bool,
) -> Result<Vec<f64>> {
    let ids: Vec<i64> = if terminal {
        segments.terminal_ids()
    } else {
        segments.ids().to_vec()
    };

    if statistic == Statistic::Outlet {
        return ids.iter().map(|&id| outlet_value(segments, id, values)).collect();
    }

    if statistic.is_additive() {
        return catchment_additive(segments, statistic, values, mask, &ids);
    }

    let flow = segments.flow();
    let (kind, omit_nan) = statistic.basic().expect("non-outlet statistic always has a basic reducer");
    ids.iter()
        .map(|&id| {
            let (row, col) = segments.outlet(id, !terminal)?;
            let catchment = flow::catchment(flow, row, col);
            let mut sample = Vec::new();
            for (idx, v) in catchment.raw_data().iter().enumerate() {
                if *v == 0.0 {
                    continue;
                }
                let r = (idx / flow.columns()) as isize;
                let c = (idx % flow.columns()) as isize;
                if let Some(m) = mask {
                    if m.get_or_nan(r, c) == 0.0 || m.get_or_nan(r, c).is_nan() {
                        continue;
                    }
                }
                sample.push(values.get_or_nan(r, c));
            }
            Ok(reduce(kind, &sample, omit_nan))
        })
        .collect()
}

/// Builds a 0/1 indicator raster marking pixels that count toward a
/// nan-variant statistic's denominator: non-NaN in `values`, and (if a
/// mask is given) mask-True. Plain accumulation's own mask handling
/// already does the mask-True half of this; this only adds the
/// NaN-exclusion half, which accumulation's "weights=None" default
/// path has no way to express.
fn nan_indicator(values: &Raster, mask: Option<&Raster>) -> Raster {
    let data: Vec<f64> = (0..values.num_cells())
        .map(|i| {
            let r = (i / values.columns()) as isize;
            let c = (i % values.columns()) as isize;
            let present = !values.get_or_nan(r, c).is_nan()
                && mask.map_or(true, |m| {
                    let mv = m.get_or_nan(r, c);
                    !mv.is_nan() && mv != 0.0
                });
            if present {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    Raster::new(
        values.rows(),
        values.columns(),
        data,
        Some(-1.0),
        DataType::F64,
        values.crs().cloned(),
        values.transform().copied(),
    )
    .expect("indicator buffer always matches the values raster's shape")
}

/// The additive fast path: two `flow::accumulation` calls (one weighted by
/// `values`, one counting contributing pixels), read directly at each
/// segment's outlet rather than materialising a catchment mask per
/// segment. For nan-variants the denominator must count only non-NaN
/// pixels, not every mask-true pixel, so it is accumulated from a
/// dedicated indicator raster rather than the plain mask-count default.
fn catchment_additive(
    segments: &Segments,
    statistic: Statistic,
    values: &Raster,
    mask: Option<&Raster>,
    ids: &[i64],
) -> Result<Vec<f64>> {
    let flow = segments.flow();
    let omit_nan = statistic.omits_nan();
    let weighted = flow::accumulation(flow, Some(values), mask, omit_nan);
    let counts = if omit_nan {
        let indicator = nan_indicator(values, mask);
        flow::accumulation(flow, Some(&indicator), mask, false)
    } else {
        flow::accumulation(flow, None, mask, omit_nan)
    };

    let is_mean = matches!(statistic, Statistic::Mean | Statistic::NanMean);
    let terminal = ids.len() == segments.nlocal() && segments.terminal_ids().as_slice() == ids;

    ids.iter()
        .map(|&id| {
            let (row, col) = segments.outlet(id, !terminal)?;
            let total = weighted.get_or_nan(row, col);
            let count = counts.get_or_nan(row, col);
            if is_mean {
                Ok(if count == 0.0 { f64::NAN } else { total / count })
            } else {
                Ok(if count == 0.0 { 0.0 } else { total })
            }
        })
        .collect()
}

fn pixel_area_m2(segments: &Segments, row: isize, col: isize) -> f64 {
    let transform = segments.transform().expect("segment graph always carries a transform");
    let dx = transform.pixel_width().abs();
    let dy = transform.pixel_height().abs();
    match segments.crs() {
        Some(crs) if crs.is_geographic() => {
            let (_, lat) = transform.apply(row as f64 + 0.5, col as f64 + 0.5);
            let meters_per_deg_lat = 111_320.0;
            let meters_per_deg_lon = 111_320.0 * lat.to_radians().cos();
            dx * meters_per_deg_lon * dy * meters_per_deg_lat
        }
        _ => dx * dy,
    }
}

/// Catchment area in square meters, per 4.5's `area` convenience reducer.
pub fn area(segments: &Segments, id: i64, terminal: bool) -> Result<f64> {
    let flow = segments.flow();
    let (row, col) = segments.outlet(id, !terminal)?;
    let n = flow::catchment_size(flow, row, col) as f64;
    Ok(n * pixel_area_m2(segments, row, col))
}

/// Looks up `id`'s position among the IDs a `catchment_summary(..., terminal)`
/// call would have produced, for picking a single value back out of its
/// per-selection result vector.
fn selection_index(segments: &Segments, id: i64, terminal: bool) -> Result<usize> {
    let found = if terminal {
        segments.terminal_ids().iter().position(|&t| t == id)
    } else {
        segments.ids().iter().position(|&t| t == id)
    };
    found.ok_or_else(|| Error::Range {
        name: "id",
        value: id.to_string(),
        expected: "a valid segment id for the requested selection".to_string(),
    })
}

/// Fraction of a catchment's pixels where `indicator` is true (non-zero,
/// non-NaN); the shared implementation behind `burn_ratio`, `in_mask`,
/// `in_perimeter`, and `developed_area`.
pub fn in_mask(segments: &Segments, id: i64, indicator: &Raster, terminal: bool) -> Result<f64> {
    let values = catchment_summary(segments, Statistic::Mean, indicator, None, terminal)?;
    Ok(values[selection_index(segments, id, terminal)?])
}

/// Fraction of a catchment burned, per a boolean burn-perimeter raster.
pub fn burn_ratio(segments: &Segments, id: i64, burned: &Raster, terminal: bool) -> Result<f64> {
    in_mask(segments, id, burned, terminal)
}

/// Burned area in square meters.
pub fn burned_area(segments: &Segments, id: i64, burned: &Raster, terminal: bool) -> Result<f64> {
    Ok(burn_ratio(segments, id, burned, terminal)? * area(segments, id, terminal)?)
}

/// Fraction of a catchment covered by an arbitrary perimeter/mask raster.
pub fn in_perimeter(segments: &Segments, id: i64, perimeter: &Raster, terminal: bool) -> Result<f64> {
    in_mask(segments, id, perimeter, terminal)
}

/// Ratio of a segment's own catchment size to its terminal's catchment
/// size (always 1.0 for a terminal itself).
pub fn catchment_ratio(segments: &Segments, id: i64) -> Result<f64> {
    let flow = segments.flow();
    let (row, col) = segments.outlet(id, true)?;
    let terminus = segments.terminus(id)?;
    let (trow, tcol) = segments.outlet(terminus, true)?;
    let own = flow::catchment_size(flow, row, col) as f64;
    let total = flow::catchment_size(flow, trow, tcol) as f64;
    Ok(if total == 0.0 { f64::NAN } else { own / total })
}

/// Fraction of a catchment classified as developed land cover.
pub fn developed_area(segments: &Segments, id: i64, developed: &Raster, terminal: bool) -> Result<f64> {
    Ok(in_mask(segments, id, developed, terminal)? * area(segments, id, terminal)?)
}

/// Mean soil erodibility (KF) factor over a catchment.
pub fn kf_factor(segments: &Segments, id: i64, kf: &Raster, terminal: bool) -> Result<f64> {
    let values = catchment_summary(segments, Statistic::Mean, kf, None, terminal)?;
    Ok(values[selection_index(segments, id, terminal)?])
}

/// Mean differenced Normalized Burn Ratio, scaled from the conventional
/// ×1000 integer storage back to a unitless ratio.
pub fn scaled_dnbr(segments: &Segments, id: i64, dnbr: &Raster, terminal: bool) -> Result<f64> {
    let values = catchment_summary(segments, Statistic::Mean, dnbr, None, terminal)?;
    Ok(values[selection_index(segments, id, terminal)?] / 1000.0)
}

/// Mean soil/sediment thickness, scaled from centimeters to meters.
pub fn scaled_thickness(segments: &Segments, id: i64, thickness: &Raster, terminal: bool) -> Result<f64> {
    let values = catchment_summary(segments, Statistic::Mean, thickness, None, terminal)?;
    Ok(values[selection_index(segments, id, terminal)?] / 100.0)
}

/// Mean sin(slope angle) over a catchment, read directly from a
/// precomputed sine-of-slope raster (the engine does not derive slope
/// angle from a DEM for this reducer; callers supply it).
pub fn sine_theta(segments: &Segments, id: i64, sine_slope: &Raster, terminal: bool) -> Result<f64> {
    let values = catchment_summary(segments, Statistic::Mean, sine_slope, None, terminal)?;
    Ok(values[selection_index(segments, id, terminal)?])
}

/// Arc length of a segment's polyline, in `units`.
pub fn length(segments: &Segments, id: i64, units: Units) -> Result<f64> {
    let polyline = segments.polyline(id)?;
    let base_length: f64 = polyline
        .windows(2)
        .map(|w| {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt()
        })
        .sum();
    Ok(units.from_base(base_length))
}

/// Elevation drop from a segment's upstream endpoint to its downstream
/// endpoint (always ≥ 0 for a hydrologically-conditioned DEM; negative
/// values indicate an unconditioned or noisy input and are passed through
/// rather than clamped).
pub fn relief(segments: &Segments, id: i64, dem: &Raster) -> Result<f64> {
    let pixels = segments.polyline_pixels(id)?;
    let (r0, c0) = *pixels.first().expect("a segment always has at least one pixel");
    let (r1, c1) = *pixels.last().unwrap();
    Ok(dem.get_or_nan(r0, c0) - dem.get_or_nan(r1, c1))
}

/// Relief normalised by the square root of catchment area, a standard
/// channel-steepness proxy.
pub fn ruggedness(segments: &Segments, id: i64, dem: &Raster, terminal: bool) -> Result<f64> {
    let r = relief(segments, id, dem)?;
    let a = area(segments, id, terminal)?;
    Ok(if a <= 0.0 { f64::NAN } else { r / a.sqrt() })
}

/// Mean gradient along a segment's polyline (relief divided by length, in
/// base units).
pub fn slope(segments: &Segments, id: i64, dem: &Raster) -> Result<f64> {
    let r = relief(segments, id, dem)?;
    let l = length(segments, id, Units::Base)?;
    Ok(if l <= 0.0 { f64::NAN } else { r / l })
}

/// Perpendicular-slope channel confinement angle, in degrees, averaged
/// over a segment's pixels. For each pixel, looks `neighborhood` pixels
/// out along each of the two directions perpendicular to local flow,
/// takes the maximum DEM rise in each direction, and combines the two
/// resulting slopes into a confinement angle per 4.5's formula:
/// θ = 180° − atan(s₁) − atan(s₂).
pub fn confinement(segments: &Segments, id: i64, dem: &Raster, neighborhood: usize, dem_per_m: Option<f64>) -> Result<f64> {
    if neighborhood == 0 {
        return Err(Error::Range {
            name: "neighborhood",
            value: "0".to_string(),
            expected: ">= 1".to_string(),
        });
    }
    let scale = dem_per_m.unwrap_or(1.0);
    let transform = segments.transform().expect("segment graph always carries a transform");
    let flow = segments.flow();
    let pixels = segments.pixels(id)?;
    if pixels.is_empty() {
        return Ok(f64::NAN);
    }

    let n = neighborhood as f64;
    let mut angles = Vec::with_capacity(pixels.len());
    for (row, col) in pixels {
        let value = flow.get(row, col);
        let Some(dir_idx) = crate::flow::d8::direction_index(value) else {
            continue;
        };
        let (dr, dc) = crate::flow::d8::OFFSETS[dir_idx];
        // Perpendiculars: rotate the flow offset by ±90 degrees.
        let perp_a = (-dc, dr);
        let perp_b = (dc, -dr);
        let is_diag = dr != 0 && dc != 0;
        let length_per_step = if is_diag {
            transform.pixel_diagonal()
        } else if dr != 0 {
            transform.pixel_width().abs()
        } else {
            transform.pixel_height().abs()
        };

        let base_elev = dem.get_or_nan(row, col) * scale;
        let rise = |perp: (isize, isize)| -> f64 {
            let mut max_elev = f64::NEG_INFINITY;
            for step in 1..=neighborhood as isize {
                let r = row + perp.0 * step;
                let c = col + perp.1 * step;
                let e = dem.get_or_nan(r, c) * scale;
                if !e.is_nan() && e > max_elev {
                    max_elev = e;
                }
            }
            if max_elev.is_finite() {
                (max_elev - base_elev).max(0.0)
            } else {
                0.0
            }
        };

        let h1 = rise(perp_a);
        let h2 = rise(perp_b);
        let denom = n * length_per_step;
        let s1 = if denom > 0.0 { h1 / denom } else { 0.0 };
        let s2 = if denom > 0.0 { h2 / denom } else { 0.0 };
        let theta = 180.0 - s1.atan().to_degrees() - s2.atan().to_degrees();
        angles.push(theta);
    }

    if angles.is_empty() {
        return Ok(f64::NAN);
    }
    Ok(angles.iter().sum::<f64>() / angles.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{AffineTransform, Crs, DataType};
    use approx::assert_relative_eq;

    fn georeferenced(rows: usize, cols: usize, data: Vec<f64>, nodata: f64) -> Raster {
        Raster::new(
            rows,
            cols,
            data,
            Some(nodata),
            DataType::F64,
            Some(Crs::Epsg(5070)),
            Some(AffineTransform::from_origin(0.0, 0.0, 10.0, 10.0)),
        )
        .unwrap()
    }

    // 1x5 single east-flowing channel, entirely inside the mask.
    fn single_channel() -> Segments {
        let flow = georeferenced(1, 5, vec![1.0, 1.0, 1.0, 1.0, -1.0], -1.0);
        let mask = georeferenced(1, 5, vec![1.0; 5], 0.0);
        Segments::new(flow, &mask, 1000.0, Units::Meters).unwrap()
    }

    #[test]
    fn sum_and_mean_over_a_single_segment() {
        let segments = single_channel();
        let values = georeferenced(1, 5, vec![1.0, 2.0, 3.0, 4.0, 5.0], -9999.0);
        let sums = summary(&segments, Statistic::Sum, &values).unwrap();
        let means = summary(&segments, Statistic::Mean, &values).unwrap();
        assert_relative_eq!(sums[0], 15.0);
        assert_relative_eq!(means[0], 3.0);
    }

    #[test]
    fn additive_and_direct_paths_agree_for_mean() {
        let segments = single_channel();
        let values = georeferenced(1, 5, vec![1.0, 2.0, 3.0, 4.0, 5.0], -9999.0);
        let additive = catchment_summary(&segments, Statistic::Mean, &values, None, true).unwrap();
        let direct = catchment_summary(&segments, Statistic::Median, &values, None, true).unwrap();
        // mean over the full catchment (all 5 pixels) is 3.0; median matches too
        // for this symmetric sample.
        assert_relative_eq!(additive[0], 3.0);
        assert_relative_eq!(direct[0], 3.0);
    }

    #[test]
    fn nan_variants_omit_nan_but_plain_variants_propagate_it() {
        let segments = single_channel();
        let values = georeferenced(1, 5, vec![1.0, f64::NAN, 3.0, 4.0, 5.0], -9999.0);
        let plain = summary(&segments, Statistic::Sum, &values).unwrap();
        let nan_omitting = summary(&segments, Statistic::NanSum, &values).unwrap();
        assert!(plain[0].is_nan());
        assert_relative_eq!(nan_omitting[0], 13.0);
    }

    #[test]
    fn additive_nanmean_denominator_excludes_nan_pixels_not_just_absent_ones() {
        let segments = single_channel();
        let values = georeferenced(1, 5, vec![1.0, f64::NAN, 3.0, 4.0, 5.0], -9999.0);
        let nanmeans = catchment_summary(&segments, Statistic::NanMean, &values, None, true).unwrap();
        // the catchment has 5 pixels but only 4 carry a real value; the mean
        // must divide by 4, not by the full catchment size.
        assert_relative_eq!(nanmeans[0], (1.0 + 3.0 + 4.0 + 5.0) / 4.0);
    }

    #[test]
    fn outlet_statistic_reads_the_segment_outlet_pixel() {
        let segments = single_channel();
        let values = georeferenced(1, 5, vec![10.0, 20.0, 30.0, 40.0, 50.0], -9999.0);
        let outlet = summary(&segments, Statistic::Outlet, &values).unwrap();
        assert_relative_eq!(outlet[0], 50.0);
    }

    #[test]
    fn area_scales_catchment_size_by_pixel_area() {
        let segments = single_channel();
        let a = area(&segments, 1, true).unwrap();
        assert_relative_eq!(a, 5.0 * 100.0);
    }

    #[test]
    fn length_sums_euclidean_step_distances() {
        let segments = single_channel();
        let l = length(&segments, 1, Units::Meters).unwrap();
        assert_relative_eq!(l, 40.0);
    }

    #[test]
    fn relief_is_upstream_elevation_minus_downstream_elevation() {
        let segments = single_channel();
        let dem = georeferenced(1, 5, vec![100.0, 90.0, 80.0, 70.0, 60.0], -9999.0);
        let r = relief(&segments, 1, &dem).unwrap();
        assert_relative_eq!(r, 40.0);
    }

    #[test]
    fn slope_is_relief_over_length() {
        let segments = single_channel();
        let dem = georeferenced(1, 5, vec![100.0, 90.0, 80.0, 70.0, 60.0], -9999.0);
        let s = slope(&segments, 1, &dem).unwrap();
        assert_relative_eq!(s, 40.0 / 40.0);
    }

    #[test]
    fn burn_ratio_is_the_fraction_of_burned_catchment_pixels() {
        let segments = single_channel();
        let burned = georeferenced(1, 5, vec![1.0, 1.0, 0.0, 0.0, 0.0], -9999.0);
        let ratio = burn_ratio(&segments, 1, &burned, true).unwrap();
        assert_relative_eq!(ratio, 2.0 / 5.0);
    }

    #[test]
    fn catchment_ratio_of_a_terminal_is_one() {
        let segments = single_channel();
        let ratio = catchment_ratio(&segments, 1).unwrap();
        assert_relative_eq!(ratio, 1.0);
    }

    #[test]
    fn confinement_rejects_zero_neighborhood() {
        let segments = single_channel();
        let dem = georeferenced(1, 5, vec![0.0; 5], -9999.0);
        assert!(confinement(&segments, 1, &dem, 0, None).is_err());
    }

    #[test]
    fn confinement_of_a_flat_dem_is_near_180_degrees() {
        let segments = single_channel();
        let dem = georeferenced(1, 5, vec![0.0; 5], -9999.0);
        let theta = confinement(&segments, 1, &dem, 1, None).unwrap();
        assert_relative_eq!(theta, 180.0, epsilon = 1e-6);
    }
}
