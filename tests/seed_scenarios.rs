//! End-to-end seed scenarios exercising the full construct -> query ->
//! summarise -> filter -> basin pipeline through the public API, one test
//! per numbered scenario.

use std::rc::Rc;

use streamnet_engine::flow;
use streamnet_engine::{
    AffineTransform, Crs, DataType, EngineConfig, Raster, SelectionType, Segments, Statistic,
    Units,
};

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

/// Scenario 1: 5x5 flow grid, all-east flow, mask True only on row 2.
/// Expect one 5-pixel terminal segment.
#[test]
fn scenario_1_single_channel_on_a_5x5_grid() {
    let flow_data = vec![1.0; 25];
    let flow = georeferenced(5, 5, flow_data, -1.0);

    let mut mask_data = vec![0.0; 25];
    for c in 0..5 {
        mask_data[2 * 5 + c] = 1.0;
    }
    let mask = georeferenced(5, 5, mask_data, 0.0);

    let segments = Segments::new(flow, &mask, f64::MAX / 2.0, Units::Meters).unwrap();

    assert_eq!(segments.size(), 1);
    assert_eq!(segments.nlocal(), 1);
    let id = segments.ids()[0];
    assert_eq!(segments.child(id).unwrap(), None);
    assert_eq!(segments.parents(id).unwrap(), Vec::<i64>::new());

    let pixels = segments.pixels(id).unwrap();
    assert_eq!(pixels.len(), 5);
    let expected: Vec<(isize, isize)> = (0..5).map(|c| (2, c)).collect();
    assert_eq!(pixels, expected);
}

/// Scenario 2: Y-confluence. Two east-flowing rows turn south and merge,
/// continuing east. Expect 3 segments, the confluence with two parents,
/// one terminal whose family covers the whole network.
#[test]
fn scenario_2_y_confluence() {
    // 4x5 grid. Rows 0 and 2 flow east to column 3, then turn toward row 1;
    // they meet at (1,3), which continues east to (1,4), the outlet.
    let idx = |r: usize, c: usize| r * 5 + c;
    let mut flow_data = vec![-1.0; 20];
    for c in 0..3 {
        flow_data[idx(0, c)] = 1.0; // E
        flow_data[idx(2, c)] = 1.0; // E
    }
    flow_data[idx(0, 3)] = 4.0; // S, into (1,3)
    flow_data[idx(2, 3)] = 64.0; // N, into (1,3)
    flow_data[idx(1, 3)] = 1.0; // E, into (1,4)
    let flow = georeferenced(4, 5, flow_data, -1.0);

    let mut mask_data = vec![0.0; 20];
    for c in 0..=3 {
        mask_data[idx(0, c)] = 1.0;
        mask_data[idx(2, c)] = 1.0;
    }
    mask_data[idx(1, 3)] = 1.0;
    mask_data[idx(1, 4)] = 1.0;
    let mask = georeferenced(4, 5, mask_data, 0.0);

    let segments = Segments::new(flow, &mask, f64::MAX / 2.0, Units::Meters).unwrap();
    assert_eq!(segments.size(), 3);
    assert_eq!(segments.nlocal(), 1);

    let terminal = segments.terminal_ids()[0];
    assert_eq!(segments.parents(terminal).unwrap().len(), 2);
    assert_eq!(segments.family(terminal).unwrap().len(), 3);
    for &id in segments.ids() {
        assert_eq!(segments.terminus(id).unwrap(), terminal);
    }

    for &id in segments.ids() {
        if let Some(child) = segments.child(id).unwrap() {
            let own_last = *segments.polyline_pixels(id).unwrap().last().unwrap();
            let child_first = segments.polyline_pixels(child).unwrap()[0];
            assert_eq!(own_last, child_first);
        }
    }
}

/// Scenario 3: max-length split of a single long channel. The exact piece
/// count is an implementation choice (see DESIGN.md); what must hold is
/// that every non-final piece respects the bound, parent/child pixel
/// continuity holds across every cut, and `npixels` increases
/// monotonically downstream.
#[test]
fn scenario_3_long_channel_is_split_by_max_length() {
    let mut flow_data = vec![-1.0; 11];
    for c in 0..10 {
        flow_data[c] = 1.0;
    }
    let flow = georeferenced(1, 11, flow_data, -1.0);
    let mask_data = (0..11).map(|c| if c < 10 { 1.0 } else { 0.0 }).collect();
    let mask = georeferenced(1, 11, mask_data, 0.0);

    let max_length = 30.0; // 3 pixel-widths of 10m
    let segments = Segments::new(flow, &mask, max_length, Units::Meters).unwrap();

    assert!(segments.size() > 1, "a 90m run must split under a 30m cap");
    assert_eq!(segments.nlocal(), 1);

    for &id in segments.ids() {
        if let Some(child) = segments.child(id).unwrap() {
            let own_last = *segments.polyline_pixels(id).unwrap().last().unwrap();
            let child_first = segments.polyline_pixels(child).unwrap()[0];
            assert_eq!(own_last, child_first);
        }
    }

    // npixels is the full upstream catchment count at each segment's own
    // outlet, so it strictly increases walking downstream along the chain.
    let mut id = segments
        .ids()
        .iter()
        .copied()
        .find(|&id| segments.parents(id).unwrap().is_empty())
        .unwrap();
    let mut prev = segments.npixels()[segments.index_of(id).unwrap()];
    while let Some(child) = segments.child(id).unwrap() {
        let next = segments.npixels()[segments.index_of(child).unwrap()];
        assert!(next > prev, "npixels must strictly increase downstream");
        prev = next;
        id = child;
    }
}

/// Scenario 4: catchment summary with NoData. 3x3 grid, flow all-south,
/// mask all-True. Bottom-left's mean excludes nothing; bottom-middle's
/// plain mean is NaN (its catchment touches NoData) but nanmean excludes
/// it.
#[test]
fn scenario_4_catchment_summary_with_nodata() {
    let flow = georeferenced(3, 3, vec![4.0; 9], -1.0);
    let mask = georeferenced(3, 3, vec![1.0; 9], 0.0);
    let values = georeferenced(
        3,
        3,
        vec![
            1.0, f64::NAN, 3.0, //
            4.0, 5.0, 6.0, //
            7.0, 8.0, 9.0,
        ],
        -9999.0,
    );

    let segments = Segments::new(flow, &mask, f64::MAX / 2.0, Units::Meters).unwrap();
    assert_eq!(segments.size(), 3);

    let bottom_left = segments
        .ids()
        .iter()
        .copied()
        .find(|&id| segments.outlet(id, true).unwrap() == (2, 0))
        .unwrap();
    let bottom_mid = segments
        .ids()
        .iter()
        .copied()
        .find(|&id| segments.outlet(id, true).unwrap() == (2, 1))
        .unwrap();

    let means = streamnet_engine::summary::catchment_summary(
        &segments,
        Statistic::Mean,
        &values,
        None,
        false,
    )
    .unwrap();
    let bl_index = segments.index_of(bottom_left).unwrap();
    let bm_index = segments.index_of(bottom_mid).unwrap();
    assert!((means[bl_index] - (1.0 + 4.0 + 7.0) / 3.0).abs() < 1e-9);
    assert!(means[bm_index].is_nan());

    let nanmeans = streamnet_engine::summary::catchment_summary(
        &segments,
        Statistic::NanMean,
        &values,
        None,
        false,
    )
    .unwrap();
    assert!((nanmeans[bm_index] - (5.0 + 8.0) / 2.0).abs() < 1e-9);
}

/// Scenario 5: continuity filter on a linear chain of 5 segments. Interior
/// removals are never approved, even with `keep_downstream` set, because
/// removing an interior segment would disconnect its neighbours.
#[test]
fn scenario_5_interior_segments_cannot_be_removed() {
    // A 6-pixel diagonal (SE) channel on a 6x6 grid. `max_length` set to
    // exactly one pixel diagonal — the smallest value `network()` accepts —
    // forces a cut after every single edge, yielding 5 one-edge segments
    // chained start-to-end.
    let transform = AffineTransform::from_origin(0.0, 0.0, 10.0, 10.0);
    let mut flow_data = vec![-1.0; 36];
    for i in 0..5 {
        flow_data[i * 6 + i] = 2.0; // SE
    }
    let flow = Raster::new(6, 6, flow_data, Some(-1.0), DataType::F64, Some(Crs::Epsg(5070)), Some(transform)).unwrap();
    let mut mask_data = vec![0.0; 36];
    for i in 0..6 {
        mask_data[i * 6 + i] = 1.0;
    }
    let mask = georeferenced(6, 6, mask_data, 0.0);

    let segments = Segments::new(flow, &mask, transform.pixel_diagonal(), Units::Meters).unwrap();
    assert_eq!(segments.size(), 5);

    let requested: Vec<bool> = vec![false, true, false, true, false];
    let selection = SelectionType::Mask(requested);
    let approved = segments.continuous(&selection, true, false, false).unwrap();
    assert_eq!(approved, vec![false, false, false, false, false]);

    let approved_kd = segments.continuous(&selection, true, false, true).unwrap();
    assert_eq!(approved_kd, vec![false, false, false, false, false]);
}

/// Scenario 6: nested basins. A's local network is small and sits inside
/// B's much larger catchment even though the two are unconnected in the
/// segment graph; the basin raster should label the overlap with B, and
/// `isnested` should flag A but not B.
#[test]
fn scenario_6_nested_basins() {
    let flow = georeferenced(
        3,
        3,
        vec![
            4.0, -1.0, -1.0, //
            1.0, 4.0, -1.0, //
            -1.0, -1.0, -1.0,
        ],
        -1.0,
    );
    let mask = georeferenced(3, 3, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0], 0.0);
    let mut segments = Segments::new(flow, &mask, f64::MAX / 2.0, Units::Meters).unwrap();
    let terminals = segments.terminal_ids();
    assert_eq!(terminals.len(), 2);

    let a = *terminals
        .iter()
        .find(|&&id| segments.outlet(id, false).unwrap() == (0, 0))
        .unwrap();
    let b = *terminals.iter().find(|&&id| id != a).unwrap();

    let basin = streamnet_engine::basin::build(&segments).unwrap();
    assert_eq!(basin.get(0, 0), b as f64);
    assert_eq!(basin.get(2, 1), b as f64);

    let nested = segments.isnested(Some(&[a, b])).unwrap();
    assert_eq!(nested, vec![true, false]);

    let config = EngineConfig::default();
    let basin_parallel = streamnet_engine::basin::build_parallel(&segments, &config).unwrap();
    assert_eq!(basin.raw_data(), basin_parallel.raw_data());

    // sanity: both terminal outlets are reachable from the cached flow raster.
    let flow_ref: Rc<Raster> = Rc::new(segments.flow().clone());
    assert_eq!(flow_ref.rows(), 3);
    let _ = flow::catchment_size(&flow_ref, 2, 1);
}
