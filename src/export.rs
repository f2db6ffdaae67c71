//! Feature export (C7). Builds a GeoJSON feature collection with the
//! `geojson` crate: `Feature`/`FeatureCollection`/`Geometry`/`Value` built
//! up by hand rather than through a vector-file writer, since this engine
//! never ships one.

use crate::error::{Error, Result};
use crate::raster::Crs;
use crate::segments::Segments;
use geojson::{Feature, FeatureCollection, Geometry, Value as GeoValue};
use serde_json::{json, Map as JsonObject, Value as JsonValue};
use std::collections::HashMap;

/// Which geometry/feature set an `export` call produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportType {
    Segments,
    SegmentOutlets,
    Outlets,
    Basins,
}

/// A per-feature property column. Length must match the feature count for
/// the requested export type (see `export`'s validation rules).
#[derive(Clone, Debug)]
pub enum PropertyColumn {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
}

impl PropertyColumn {
    fn len(&self) -> usize {
        match self {
            PropertyColumn::Bool(v) => v.len(),
            PropertyColumn::Int(v) => v.len(),
            PropertyColumn::Float(v) => v.len(),
            PropertyColumn::Str(v) => v.len(),
        }
    }

    fn json_at(&self, i: usize) -> JsonValue {
        match self {
            PropertyColumn::Bool(v) => json!(v[i] as i64),
            PropertyColumn::Int(v) => json!(v[i]),
            PropertyColumn::Float(v) => json!(v[i]),
            PropertyColumn::Str(v) => json!(v[i]),
        }
    }
}

fn point_feature(x: f64, y: f64, properties: Option<JsonObject>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoValue::Point(vec![x, y]))),
        id: None,
        properties,
        foreign_members: None,
    }
}

fn line_feature(coords: Vec<(f64, f64)>, properties: Option<JsonObject>) -> Feature {
    let line: Vec<Vec<f64>> = coords.into_iter().map(|(x, y)| vec![x, y]).collect();
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoValue::LineString(line))),
        id: None,
        properties,
        foreign_members: None,
    }
}

fn polygon_feature(rings: Vec<Vec<(f64, f64)>>, properties: Option<JsonObject>) -> Feature {
    let rings: Vec<Vec<Vec<f64>>> = rings
        .into_iter()
        .map(|ring| ring.into_iter().map(|(x, y)| vec![x, y]).collect())
        .collect();
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoValue::Polygon(rings))),
        id: None,
        properties,
        foreign_members: None,
    }
}

fn crs_foreign_member(crs: &Crs) -> Option<JsonObject> {
    let name = match crs {
        Crs::Epsg(code) => format!("urn:ogc:def:crs:EPSG::{code}"),
        Crs::Wkt(wkt) => wkt.clone(),
    };
    let mut members = JsonObject::new();
    members.insert(
        "crs".to_string(),
        json!({"type": "name", "properties": {"name": name}}),
    );
    Some(members)
}

/// Validates a properties map against a feature count, auto-selecting
/// terminal-indexed values out of a segment-length column when exporting
/// outlets/basins, per 4.7's length rule.
fn resolve_properties(
    segments: &Segments,
    properties: &HashMap<String, PropertyColumn>,
    feature_count: usize,
    allow_segment_length_fallback: bool,
) -> Result<Vec<Option<JsonObject>>> {
    if properties.is_empty() {
        return Ok(vec![None; feature_count]);
    }

    let mut narrowed: HashMap<&str, &PropertyColumn> = HashMap::new();
    let mut selected_indices: Option<Vec<usize>> = None;

    for (name, column) in properties {
        if column.len() == feature_count {
            narrowed.insert(name, column);
            continue;
        }
        if allow_segment_length_fallback && column.len() == segments.size() {
            if selected_indices.is_none() {
                let terminal_ids = segments.terminal_ids();
                let ids = segments.ids();
                selected_indices = Some(
                    terminal_ids
                        .iter()
                        .map(|&tid| ids.iter().position(|&id| id == tid).unwrap())
                        .collect(),
                );
            }
            narrowed.insert(name, column);
            continue;
        }
        return Err(Error::Range {
            name: "properties",
            value: format!("`{name}` has {} entries", column.len()),
            expected: format!(
                "{feature_count} entries (the feature count){}",
                if allow_segment_length_fallback {
                    format!(", or {} (the segment count)", segments.size())
                } else {
                    String::new()
                }
            ),
        });
    }

    let mut out = Vec::with_capacity(feature_count);
    for i in 0..feature_count {
        let mut obj = JsonObject::new();
        for (name, column) in &narrowed {
            let source_index = if column.len() == feature_count {
                i
            } else {
                selected_indices.as_ref().unwrap()[i]
            };
            obj.insert((*name).to_string(), column.json_at(source_index));
        }
        out.push(Some(obj));
    }
    Ok(out)
}

/// Traces the outer boundary of every pixel labelled `target_id` in a
/// basin raster into one or more closed rings of pixel-corner
/// coordinates, by collecting every boundary edge (an edge between a
/// target pixel and a non-target neighbour) and stitching edges whose
/// endpoints coincide into loops. Simplified relative to a full
/// polygon-with-holes tracer (no hole/exterior classification beyond
/// reporting every closed ring found); adequate for basins, which are
/// simply-connected except at rare single-pixel pinch points.
fn trace_basin_rings(basin: &crate::raster::Raster, target_id: i64) -> Vec<Vec<(isize, isize)>> {
    let rows = basin.rows() as isize;
    let cols = basin.columns() as isize;
    let is_target = |r: isize, c: isize| -> bool {
        r >= 0 && c >= 0 && r < rows && c < cols && basin.get(r, c) as i64 == target_id
    };

    let mut edges: HashMap<(isize, isize), Vec<(isize, isize)>> = HashMap::new();
    let mut push_edge = |from: (isize, isize), to: (isize, isize)| {
        edges.entry(from).or_default().push(to);
    };

    for r in 0..rows {
        for c in 0..cols {
            if !is_target(r, c) {
                continue;
            }
            if !is_target(r - 1, c) {
                push_edge((r, c), (r, c + 1));
            }
            if !is_target(r, c + 1) {
                push_edge((r, c + 1), (r + 1, c + 1));
            }
            if !is_target(r + 1, c) {
                push_edge((r + 1, c + 1), (r + 1, c));
            }
            if !is_target(r, c - 1) {
                push_edge((r + 1, c), (r, c));
            }
        }
    }

    let mut rings = Vec::new();
    while let Some((&start, _)) = edges.iter().find(|(_, v)| !v.is_empty()) {
        let mut ring = vec![start];
        let mut current = start;
        loop {
            let next = match edges.get_mut(&current).and_then(|v| v.pop()) {
                Some(n) => n,
                None => break,
            };
            if next == start {
                break;
            }
            ring.push(next);
            current = next;
        }
        if ring.len() >= 3 {
            ring.push(start);
            rings.push(ring);
        }
    }
    rings
}

/// Emits a feature collection for `type_`, optionally reprojecting
/// geometries to `crs` (bookkeeping only, matching 4.1's `reproject`
/// scope: no datum transformation). `properties` maps field name to a
/// per-feature column.
pub fn export(
    segments: &Segments,
    basins: Option<&crate::raster::Raster>,
    type_: ExportType,
    properties: &HashMap<String, PropertyColumn>,
    crs: Option<Crs>,
) -> Result<FeatureCollection> {
    let transform = segments
        .transform()
        .ok_or_else(|| Error::MissingMetadata(crate::error::MissingMetadataError::Transform { raster: "segments" }))?;

    let features = match type_ {
        ExportType::Segments => {
            let props = resolve_properties(segments, properties, segments.size(), false)?;
            segments
                .ids()
                .iter()
                .zip(props)
                .map(|(&id, p)| line_feature(segments.polyline(id).unwrap(), p))
                .collect::<Vec<_>>()
        }
        ExportType::SegmentOutlets => {
            let props = resolve_properties(segments, properties, segments.size(), false)?;
            segments
                .ids()
                .iter()
                .zip(props)
                .map(|(&id, p)| {
                    let (r, c) = segments.outlet(id, true).unwrap();
                    let (x, y) = transform.apply(r as f64, c as f64);
                    point_feature(x, y, p)
                })
                .collect::<Vec<_>>()
        }
        ExportType::Outlets => {
            let terminal_ids = segments.terminal_ids();
            let props = resolve_properties(segments, properties, terminal_ids.len(), true)?;
            terminal_ids
                .iter()
                .zip(props)
                .map(|(&id, p)| {
                    let (r, c) = segments.outlet(id, false).unwrap();
                    let (x, y) = transform.apply(r as f64, c as f64);
                    point_feature(x, y, p)
                })
                .collect::<Vec<_>>()
        }
        ExportType::Basins => {
            let basins = basins.ok_or_else(|| {
                Error::MissingMetadata(crate::error::MissingMetadataError::NoData { raster: "basins" })
            })?;
            let terminal_ids = segments.terminal_ids();
            let props = resolve_properties(segments, properties, terminal_ids.len(), true)?;
            terminal_ids
                .iter()
                .zip(props)
                .map(|(&id, p)| {
                    let rings = trace_basin_rings(basins, id);
                    let world_rings: Vec<Vec<(f64, f64)>> = rings
                        .into_iter()
                        .map(|ring| ring.into_iter().map(|(r, c)| transform.apply(r as f64, c as f64)).collect())
                        .collect();
                    polygon_feature(world_rings, p)
                })
                .collect::<Vec<_>>()
        }
    };

    let foreign_members = crs
        .as_ref()
        .or_else(|| segments.crs())
        .and_then(crs_foreign_member);

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{AffineTransform, DataType, Units};
    use crate::segments::Segments;

    fn georeferenced(rows: usize, cols: usize, data: Vec<f64>, nodata: f64) -> crate::raster::Raster {
        crate::raster::Raster::new(
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

    fn single_channel() -> Segments {
        let flow = georeferenced(1, 5, vec![1.0, 1.0, 1.0, 1.0, -1.0], -1.0);
        let mask = georeferenced(1, 5, vec![1.0; 5], 0.0);
        Segments::new(flow, &mask, 1000.0, Units::Meters).unwrap()
    }

    // Two headwater arms into a confluence that drains to a single outlet:
    // 3 segments, 1 terminal.
    fn y_confluence() -> Segments {
        let flow = georeferenced(
            3,
            3,
            vec![
                4.0, -1.0, 4.0, //
                1.0, 4.0, 16.0, //
                -1.0, -1.0, -1.0,
            ],
            -1.0,
        );
        let mask = georeferenced(3, 3, vec![1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 0.0], 0.0);
        Segments::new(flow, &mask, 1000.0, Units::Meters).unwrap()
    }

    #[test]
    fn segments_export_produces_one_line_feature_per_segment() {
        let segments = single_channel();
        let collection = export(&segments, None, ExportType::Segments, &HashMap::new(), None).unwrap();
        assert_eq!(collection.features.len(), 1);
        assert!(matches!(
            collection.features[0].geometry.as_ref().unwrap().value,
            GeoValue::LineString(_)
        ));
    }

    #[test]
    fn outlets_export_produces_one_point_per_terminal() {
        let segments = single_channel();
        let collection = export(&segments, None, ExportType::Outlets, &HashMap::new(), None).unwrap();
        assert_eq!(collection.features.len(), 1);
        assert!(matches!(
            collection.features[0].geometry.as_ref().unwrap().value,
            GeoValue::Point(_)
        ));
    }

    #[test]
    fn basins_export_without_a_basin_raster_is_an_error() {
        let segments = single_channel();
        let result = export(&segments, None, ExportType::Basins, &HashMap::new(), None);
        assert!(result.is_err());
    }

    #[test]
    fn mismatched_property_length_is_rejected() {
        let segments = single_channel();
        let mut props = HashMap::new();
        props.insert("bad".to_string(), PropertyColumn::Float(vec![1.0, 2.0]));
        let result = export(&segments, None, ExportType::Segments, &props, None);
        assert!(result.is_err());
    }

    #[test]
    fn segment_length_properties_are_auto_selected_for_outlets() {
        let segments = y_confluence();
        let terminal = segments.terminal_ids()[0];
        let terminal_index = segments.index_of(terminal).unwrap();
        let mut per_segment = vec![0i64; segments.size()];
        per_segment[terminal_index] = 42;
        let mut props = HashMap::new();
        props.insert("id".to_string(), PropertyColumn::Int(per_segment));
        let collection = export(&segments, None, ExportType::Outlets, &props, None).unwrap();
        assert_eq!(collection.features.len(), 1);
        let value = collection.features[0]
            .properties
            .as_ref()
            .unwrap()
            .get("id")
            .unwrap();
        assert_eq!(value, &json!(42));
    }

    #[test]
    fn crs_foreign_member_is_attached_as_epsg_urn() {
        let segments = single_channel();
        let collection =
            export(&segments, None, ExportType::Segments, &HashMap::new(), Some(Crs::Epsg(4326))).unwrap();
        let members = collection.foreign_members.unwrap();
        let crs = &members["crs"];
        assert_eq!(crs["properties"]["name"], json!("urn:ogc:def:crs:EPSG::4326"));
    }

    #[test]
    fn trace_basin_rings_traces_a_rectangular_basin() {
        let basin = crate::raster::Raster::new(
            3,
            3,
            vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            Some(0.0),
            DataType::I32,
            None,
            None,
        )
        .unwrap();
        let rings = trace_basin_rings(&basin, 1);
        assert_eq!(rings.len(), 1);
        assert!(rings[0].len() >= 4);
        assert_eq!(rings[0].first(), rings[0].last());
    }
}
