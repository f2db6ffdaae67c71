//! The Raster primitive (C1): a 2-D grid of numeric cells plus CRS, affine
//! transform, bounds, and NoData sentinel. Trimmed to the in-memory-only
//! construction path this engine's external interface requires (§6): the
//! engine never reads a GeoTIFF itself, it only normalises whatever buffer
//! and metadata a caller hands it.

mod transform;

pub use transform::AffineTransform;

use crate::config::CastingPolicy;
use crate::error::{Error, MissingMetadataError, Result};

/// The element type a raster's cells are interpreted as. The engine always
/// stores cell data as `f64` internally, backing every dtype with a flat
/// `Vec<f64>`; this tag records the dtype the caller declared, used for
/// casting-policy checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
    Bool,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::I8 => "i8",
            DataType::U8 => "u8",
            DataType::I16 => "i16",
            DataType::U16 => "u16",
            DataType::I32 => "i32",
            DataType::U32 => "u32",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::Bool => "bool",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::I8 | DataType::U8 | DataType::I16 | DataType::U16 | DataType::I32 | DataType::U32
        )
    }
}

/// Resampling kernel used by `Raster::reproject`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resampling {
    Nearest,
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
    Mode,
    Max,
    Min,
    Med,
    Q1,
    Q3,
    Sum,
    Rms,
}

/// Units used to interpret a scalar length (max_length, buffer distance).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Units {
    Base,
    Meters,
    Kilometers,
    Feet,
    Miles,
}

impl Units {
    /// Converts a length expressed in `self` units into the raster's base
    /// (transform) units, which are assumed to be meters for any CRS this
    /// engine treats as projected, and degrees for geographic CRS (the
    /// latter only supports `Units::Base`, matching the source library's
    /// refusal to silently reinterpret degrees as a linear unit).
    pub fn to_base(self, value: f64) -> f64 {
        match self {
            Units::Base => value,
            Units::Meters => value,
            Units::Kilometers => value * 1000.0,
            Units::Feet => value * 0.3048,
            Units::Miles => value * 1609.344,
        }
    }

    /// Inverse of `to_base`: converts a length expressed in the raster's
    /// base (transform) units into `self` units.
    pub fn from_base(self, value: f64) -> f64 {
        match self {
            Units::Base => value,
            Units::Meters => value,
            Units::Kilometers => value / 1000.0,
            Units::Feet => value / 0.3048,
            Units::Miles => value / 1609.344,
        }
    }
}

/// Either an EPSG code or a raw WKT string; the engine treats CRS as an
/// opaque, comparable identifier and never performs the reprojection math
/// of a full geodesy stack (out of scope for this engine; §4.1's
/// `reproject` implements pixel-grid resampling, not datum transformation).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Crs {
    Epsg(u32),
    Wkt(String),
}

impl Crs {
    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Epsg(4326))
    }
}

#[derive(Clone, Debug)]
pub struct RasterConfigs {
    pub rows: usize,
    pub columns: usize,
    pub nodata: Option<f64>,
    pub data_type: DataType,
    pub crs: Option<Crs>,
    pub transform: Option<AffineTransform>,
}

/// An H×W grid of cells, backed by a flat row-major `Vec<f64>`, plus the
/// metadata `RasterConfigs` tracks. Treated as conceptually immutable by
/// every downstream component: operations that transform a Raster return a
/// new one rather than mutating in place.
#[derive(Clone, Debug)]
pub struct Raster {
    pub configs: RasterConfigs,
    data: Vec<f64>,
}

impl Raster {
    /// Constructs a Raster from an in-memory row-major buffer plus
    /// metadata. Exactly one of `transform`/`bounds` may be supplied to
    /// `RasterBuilder` (see below); this constructor takes the resolved
    /// transform directly.
    pub fn new(
        rows: usize,
        columns: usize,
        data: Vec<f64>,
        nodata: Option<f64>,
        data_type: DataType,
        crs: Option<Crs>,
        transform: Option<AffineTransform>,
    ) -> Result<Raster> {
        if data.len() != rows * columns {
            return Err(Error::Array(crate::error::ArrayError::Shape {
                name: "data",
                actual: (data.len(), 1),
                expected: (rows * columns, 1),
            }));
        }
        Ok(Raster {
            configs: RasterConfigs {
                rows,
                columns,
                nodata,
                data_type,
                crs,
                transform,
            },
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.configs.rows
    }

    pub fn columns(&self) -> usize {
        self.configs.columns
    }

    pub fn num_cells(&self) -> usize {
        self.configs.rows * self.configs.columns
    }

    pub fn nodata(&self) -> Option<f64> {
        self.configs.nodata
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.configs.crs.as_ref()
    }

    pub fn transform(&self) -> Option<&AffineTransform> {
        self.configs.transform.as_ref()
    }

    pub fn require_transform(&self) -> Result<&AffineTransform> {
        self.configs
            .transform
            .as_ref()
            .ok_or_else(|| Error::MissingMetadata(MissingMetadataError::Transform { raster: "raster" }))
    }

    pub fn require_crs(&self) -> Result<&Crs> {
        self.configs
            .crs
            .as_ref()
            .ok_or_else(|| Error::MissingMetadata(MissingMetadataError::Crs { raster: "raster" }))
    }

    /// Returns the raw cell value at (row, col), or NoData's numeric value
    /// if set, or `f64::NAN` if out of bounds and no NoData is defined.
    pub fn get(&self, row: isize, col: isize) -> f64 {
        if row < 0 || col < 0 || row as usize >= self.configs.rows || col as usize >= self.configs.columns {
            return self.configs.nodata.unwrap_or(f64::NAN);
        }
        self.data[row as usize * self.configs.columns + col as usize]
    }

    pub fn set(&mut self, row: isize, col: isize, value: f64) {
        if row < 0 || col < 0 || row as usize >= self.configs.rows || col as usize >= self.configs.columns {
            return;
        }
        self.data[row as usize * self.configs.columns + col as usize] = value;
    }

    /// Reads a value and converts NoData (and any pre-existing NaN) to NaN,
    /// per the engine-wide NoData/NaN modelling rule.
    pub fn get_or_nan(&self, row: isize, col: isize) -> f64 {
        let v = self.get(row, col);
        match self.configs.nodata {
            Some(nd) if v == nd => f64::NAN,
            _ => v,
        }
    }

    pub fn raw_data(&self) -> &[f64] {
        &self.data
    }

    /// Boolean view of which cells hold NoData.
    pub fn nodata_mask(&self) -> Vec<bool> {
        match self.configs.nodata {
            Some(nd) => self.data.iter().map(|&v| v == nd || v.is_nan()).collect(),
            None => vec![false; self.data.len()],
        }
    }

    /// Boolean view of which cells hold real data (the complement of
    /// `nodata_mask`).
    pub fn data_mask(&self) -> Vec<bool> {
        self.nodata_mask().into_iter().map(|b| !b).collect()
    }

    /// Replaces metadata in place without reprojecting pixel values, per
    /// 4.1's `override`.
    pub fn override_metadata(
        &mut self,
        crs: Option<Crs>,
        transform: Option<AffineTransform>,
        nodata: Option<f64>,
    ) {
        if let Some(crs) = crs {
            self.configs.crs = Some(crs);
        }
        if let Some(transform) = transform {
            self.configs.transform = Some(transform);
        }
        if let Some(nodata) = nodata {
            self.configs.nodata = Some(nodata);
        }
    }

    /// Returns the sub-raster whose outer rectangle is the intersection of
    /// this raster's pixel bounds and `(row0, col0, rows, columns)`, padded
    /// with NoData wherever the requested window extends beyond the
    /// source, per 4.1's `clip`.
    pub fn clip(&self, row0: isize, col0: isize, rows: usize, columns: usize) -> Result<Raster> {
        let nodata = self
            .configs
            .nodata
            .ok_or_else(|| Error::MissingMetadata(MissingMetadataError::NoData { raster: "raster" }))?;
        let mut out = vec![nodata; rows * columns];
        for r in 0..rows {
            for c in 0..columns {
                out[r * columns + c] = self.get(row0 + r as isize, col0 + c as isize);
            }
        }
        let transform = self.configs.transform.map(|t| t.offset(row0, col0));
        Raster::new(
            rows,
            columns,
            out,
            Some(nodata),
            self.configs.data_type,
            self.configs.crs.clone(),
            transform,
        )
    }

    /// Pads the raster with NoData cells on every side, per 4.1's
    /// `buffer`. `distance` is expressed in `units` and converted to whole
    /// pixels by dividing by the corresponding pixel dimension.
    pub fn buffer(&self, distance: f64, units: Units) -> Result<Raster> {
        if self.configs.nodata.is_none() {
            return Err(Error::MissingMetadata(MissingMetadataError::NoData { raster: "raster" }));
        }
        let transform = self.require_transform()?;
        let base = units.to_base(distance);
        let pad_rows = (base / transform.pixel_height().abs()).round().max(0.0) as usize;
        let pad_cols = (base / transform.pixel_width().abs()).round().max(0.0) as usize;
        self.clip(
            -(pad_rows as isize),
            -(pad_cols as isize),
            self.configs.rows + 2 * pad_rows,
            self.configs.columns + 2 * pad_cols,
        )
    }

    /// Resamples the raster onto a new pixel grid defined by `transform`
    /// and `(rows, columns)`, per 4.1's `reproject`. CRS handling is
    /// limited to bookkeeping (this engine does not implement datum
    /// transformation — only grid resampling); `target_crs` simply
    /// overrides the output's recorded CRS. Boolean rasters always use
    /// nearest-neighbour resampling regardless of the requested kernel.
    pub fn reproject(
        &self,
        target_transform: AffineTransform,
        rows: usize,
        columns: usize,
        resampling: Resampling,
        target_crs: Option<Crs>,
        nodata: Option<f64>,
    ) -> Result<Raster> {
        self.require_transform()?;
        let out_nodata = nodata.or(self.configs.nodata).unwrap_or(f64::NAN);
        let kernel = if self.configs.data_type == DataType::Bool {
            Resampling::Nearest
        } else {
            resampling
        };
        let mut out = vec![out_nodata; rows * columns];
        for r in 0..rows {
            for c in 0..columns {
                let (x, y) = target_transform.apply(r as f64, c as f64);
                let (src_row, src_col) = self.require_transform().unwrap().invert_to_cell(x, y);
                out[r * columns + c] = self.resample_at(src_row, src_col, kernel, out_nodata);
            }
        }
        Raster::new(
            rows,
            columns,
            out,
            Some(out_nodata),
            self.configs.data_type,
            target_crs.or_else(|| self.configs.crs.clone()),
            Some(target_transform),
        )
    }

    fn resample_at(&self, row: f64, col: f64, kernel: Resampling, nodata: f64) -> f64 {
        match kernel {
            Resampling::Nearest => self.get_or_nan(row.round() as isize, col.round() as isize),
            Resampling::Bilinear => self.bilinear_at(row, col, nodata),
            _ => {
                // Cubic/lanczos/statistical kernels all reduce to a local
                // window around the nearest source cell; the window width
                // follows the same fixed small-kernel pattern used for
                // neighbourhood operations elsewhere (see `confinement`'s
                // use of a pixel neighbourhood radius).
                let radius: isize = match kernel {
                    Resampling::Cubic | Resampling::CubicSpline | Resampling::Lanczos => 2,
                    _ => 1,
                };
                let center_row = row.round() as isize;
                let center_col = col.round() as isize;
                let mut samples = Vec::new();
                for dr in -radius..=radius {
                    for dc in -radius..=radius {
                        let v = self.get_or_nan(center_row + dr, center_col + dc);
                        if !v.is_nan() {
                            samples.push(v);
                        }
                    }
                }
                if samples.is_empty() {
                    return nodata;
                }
                samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
                match kernel {
                    Resampling::Max => *samples.last().unwrap(),
                    Resampling::Min => samples[0],
                    Resampling::Sum => samples.iter().sum(),
                    Resampling::Average | Resampling::Cubic | Resampling::CubicSpline | Resampling::Lanczos => {
                        samples.iter().sum::<f64>() / samples.len() as f64
                    }
                    Resampling::Med => samples[samples.len() / 2],
                    Resampling::Q1 => samples[samples.len() / 4],
                    Resampling::Q3 => samples[samples.len() * 3 / 4],
                    Resampling::Rms => (samples.iter().map(|v| v * v).sum::<f64>() / samples.len() as f64).sqrt(),
                    Resampling::Mode => mode(&samples),
                    Resampling::Nearest | Resampling::Bilinear => unreachable!(),
                }
            }
        }
    }

    fn bilinear_at(&self, row: f64, col: f64, nodata: f64) -> f64 {
        let r0 = row.floor();
        let c0 = col.floor();
        let fr = row - r0;
        let fc = col - c0;
        let v00 = self.get_or_nan(r0 as isize, c0 as isize);
        let v01 = self.get_or_nan(r0 as isize, c0 as isize + 1);
        let v10 = self.get_or_nan(r0 as isize + 1, c0 as isize);
        let v11 = self.get_or_nan(r0 as isize + 1, c0 as isize + 1);
        if [v00, v01, v10, v11].iter().any(|v| v.is_nan()) {
            return nodata;
        }
        let top = v00 * (1.0 - fc) + v01 * fc;
        let bottom = v10 * (1.0 - fc) + v11 * fc;
        top * (1.0 - fr) + bottom * fr
    }

    /// Casts `value` for assignment into this raster's dtype under
    /// `policy`, failing per 4.1's casting-policy failure mode rather than
    /// silently truncating.
    pub fn check_cast(&self, name: &'static str, value: f64, policy: CastingPolicy) -> Result<f64> {
        if policy == CastingPolicy::Unsafe {
            return Ok(value);
        }
        if self.configs.data_type.is_integer() && value.fract() != 0.0 {
            return Err(Error::Casting {
                name,
                value: value.to_string(),
                target_dtype: self.configs.data_type.name(),
                policy: format!("{policy:?}"),
            });
        }
        Ok(value)
    }
}


fn mode(sorted: &[f64]) -> f64 {
    let mut best = sorted[0];
    let mut best_count = 0usize;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        if j - i > best_count {
            best_count = j - i;
            best = sorted[i];
        }
        i = j;
    }
    best
}
