//! Error taxonomy for the stream-segment network engine.
//!
//! A single enum is used throughout the crate so that every fallible public
//! function returns the same `Result` alias. Each variant carries the data a
//! caller needs to understand what was expected versus what was observed,
//! per the engine's "never silently substitute a default" propagation policy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("array error: {0}")]
    Array(#[from] ArrayError),

    #[error("missing metadata: {0}")]
    MissingMetadata(#[from] MissingMetadataError),

    #[error(
        "raster mismatch: {field} differs between `{left_name}` and `{right_name}` \
         (left = {left}, right = {right})"
    )]
    RasterMismatch {
        field: &'static str,
        left_name: String,
        right_name: String,
        left: String,
        right: String,
    },

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error(
        "overlap error: `{name}` does not overlap the required bounding box \
         (bounds = {bounds}, required = {required})"
    )]
    Overlap {
        name: String,
        bounds: String,
        required: String,
    },

    #[error("range error: `{name}` = {value} is outside the permitted range {expected}")]
    Range {
        name: &'static str,
        value: String,
        expected: String,
    },

    #[error("casting error: cannot cast `{name}` (value = {value}) to {target_dtype} under the `{policy}` casting policy")]
    Casting {
        name: &'static str,
        value: String,
        target_dtype: &'static str,
        policy: String,
    },

    #[error("too large: {operation} would allocate {requested_bytes} bytes, exceeding the {limit_bytes}-byte budget")]
    TooLarge {
        operation: &'static str,
        requested_bytes: u64,
        limit_bytes: u64,
    },

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ArrayError {
    #[error("array `{name}` is empty")]
    Empty { name: &'static str },

    #[error("array `{name}` has shape {actual:?}, expected {expected:?}")]
    Shape {
        name: &'static str,
        actual: (usize, usize),
        expected: (usize, usize),
    },

    #[error("array `{name}` has dtype `{actual}`, expected `{expected}`")]
    Dtype {
        name: &'static str,
        actual: &'static str,
        expected: &'static str,
    },
}

#[derive(Error, Debug)]
pub enum MissingMetadataError {
    #[error("`{raster}` has no coordinate reference system")]
    Crs { raster: &'static str },

    #[error("`{raster}` has no affine transform")]
    Transform { raster: &'static str },

    #[error("`{raster}` has no NoData value")]
    NoData { raster: &'static str },
}
