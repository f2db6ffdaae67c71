//! Stream-segment network delineation, topology, and summary-statistics
//! engine for post-fire debris-flow hazard assessment. Built around four
//! layers, leaves first: a Raster primitive (C1), a D8 watershed kernel
//! (C2), an integer-indexed segment graph (C3), and the basin/summary/
//! filter/export components built on top of it (C4-C7).

pub mod basin;
pub mod config;
pub mod error;
pub mod export;
pub mod flow;
pub mod raster;
pub mod segments;
pub mod summary;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use export::{export, ExportType, PropertyColumn};
pub use raster::{AffineTransform, Crs, DataType, Raster, Resampling, Units};
pub use segments::{SelectionType, Segments};
pub use summary::Statistic;
