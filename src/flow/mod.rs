//! The D8 watershed kernel (C2).

pub mod d8;

mod accumulation;
mod catchment;
mod network;

pub use accumulation::accumulation;
pub use catchment::{catchment, catchment_size};
pub use network::{network, RawSegment};
