//! Geo-coding strategies and streaming statistics for raster data.
//!
//! [`geocoding`] maps pixel positions to geodetic ones and back, through
//! analytic functions, tie-point grids, per-pixel grids, map projections or
//! ground control points. [`stx`] accumulates summary statistics,
//! histograms and class counts over caller-supplied, optionally masked
//! tiles.

pub mod bounds;
pub mod crs_geo;
pub mod errors;
pub mod geocoding;
mod intersection;
pub mod math;
pub mod positions;
pub mod scaling;
pub mod scene;
pub mod stepping;
pub mod stx;
pub mod time_coding;
pub mod transforms;

pub use bounds::Region;
pub use errors::{DataModelError, Result};
pub use geocoding::GeoCoding;
pub use positions::{GeoPos, PixelPos};
pub use scene::{Scene, SceneRasterTransform, SubsetDef};
pub use stepping::Stepping;
pub use stx::{
    HistogramStxOp, MaskTile, Merge, QualitativeStxOp, Samples, Stx, StxConfig, StxFactory, StxOp, SummaryStxOp, Tile,
};
pub use time_coding::{TimeCoding, TimeCodingKind};
