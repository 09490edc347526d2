//! Pixel <-> geodetic coordinate strategies.
//!
//! Every strategy implements [`GeoCoding`]. Implementations are shared between
//! threads, so anything computed lazily goes through a compute-once cell.

mod crs;
mod fxy;
mod gcp;
mod pixel;
mod tie_point;

pub use crs::CrsGeoCoding;
pub use fxy::FxyGeoCoding;
pub use gcp::{GcpGeoCoding, GcpMethod, GroundControlPoint};
pub use pixel::PixelGeoCoding;
pub use tie_point::{Approximation, Discontinuity, TiePointGeoCoding, TiePointGrid};

use std::{fmt::Debug, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    crs_geo::GeoCodingCrs,
    errors::Result,
    positions::{GeoPos, PixelPos},
    scene::{Scene, SubsetDef},
    transforms::Transform2D,
};

/// Reference ellipsoid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    pub name: String,
    pub semi_major: f64,
    pub inverse_flattening: f64,
}

impl Datum {
    pub fn wgs84() -> Self {
        Self {
            name: String::from("WGS84"),
            semi_major: 6_378_137.0,
            inverse_flattening: 298.257_223_563,
        }
    }

    pub fn semi_minor(&self) -> f64 {
        self.semi_major * (1. - 1. / self.inverse_flattening)
    }

    /// Great circle distance in meters on the mean sphere of the ellipsoid.
    pub fn distance(&self, from: &GeoPos, to: &GeoPos) -> f64 {
        let radius = (2. * self.semi_major + self.semi_minor()) / 3.;
        let (lat1, lat2) = (from.lat.to_radians(), to.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (to.lon - from.lon).to_radians();
        let a = (d_lat / 2.).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.).sin().powi(2);
        2. * radius * a.sqrt().min(1.).asin()
    }
}

impl Default for Datum {
    fn default() -> Self {
        Self::wgs84()
    }
}

pub trait GeoCoding: Send + Sync + Debug {
    fn can_get_pixel_pos(&self) -> bool;

    fn can_get_geo_pos(&self) -> bool;

    /// Invalid position when `geo_pos` is outside what the strategy can invert.
    fn get_pixel_pos(&self, geo_pos: &GeoPos) -> PixelPos;

    /// Invalid position when `pixel_pos` is outside the strategy's domain.
    fn get_geo_pos(&self, pixel_pos: &PixelPos) -> GeoPos;

    /// Longitude normalization across the anti-meridian is left to callers.
    fn is_crossing_meridian_at_180(&self) -> bool;

    fn datum(&self) -> &Datum;

    /// Installs on `dest` an equivalent geo-coding restricted to `subset`.
    ///
    /// Returns `false` when none could be built.
    fn transfer_geo_coding(&self, src: &Scene, dest: &mut Scene, subset: Option<&SubsetDef>) -> bool;

    fn crs(&self) -> &GeoCodingCrs;

    /// Pixel to image base CRS transform.
    fn pixel_transform(&self) -> Arc<dyn Transform2D>;

    /// Image to map transform, resolved once per geo-coding.
    fn image_to_map_transform(&self) -> Result<Arc<dyn Transform2D>> {
        self.crs().image_to_map(|| self.pixel_transform())
    }
}

/// Forward mapping of a geo-coding as a transform, `x = lon`, `y = lat`.
#[derive(Debug, Clone)]
pub(crate) struct GeoPosTransform<G: GeoCoding + Clone>(pub(crate) G);

impl<G: GeoCoding + Clone> Transform2D for GeoPosTransform<G> {
    fn transform(&self, coord: geo::Coord) -> geo::Coord {
        let geo_pos = self.0.get_geo_pos(&PixelPos::from(coord));
        geo::Coord {
            x: geo_pos.lon,
            y: geo_pos.lat,
        }
    }
}
