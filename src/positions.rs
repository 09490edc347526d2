use std::fmt::Display;

use geo::Coord;
use serde::{Deserialize, Serialize};

/// Raster coordinate. Pixel centres sit at `.5`.
///
/// Invalid iff either component is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPos {
    pub x: f64,
    pub y: f64,
}

impl PixelPos {
    pub const INVALID: PixelPos = PixelPos {
        x: f64::NAN,
        y: f64::NAN,
    };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn invalid() -> Self {
        Self::INVALID
    }

    pub fn is_valid(&self) -> bool {
        !(self.x.is_nan() || self.y.is_nan())
    }

    pub fn set_invalid(&mut self) {
        self.x = f64::NAN;
        self.y = f64::NAN;
    }

    pub fn set_location(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }
}

impl Default for PixelPos {
    fn default() -> Self {
        Self::new(0., 0.)
    }
}

impl From<Coord> for PixelPos {
    fn from(value: Coord) -> Self {
        Self::new(value.x, value.y)
    }
}

impl From<PixelPos> for Coord {
    fn from(value: PixelPos) -> Self {
        Coord {
            x: value.x,
            y: value.y,
        }
    }
}

/// Geodetic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPos {
    pub const INVALID: GeoPos = GeoPos {
        lat: f64::NAN,
        lon: f64::NAN,
    };

    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn invalid() -> Self {
        Self::INVALID
    }

    pub fn is_valid(&self) -> bool {
        !(self.lat.is_nan() || self.lon.is_nan())
    }

    pub fn set_invalid(&mut self) {
        self.lat = f64::NAN;
        self.lon = f64::NAN;
    }

    pub fn set_location(&mut self, lat: f64, lon: f64) {
        self.lat = lat;
        self.lon = lon;
    }

    /// Wraps the longitude into `[-180, 180]`.
    pub fn normalize_lon(&mut self) {
        self.lon = normalize_lon(self.lon);
    }

    /// Degrees/minutes/seconds representation of the latitude, e.g. `53°30'0" N`.
    pub fn lat_string(&self) -> String {
        if self.lat.is_nan() {
            return String::from("Inv N");
        }
        format!("{} {}", dms(self.lat.abs()), if self.lat < 0. { 'S' } else { 'N' })
    }

    pub fn lon_string(&self) -> String {
        if self.lon.is_nan() {
            return String::from("Inv E");
        }
        format!("{} {}", dms(self.lon.abs()), if self.lon < 0. { 'W' } else { 'E' })
    }
}

impl Default for GeoPos {
    fn default() -> Self {
        Self::new(0., 0.)
    }
}

impl Display for GeoPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.lat_string(), self.lon_string())
    }
}

pub fn normalize_lon(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) || lon.is_nan() {
        return lon;
    }
    let wrapped = (lon + 180.).rem_euclid(360.) - 180.;
    if wrapped == -180. && lon > 0. {
        180.
    } else {
        wrapped
    }
}

fn dms(degrees: f64) -> String {
    let total_seconds = (degrees * 3600.).round() as u64;
    let d = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;
    format!("{d}°{m}'{s}\"")
}

/// Viewing direction in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngularDirection {
    pub azimuth: f64,
    pub zenith: f64,
}

impl AngularDirection {
    pub fn new(azimuth: f64, zenith: f64) -> Self {
        Self { azimuth, zenith }
    }

    pub fn is_valid(&self) -> bool {
        !(self.azimuth.is_nan() || self.zenith.is_nan())
    }
}
