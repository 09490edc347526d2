use std::{fmt::Debug, sync::Arc};

use log::{debug, info, warn};

use crate::{
    bounds::Region,
    crs_geo::GeoCodingCrs,
    errors::{DataModelError, Result},
    geocoding::{Datum, GeoCoding, GeoPosTransform},
    positions::{GeoPos, PixelPos},
    scene::{Scene, SubsetDef},
    stepping::Stepping,
    transforms::Transform2D,
};

const MAX_SEARCH_CYCLES: usize = 10;
const COARSE_SEARCH_POINTS: usize = 4096;
/// Matches further away than this many local pixel diagonals are rejected.
const DIAGONAL_TOLERANCE: f64 = 1.;

/// Geo-coding backed by per-pixel latitude and longitude rasters.
#[derive(Clone)]
pub struct PixelGeoCoding {
    width: usize,
    height: usize,
    lats: Arc<[f32]>,
    lons: Arc<[f32]>,
    search_radius: usize,
    estimator: Option<Arc<dyn GeoCoding>>,
    crossing_meridian: bool,
    datum: Datum,
    crs: GeoCodingCrs,
}

impl Debug for PixelGeoCoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelGeoCoding")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("search_radius", &self.search_radius)
            .field("estimator", &self.estimator)
            .field("crossing_meridian", &self.crossing_meridian)
            .finish()
    }
}

impl PixelGeoCoding {
    /// `lats` and `lons` are row-major, NaN where a pixel has no location.
    pub fn new(
        width: usize,
        height: usize,
        lats: Vec<f32>,
        lons: Vec<f32>,
        search_radius: usize,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DataModelError::invalid("pixel geo-coding over an empty raster"));
        }
        if lats.len() != width * height || lons.len() != width * height {
            return Err(DataModelError::invalid(format!(
                "pixel geo-coding needs {} latitudes and longitudes, got {} and {}",
                width * height,
                lats.len(),
                lons.len()
            )));
        }
        if search_radius < 2 {
            return Err(DataModelError::invalid(format!(
                "search radius must be at least 2, got {search_radius}"
            )));
        }
        let crossing_meridian = crosses_meridian(width, &lons);
        info!("pixel geo-coding over {width} x {height} pixels, crossing 180: {crossing_meridian}");
        Ok(Self {
            width,
            height,
            lats: Arc::from(lats),
            lons: Arc::from(lons),
            search_radius,
            estimator: None,
            crossing_meridian,
            datum: Datum::wgs84(),
            crs: GeoCodingCrs::wgs84(),
        })
    }

    /// Coarse inverse used as the starting point of the local search.
    pub fn with_estimator(mut self, estimator: Arc<dyn GeoCoding>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn with_datum(mut self, datum: Datum) -> Self {
        self.datum = datum;
        self
    }

    pub fn with_crs(mut self, crs: GeoCodingCrs) -> Self {
        self.crs = crs;
        self
    }

    pub fn estimator(&self) -> Option<&Arc<dyn GeoCoding>> {
        self.estimator.as_ref()
    }

    pub fn search_radius(&self) -> usize {
        self.search_radius
    }

    fn location(&self, x: usize, y: usize) -> (f64, f64) {
        let index = y * self.width + x;
        (self.lats[index] as f64, self.lons[index] as f64)
    }

    /// Squared angular distance of pixel `(x, y)` to `(lat, lon)`, NaN for unlocated pixels.
    fn delta(&self, x: usize, y: usize, lat: f64, lon: f64) -> f64 {
        let (pixel_lat, pixel_lon) = self.location(x, y);
        let d_lat = pixel_lat - lat;
        let d_lon = lat.to_radians().cos() * lon_diff(pixel_lon, lon);
        d_lat * d_lat + d_lon * d_lon
    }

    fn initial_guess(&self, geo_pos: &GeoPos) -> Option<(usize, usize)> {
        let estimated = self
            .estimator
            .as_ref()
            .map(|estimator| estimator.get_pixel_pos(geo_pos))
            .filter(PixelPos::is_valid)
            .filter(|pos| pos.x >= 0. && pos.y >= 0.)
            .map(|pos| (pos.x.floor() as usize, pos.y.floor() as usize))
            .filter(|&(x, y)| x < self.width && y < self.height);
        if estimated.is_some() {
            return estimated;
        }
        let stepping = Stepping::new(&Region::new((0, 0), (self.width, self.height)), COARSE_SEARCH_POINTS).ok()?;
        self.best_of(stepping.points(), geo_pos).map(|(pixel, _)| pixel)
    }

    fn best_of(
        &self,
        pixels: impl Iterator<Item = (usize, usize)>,
        geo_pos: &GeoPos,
    ) -> Option<((usize, usize), f64)> {
        pixels
            .map(|(x, y)| ((x, y), self.delta(x, y, geo_pos.lat, geo_pos.lon)))
            .filter(|(_, delta)| !delta.is_nan())
            .min_by(|(_, lhs), (_, rhs)| lhs.total_cmp(rhs))
    }

    fn window(&self, (x0, y0): (usize, usize)) -> impl Iterator<Item = (usize, usize)> {
        let x1 = x0.saturating_sub(self.search_radius);
        let y1 = y0.saturating_sub(self.search_radius);
        let x2 = (x0 + self.search_radius).min(self.width - 1);
        let y2 = (y0 + self.search_radius).min(self.height - 1);
        (y1..=y2).flat_map(move |y| (x1..=x2).map(move |x| (x, y)))
    }

    /// Squared angular length of the diagonal of pixel `(x, y)`.
    fn square_diagonal(&self, (x, y): (usize, usize)) -> f64 {
        let (x2, y2) = (
            if x + 1 < self.width { x + 1 } else { x.saturating_sub(1) },
            if y + 1 < self.height { y + 1 } else { y.saturating_sub(1) },
        );
        let (lat, lon) = self.location(x, y);
        self.delta(x2, y2, lat, lon)
    }

    fn subset(&self, subset: Option<&SubsetDef>) -> Result<Self> {
        let Some(subset) = subset else {
            return Ok(self.clone());
        };
        let region = subset.effective_region(self.width, self.height)?;
        let (width, height) = subset.scene_size(self.width, self.height)?;
        let (step_x, step_y) = subset.sub_sampling();
        let pixels = || {
            (region.y()..region.y() + region.shape().1)
                .step_by(step_y)
                .flat_map(move |y| {
                    (region.x()..region.x() + region.shape().0)
                        .step_by(step_x)
                        .map(move |x| y * self.width + x)
                })
        };
        let lats = pixels().map(|index| self.lats[index]).collect();
        let lons = pixels().map(|index| self.lons[index]).collect();
        let coding = Self::new(width, height, lats, lons, self.search_radius)?
            .with_datum(self.datum.clone())
            .with_crs(self.crs.clone());
        Ok(coding)
    }
}

/// Longitude difference in degrees, across the anti-meridian if shorter.
fn lon_diff(lhs: f64, rhs: f64) -> f64 {
    let diff = (lhs - rhs).abs();
    if diff > 180. {
        360. - diff
    } else {
        diff
    }
}

fn crosses_meridian(width: usize, lons: &[f32]) -> bool {
    let jumps = |lhs: f32, rhs: f32| (lhs - rhs).abs() > 180.;
    let horizontal = lons
        .chunks(width)
        .any(|row| row.windows(2).any(|pair| jumps(pair[0], pair[1])));
    horizontal || lons.iter().zip(lons.iter().skip(width)).any(|(&lhs, &rhs)| jumps(lhs, rhs))
}

impl GeoCoding for PixelGeoCoding {
    fn can_get_pixel_pos(&self) -> bool {
        true
    }

    fn can_get_geo_pos(&self) -> bool {
        true
    }

    fn get_pixel_pos(&self, geo_pos: &GeoPos) -> PixelPos {
        if !geo_pos.is_valid() || geo_pos.lat.abs() > 90. || geo_pos.lon.abs() > 180. {
            return PixelPos::invalid();
        }
        let Some(mut best) = self.initial_guess(geo_pos) else {
            return PixelPos::invalid();
        };
        let mut min_delta = f64::NAN;
        for _ in 0..MAX_SEARCH_CYCLES {
            let Some((pixel, delta)) = self.best_of(self.window(best), geo_pos) else {
                break;
            };
            let moved = pixel != best;
            let on_border = pixel.0.abs_diff(best.0) + 2 > self.search_radius
                || pixel.1.abs_diff(best.1) + 2 > self.search_radius;
            (best, min_delta) = (pixel, delta);
            if !(moved && on_border) {
                break;
            }
        }
        let limit = self.square_diagonal(best) * DIAGONAL_TOLERANCE * DIAGONAL_TOLERANCE;
        if min_delta <= limit {
            PixelPos::new(best.0 as f64 + 0.5, best.1 as f64 + 0.5)
        } else {
            PixelPos::invalid()
        }
    }

    fn get_geo_pos(&self, pixel_pos: &PixelPos) -> GeoPos {
        if !pixel_pos.is_valid() || pixel_pos.x < 0. || pixel_pos.y < 0. {
            return GeoPos::invalid();
        }
        let (x, y) = (pixel_pos.x.floor() as usize, pixel_pos.y.floor() as usize);
        if x >= self.width || y >= self.height {
            return GeoPos::invalid();
        }
        let (lat, lon) = self.location(x, y);
        GeoPos::new(lat, lon)
    }

    fn is_crossing_meridian_at_180(&self) -> bool {
        self.crossing_meridian
    }

    fn datum(&self) -> &Datum {
        &self.datum
    }

    fn transfer_geo_coding(&self, src: &Scene, dest: &mut Scene, subset: Option<&SubsetDef>) -> bool {
        let mut coding = match self.subset(subset) {
            Ok(coding) => coding,
            Err(error) => {
                warn!("pixel geo-coding can not be transferred: {error}");
                return false;
            }
        };
        if let Some(estimator) = &self.estimator {
            let mut scratch = Scene::new(coding.width, coding.height);
            if estimator.transfer_geo_coding(src, &mut scratch, subset) {
                coding.estimator = scratch.geo_coding().cloned();
            } else {
                warn!("estimator not transferred, falling back to the stepped search");
                coding.estimator = None;
            }
        }
        debug!("transferring pixel geo-coding onto {} x {} scene", coding.width, coding.height);
        dest.set_geo_coding(Arc::new(coding));
        true
    }

    fn crs(&self) -> &GeoCodingCrs {
        &self.crs
    }

    fn pixel_transform(&self) -> Arc<dyn Transform2D> {
        Arc::new(GeoPosTransform(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoding::{Discontinuity, TiePointGeoCoding, TiePointGrid};
    use rstest::{fixture, rstest};

    const SIZE: usize = 101;

    fn lat_of(x: f64, y: f64) -> f64 {
        60. - 0.01 * y + 0.002 * x
    }

    fn lon_of(x: f64, y: f64) -> f64 {
        20. + 0.02 * x + 0.003 * y + 1e-5 * x * y
    }

    fn sampled(f: fn(f64, f64) -> f64, size: usize, step: usize) -> Vec<f32> {
        (0..size)
            .flat_map(|j| (0..size).map(move |i| (i, j)))
            .map(|(i, j)| f((i * step) as f64 + 0.5, (j * step) as f64 + 0.5) as f32)
            .collect()
    }

    #[fixture]
    fn coding() -> PixelGeoCoding {
        PixelGeoCoding::new(SIZE, SIZE, sampled(lat_of, SIZE, 1), sampled(lon_of, SIZE, 1), 5).unwrap()
    }

    #[fixture]
    fn estimator() -> Arc<dyn GeoCoding> {
        let grid = |name: &str, f: fn(f64, f64) -> f64| {
            TiePointGrid::new(name, 11, 11, (0.5, 0.5), (10., 10.), sampled(f, 11, 10), Discontinuity::None)
        };
        let lat = grid("latitude", lat_of).unwrap();
        let lon = grid("longitude", lon_of).unwrap();
        Arc::new(TiePointGeoCoding::new(lat, lon, Datum::wgs84()).unwrap())
    }

    #[rstest]
    fn forward_reads_containing_pixel(coding: PixelGeoCoding) {
        let geo_pos = coding.get_geo_pos(&PixelPos::new(10.9, 20.1));
        assert_eq!(geo_pos.lat, lat_of(10.5, 20.5) as f32 as f64);
        assert_eq!(geo_pos.lon, lon_of(10.5, 20.5) as f32 as f64);
        assert!(!coding.get_geo_pos(&PixelPos::new(-0.5, 3.)).is_valid());
        assert!(!coding.get_geo_pos(&PixelPos::new(3., 101.)).is_valid());
    }

    #[rstest]
    fn unlocated_pixels_are_invalid() {
        let mut lats = vec![45.; 4];
        lats[3] = f32::NAN;
        let coding = PixelGeoCoding::new(2, 2, lats, vec![7.; 4], 2).unwrap();
        assert!(coding.get_geo_pos(&PixelPos::new(0.5, 0.5)).is_valid());
        assert!(!coding.get_geo_pos(&PixelPos::new(1.5, 1.5)).is_valid());
    }

    #[test_log::test(rstest)]
    fn stepped_search_finds_pixel_centres(coding: PixelGeoCoding) {
        for (x, y) in [(0, 0), (17, 83), (50, 50), (100, 3), (99, 100)] {
            let geo_pos = coding.get_geo_pos(&PixelPos::new(x as f64 + 0.5, y as f64 + 0.5));
            let pixel_pos = coding.get_pixel_pos(&geo_pos);
            assert_eq!(pixel_pos, PixelPos::new(x as f64 + 0.5, y as f64 + 0.5));
        }
    }

    #[test_log::test(rstest)]
    fn estimator_seeds_the_search(coding: PixelGeoCoding, estimator: Arc<dyn GeoCoding>) {
        let coding = coding.with_estimator(estimator);
        for (x, y) in [(3, 4), (64, 31), (88, 97)] {
            let geo_pos = coding.get_geo_pos(&PixelPos::new(x as f64 + 0.5, y as f64 + 0.5));
            assert_eq!(coding.get_pixel_pos(&geo_pos), PixelPos::new(x as f64 + 0.5, y as f64 + 0.5));
        }
    }

    #[rstest]
    fn far_positions_are_invalid(coding: PixelGeoCoding) {
        assert!(!coding.get_pixel_pos(&GeoPos::new(10., -60.)).is_valid());
        assert!(!coding.get_pixel_pos(&GeoPos::new(lat_of(50., -30.), lon_of(50., -30.))).is_valid());
        assert!(!coding.get_pixel_pos(&GeoPos::invalid()).is_valid());
    }

    #[rstest]
    fn detects_meridian_crossing(coding: PixelGeoCoding) {
        assert!(!coding.is_crossing_meridian_at_180());
        let crossing = PixelGeoCoding::new(2, 2, vec![0.; 4], vec![179.5, -179.5, 179.6, -179.4], 2).unwrap();
        assert!(crossing.is_crossing_meridian_at_180());
    }

    #[rstest]
    fn rejects_mismatched_arrays() {
        assert!(PixelGeoCoding::new(2, 2, vec![0.; 4], vec![0.; 3], 2).is_err());
        assert!(PixelGeoCoding::new(2, 2, vec![0.; 4], vec![0.; 4], 1).is_err());
    }

    #[test_log::test(rstest)]
    fn subset_crops_and_sub_samples(coding: PixelGeoCoding, estimator: Arc<dyn GeoCoding>) {
        let coding = coding.with_estimator(estimator);
        let src = Scene::new(SIZE, SIZE);
        let subset = SubsetDef::new(Some(Region::new((10, 20), (40, 30))), 2, 3).unwrap();
        let mut dest = Scene::subset_of(&src, Some(&subset)).unwrap();
        assert!(coding.transfer_geo_coding(&src, &mut dest, Some(&subset)));

        let subset_coding = dest.geo_coding().unwrap();
        let from_subset = subset_coding.get_geo_pos(&PixelPos::new(5.5, 4.5));
        let from_source = coding.get_geo_pos(&PixelPos::new(20.5, 32.5));
        assert_eq!(from_subset, from_source);
        assert_eq!(subset_coding.get_pixel_pos(&from_subset), PixelPos::new(5.5, 4.5));
    }
}
