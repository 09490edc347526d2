use std::sync::Arc;

use geo::{AffineTransform, Coord};
use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    crs_geo::{Crs, GeoCodingCrs, TransformLookup},
    errors::{DataModelError, Result},
    geocoding::{Datum, GeoCoding},
    positions::{normalize_lon, GeoPos, PixelPos},
    scene::{Scene, SubsetDef},
    transforms::{subset_affine, Transform2D},
};

const BORDER_STEPS: usize = 64;

/// Geo-coding of a raster registered to a map CRS by an affine transform.
///
/// Pixel `(x, y)` maps to map coordinates by `image_to_map`, map coordinates
/// to geographic ones through the lookup, resolved once at construction.
#[derive(Debug, Clone)]
pub struct CrsGeoCoding {
    width: usize,
    height: usize,
    image_to_map: AffineTransform,
    map_to_image: AffineTransform,
    map_to_geo: Arc<dyn Transform2D>,
    geo_to_map: Arc<dyn Transform2D>,
    crossing_meridian: bool,
    datum: Datum,
    crs: GeoCodingCrs,
}

impl CrsGeoCoding {
    /// Fails with [`DataModelError::NoTransformFound`] if `map_crs` does not
    /// relate to WGS-84 through `lookup`.
    pub fn new(
        map_crs: Crs,
        width: usize,
        height: usize,
        image_to_map: AffineTransform,
        lookup: Arc<dyn TransformLookup>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DataModelError::invalid("CRS geo-coding over an empty raster"));
        }
        let map_to_image = image_to_map
            .inverse()
            .ok_or_else(|| DataModelError::invalid("image to map transform is not invertible"))?;
        let geo_crs = Crs::wgs84();
        let map_to_geo = lookup.find_transform(&map_crs, &geo_crs)?;
        let geo_to_map = lookup.find_transform(&geo_crs, &map_crs)?;
        let crs = GeoCodingCrs::new(map_crs.clone(), map_crs, geo_crs, lookup);

        let mut coding = Self {
            width,
            height,
            image_to_map,
            map_to_image,
            map_to_geo,
            geo_to_map,
            crossing_meridian: false,
            datum: Datum::wgs84(),
            crs,
        };
        coding.crossing_meridian = coding.border_crosses_meridian();
        info!(
            "CRS geo-coding in {} over {width} x {height} pixels, crossing 180: {}",
            coding.crs.map_crs().id(),
            coding.crossing_meridian
        );
        Ok(coding)
    }

    pub fn image_to_map(&self) -> &AffineTransform {
        &self.image_to_map
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Raster border walked clockwise from the top left corner.
    fn border(&self) -> impl Iterator<Item = PixelPos> {
        let (w, h) = (self.width as f64, self.height as f64);
        let along = move |length: f64| (0..BORDER_STEPS).map(move |i| length * i as f64 / BORDER_STEPS as f64);
        let top = along(w).map(|x| PixelPos::new(x, 0.));
        let right = along(h).map(move |y| PixelPos::new(w, y));
        let bottom = along(w).map(move |x| PixelPos::new(w - x, h));
        let left = along(h).map(move |y| PixelPos::new(0., h - y));
        top.chain(right).chain(bottom).chain(left)
    }

    fn border_crosses_meridian(&self) -> bool {
        let lons: Vec<f64> = self
            .border()
            .map(|pixel| self.get_geo_pos(&pixel))
            .filter(GeoPos::is_valid)
            .map(|geo_pos| geo_pos.lon)
            .collect();
        lons.iter()
            .chain(lons.first())
            .tuple_windows()
            .any(|(lhs, rhs)| (lhs - rhs).abs() > 180.)
    }

    fn pixel_of(&self, lat: f64, lon: f64) -> PixelPos {
        let map = self.geo_to_map.transform(Coord { x: lon, y: lat });
        PixelPos::from(self.map_to_image.apply(map))
    }

    fn inside(&self, pixel_pos: &PixelPos) -> bool {
        (0.0..=self.width as f64).contains(&pixel_pos.x) && (0.0..=self.height as f64).contains(&pixel_pos.y)
    }
}

impl GeoCoding for CrsGeoCoding {
    fn can_get_pixel_pos(&self) -> bool {
        true
    }

    fn can_get_geo_pos(&self) -> bool {
        true
    }

    fn get_pixel_pos(&self, geo_pos: &GeoPos) -> PixelPos {
        if !geo_pos.is_valid() {
            return PixelPos::invalid();
        }
        let pixel_pos = self.pixel_of(geo_pos.lat, geo_pos.lon);
        if self.crossing_meridian && !self.inside(&pixel_pos) {
            // map coordinates may continue past 180 degrees
            let shifted = if geo_pos.lon < 0. { geo_pos.lon + 360. } else { geo_pos.lon - 360. };
            let retry = self.pixel_of(geo_pos.lat, shifted);
            if self.inside(&retry) {
                return retry;
            }
        }
        if pixel_pos.is_valid() {
            pixel_pos
        } else {
            PixelPos::invalid()
        }
    }

    fn get_geo_pos(&self, pixel_pos: &PixelPos) -> GeoPos {
        if !pixel_pos.is_valid() {
            return GeoPos::invalid();
        }
        let map = self.image_to_map.apply(Coord::from(*pixel_pos));
        let geo = self.map_to_geo.transform(map);
        if geo.x.is_nan() || geo.y.is_nan() {
            return GeoPos::invalid();
        }
        GeoPos::new(geo.y, normalize_lon(geo.x))
    }

    fn is_crossing_meridian_at_180(&self) -> bool {
        self.crossing_meridian
    }

    fn datum(&self) -> &Datum {
        &self.datum
    }

    fn transfer_geo_coding(&self, _src: &Scene, dest: &mut Scene, subset: Option<&SubsetDef>) -> bool {
        let (offset, step) = match subset {
            Some(subset) => {
                let (x, y) = subset.region().map_or((0, 0), |region| (region.x(), region.y()));
                let (step_x, step_y) = subset.sub_sampling();
                ((x as f64, y as f64), (step_x as f64, step_y as f64))
            }
            None => ((0., 0.), (1., 1.)),
        };
        let image_to_map = subset_affine(&self.image_to_map, offset, step);
        let coding = CrsGeoCoding::new(
            self.crs.map_crs().clone(),
            dest.width(),
            dest.height(),
            image_to_map,
            Arc::clone(self.crs.lookup()),
        );
        match coding {
            Ok(coding) => {
                debug!("transferring CRS geo-coding, offset {offset:?}, step {step:?}");
                dest.set_geo_coding(Arc::new(coding));
                true
            }
            Err(error) => {
                warn!("CRS geo-coding can not be transferred: {error}");
                false
            }
        }
    }

    fn crs(&self) -> &GeoCodingCrs {
        &self.crs
    }

    /// Pixels to map coordinates, the image CRS being derived from the map CRS.
    fn pixel_transform(&self) -> Arc<dyn Transform2D> {
        Arc::new(self.image_to_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bounds::Region,
        crs_geo::{BuiltinLookup, WEB_MERCATOR_ID},
        transforms::affine_from_gdal,
    };
    use approx::assert_abs_diff_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn mercator() -> CrsGeoCoding {
        let image_to_map = affine_from_gdal([1_113_194.9, 1000., 0., 6_000_000., 0., -1000.]);
        CrsGeoCoding::new(Crs::new(WEB_MERCATOR_ID), 200, 200, image_to_map, Arc::new(BuiltinLookup)).unwrap()
    }

    #[fixture]
    fn geographic_over_180() -> CrsGeoCoding {
        let image_to_map = affine_from_gdal([170., 0.1, 0., 10., 0., -0.1]);
        CrsGeoCoding::new(Crs::wgs84(), 200, 100, image_to_map, Arc::new(BuiltinLookup)).unwrap()
    }

    #[rstest]
    fn round_trips_through_mercator(mercator: CrsGeoCoding) {
        for (x, y) in [(0.5, 0.5), (120.25, 33.75), (199.5, 199.5)] {
            let geo_pos = mercator.get_geo_pos(&PixelPos::new(x, y));
            assert!(geo_pos.lat > 40. && geo_pos.lat < 50.);
            let pixel_pos = mercator.get_pixel_pos(&geo_pos);
            assert_abs_diff_eq!(pixel_pos.x, x, epsilon = 1e-6);
            assert_abs_diff_eq!(pixel_pos.y, y, epsilon = 1e-6);
        }
        assert!(!mercator.is_crossing_meridian_at_180());
    }

    #[rstest]
    fn unknown_map_crs_fails_at_construction() {
        let result = CrsGeoCoding::new(
            Crs::new("EPSG:32633"),
            10,
            10,
            AffineTransform::identity(),
            Arc::new(BuiltinLookup),
        );
        assert!(matches!(result, Err(DataModelError::NoTransformFound { .. })));
    }

    #[rstest]
    fn singular_affine_is_rejected() {
        let result = CrsGeoCoding::new(
            Crs::wgs84(),
            10,
            10,
            AffineTransform::new(1., 1., 0., 1., 1., 0.),
            Arc::new(BuiltinLookup),
        );
        assert!(matches!(result, Err(DataModelError::InvalidArgument(_))));
    }

    #[rstest]
    fn border_walk_detects_anti_meridian(geographic_over_180: CrsGeoCoding) {
        assert!(geographic_over_180.is_crossing_meridian_at_180());
        let geo_pos = geographic_over_180.get_geo_pos(&PixelPos::new(150., 50.));
        assert_abs_diff_eq!(geo_pos.lon, -175., epsilon = 1e-9);
        assert_abs_diff_eq!(geo_pos.lat, 5., epsilon = 1e-9);
        let pixel_pos = geographic_over_180.get_pixel_pos(&geo_pos);
        assert_abs_diff_eq!(pixel_pos.x, 150., epsilon = 1e-6);
        assert_abs_diff_eq!(pixel_pos.y, 50., epsilon = 1e-6);
    }

    #[rstest]
    fn image_to_map_is_the_affine(mercator: CrsGeoCoding) {
        let transform = mercator.image_to_map_transform().unwrap();
        let coord = transform.transform(Coord { x: 10., y: 20. });
        assert_abs_diff_eq!(coord.x, 1_113_194.9 + 10_000., epsilon = 1e-6);
        assert_abs_diff_eq!(coord.y, 6_000_000. - 20_000., epsilon = 1e-6);
    }

    #[rstest]
    fn subset_composes_offset_and_step(mercator: CrsGeoCoding) {
        let src = Scene::new(200, 200);
        let subset = SubsetDef::new(Some(Region::new((40, 60), (100, 80))), 4, 2).unwrap();
        let mut dest = Scene::subset_of(&src, Some(&subset)).unwrap();
        assert!(mercator.transfer_geo_coding(&src, &mut dest, Some(&subset)));

        let subset_coding = dest.geo_coding().unwrap();
        let from_subset = subset_coding.get_geo_pos(&PixelPos::new(3., 7.));
        let from_source = mercator.get_geo_pos(&PixelPos::new(52., 74.));
        assert_abs_diff_eq!(from_subset.lat, from_source.lat, epsilon = 1e-9);
        assert_abs_diff_eq!(from_subset.lon, from_source.lon, epsilon = 1e-9);
    }
}
