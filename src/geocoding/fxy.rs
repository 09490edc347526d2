use std::sync::Arc;

use log::debug;

use crate::{
    crs_geo::GeoCodingCrs,
    errors::{DataModelError, Result},
    geocoding::{Datum, GeoCoding, GeoPosTransform},
    math::FxySum,
    positions::{GeoPos, PixelPos},
    scene::{Scene, SubsetDef},
    transforms::Transform2D,
};

/// Geo-coding by four polynomials over a local, flat approximation.
///
/// `x_function`/`y_function` take `(lat, lon)` and give function space coordinates,
/// `lat_function`/`lon_function` take function space `(x, y)`. Function space
/// relates to pixels by `function = offset + size * pixel`.
#[derive(Debug, Clone)]
pub struct FxyGeoCoding {
    pixel_offset_x: f64,
    pixel_offset_y: f64,
    pixel_size_x: f64,
    pixel_size_y: f64,
    x_function: FxySum,
    y_function: FxySum,
    lat_function: FxySum,
    lon_function: FxySum,
    datum: Datum,
    crs: GeoCodingCrs,
}

impl FxyGeoCoding {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pixel_offset: (f64, f64),
        pixel_size: (f64, f64),
        x_function: FxySum,
        y_function: FxySum,
        lat_function: FxySum,
        lon_function: FxySum,
        datum: Datum,
    ) -> Result<Self> {
        let sizes_valid = [pixel_size.0, pixel_size.1]
            .iter()
            .all(|size| size.is_finite() && *size != 0.);
        if !sizes_valid {
            return Err(DataModelError::invalid(format!(
                "pixel size must be finite and non-zero, got {pixel_size:?}"
            )));
        }
        if !(pixel_offset.0.is_finite() && pixel_offset.1.is_finite()) {
            return Err(DataModelError::invalid("pixel offset must be finite"));
        }
        Ok(Self {
            pixel_offset_x: pixel_offset.0,
            pixel_offset_y: pixel_offset.1,
            pixel_size_x: pixel_size.0,
            pixel_size_y: pixel_size.1,
            x_function,
            y_function,
            lat_function,
            lon_function,
            datum,
            crs: GeoCodingCrs::wgs84(),
        })
    }

    pub fn with_crs(mut self, crs: GeoCodingCrs) -> Self {
        self.crs = crs;
        self
    }

    pub fn pixel_offset(&self) -> (f64, f64) {
        (self.pixel_offset_x, self.pixel_offset_y)
    }

    pub fn pixel_size(&self) -> (f64, f64) {
        (self.pixel_size_x, self.pixel_size_y)
    }

    pub fn x_function(&self) -> &FxySum {
        &self.x_function
    }

    pub fn y_function(&self) -> &FxySum {
        &self.y_function
    }

    pub fn lat_function(&self) -> &FxySum {
        &self.lat_function
    }

    pub fn lon_function(&self) -> &FxySum {
        &self.lon_function
    }

    fn subset(&self, subset: Option<&SubsetDef>) -> Self {
        let mut coding = self.clone();
        if let Some(subset) = subset {
            if let Some(region) = subset.region() {
                coding.pixel_offset_x += region.x() as f64 * self.pixel_size_x;
                coding.pixel_offset_y += region.y() as f64 * self.pixel_size_y;
            }
            let (sub_sampling_x, sub_sampling_y) = subset.sub_sampling();
            coding.pixel_size_x *= sub_sampling_x as f64;
            coding.pixel_size_y *= sub_sampling_y as f64;
        }
        coding
    }
}

impl GeoCoding for FxyGeoCoding {
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
        let x = self.x_function.compute_z(geo_pos.lat, geo_pos.lon);
        let y = self.y_function.compute_z(geo_pos.lat, geo_pos.lon);
        PixelPos::new(
            (x - self.pixel_offset_x) / self.pixel_size_x,
            (y - self.pixel_offset_y) / self.pixel_size_y,
        )
    }

    fn get_geo_pos(&self, pixel_pos: &PixelPos) -> GeoPos {
        if !pixel_pos.is_valid() {
            return GeoPos::invalid();
        }
        let x = self.pixel_offset_x + self.pixel_size_x * pixel_pos.x;
        let y = self.pixel_offset_y + self.pixel_size_y * pixel_pos.y;
        GeoPos::new(self.lat_function.compute_z(x, y), self.lon_function.compute_z(x, y))
    }

    fn is_crossing_meridian_at_180(&self) -> bool {
        false
    }

    fn datum(&self) -> &Datum {
        &self.datum
    }

    fn transfer_geo_coding(&self, _src: &Scene, dest: &mut Scene, subset: Option<&SubsetDef>) -> bool {
        let coding = self.subset(subset);
        debug!(
            "transferring FXY geo-coding, offset {:?}, size {:?}",
            coding.pixel_offset(),
            coding.pixel_size()
        );
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
    use crate::{bounds::Region, math::PolynomialKind};
    use approx::assert_abs_diff_eq;
    use geo::Coord;
    use rstest::{fixture, rstest};

    fn geo_of(x: f64, y: f64) -> (f64, f64) {
        (45. - 0.001 * y + 1e-8 * x * x, 10. + 0.001 * x)
    }

    /// Quadric fits of a mildly curved mapping over a 1000 x 1000 scene.
    #[fixture]
    fn coding() -> FxyGeoCoding {
        let mut forward_lat = Vec::new();
        let mut forward_lon = Vec::new();
        let mut inverse_x = Vec::new();
        let mut inverse_y = Vec::new();
        for j in 0..=10 {
            for i in 0..=10 {
                let (x, y) = (i as f64 * 100., j as f64 * 100.);
                let (lat, lon) = geo_of(x, y);
                forward_lat.push([x, y, lat]);
                forward_lon.push([x, y, lon]);
                inverse_x.push([lat, lon, x]);
                inverse_y.push([lat, lon, y]);
            }
        }
        let fit = |points: &[[f64; 3]]| FxySum::approximate(PolynomialKind::Quadric, points).unwrap();
        FxyGeoCoding::new(
            (0., 0.),
            (1., 1.),
            fit(&inverse_x),
            fit(&inverse_y),
            fit(&forward_lat),
            fit(&forward_lon),
            Datum::wgs84(),
        )
        .unwrap()
    }

    #[rstest]
    fn round_trips_inside_fitted_domain(coding: FxyGeoCoding) {
        for (x, y) in [(0.5, 0.5), (250.5, 730.5), (999.5, 12.5), (500., 500.)] {
            let geo_pos = coding.get_geo_pos(&PixelPos::new(x, y));
            let (lat, lon) = geo_of(x, y);
            assert_abs_diff_eq!(geo_pos.lat, lat, epsilon = 1e-7);
            assert_abs_diff_eq!(geo_pos.lon, lon, epsilon = 1e-7);

            let pixel_pos = coding.get_pixel_pos(&geo_pos);
            assert_abs_diff_eq!(pixel_pos.x, x, epsilon = 1e-3);
            assert_abs_diff_eq!(pixel_pos.y, y, epsilon = 1e-3);
        }
    }

    #[rstest]
    fn invalid_input_gives_invalid_output(coding: FxyGeoCoding) {
        assert!(!coding.get_geo_pos(&PixelPos::invalid()).is_valid());
        assert!(!coding.get_pixel_pos(&GeoPos::invalid()).is_valid());
        assert!(coding.can_get_pixel_pos() && coding.can_get_geo_pos());
        assert!(!coding.is_crossing_meridian_at_180());
    }

    #[rstest]
    fn rejects_zero_pixel_size(coding: FxyGeoCoding) {
        let result = FxyGeoCoding::new(
            (0., 0.),
            (0., 1.),
            coding.x_function().clone(),
            coding.y_function().clone(),
            coding.lat_function().clone(),
            coding.lon_function().clone(),
            Datum::wgs84(),
        );
        assert!(matches!(result, Err(DataModelError::InvalidArgument(_))));
    }

    #[rstest]
    fn subset_maps_to_source_pixels(coding: FxyGeoCoding) {
        let src = Scene::new(1000, 1000);
        let subset = SubsetDef::new(Some(Region::new((100, 200), (400, 400))), 2, 4).unwrap();
        let mut dest = Scene::subset_of(&src, Some(&subset)).unwrap();
        assert!(coding.transfer_geo_coding(&src, &mut dest, Some(&subset)));

        let subset_coding = dest.geo_coding().unwrap();
        let from_subset = subset_coding.get_geo_pos(&PixelPos::new(10., 20.));
        let from_source = coding.get_geo_pos(&PixelPos::new(120., 280.));
        assert_abs_diff_eq!(from_subset.lat, from_source.lat, epsilon = 1e-12);
        assert_abs_diff_eq!(from_subset.lon, from_source.lon, epsilon = 1e-12);
    }

    #[rstest]
    fn image_to_map_follows_forward_mapping(coding: FxyGeoCoding) {
        let transform = coding.image_to_map_transform().unwrap();
        let coord = transform.transform(Coord { x: 300., y: 400. });
        let (lat, lon) = geo_of(300., 400.);
        assert_abs_diff_eq!(coord.x, lon, epsilon = 1e-9);
        assert_abs_diff_eq!(coord.y, lat, epsilon = 1e-9);
    }
}
