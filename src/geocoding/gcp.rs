use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    crs_geo::GeoCodingCrs,
    errors::{DataModelError, Result},
    geocoding::{Datum, GeoCoding, GeoPosTransform},
    math::{FxySum, PolynomialKind},
    positions::{normalize_lon, GeoPos, PixelPos},
    scene::{Scene, SubsetDef},
    transforms::Transform2D,
};

/// Pixel with a known geodetic position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundControlPoint {
    pub name: String,
    pub pixel_pos: PixelPos,
    pub geo_pos: GeoPos,
}

impl GroundControlPoint {
    pub fn new(name: &str, pixel_pos: PixelPos, geo_pos: GeoPos) -> Self {
        Self {
            name: name.to_string(),
            pixel_pos,
            geo_pos,
        }
    }
}

/// Order of the polynomials fitted through the control points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcpMethod {
    #[default]
    Linear,
    Quadratic,
    Cubic,
}

impl GcpMethod {
    fn kind(&self) -> PolynomialKind {
        match self {
            GcpMethod::Linear => PolynomialKind::Linear,
            GcpMethod::Quadratic => PolynomialKind::Quadric,
            GcpMethod::Cubic => PolynomialKind::Cubic,
        }
    }

    pub fn num_points_required(&self) -> usize {
        self.kind().num_points_required()
    }
}

/// Centres and scales polynomial inputs to keep the fits well conditioned.
#[derive(Debug, Clone, Copy)]
struct Normalization {
    center: (f64, f64),
    scale: (f64, f64),
}

impl Normalization {
    fn of(points: impl Iterator<Item = (f64, f64)> + Clone) -> Self {
        let count = points.clone().count() as f64;
        let (sum_x, sum_y) = points.clone().fold((0., 0.), |(x, y), p| (x + p.0, y + p.1));
        let center = (sum_x / count, sum_y / count);
        let (max_x, max_y) = points.fold((0f64, 0f64), |(x, y), p| {
            (x.max((p.0 - center.0).abs()), y.max((p.1 - center.1).abs()))
        });
        let scale = (if max_x > 0. { max_x } else { 1. }, if max_y > 0. { max_y } else { 1. });
        Self { center, scale }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.center.0) / self.scale.0, (y - self.center.1) / self.scale.1)
    }
}

/// Forward and inverse polynomials of one fit.
#[derive(Debug, Clone)]
struct Fit {
    pixel_norm: Normalization,
    geo_norm: Normalization,
    lat: FxySum,
    lon: FxySum,
    x: FxySum,
    y: FxySum,
}

/// Geo-coding by least squares polynomials through ground control points.
#[derive(Debug, Clone)]
pub struct GcpGeoCoding {
    gcps: Vec<GroundControlPoint>,
    method: GcpMethod,
    width: usize,
    height: usize,
    crossing_meridian: bool,
    fit: Fit,
    datum: Datum,
    crs: GeoCodingCrs,
}

impl GcpGeoCoding {
    pub fn new(
        gcps: Vec<GroundControlPoint>,
        method: GcpMethod,
        width: usize,
        height: usize,
        datum: Datum,
    ) -> Result<Self> {
        if gcps.len() < method.num_points_required() {
            return Err(DataModelError::invalid(format!(
                "{method:?} GCP geo-coding needs at least {} points, got {}",
                method.num_points_required(),
                gcps.len()
            )));
        }
        if gcps.iter().any(|gcp| !(gcp.pixel_pos.is_valid() && gcp.geo_pos.is_valid())) {
            return Err(DataModelError::invalid("ground control points must be valid"));
        }
        let (min_lon, max_lon) = gcps.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), gcp| {
            (min.min(gcp.geo_pos.lon), max.max(gcp.geo_pos.lon))
        });
        let crossing_meridian = max_lon - min_lon > 180.;
        let fit = Self::fit(&gcps, method, crossing_meridian)?;
        info!(
            "{method:?} GCP geo-coding from {} points, crossing 180: {crossing_meridian}",
            gcps.len()
        );
        Ok(Self {
            gcps,
            method,
            width,
            height,
            crossing_meridian,
            fit,
            datum,
            crs: GeoCodingCrs::wgs84(),
        })
    }

    pub fn with_crs(mut self, crs: GeoCodingCrs) -> Self {
        self.crs = crs;
        self
    }

    pub fn gcps(&self) -> &[GroundControlPoint] {
        &self.gcps
    }

    pub fn method(&self) -> GcpMethod {
        self.method
    }

    /// Largest residual in pixels of the inverse fit.
    pub fn max_pixel_error(&self) -> f64 {
        self.fit.x.max_error().max(self.fit.y.max_error())
    }

    fn fit(gcps: &[GroundControlPoint], method: GcpMethod, crossing_meridian: bool) -> Result<Fit> {
        let unwrap_lon = |lon: f64| if crossing_meridian && lon < 0. { lon + 360. } else { lon };
        let pixels = gcps.iter().map(|gcp| (gcp.pixel_pos.x, gcp.pixel_pos.y));
        let geos = gcps.iter().map(|gcp| (gcp.geo_pos.lat, unwrap_lon(gcp.geo_pos.lon)));
        let pixel_norm = Normalization::of(pixels.clone());
        let geo_norm = Normalization::of(geos.clone());

        let points = |inputs: &Normalization, pairs: &[((f64, f64), f64)]| -> Vec<[f64; 3]> {
            pairs
                .iter()
                .map(|&((a, b), z)| {
                    let (a, b) = inputs.apply(a, b);
                    [a, b, z]
                })
                .collect()
        };
        let pixel_pairs: Vec<_> = pixels.zip(geos.clone()).collect();
        let geo_pairs: Vec<_> = geos.zip(gcps.iter().map(|gcp| (gcp.pixel_pos.x, gcp.pixel_pos.y))).collect();

        let kind = method.kind();
        let by = |pairs: &[((f64, f64), (f64, f64))], first: bool| -> Vec<((f64, f64), f64)> {
            pairs
                .iter()
                .map(|&(input, output)| (input, if first { output.0 } else { output.1 }))
                .collect()
        };
        let lat = FxySum::approximate(kind, &points(&pixel_norm, &by(&pixel_pairs, true)))?;
        let lon = FxySum::approximate(kind, &points(&pixel_norm, &by(&pixel_pairs, false)))?;
        let x = FxySum::approximate(kind, &points(&geo_norm, &by(&geo_pairs, true)))?;
        let y = FxySum::approximate(kind, &points(&geo_norm, &by(&geo_pairs, false)))?;
        debug!(
            "GCP fit residuals: lat {:.2e}, lon {:.2e}, x {:.3}, y {:.3}",
            lat.max_error(),
            lon.max_error(),
            x.max_error(),
            y.max_error()
        );
        Ok(Fit {
            pixel_norm,
            geo_norm,
            lat,
            lon,
            x,
            y,
        })
    }

    fn subset_gcps(&self, subset: &SubsetDef) -> Vec<GroundControlPoint> {
        let (step_x, step_y) = subset.sub_sampling();
        let (x0, y0, width, height) = match subset.region() {
            Some(region) => (
                region.x() as f64,
                region.y() as f64,
                region.shape().0 as f64,
                region.shape().1 as f64,
            ),
            None => (0., 0., self.width as f64, self.height as f64),
        };
        self.gcps
            .iter()
            .filter(|gcp| {
                let PixelPos { x, y } = gcp.pixel_pos;
                x >= x0 && x <= x0 + width && y >= y0 && y <= y0 + height
            })
            .map(|gcp| {
                let pixel_pos = PixelPos::new(
                    (gcp.pixel_pos.x - x0) / step_x as f64,
                    (gcp.pixel_pos.y - y0) / step_y as f64,
                );
                GroundControlPoint::new(&gcp.name, pixel_pos, gcp.geo_pos)
            })
            .collect()
    }
}

impl GeoCoding for GcpGeoCoding {
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
        let lon = if self.crossing_meridian && geo_pos.lon < 0. {
            geo_pos.lon + 360.
        } else {
            geo_pos.lon
        };
        let (a, b) = self.fit.geo_norm.apply(geo_pos.lat, lon);
        PixelPos::new(self.fit.x.compute_z(a, b), self.fit.y.compute_z(a, b))
    }

    fn get_geo_pos(&self, pixel_pos: &PixelPos) -> GeoPos {
        if !pixel_pos.is_valid() {
            return GeoPos::invalid();
        }
        let (a, b) = self.fit.pixel_norm.apply(pixel_pos.x, pixel_pos.y);
        GeoPos::new(self.fit.lat.compute_z(a, b), normalize_lon(self.fit.lon.compute_z(a, b)))
    }

    fn is_crossing_meridian_at_180(&self) -> bool {
        self.crossing_meridian
    }

    fn datum(&self) -> &Datum {
        &self.datum
    }

    fn transfer_geo_coding(&self, _src: &Scene, dest: &mut Scene, subset: Option<&SubsetDef>) -> bool {
        let gcps = match subset {
            Some(subset) => self.subset_gcps(subset),
            None => self.gcps.clone(),
        };
        let remaining = gcps.len();
        match GcpGeoCoding::new(gcps, self.method, dest.width(), dest.height(), self.datum.clone()) {
            Ok(coding) => {
                debug!("transferring GCP geo-coding with {remaining} points");
                dest.set_geo_coding(Arc::new(coding.with_crs(self.crs.clone())));
                true
            }
            Err(error) => {
                warn!("GCP geo-coding can not be transferred: {error}");
                false
            }
        }
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
    use crate::bounds::Region;
    use approx::assert_abs_diff_eq;
    use rstest::{fixture, rstest};

    fn geo_of(x: f64, y: f64) -> GeoPos {
        GeoPos::new(38. - 0.001 * y + 0.0002 * x, -9. + 0.0012 * x + 0.0001 * y)
    }

    fn gcps(step: usize) -> Vec<GroundControlPoint> {
        (0..=1000)
            .step_by(step)
            .flat_map(|y| (0..=1000).step_by(step).map(move |x| (x as f64, y as f64)))
            .enumerate()
            .map(|(i, (x, y))| GroundControlPoint::new(&format!("gcp{i}"), PixelPos::new(x, y), geo_of(x, y)))
            .collect()
    }

    #[fixture]
    fn coding() -> GcpGeoCoding {
        GcpGeoCoding::new(gcps(250), GcpMethod::Quadratic, 1000, 1000, Datum::wgs84()).unwrap()
    }

    #[rstest]
    fn round_trips_through_fitted_polynomials(coding: GcpGeoCoding) {
        assert!(coding.max_pixel_error() < 1e-3);
        for (x, y) in [(10.5, 990.5), (500., 500.), (731.2, 12.9)] {
            let geo_pos = coding.get_geo_pos(&PixelPos::new(x, y));
            let expected = geo_of(x, y);
            assert_abs_diff_eq!(geo_pos.lat, expected.lat, epsilon = 1e-9);
            assert_abs_diff_eq!(geo_pos.lon, expected.lon, epsilon = 1e-9);
            let pixel_pos = coding.get_pixel_pos(&geo_pos);
            assert_abs_diff_eq!(pixel_pos.x, x, epsilon = 1e-3);
            assert_abs_diff_eq!(pixel_pos.y, y, epsilon = 1e-3);
        }
    }

    #[rstest]
    #[case(GcpMethod::Linear, 2)]
    #[case(GcpMethod::Quadratic, 5)]
    #[case(GcpMethod::Cubic, 9)]
    fn too_few_points_are_rejected(#[case] method: GcpMethod, #[case] count: usize) {
        let points = gcps(100).into_iter().take(count).collect();
        let result = GcpGeoCoding::new(points, method, 1000, 1000, Datum::wgs84());
        assert!(matches!(result, Err(DataModelError::InvalidArgument(_))));
    }

    #[rstest]
    fn anti_meridian_points_are_unwrapped() {
        let points = [(0., 0., 179.), (100., 0., -179.), (0., 100., 179.), (100., 100., -179.)]
            .iter()
            .map(|&(x, y, lon)| GroundControlPoint::new("p", PixelPos::new(x, y), GeoPos::new(10. - y / 100., lon)))
            .collect();
        let coding = GcpGeoCoding::new(points, GcpMethod::Linear, 100, 100, Datum::wgs84()).unwrap();
        assert!(coding.is_crossing_meridian_at_180());
        let geo_pos = coding.get_geo_pos(&PixelPos::new(75., 50.));
        assert_abs_diff_eq!(geo_pos.lon, -179.5, epsilon = 1e-9);
        let pixel_pos = coding.get_pixel_pos(&geo_pos);
        assert_abs_diff_eq!(pixel_pos.x, 75., epsilon = 1e-6);
    }

    #[test_log::test(rstest)]
    fn subset_refits_moved_points(coding: GcpGeoCoding) {
        let fine = GcpGeoCoding::new(gcps(100), GcpMethod::Quadratic, 1000, 1000, Datum::wgs84()).unwrap();
        let src = Scene::new(1000, 1000);
        let subset = SubsetDef::new(Some(Region::new((200, 300), (500, 400))), 2, 2).unwrap();
        let mut dest = Scene::subset_of(&src, Some(&subset)).unwrap();
        assert!(fine.transfer_geo_coding(&src, &mut dest, Some(&subset)));

        let subset_coding = dest.geo_coding().unwrap();
        let from_subset = subset_coding.get_geo_pos(&PixelPos::new(40., 60.));
        let from_source = geo_of(280., 420.);
        assert_abs_diff_eq!(from_subset.lat, from_source.lat, epsilon = 1e-9);
        assert_abs_diff_eq!(from_subset.lon, from_source.lon, epsilon = 1e-9);

        // only four of the coarse points fall into this region
        let subset = SubsetDef::new(Some(Region::new((200, 200), (400, 400))), 1, 1).unwrap();
        let mut dest = Scene::subset_of(&src, Some(&subset)).unwrap();
        assert!(!coding.transfer_geo_coding(&src, &mut dest, Some(&subset)));
        assert!(dest.geo_coding().is_none());
    }
}
