use std::sync::{Arc, OnceLock};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    crs_geo::GeoCodingCrs,
    errors::{DataModelError, Result},
    geocoding::{Datum, GeoCoding, GeoPosTransform},
    math::{self, best_polynomial, FxySum},
    positions::{GeoPos, PixelPos},
    scene::{Scene, SubsetDef},
    transforms::Transform2D,
};

const ABS_ERROR_LIMIT: f64 = 0.5;
const MAX_NUM_POINTS_PER_TILE: usize = 1000;
const MIN_POINTS_PER_TILE: usize = 10;

/// Angular discontinuity of a grid of angles.
///
/// `Auto` is resolved to `At180` or `At360` from the tie point values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Discontinuity {
    #[default]
    None,
    Auto,
    At180,
    At360,
}

/// Coarse grid of `f32` samples, bilinearly interpolated to raster pixels.
///
/// Tie point `(i, j)` sits at pixel `(offset_x + i * sub_sampling_x, offset_y + j * sub_sampling_y)`.
#[derive(Debug, Clone)]
pub struct TiePointGrid {
    name: String,
    grid_width: usize,
    grid_height: usize,
    offset_x: f64,
    offset_y: f64,
    sub_sampling_x: f64,
    sub_sampling_y: f64,
    tie_points: Arc<[f32]>,
    discontinuity: Discontinuity,
    sin_cos: OnceLock<(Arc<[f64]>, Arc<[f64]>)>,
}

impl TiePointGrid {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        grid_width: usize,
        grid_height: usize,
        offset: (f64, f64),
        sub_sampling: (f64, f64),
        tie_points: Vec<f32>,
        discontinuity: Discontinuity,
    ) -> Result<Self> {
        if grid_width < 2 || grid_height < 2 {
            return Err(DataModelError::invalid(format!(
                "tie point grid '{name}' must be at least 2 x 2, got {grid_width} x {grid_height}"
            )));
        }
        if tie_points.len() != grid_width * grid_height {
            return Err(DataModelError::invalid(format!(
                "tie point grid '{name}' needs {} points, got {}",
                grid_width * grid_height,
                tie_points.len()
            )));
        }
        if !(sub_sampling.0 > 0. && sub_sampling.1 > 0.) {
            return Err(DataModelError::invalid(format!(
                "tie point grid '{name}' sub-sampling must be positive, got {sub_sampling:?}"
            )));
        }
        let discontinuity = match discontinuity {
            Discontinuity::Auto => {
                let max = tie_points.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                if max > 180. {
                    Discontinuity::At360
                } else {
                    Discontinuity::At180
                }
            }
            other => other,
        };
        Ok(Self {
            name: name.to_string(),
            grid_width,
            grid_height,
            offset_x: offset.0,
            offset_y: offset.1,
            sub_sampling_x: sub_sampling.0,
            sub_sampling_y: sub_sampling.1,
            tie_points: Arc::from(tie_points),
            discontinuity,
            sin_cos: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid_width(&self) -> usize {
        self.grid_width
    }

    pub fn grid_height(&self) -> usize {
        self.grid_height
    }

    pub fn offset(&self) -> (f64, f64) {
        (self.offset_x, self.offset_y)
    }

    pub fn sub_sampling(&self) -> (f64, f64) {
        (self.sub_sampling_x, self.sub_sampling_y)
    }

    pub fn tie_points(&self) -> &[f32] {
        &self.tie_points
    }

    pub fn discontinuity(&self) -> Discontinuity {
        self.discontinuity
    }

    pub fn raster_width(&self) -> usize {
        ((self.grid_width - 1) as f64 * self.sub_sampling_x + 1.).round() as usize
    }

    pub fn raster_height(&self) -> usize {
        ((self.grid_height - 1) as f64 * self.sub_sampling_y + 1.).round() as usize
    }

    /// Same layout, so the grids can be evaluated together.
    pub fn is_compatible(&self, other: &TiePointGrid) -> bool {
        self.grid_width == other.grid_width
            && self.grid_height == other.grid_height
            && self.offset_x == other.offset_x
            && self.offset_y == other.offset_y
            && self.sub_sampling_x == other.sub_sampling_x
            && self.sub_sampling_y == other.sub_sampling_y
    }

    /// Value at the centre of pixel `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> f64 {
        self.pixel_double(x as f64 + 0.5, y as f64 + 0.5)
    }

    /// Interpolated value at a raster coordinate, extrapolated beyond the outer tie points.
    pub fn pixel_double(&self, x: f64, y: f64) -> f64 {
        if self.discontinuity == Discontinuity::None {
            return self.interpolate(&self.tie_points[..], x, y, |v| v as f64);
        }
        let (sin, cos) = self.sin_cos.get_or_init(|| {
            let radians = || self.tie_points.iter().map(|v| (*v as f64).to_radians());
            (radians().map(f64::sin).collect(), radians().map(f64::cos).collect())
        });
        let angle = self
            .interpolate(&sin[..], x, y, |v| v)
            .atan2(self.interpolate(&cos[..], x, y, |v| v))
            .to_degrees();
        if self.discontinuity == Discontinuity::At360 && angle < 0. {
            360. + angle
        } else {
            angle
        }
    }

    fn interpolate<T: Copy>(&self, values: &[T], x: f64, y: f64, to_f64: impl Fn(T) -> f64) -> f64 {
        let fi = (x - self.offset_x) / self.sub_sampling_x;
        let fj = (y - self.offset_y) / self.sub_sampling_y;
        let i = math::floor_and_crop(fi, 0, self.grid_width - 2);
        let j = math::floor_and_crop(fj, 0, self.grid_height - 2);
        let w = self.grid_width;
        math::interpolate_2d(
            fi - i as f64,
            fj - j as f64,
            to_f64(values[i + j * w]),
            to_f64(values[i + 1 + j * w]),
            to_f64(values[i + (j + 1) * w]),
            to_f64(values[i + 1 + (j + 1) * w]),
        )
    }

    /// Grid covering `subset`, in the pixel coordinates of the subset scene.
    pub fn create_subset(&self, subset: Option<&SubsetDef>) -> Result<Self> {
        let (step_x, step_y) = subset.map_or((1, 1), SubsetDef::sub_sampling);
        let (region_x, region_y, subset_width, subset_height) = match subset.and_then(SubsetDef::region) {
            Some(region) => (region.x(), region.y(), region.shape().0, region.shape().1),
            None => (0, 0, self.raster_width(), self.raster_height()),
        };
        let (step_x, step_y) = (step_x as f64, step_y as f64);

        let sub_sampling_x = self.sub_sampling_x / step_x;
        let sub_sampling_y = self.sub_sampling_y / step_y;
        let shifted_x = (self.offset_x - 0.5 - region_x as f64) / step_x + 0.5;
        let shifted_y = (self.offset_y - 0.5 - region_y as f64) / step_y + 0.5;
        // first tie point at or left of the subset origin, or the grid origin if it starts later
        let first = |shifted: f64, sub_sampling: f64| {
            if shifted > 0. {
                (shifted, 0)
            } else {
                let offset = shifted % sub_sampling;
                (offset, ((offset - shifted) / sub_sampling).round() as usize)
            }
        };
        let (offset_x, data_x) = first(shifted_x, sub_sampling_x);
        let (offset_y, data_y) = first(shifted_y, sub_sampling_y);
        if data_x >= self.grid_width || data_y >= self.grid_height {
            return Err(DataModelError::invalid(format!(
                "subset starts at tie point ({data_x}, {data_y}) outside the {} x {} grid {}",
                self.grid_width, self.grid_height, self.name
            )));
        }

        let width = ((subset_width as f64 / self.sub_sampling_x).ceil() as usize + 2)
            .min(self.grid_width.saturating_sub(data_x));
        let height = ((subset_height as f64 / self.sub_sampling_y).ceil() as usize + 2)
            .min(self.grid_height.saturating_sub(data_y));

        let mut tie_points = Vec::with_capacity(width * height);
        for row in self.tie_points.chunks(self.grid_width).skip(data_y).take(height) {
            tie_points.extend_from_slice(&row[data_x..data_x + width]);
        }
        Self::new(
            &self.name,
            width,
            height,
            (offset_x, offset_y),
            (sub_sampling_x, sub_sampling_y),
            tie_points,
            self.discontinuity,
        )
    }
}

/// Local inverse model of one tile of the tie point grid.
///
/// Polynomials take `(lat / 90, (lon - center_lon) / 90)` and give the pixel coordinate.
#[derive(Debug, Clone)]
pub struct Approximation {
    fx: FxySum,
    fy: FxySum,
    center_lat: f64,
    center_lon: f64,
    max_square_distance: f64,
}

impl Approximation {
    pub fn fx(&self) -> &FxySum {
        &self.fx
    }

    pub fn fy(&self) -> &FxySum {
        &self.fy
    }

    pub fn center(&self) -> GeoPos {
        GeoPos::new(self.center_lat, self.center_lon)
    }

    /// Square distance in degrees up to which the approximation is used.
    pub fn max_square_distance(&self) -> f64 {
        self.max_square_distance
    }

    pub fn square_distance(&self, lat: f64, lon: f64) -> f64 {
        let d_lat = lat - self.center_lat;
        let d_lon = lon - self.center_lon;
        d_lat * d_lat + d_lon * d_lon
    }

    fn pixel_pos(&self, lat: f64, lon: f64) -> PixelPos {
        let lat = lat / 90.;
        let lon = (lon - self.center_lon) / 90.;
        PixelPos::new(self.fx.compute_z(lat, lon), self.fy.compute_z(lat, lon))
    }
}

/// Everything the inverse needs, derived once from the grids.
#[derive(Debug)]
struct InverseModel {
    normalized: bool,
    normalized_lon_min: f64,
    normalized_lon_max: f64,
    overlap_start: f64,
    overlap_end: f64,
    approximations: Option<Vec<Approximation>>,
}

impl InverseModel {
    fn normalize_lon(&self, lon: f64) -> f64 {
        if !(-180.0..=180.0).contains(&lon) {
            return f64::NAN;
        }
        let lon = if lon < self.normalized_lon_min { lon + 360. } else { lon };
        if lon < self.normalized_lon_min || lon > self.normalized_lon_max {
            f64::NAN
        } else {
            lon
        }
    }
}

/// Geo-coding interpolating latitude and longitude tie point grids.
#[derive(Debug, Clone)]
pub struct TiePointGeoCoding {
    lat_grid: TiePointGrid,
    lon_grid: TiePointGrid,
    raster_width: usize,
    raster_height: usize,
    datum: Datum,
    crs: GeoCodingCrs,
    inverse: OnceLock<Arc<InverseModel>>,
}

impl TiePointGeoCoding {
    pub fn new(lat_grid: TiePointGrid, lon_grid: TiePointGrid, datum: Datum) -> Result<Self> {
        if !lat_grid.is_compatible(&lon_grid) {
            return Err(DataModelError::invalid(format!(
                "latitude grid '{}' is not compatible with longitude grid '{}'",
                lat_grid.name(),
                lon_grid.name()
            )));
        }
        info!(
            "tie point geo-coding from {} x {} grids '{}' and '{}'",
            lat_grid.grid_width(),
            lat_grid.grid_height(),
            lat_grid.name(),
            lon_grid.name()
        );
        Ok(Self {
            raster_width: lat_grid.raster_width(),
            raster_height: lat_grid.raster_height(),
            lat_grid,
            lon_grid,
            datum,
            crs: GeoCodingCrs::wgs84(),
            inverse: OnceLock::new(),
        })
    }

    /// Bounds of the forward mapping, when the scene is not exactly the grid's raster.
    pub fn with_raster_size(mut self, width: usize, height: usize) -> Self {
        self.raster_width = width;
        self.raster_height = height;
        self
    }

    pub fn with_crs(mut self, crs: GeoCodingCrs) -> Self {
        self.crs = crs;
        self
    }

    pub fn lat_grid(&self) -> &TiePointGrid {
        &self.lat_grid
    }

    pub fn lon_grid(&self) -> &TiePointGrid {
        &self.lon_grid
    }

    /// Empty when no approximation could be fitted.
    pub fn approximations(&self) -> &[Approximation] {
        self.inverse().approximations.as_deref().unwrap_or(&[])
    }

    fn inverse(&self) -> &InverseModel {
        self.inverse.get_or_init(|| Arc::new(self.compute_inverse()))
    }

    fn compute_inverse(&self) -> InverseModel {
        let (normalized_lons, normalized) = normalize_longitudes(&self.lon_grid);
        let (lon_min, lon_max) = min_max(&normalized_lons);
        let overlap_start = if lon_min < -180. { lon_min + 360. } else { lon_min };
        let overlap_end = if lon_max > 180. { lon_max - 360. } else { lon_max };
        debug!(
            "normalized longitudes of '{}' to [{lon_min}, {lon_max}], crossing 180: {normalized}",
            self.lon_grid.name()
        );
        let approximations = self.fit_approximations(&normalized_lons);
        if approximations.is_none() {
            warn!("no inverse approximation for grids '{}'", self.lat_grid.name());
        }
        InverseModel {
            normalized,
            normalized_lon_min: lon_min,
            normalized_lon_max: lon_max,
            overlap_start,
            overlap_end,
            approximations,
        }
    }

    fn fit_approximations(&self, lons: &[f64]) -> Option<Vec<Approximation>> {
        let (w, h) = (self.lat_grid.grid_width(), self.lat_grid.grid_height());
        let (sub_x, sub_y) = self.lat_grid.sub_sampling();
        let num_points = w * h;

        let mut num_tiles = num_points.div_ceil(MIN_POINTS_PER_TILE);
        let (mut tiles_x, mut tiles_y) = (1, 1);
        while num_tiles > 1 {
            let (new_x, new_y) = math::fit_dimension(num_tiles, w as f64 * sub_x, h as f64 * sub_y);
            if num_points / (new_x * new_y) >= MIN_POINTS_PER_TILE {
                (tiles_x, tiles_y) = (new_x, new_y);
                break;
            }
            num_tiles -= 1;
        }
        debug!("fitting {tiles_x} x {tiles_y} inverse approximations");

        math::subdivide_rectangle(w, h, tiles_x, tiles_y, 1)
            .into_iter()
            .map(|tile| self.fit_approximation(lons, tile.x(), tile.y(), tile.shape()))
            .collect()
    }

    fn fit_approximation(
        &self,
        lons: &[f64],
        i1: usize,
        j1: usize,
        (sw, sh): (usize, usize),
    ) -> Option<Approximation> {
        let w = self.lat_grid.grid_width();
        let (offset_x, offset_y) = self.lat_grid.offset();
        let (sub_x, sub_y) = self.lat_grid.sub_sampling();
        let lats = self.lat_grid.tie_points();
        let (num_u, num_v, step_i, step_j) = warp_parameters(sw, sh);

        // lat, lon, x, y
        let mut warp_points = Vec::with_capacity(num_u * num_v);
        for v in 0..num_v {
            let j = (j1 + v * step_j).min(j1 + sh - 1);
            for u in 0..num_u {
                let i = (i1 + u * step_i).min(i1 + sw - 1);
                warp_points.push([
                    lats[j * w + i] as f64,
                    lons[j * w + i],
                    offset_x + i as f64 * sub_x,
                    offset_y + j as f64 * sub_y,
                ]);
            }
        }
        let count = warp_points.len() as f64;
        let center_lat = warp_points.iter().map(|p| p[0]).sum::<f64>() / count;
        let center_lon = warp_points.iter().map(|p| p[1]).sum::<f64>() / count;
        let max_square_distance = warp_points
            .iter()
            .map(|p| (p[0] - center_lat).powi(2) + (p[1] - center_lon).powi(2))
            .fold(0., f64::max);

        let rescaled = |component: usize| -> Vec<[f64; 3]> {
            warp_points
                .iter()
                .map(|p| [p[0] / 90., (p[1] - center_lon) / 90., p[component]])
                .collect()
        };
        let fx = best_polynomial(&rescaled(2), ABS_ERROR_LIMIT)?;
        let fy = best_polynomial(&rescaled(3), ABS_ERROR_LIMIT)?;
        debug!(
            "approximation at ({center_lat:.3}, {center_lon:.3}): {:?} max error {:.4}, {:?} max error {:.4}",
            fx.kind(),
            fx.max_error(),
            fy.kind(),
            fy.max_error()
        );
        Some(Approximation {
            fx,
            fy,
            center_lat,
            center_lon,
            max_square_distance: max_square_distance * 1.1,
        })
    }
}

/// Nearest approximation whose extent covers `(lat, lon)`.
fn best_approximation(approximations: &[Approximation], lat: f64, lon: f64) -> Option<&Approximation> {
    approximations
        .iter()
        .map(|a| (a, a.square_distance(lat, lon)))
        .filter(|(a, distance)| *distance < a.max_square_distance())
        .min_by(|(_, lhs), (_, rhs)| lhs.total_cmp(rhs))
        .map(|(a, _)| a)
}

/// Longitudes made continuous row by row; `true` if any jump over 180 degrees was found.
fn normalize_longitudes(grid: &TiePointGrid) -> (Vec<f64>, bool) {
    let w = grid.grid_width();
    let mut lons: Vec<f64> = grid.tie_points().iter().map(|v| *v as f64).collect();
    let (mut west, mut east) = (false, false);
    for index in 1..lons.len() {
        let base = if index % w == 0 { lons[index - w] } else { lons[index - 1] };
        let delta = lons[index] - base;
        if delta > 180. {
            lons[index] -= 360.;
            west = true;
        } else if delta < -180. {
            lons[index] += 360.;
            east = true;
        }
    }
    // west normalization can reach -540
    if west {
        lons.iter_mut().for_each(|lon| *lon += 360.);
    }
    (lons, west || east)
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| (min.min(*v), max.max(*v)))
}

/// Counts and steps of warp points so that a tile contributes at most
/// `MAX_NUM_POINTS_PER_TILE` points, thinning the longer side first.
fn warp_parameters(sw: usize, sh: usize) -> (usize, usize, usize, usize) {
    let (mut num_u, mut num_v, mut step_i, mut step_j) = (sw, sh, 1, 1);
    let mut adjust_i = num_u >= num_v;
    while num_u * num_v > MAX_NUM_POINTS_PER_TILE {
        if adjust_i {
            step_i += 1;
            num_u = sw.div_ceil(step_i);
        } else {
            step_j += 1;
            num_v = sh.div_ceil(step_j);
        }
        adjust_i = num_u >= num_v;
    }
    (num_u, num_v, step_i, step_j)
}

impl GeoCoding for TiePointGeoCoding {
    fn can_get_pixel_pos(&self) -> bool {
        self.inverse().approximations.is_some()
    }

    fn can_get_geo_pos(&self) -> bool {
        true
    }

    fn get_pixel_pos(&self, geo_pos: &GeoPos) -> PixelPos {
        let model = self.inverse();
        let Some(approximations) = model.approximations.as_deref() else {
            return PixelPos::invalid();
        };
        let lat = if (-90.0..=90.).contains(&geo_pos.lat) { geo_pos.lat } else { f64::NAN };
        let mut lon = model.normalize_lon(geo_pos.lon);
        if lat.is_nan() || lon.is_nan() {
            return PixelPos::invalid();
        }
        let mut approximation = best_approximation(approximations, lat, lon);
        // overlapping normalized and raw longitudes, retry on the other side
        if lon >= model.overlap_start && lon <= model.overlap_end {
            let distance = approximation.map_or(f64::MAX, |a| a.square_distance(lat, lon));
            let shifted = lon + 360.;
            if let Some(renormalized) = best_approximation(approximations, lat, shifted)
                .filter(|a| a.square_distance(lat, shifted) < distance)
            {
                approximation = Some(renormalized);
                lon = shifted;
            }
        }
        approximation.map_or(PixelPos::invalid(), |a| a.pixel_pos(lat, lon))
    }

    fn get_geo_pos(&self, pixel_pos: &PixelPos) -> GeoPos {
        let inside = pixel_pos.is_valid()
            && (0.0..=self.raster_width as f64).contains(&pixel_pos.x)
            && (0.0..=self.raster_height as f64).contains(&pixel_pos.y);
        if !inside {
            return GeoPos::invalid();
        }
        GeoPos::new(
            self.lat_grid.pixel_double(pixel_pos.x, pixel_pos.y),
            self.lon_grid.pixel_double(pixel_pos.x, pixel_pos.y),
        )
    }

    fn is_crossing_meridian_at_180(&self) -> bool {
        self.inverse().normalized
    }

    fn datum(&self) -> &Datum {
        &self.datum
    }

    fn transfer_geo_coding(&self, src: &Scene, dest: &mut Scene, subset: Option<&SubsetDef>) -> bool {
        let grids = subset
            .map_or(Ok(()), |subset| subset.effective_region(src.width(), src.height()).map(drop))
            .and_then(|_| self.lat_grid.create_subset(subset))
            .and_then(|lat| Ok((lat, self.lon_grid.create_subset(subset)?)))
            .and_then(|(lat, lon)| TiePointGeoCoding::new(lat, lon, self.datum.clone()));
        match grids {
            Ok(coding) => {
                debug!(
                    "transferring tie point geo-coding onto {} x {} scene",
                    dest.width(),
                    dest.height()
                );
                let coding = coding
                    .with_raster_size(dest.width(), dest.height())
                    .with_crs(self.crs.clone());
                dest.set_geo_coding(Arc::new(coding));
                true
            }
            Err(error) => {
                warn!("tie point geo-coding can not be transferred: {error}");
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

    const GRID: usize = 11;
    const SUB: f64 = 10.;

    fn grid(name: &str, discontinuity: Discontinuity, f: impl Fn(f64, f64) -> f64) -> TiePointGrid {
        let values = (0..GRID)
            .flat_map(|j| (0..GRID).map(move |i| (i, j)))
            .map(|(i, j)| f(0.5 + i as f64 * SUB, 0.5 + j as f64 * SUB) as f32)
            .collect();
        TiePointGrid::new(name, GRID, GRID, (0.5, 0.5), (SUB, SUB), values, discontinuity).unwrap()
    }

    /// 101 x 101 scene over a mildly curved area in Europe.
    #[fixture]
    fn coding() -> TiePointGeoCoding {
        let lat = grid("latitude", Discontinuity::None, |x, y| 50. - 0.02 * y + 1e-5 * x * x);
        let lon = grid("longitude", Discontinuity::At180, |x, y| 5. + 0.03 * x + 0.005 * y);
        TiePointGeoCoding::new(lat, lon, Datum::wgs84()).unwrap()
    }

    /// Scene whose longitudes run from 170 over the anti-meridian to -170.
    #[fixture]
    fn crossing() -> TiePointGeoCoding {
        let lat = grid("latitude", Discontinuity::None, |_, y| -10. - 0.02 * y);
        let lon = grid("longitude", Discontinuity::At180, |x, _| {
            let lon = 170. + 0.2 * x;
            if lon > 180. { lon - 360. } else { lon }
        });
        TiePointGeoCoding::new(lat, lon, Datum::wgs84()).unwrap()
    }

    #[rstest]
    fn raster_size_follows_grid() {
        let grid = grid("g", Discontinuity::None, |x, _| x);
        assert_eq!((grid.raster_width(), grid.raster_height()), (101, 101));
    }

    #[rstest]
    fn interpolates_and_extrapolates() {
        let grid = grid("g", Discontinuity::None, |x, y| x + 2. * y);
        assert_abs_diff_eq!(grid.pixel_double(33.3, 47.1), 33.3 + 94.2, epsilon = 1e-3);
        assert_abs_diff_eq!(grid.pixel(0, 0), 1.5, epsilon = 1e-4);
        // beyond the last tie point the outer cell is extended
        assert_abs_diff_eq!(grid.pixel_double(105.5, 0.5), 105.5 + 1., epsilon = 1e-3);
    }

    #[rstest]
    fn angles_interpolate_across_discontinuity() {
        let values = vec![179., -179., 179., -179.];
        let grid = TiePointGrid::new("lon", 2, 2, (0., 0.), (1., 1.), values, Discontinuity::At180).unwrap();
        assert_abs_diff_eq!(grid.pixel_double(0.5, 0.5).abs(), 180., epsilon = 1e-6);

        let values = vec![359., 1., 359., 1.];
        let grid = TiePointGrid::new("azimuth", 2, 2, (0., 0.), (1., 1.), values, Discontinuity::Auto).unwrap();
        assert_eq!(grid.discontinuity(), Discontinuity::At360);
        assert_abs_diff_eq!(grid.pixel_double(0.25, 0.5), 359.5, epsilon = 1e-3);
    }

    #[rstest]
    #[case(1, vec![1.; 2])]
    #[case(2, vec![1.; 3])]
    fn rejects_malformed_grids(#[case] height: usize, #[case] values: Vec<f32>) {
        let result = TiePointGrid::new("g", 2, height, (0., 0.), (1., 1.), values, Discontinuity::None);
        assert!(matches!(result, Err(DataModelError::InvalidArgument(_))));
    }

    #[rstest]
    fn rejects_incompatible_grids() {
        let lat = grid("latitude", Discontinuity::None, |_, y| y);
        let lon = TiePointGrid::new("longitude", 2, 2, (0.5, 0.5), (SUB, SUB), vec![0.; 4], Discontinuity::None)
            .unwrap();
        assert!(TiePointGeoCoding::new(lat, lon, Datum::wgs84()).is_err());
    }

    #[test_log::test(rstest)]
    fn inverse_round_trips_within_half_a_pixel(coding: TiePointGeoCoding) {
        assert!(coding.can_get_pixel_pos());
        assert!(!coding.is_crossing_meridian_at_180());
        assert!(coding.approximations().len() > 1);
        for (x, y) in [(0.5, 0.5), (37.3, 64.8), (99.5, 99.5), (50., 12.5), (3.5, 96.5)] {
            let geo_pos = coding.get_geo_pos(&PixelPos::new(x, y));
            let pixel_pos = coding.get_pixel_pos(&geo_pos);
            assert!((pixel_pos.x - x).abs() < 0.5, "x {x} -> {}", pixel_pos.x);
            assert!((pixel_pos.y - y).abs() < 0.5, "y {y} -> {}", pixel_pos.y);
        }
    }

    #[rstest]
    fn forward_is_invalid_outside_raster(coding: TiePointGeoCoding) {
        assert!(!coding.get_geo_pos(&PixelPos::new(-0.1, 5.)).is_valid());
        assert!(!coding.get_geo_pos(&PixelPos::new(5., 101.5)).is_valid());
        assert!(!coding.get_geo_pos(&PixelPos::invalid()).is_valid());
        assert!(coding.get_geo_pos(&PixelPos::new(101., 101.)).is_valid());
    }

    #[rstest]
    fn inverse_is_invalid_far_away(coding: TiePointGeoCoding) {
        assert!(!coding.get_pixel_pos(&GeoPos::new(-30., 120.)).is_valid());
        assert!(!coding.get_pixel_pos(&GeoPos::new(91., 5.)).is_valid());
    }

    #[test_log::test(rstest)]
    fn crossing_the_anti_meridian(crossing: TiePointGeoCoding) {
        assert!(crossing.is_crossing_meridian_at_180());
        for (x, y) in [(20.5, 30.5), (75.5, 60.5)] {
            let geo_pos = crossing.get_geo_pos(&PixelPos::new(x, y));
            assert!(geo_pos.lon.abs() <= 180.);
            let pixel_pos = crossing.get_pixel_pos(&geo_pos);
            assert!((pixel_pos.x - x).abs() < 0.5, "x {x} -> {}", pixel_pos.x);
            assert!((pixel_pos.y - y).abs() < 0.5, "y {y} -> {}", pixel_pos.y);
        }
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    fn subset_matches_source(coding: TiePointGeoCoding, #[case] step: usize) {
        let src = Scene::new(101, 101);
        let subset = SubsetDef::new(Some(Region::new((20, 30), (50, 40))), step, step).unwrap();
        let mut dest = Scene::subset_of(&src, Some(&subset)).unwrap();
        assert!(coding.transfer_geo_coding(&src, &mut dest, Some(&subset)));

        let subset_coding = dest.geo_coding().unwrap();
        for (k, l) in [(0, 0), (5, 7), (12, 9)] {
            let from_subset = subset_coding.get_geo_pos(&PixelPos::new(k as f64 + 0.5, l as f64 + 0.5));
            let from_source = coding.get_geo_pos(&PixelPos::new(
                (20 + step * k) as f64 + 0.5,
                (30 + step * l) as f64 + 0.5,
            ));
            assert_abs_diff_eq!(from_subset.lat, from_source.lat, epsilon = 1e-6);
            assert_abs_diff_eq!(from_subset.lon, from_source.lon, epsilon = 1e-6);
        }
    }

    #[test_log::test(rstest)]
    fn subset_outside_the_grid_is_not_transferred(coding: TiePointGeoCoding) {
        let src = Scene::new(101, 101);
        let subset = SubsetDef::new(Some(Region::new((200, 0), (50, 50))), 1, 1).unwrap();
        let mut dest = Scene::new(50, 50);
        assert!(!coding.transfer_geo_coding(&src, &mut dest, Some(&subset)));
        assert!(dest.geo_coding().is_none());
        assert!(matches!(
            coding.lat_grid.create_subset(Some(&subset)),
            Err(DataModelError::InvalidArgument(_))
        ));
    }

    #[rstest]
    #[case(10, 10, (10, 10, 1, 1))]
    #[case(100, 20, (50, 20, 2, 1))]
    #[case(40, 40, (20, 40, 2, 1))]
    fn warp_points_stay_within_budget(#[case] sw: usize, #[case] sh: usize, #[case] expected: (usize, usize, usize, usize)) {
        let parameters = warp_parameters(sw, sh);
        assert_eq!(parameters, expected);
        assert!(parameters.0 * parameters.1 <= MAX_NUM_POINTS_PER_TILE);
    }
}
