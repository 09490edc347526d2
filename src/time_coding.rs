//! Pixel to time mapping in MJD2000, fractional days since 2000-01-01T00:00:00Z.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    errors::{DataModelError, Result},
    positions::PixelPos,
};

const MJD2000_EPOCH_MICROS: i64 = 946_684_800_000_000;
const MICROS_PER_DAY: f64 = 86_400_000_000.;

pub fn utc_to_mjd2000(utc: &DateTime<Utc>) -> f64 {
    (utc.timestamp_micros() - MJD2000_EPOCH_MICROS) as f64 / MICROS_PER_DAY
}

/// `None` for non-finite or unrepresentable times.
pub fn mjd2000_to_utc(mjd: f64) -> Option<DateTime<Utc>> {
    if !mjd.is_finite() {
        return None;
    }
    let micros = (mjd * MICROS_PER_DAY).round();
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }
    MJD2000_EPOCH_MICROS
        .checked_add(micros as i64)
        .and_then(DateTime::from_timestamp_micros)
}

#[ambassador::delegatable_trait]
pub trait TimeCoding {
    /// NaN for invalid or out of bounds positions.
    fn get_mjd(&self, pixel_pos: &PixelPos) -> f64;

    fn can_get_pixel_pos(&self) -> bool;

    /// Invalid when the time is not covered.
    fn get_pixel_pos(&self, mjd: f64) -> PixelPos;
}

/// Same time for every pixel of a `width * height` raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantTimeCoding {
    width: usize,
    height: usize,
    mjd: f64,
}

impl ConstantTimeCoding {
    pub fn new(width: usize, height: usize, mjd: f64) -> Self {
        Self { width, height, mjd }
    }
}

impl TimeCoding for ConstantTimeCoding {
    fn get_mjd(&self, pixel_pos: &PixelPos) -> f64 {
        if !pixel_pos.is_valid() || pixel_pos.x < 0. || pixel_pos.y < 0. {
            return f64::NAN;
        }
        if pixel_pos.x.floor() as usize >= self.width || pixel_pos.y.floor() as usize >= self.height {
            return f64::NAN;
        }
        self.mjd
    }

    fn can_get_pixel_pos(&self) -> bool {
        false
    }

    fn get_pixel_pos(&self, _mjd: f64) -> PixelPos {
        PixelPos::invalid()
    }
}

/// One time per raster row.
#[derive(Debug, Clone, PartialEq)]
pub struct LineTimeCoding {
    times: Arc<[f64]>,
}

impl LineTimeCoding {
    pub fn from_values(times: Vec<f64>) -> Result<Self> {
        if times.is_empty() {
            return Err(DataModelError::invalid("line time coding needs at least one line"));
        }
        Ok(Self {
            times: Arc::from(times),
        })
    }

    /// Times linearly spaced from `start` on the first line to `end` on the last.
    pub fn from_start_end(num_lines: usize, start: f64, end: f64) -> Result<Self> {
        if num_lines == 0 {
            return Err(DataModelError::invalid("line time coding needs at least one line"));
        }
        let delta = if num_lines > 1 {
            (end - start) / (num_lines - 1) as f64
        } else {
            0.
        };
        Self::from_values((0..num_lines).map(|line| start + delta * line as f64).collect())
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }
}

impl TimeCoding for LineTimeCoding {
    fn get_mjd(&self, pixel_pos: &PixelPos) -> f64 {
        if !pixel_pos.is_valid() || pixel_pos.y < 0. {
            return f64::NAN;
        }
        self.times
            .get(pixel_pos.y.floor() as usize)
            .copied()
            .unwrap_or(f64::NAN)
    }

    fn can_get_pixel_pos(&self) -> bool {
        true
    }

    /// Centre of the first pixel of the last line not after `mjd`,
    /// in acquisition order.
    fn get_pixel_pos(&self, mjd: f64) -> PixelPos {
        let (first, last) = (self.times[0], self.times[self.times.len() - 1]);
        let ascending = first <= last;
        let covered = if ascending {
            first <= mjd && mjd <= last
        } else {
            last <= mjd && mjd <= first
        };
        if !covered {
            return PixelPos::invalid();
        }
        let after = self
            .times
            .partition_point(|&time| if ascending { time <= mjd } else { time >= mjd });
        PixelPos::new(0.5, after.saturating_sub(1) as f64 + 0.5)
    }
}

/// One time per pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelTimeCoding {
    width: usize,
    height: usize,
    times: Arc<[f64]>,
}

impl PixelTimeCoding {
    pub fn new(width: usize, height: usize, times: Vec<f64>) -> Result<Self> {
        if times.len() != width * height {
            return Err(DataModelError::invalid(format!(
                "pixel time coding needs {} values, got {}",
                width * height,
                times.len()
            )));
        }
        Ok(Self {
            width,
            height,
            times: Arc::from(times),
        })
    }
}

impl TimeCoding for PixelTimeCoding {
    fn get_mjd(&self, pixel_pos: &PixelPos) -> f64 {
        if !pixel_pos.is_valid() || pixel_pos.x < 0. || pixel_pos.y < 0. {
            return f64::NAN;
        }
        let (x, y) = (pixel_pos.x.floor() as usize, pixel_pos.y.floor() as usize);
        if x >= self.width || y >= self.height {
            return f64::NAN;
        }
        self.times[y * self.width + x]
    }

    fn can_get_pixel_pos(&self) -> bool {
        false
    }

    fn get_pixel_pos(&self, _mjd: f64) -> PixelPos {
        PixelPos::invalid()
    }
}

#[derive(ambassador::Delegate, Debug, Clone, PartialEq)]
#[delegate(TimeCoding)]
pub enum TimeCodingKind {
    Constant(ConstantTimeCoding),
    Line(LineTimeCoding),
    Pixel(PixelTimeCoding),
}

impl From<ConstantTimeCoding> for TimeCodingKind {
    fn from(value: ConstantTimeCoding) -> Self {
        Self::Constant(value)
    }
}

impl From<LineTimeCoding> for TimeCodingKind {
    fn from(value: LineTimeCoding) -> Self {
        Self::Line(value)
    }
}

impl From<PixelTimeCoding> for TimeCodingKind {
    fn from(value: PixelTimeCoding) -> Self {
        Self::Pixel(value)
    }
}
