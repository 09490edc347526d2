use serde::{Deserialize, Serialize};

use crate::{
    errors::{DataModelError, Result},
    stx::{for_each_valid, MaskTile, Merge, StxOp, Tile},
};

/// Which raw moments feed the coefficient of variation and the equivalent
/// number of looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MomentKind {
    /// Samples are intensities, moments of the samples themselves.
    Intensity,
    /// Samples are amplitudes, moments of their squares.
    #[default]
    Amplitude,
}

impl MomentKind {
    /// Intensity when the unit names one, amplitude otherwise.
    pub fn from_unit(unit: &str) -> Self {
        if unit.to_lowercase().contains("intensity") {
            Self::Intensity
        } else {
            Self::Amplitude
        }
    }
}

/// Count, extrema, mean and variance of the finite samples seen so far.
///
/// Mean and variance follow Welford's single pass update, shards combine
/// with Chan's formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStxOp {
    moment_kind: MomentKind,
    count: u64,
    minimum: f64,
    maximum: f64,
    mean: f64,
    m2: f64,
    sum: f64,
    sum_sq: f64,
    sum_4: f64,
}

impl SummaryStxOp {
    pub fn new(moment_kind: MomentKind) -> Self {
        Self {
            moment_kind,
            count: 0,
            minimum: f64::INFINITY,
            maximum: f64::NEG_INFINITY,
            mean: 0.,
            m2: 0.,
            sum: 0.,
            sum_sq: 0.,
            sum_4: 0.,
        }
    }

    fn accumulate_value(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        self.minimum = self.minimum.min(value);
        self.maximum = self.maximum.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);

        let square = value * value;
        self.sum += value;
        self.sum_sq += square;
        self.sum_4 += square * square;
    }

    pub fn moment_kind(&self) -> MomentKind {
        self.moment_kind
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// NaN before the first sample.
    pub fn minimum(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.minimum
        }
    }

    /// NaN before the first sample.
    pub fn maximum(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.maximum
        }
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Unbiased sample variance, 0 for a single sample.
    pub fn variance(&self) -> f64 {
        match self.count {
            0 => f64::NAN,
            1 => 0.,
            count => self.m2 / (count - 1) as f64,
        }
    }

    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// First and second moment for the configured [`MomentKind`].
    fn moments(&self) -> (f64, f64) {
        let count = self.count as f64;
        match self.moment_kind {
            MomentKind::Intensity => (self.sum / count, self.sum_sq / count),
            MomentKind::Amplitude => (self.sum_sq / count, self.sum_4 / count),
        }
    }

    pub fn coefficient_of_variation(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        let (m, m2) = self.moments();
        (m2 - m * m).sqrt() / m
    }

    pub fn equivalent_number_of_looks(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        let (m, m2) = self.moments();
        m * m / (m2 - m * m)
    }
}

impl StxOp for SummaryStxOp {
    fn name(&self) -> &str {
        "summary"
    }

    fn accumulate_data(&mut self, tile: &Tile<'_>, mask: Option<&MaskTile<'_>>) -> Result<()> {
        for_each_valid(tile, mask, |x, y| self.accumulate_value(tile.value(x, y)))
    }
}

impl Merge for SummaryStxOp {
    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.moment_kind != other.moment_kind {
            return Err(DataModelError::IncompatibleMerge(format!(
                "{:?} summary with {:?} summary",
                self.moment_kind, other.moment_kind
            )));
        }
        if other.count == 0 {
            return Ok(());
        }
        if self.count == 0 {
            *self = other.clone();
            return Ok(());
        }
        let (lhs, rhs) = (self.count as f64, other.count as f64);
        let count = lhs + rhs;
        let delta = other.mean - self.mean;
        self.mean += delta * rhs / count;
        self.m2 += other.m2 + delta * delta * lhs * rhs / count;
        self.count += other.count;
        self.minimum = self.minimum.min(other.minimum);
        self.maximum = self.maximum.max(other.maximum);
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.sum_4 += other.sum_4;
        Ok(())
    }
}
