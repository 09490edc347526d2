use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{DataModelError, Result},
    scaling::{Scaling, ScalingKind},
    stx::{for_each_valid, MaskTile, Merge, StxOp, Tile},
};

const AREA_SKIPPED_95: f64 = 0.025;

/// Fixed bin counts over the closed interval `[low, high]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    bins: Vec<u64>,
    low: f64,
    high: f64,
}

impl Histogram {
    pub fn new(num_bins: usize, low: f64, high: f64) -> Result<Self> {
        if num_bins == 0 {
            return Err(DataModelError::invalid("histogram needs at least one bin"));
        }
        if !(low.is_finite() && high.is_finite() && low <= high) {
            return Err(DataModelError::invalid(format!(
                "invalid histogram range [{low}, {high}]"
            )));
        }
        Ok(Self {
            bins: vec![0; num_bins],
            low,
            high,
        })
    }

    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn total(&self) -> u64 {
        self.bins.iter().sum()
    }

    pub fn bin_width(&self) -> f64 {
        (self.high - self.low) / self.num_bins() as f64
    }

    /// `None` outside `[low, high]`. The upper bound belongs to the last
    /// bin, a degenerate range keeps everything in bin 0.
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        if !(self.low..=self.high).contains(&value) {
            return None;
        }
        if self.low == self.high {
            return Some(0);
        }
        let bin = ((value - self.low) / self.bin_width()).floor() as usize;
        Some(bin.min(self.num_bins() - 1))
    }

    pub fn add(&mut self, value: f64) {
        if let Some(bin) = self.bin_index(value) {
            self.bins[bin] += 1;
        }
    }

    /// Value range covered by bins `first..=last`.
    pub fn range(&self, first: usize, last: usize) -> (f64, f64) {
        let width = self.bin_width();
        (self.low + first as f64 * width, self.low + (last + 1) as f64 * width)
    }

    /// Narrowest bin range leaving out at least the given fractions of the
    /// total count on either side.
    pub fn find_range(&self, left_skipped: f64, right_skipped: f64) -> (f64, f64) {
        let total = self.total() as f64;
        let last_bin = self.num_bins() - 1;

        let mut first = 0;
        let mut area = 0.;
        while first <= last_bin {
            area += self.bins[first] as f64;
            if area / total > left_skipped {
                break;
            }
            first += 1;
        }
        let mut first = first.min(last_bin);

        let mut last = last_bin as isize;
        area = 0.;
        while last >= 0 {
            area += self.bins[last as usize] as f64;
            if area / total > right_skipped {
                break;
            }
            last -= 1;
        }
        let mut last = last.max(0) as usize;

        if first > last {
            std::mem::swap(&mut first, &mut last);
        } else if first == last {
            if last < last_bin {
                last += 1;
            } else if first > 0 {
                first -= 1;
            }
        }
        debug!("histogram range for skipped areas ({left_skipped}, {right_skipped}): bins {first}..={last}");
        self.range(first, last)
    }

    /// Lower bound of the first bin at which the cumulative share of the
    /// total count reaches `p`. NaN for an empty histogram or `p` outside
    /// `[0, 1]`.
    pub fn p_tile_threshold(&self, p: f64) -> f64 {
        let total = self.total();
        if total == 0 || !(0.0..=1.0).contains(&p) {
            return f64::NAN;
        }
        let mut cumulated = 0;
        for (bin, count) in self.bins.iter().enumerate() {
            cumulated += count;
            if cumulated as f64 / total as f64 >= p {
                return self.range(bin, bin).0;
            }
        }
        self.high
    }
}

impl Merge for Histogram {
    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.num_bins() != other.num_bins() || self.low != other.low || self.high != other.high {
            return Err(DataModelError::IncompatibleMerge(format!(
                "{} bins over [{}, {}] with {} bins over [{}, {}]",
                self.num_bins(),
                self.low,
                self.high,
                other.num_bins(),
                other.low,
                other.high
            )));
        }
        self.bins
            .iter_mut()
            .zip(&other.bins)
            .for_each(|(lhs, rhs)| *lhs += rhs);
        Ok(())
    }
}

/// Histogram of the valid samples of a raster between known extrema.
///
/// Bins live on the scaled axis, queries answer in sample values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramStxOp {
    histogram: Histogram,
    scaling: ScalingKind,
    int_histogram: bool,
    minimum: f64,
    maximum: f64,
}

impl HistogramStxOp {
    /// A non-finite `minimum` becomes 0, a non-finite `maximum` becomes
    /// `minimum`. Integer histograms extend the range to `maximum + 1` so
    /// every integer gets a bin of its own.
    pub fn new(
        num_bins: usize,
        minimum: f64,
        maximum: f64,
        int_histogram: bool,
        log_histogram: bool,
    ) -> Result<Self> {
        let minimum = if minimum.is_finite() { minimum } else { 0. };
        let maximum = if maximum.is_finite() { maximum } else { minimum };
        if maximum < minimum {
            return Err(DataModelError::invalid(format!(
                "histogram maximum {maximum} below minimum {minimum}"
            )));
        }
        let (scaling, low, high) = if log_histogram {
            if minimum <= 0. {
                return Err(DataModelError::invalid(format!(
                    "log histogram needs a positive minimum, got {minimum}"
                )));
            }
            (ScalingKind::Log10, minimum, maximum)
        } else {
            (ScalingKind::Identity, minimum, maximum)
        };
        let high = if int_histogram { high + 1. } else { high };
        let histogram = Histogram::new(num_bins, scaling.scale(low), scaling.scale(high))?;
        Ok(Self {
            histogram,
            scaling,
            int_histogram,
            minimum,
            maximum,
        })
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn scaling(&self) -> ScalingKind {
        self.scaling
    }

    pub fn is_int_histogram(&self) -> bool {
        self.int_histogram
    }

    pub fn is_log_histogram(&self) -> bool {
        self.scaling == ScalingKind::Log10
    }

    /// Sanitized bounds the op was created with.
    pub fn bounds(&self) -> (f64, f64) {
        (self.minimum, self.maximum)
    }

    fn unscaled(&self, (low, high): (f64, f64)) -> (f64, f64) {
        (self.scaling.scale_inverse(low), self.scaling.scale_inverse(high))
    }

    pub fn bin_range(&self, bin: usize) -> (f64, f64) {
        self.unscaled(self.histogram.range(bin, bin))
    }

    pub fn bin_index(&self, value: f64) -> Option<usize> {
        self.histogram.bin_index(self.scaling.scale(value))
    }

    pub fn find_range(&self, left_skipped: f64, right_skipped: f64) -> (f64, f64) {
        self.unscaled(self.histogram.find_range(left_skipped, right_skipped))
    }

    pub fn find_range_for_95_percent(&self) -> (f64, f64) {
        self.find_range(AREA_SKIPPED_95, AREA_SKIPPED_95)
    }

    pub fn p_tile_threshold(&self, p: f64) -> f64 {
        self.scaling.scale_inverse(self.histogram.p_tile_threshold(p))
    }

    pub fn median(&self) -> f64 {
        self.p_tile_threshold(0.5)
    }
}

impl StxOp for HistogramStxOp {
    fn name(&self) -> &str {
        "histogram"
    }

    fn accumulate_data(&mut self, tile: &Tile<'_>, mask: Option<&MaskTile<'_>>) -> Result<()> {
        let (histogram, scaling) = (&mut self.histogram, self.scaling);
        for_each_valid(tile, mask, |x, y| histogram.add(scaling.scale(tile.value(x, y))))
    }
}

impl Merge for HistogramStxOp {
    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.scaling != other.scaling || self.int_histogram != other.int_histogram {
            return Err(DataModelError::IncompatibleMerge(String::from(
                "histograms differ in scaling or integer binning",
            )));
        }
        self.histogram.merge(&other.histogram)
    }
}
