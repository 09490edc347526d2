use std::fmt::Debug;

use num_traits::AsPrimitive;

use crate::{
    bounds::Region,
    errors::{DataModelError, Result},
    stepping::Stepping,
};

/// Primitive sample encodings a [`Tile`] can be read from.
pub trait SampleType: AsPrimitive<f64> + AsPrimitive<i64> + Copy + Send + Sync + Debug + 'static {}

impl<T> SampleType for T where T: AsPrimitive<f64> + AsPrimitive<i64> + Copy + Send + Sync + Debug + 'static {}

/// Caller-owned sample buffer of one of the supported encodings.
///
/// `Unsupported` stands for any other encoding of `len` elements and reads
/// as zeros.
#[derive(Debug, Clone, Copy)]
pub enum Samples<'a> {
    U8(&'a [u8]),
    I16(&'a [i16]),
    U16(&'a [u16]),
    I32(&'a [i32]),
    F32(&'a [f32]),
    F64(&'a [f64]),
    Unsupported { len: usize },
}

macro_rules! samples_from {
    ($ty:ty, $variant:ident) => {
        impl<'a> From<&'a [$ty]> for Samples<'a> {
            fn from(value: &'a [$ty]) -> Self {
                Samples::$variant(value)
            }
        }
    };
}

samples_from!(u8, U8);
samples_from!(i16, I16);
samples_from!(u16, U16);
samples_from!(i32, I32);
samples_from!(f32, F32);
samples_from!(f64, F64);

fn as_f64<T: SampleType>(data: &[T], index: usize) -> f64 {
    AsPrimitive::<f64>::as_(data[index])
}

fn as_i64<T: SampleType>(data: &[T], index: usize) -> i64 {
    AsPrimitive::<i64>::as_(data[index])
}

impl Samples<'_> {
    pub fn len(&self) -> usize {
        match self {
            Samples::U8(data) => data.len(),
            Samples::I16(data) => data.len(),
            Samples::U16(data) => data.len(),
            Samples::I32(data) => data.len(),
            Samples::F32(data) => data.len(),
            Samples::F64(data) => data.len(),
            Samples::Unsupported { len } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_integral(&self) -> bool {
        !matches!(self, Samples::F32(_) | Samples::F64(_))
    }

    fn value(&self, index: usize) -> f64 {
        match self {
            Samples::U8(data) => as_f64(data, index),
            Samples::I16(data) => as_f64(data, index),
            Samples::U16(data) => as_f64(data, index),
            Samples::I32(data) => as_f64(data, index),
            Samples::F32(data) => as_f64(data, index),
            Samples::F64(data) => as_f64(data, index),
            Samples::Unsupported { .. } => 0.,
        }
    }

    /// Floats truncate, saturating at the `i64` range, NaN reads as 0.
    fn int_value(&self, index: usize) -> i64 {
        match self {
            Samples::U8(data) => as_i64(data, index),
            Samples::I16(data) => as_i64(data, index),
            Samples::U16(data) => as_i64(data, index),
            Samples::I32(data) => as_i64(data, index),
            Samples::F32(data) => as_i64(data, index),
            Samples::F64(data) => as_i64(data, index),
            Samples::Unsupported { .. } => 0,
        }
    }
}

/// Where the pixels of a rectangle live inside a flat buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub offset: usize,
    pub pixel_stride: usize,
    pub line_stride: usize,
}

impl Layout {
    pub fn new(offset: usize, pixel_stride: usize, line_stride: usize) -> Self {
        Self {
            offset,
            pixel_stride,
            line_stride,
        }
    }

    /// Row-major, one element per pixel.
    pub fn contiguous(width: usize) -> Self {
        Self::new(0, 1, width)
    }

    fn index(&self, x: usize, y: usize) -> usize {
        self.offset + y * self.line_stride + x * self.pixel_stride
    }

    /// Layout of the pixels `stepping` visits inside `region`, and the
    /// region they form on the stepped grid.
    fn stepped(&self, region: &Region, stepping: &Stepping) -> (Region, Layout) {
        let (start_x, start_y) = stepping.start();
        let (step_x, step_y) = stepping.step();
        let layout = Layout::new(
            self.index(start_x - region.x(), start_y - region.y()),
            self.pixel_stride * step_x,
            self.line_stride * step_y,
        );
        (Region::new(stepping.start(), stepping.num()), layout)
    }

    fn validate(&self, region: &Region, len: usize, what: &str) -> Result<()> {
        if region.is_empty() {
            return Ok(());
        }
        if self.pixel_stride == 0 {
            return Err(DataModelError::invalid(format!("{what} pixel stride must be positive")));
        }
        let (width, height) = region.shape();
        let required = (width - 1)
            .checked_mul(self.pixel_stride)
            .zip((height - 1).checked_mul(self.line_stride))
            .and_then(|(along, across)| along.checked_add(across))
            .and_then(|last| last.checked_add(self.offset))
            .and_then(|last| last.checked_add(1));
        let Some(required) = required else {
            return Err(DataModelError::invalid(format!(
                "{what} of {width} x {height} pixels overflows with strides ({}, {})",
                self.pixel_stride, self.line_stride
            )));
        };
        if required > len {
            return Err(DataModelError::invalid(format!(
                "{what} of {width} x {height} pixels needs {required} elements, buffer has {len}"
            )));
        }
        Ok(())
    }
}

/// One rectangle of raster samples, in raster pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Tile<'a> {
    region: Region,
    samples: Samples<'a>,
    layout: Layout,
}

impl<'a> Tile<'a> {
    pub fn new(region: Region, samples: impl Into<Samples<'a>>, layout: Layout) -> Result<Self> {
        let samples = samples.into();
        layout.validate(&region, samples.len(), "tile")?;
        Ok(Self {
            region,
            samples,
            layout,
        })
    }

    pub fn contiguous(region: Region, samples: impl Into<Samples<'a>>) -> Result<Self> {
        let width = region.shape().0;
        Self::new(region, samples, Layout::contiguous(width))
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn samples(&self) -> &Samples<'a> {
        &self.samples
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Sample at `(x, y)` relative to the tile origin.
    pub fn value(&self, x: usize, y: usize) -> f64 {
        self.samples.value(self.layout.index(x, y))
    }

    pub fn int_value(&self, x: usize, y: usize) -> i64 {
        self.samples.int_value(self.layout.index(x, y))
    }

    /// The pixels a [`Stepping`] over this tile visits, as a smaller tile.
    pub(crate) fn stepped(&self, stepping: &Stepping) -> Self {
        let (region, layout) = self.layout.stepped(&self.region, stepping);
        Self {
            region,
            samples: self.samples,
            layout,
        }
    }
}

/// Validity bytes co-registered with a [`Tile`], non-zero meaning valid.
#[derive(Debug, Clone, Copy)]
pub struct MaskTile<'a> {
    region: Region,
    data: &'a [u8],
    layout: Layout,
}

impl<'a> MaskTile<'a> {
    pub fn new(region: Region, data: &'a [u8], layout: Layout) -> Result<Self> {
        layout.validate(&region, data.len(), "mask")?;
        Ok(Self { region, data, layout })
    }

    pub fn contiguous(region: Region, data: &'a [u8]) -> Result<Self> {
        let width = region.shape().0;
        Self::new(region, data, Layout::contiguous(width))
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.data[self.layout.index(x, y)] != 0
    }

    pub(crate) fn stepped(&self, stepping: &Stepping) -> Self {
        let (region, layout) = self.layout.stepped(&self.region, stepping);
        Self {
            region,
            data: self.data,
            layout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn reads_interleaved_band() {
        // two bands interleaved, one padding element per line
        let data: Vec<i16> = vec![1, -1, 2, -2, 3, -3, 0, 4, -4, 5, -5, 6, -6, 0];
        let region = Region::new((10, 20), (3, 2));
        let first = Tile::new(region, data.as_slice(), Layout::new(0, 2, 7)).unwrap();
        let second = Tile::new(region, data.as_slice(), Layout::new(1, 2, 7)).unwrap();
        assert_eq!(first.value(2, 1), 6.);
        assert_eq!(second.value(0, 1), -4.);
        assert_eq!(second.int_value(1, 0), -2);
    }

    #[rstest]
    #[case(Layout::new(0, 1, 4), 11)]
    #[case(Layout::new(1, 1, 4), 12)]
    #[case(Layout::new(0, 0, 4), 100)]
    fn rejects_short_buffers(#[case] layout: Layout, #[case] len: usize) {
        let data = vec![0u8; len];
        let region = Region::new((0, 0), (4, 3));
        assert!(matches!(
            Tile::new(region, data.as_slice(), layout),
            Err(DataModelError::InvalidArgument(_))
        ));
        assert!(MaskTile::new(region, &data, layout).is_err());
    }

    #[rstest]
    #[case(Layout::new(0, 1, usize::MAX / 2))]
    #[case(Layout::new(usize::MAX - 2, 1, 4))]
    #[case(Layout::new(0, usize::MAX, 1))]
    fn rejects_overflowing_strides(#[case] layout: Layout) {
        let region = Region::new((0, 0), (4, 3));
        let tile = Tile::new(region, Samples::Unsupported { len: usize::MAX }, layout);
        assert!(matches!(tile, Err(DataModelError::InvalidArgument(_))));
    }

    #[rstest]
    fn unsupported_encoding_reads_zeros() {
        let region = Region::new((0, 0), (2, 2));
        let tile = Tile::contiguous(region, Samples::Unsupported { len: 4 }).unwrap();
        assert_eq!(tile.value(1, 1), 0.);
        assert_eq!(tile.int_value(0, 1), 0);
        assert!(Tile::contiguous(region, Samples::Unsupported { len: 3 }).is_err());
    }

    #[rstest]
    fn float_samples_truncate_to_integers() {
        let data = [2.7f32, -1.5, f32::NAN];
        let tile = Tile::contiguous(Region::new((0, 0), (3, 1)), data.as_slice()).unwrap();
        assert_eq!(tile.int_value(0, 0), 2);
        assert_eq!(tile.int_value(1, 0), -1);
        assert_eq!(tile.int_value(2, 0), 0);
        assert!(!tile.samples().is_integral());
    }
}
