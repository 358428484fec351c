//! Raster element trait for generic cell values

use super::grid_info::PixelType;
use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Cells are read as `f64` samples for classification, so every element
/// converts to and from `f64`.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// On-disk pixel type used when writing this element type
    const PIXEL_TYPE: PixelType;

    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Convert from an `f64` sample, saturating at the type bounds.
    ///
    /// NaN maps to [`RasterElement::default_nodata`].
    fn from_f64(value: f64) -> Self;

    /// Convert self to f64 (NaN when not representable)
    fn as_f64(self) -> f64 {
        NumCast::from(self).unwrap_or(f64::NAN)
    }
}

macro_rules! impl_raster_element_int {
    ($t:ty, $pixel:expr, $nodata:expr) => {
        impl RasterElement for $t {
            const PIXEL_TYPE: PixelType = $pixel;

            fn default_nodata() -> Self {
                $nodata
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata.map_or(false, |nd| *self == nd)
            }

            fn from_f64(value: f64) -> Self {
                if value.is_nan() {
                    return Self::default_nodata();
                }
                value.round().clamp(<$t>::MIN as f64, <$t>::MAX as f64) as $t
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty, $pixel:expr) => {
        impl RasterElement for $t {
            const PIXEL_TYPE: PixelType = $pixel;

            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) => (self - nd).abs() < <$t>::EPSILON * 100.0,
                    None => false,
                }
            }

            fn from_f64(value: f64) -> Self {
                value as $t
            }
        }
    };
}

impl_raster_element_int!(u8, PixelType::Byte, u8::MAX);
impl_raster_element_int!(i32, PixelType::Int32, i32::MIN);
impl_raster_element_float!(f32, PixelType::Float32);
impl_raster_element_float!(f64, PixelType::Float64);
