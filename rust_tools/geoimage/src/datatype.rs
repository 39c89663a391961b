//! Closed set of pixel representations and generic dispatch over them.

use crate::error::{GeoImageError, Result};
use num_traits::Bounded;
use std::fmt;
use std::str::FromStr;

/// Numeric type of a band's stored samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::UInt8,
        DataType::Int8,
        DataType::UInt16,
        DataType::Int16,
        DataType::UInt32,
        DataType::Int32,
        DataType::Float32,
        DataType::Float64,
    ];

    /// GDAL-style type name, used in band reports.
    pub fn name(self) -> &'static str {
        match self {
            DataType::UInt8 => "Byte",
            DataType::Int8 => "Int8",
            DataType::UInt16 => "UInt16",
            DataType::Int16 => "Int16",
            DataType::UInt32 => "UInt32",
            DataType::Int32 => "Int32",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
        }
    }

    pub fn size_bytes(self) -> usize {
        match self {
            DataType::UInt8 | DataType::Int8 => 1,
            DataType::UInt16 | DataType::Int16 => 2,
            DataType::UInt32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Smallest representable value, as a working value.
    pub fn min_value(self) -> f64 {
        crate::dispatch_pixel!(self, T => <T as Bounded>::min_value().as_f64())
    }

    /// Largest representable value, as a working value.
    pub fn max_value(self) -> f64 {
        crate::dispatch_pixel!(self, T => <T as Bounded>::max_value().as_f64())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = GeoImageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "byte" | "uint8" | "u8" => Ok(DataType::UInt8),
            "int8" | "i8" => Ok(DataType::Int8),
            "uint16" | "u16" => Ok(DataType::UInt16),
            "int16" | "i16" => Ok(DataType::Int16),
            "uint32" | "u32" => Ok(DataType::UInt32),
            "int32" | "i32" => Ok(DataType::Int32),
            "float32" | "f32" => Ok(DataType::Float32),
            "float64" | "f64" => Ok(DataType::Float64),
            _ => Err(GeoImageError::UnsupportedDataType(s.to_string())),
        }
    }
}

/// A Rust primitive that can hold a band's samples.
pub trait Pixel: Copy + Send + Sync + PartialOrd + Bounded + fmt::Debug + 'static {
    const DATA_TYPE: DataType;

    /// Convert a working value, saturating at the type bounds.
    /// Integer types round to nearest and map NaN to zero.
    fn from_f64(value: f64) -> Self;

    fn as_f64(self) -> f64;
}

macro_rules! impl_pixel_int {
    ($t:ty, $dt:expr) => {
        impl Pixel for $t {
            const DATA_TYPE: DataType = $dt;

            fn from_f64(value: f64) -> Self {
                // float to int `as` saturates and sends NaN to 0
                value.round() as $t
            }

            fn as_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

macro_rules! impl_pixel_float {
    ($t:ty, $dt:expr) => {
        impl Pixel for $t {
            const DATA_TYPE: DataType = $dt;

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn as_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_pixel_int!(u8, DataType::UInt8);
impl_pixel_int!(i8, DataType::Int8);
impl_pixel_int!(u16, DataType::UInt16);
impl_pixel_int!(i16, DataType::Int16);
impl_pixel_int!(u32, DataType::UInt32);
impl_pixel_int!(i32, DataType::Int32);
impl_pixel_float!(f32, DataType::Float32);
impl_pixel_float!(f64, DataType::Float64);

/// Run `$body` with `$t` bound to the primitive matching a [`DataType`].
///
/// ```ignore
/// let bytes = dispatch_pixel!(data_type, T => std::mem::size_of::<T>());
/// ```
#[macro_export]
macro_rules! dispatch_pixel {
    ($data_type:expr, $t:ident => $body:expr) => {
        match $data_type {
            $crate::datatype::DataType::UInt8 => {
                type $t = u8;
                $body
            }
            $crate::datatype::DataType::Int8 => {
                type $t = i8;
                $body
            }
            $crate::datatype::DataType::UInt16 => {
                type $t = u16;
                $body
            }
            $crate::datatype::DataType::Int16 => {
                type $t = i16;
                $body
            }
            $crate::datatype::DataType::UInt32 => {
                type $t = u32;
                $body
            }
            $crate::datatype::DataType::Int32 => {
                type $t = i32;
                $body
            }
            $crate::datatype::DataType::Float32 => {
                type $t = f32;
                $body
            }
            $crate::datatype::DataType::Float64 => {
                type $t = f64;
                $body
            }
        }
    };
}

/// Round-trip a working value through the representation of `data_type`.
pub fn quantize(data_type: DataType, value: f64) -> f64 {
    crate::dispatch_pixel!(data_type, T => T::from_f64(value).as_f64())
}
