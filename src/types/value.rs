//! Native value representations.

use std::fmt;

use crate::error::CodecError;
use crate::types::state::{DevState, Encoded};

/// Native element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Boolean,
    UChar,
    Short,
    UShort,
    Long,
    ULong,
    Long64,
    ULong64,
    Float,
    Double,
    String,
    State,
    Encoded,
}

impl ScalarKind {
    /// Returns the name of the native type used for this kind.
    #[must_use]
    pub const fn native_name(self) -> &'static str {
        match self {
            Self::Boolean => "bool",
            Self::UChar => "u8",
            Self::Short => "i16",
            Self::UShort => "u16",
            Self::Long => "i32",
            Self::ULong => "u32",
            Self::Long64 => "i64",
            Self::ULong64 => "u64",
            Self::Float => "f32",
            Self::Double => "f64",
            Self::String => "String",
            Self::State => "DevState",
            Self::Encoded => "Encoded",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.native_name())
    }
}

/// A single native element.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Boolean(bool),
    UChar(u8),
    Short(i16),
    UShort(u16),
    Long(i32),
    ULong(u32),
    Long64(i64),
    ULong64(u64),
    Float(f32),
    Double(f64),
    String(String),
    State(DevState),
    Encoded(Encoded),
}

impl Scalar {
    /// Returns the kind of this element.
    #[must_use]
    pub const fn kind(&self) -> ScalarKind {
        match self {
            Self::Boolean(_) => ScalarKind::Boolean,
            Self::UChar(_) => ScalarKind::UChar,
            Self::Short(_) => ScalarKind::Short,
            Self::UShort(_) => ScalarKind::UShort,
            Self::Long(_) => ScalarKind::Long,
            Self::ULong(_) => ScalarKind::ULong,
            Self::Long64(_) => ScalarKind::Long64,
            Self::ULong64(_) => ScalarKind::ULong64,
            Self::Float(_) => ScalarKind::Float,
            Self::Double(_) => ScalarKind::Double,
            Self::String(_) => ScalarKind::String,
            Self::State(_) => ScalarKind::State,
            Self::Encoded(_) => ScalarKind::Encoded,
        }
    }

    /// Returns the value as a signed 128-bit integer if it is an integer.
    #[must_use]
    pub fn as_integer(&self) -> Option<i128> {
        match *self {
            Self::UChar(v) => Some(i128::from(v)),
            Self::Short(v) => Some(i128::from(v)),
            Self::UShort(v) => Some(i128::from(v)),
            Self::Long(v) => Some(i128::from(v)),
            Self::ULong(v) => Some(i128::from(v)),
            Self::Long64(v) => Some(i128::from(v)),
            Self::ULong64(v) => Some(i128::from(v)),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::UChar(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::UShort(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::ULong(v) => write!(f, "{v}"),
            Self::Long64(v) => write!(f, "{v}"),
            Self::ULong64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::State(v) => write!(f, "{v}"),
            Self::Encoded(v) => write!(f, "{v}"),
        }
    }
}

/// Two-dimensional row-major grid.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T> Image<T> {
    /// Creates an image from row-major data.
    ///
    /// Returns `None` if `data.len() != width * height`.
    #[must_use]
    pub fn new(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        if width.checked_mul(height)? != data.len() {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Creates an image from rows.
    ///
    /// Returns `None` if the rows have different lengths.
    #[must_use]
    pub fn from_rows(rows: Vec<Vec<T>>) -> Option<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != width) {
            return None;
        }
        let data = rows.into_iter().flatten().collect();
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Number of columns.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Row-major elements.
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Consumes the image, returning the row-major elements.
    #[must_use]
    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Returns the element at column `x` of row `y`.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x)
    }

    /// Iterates over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        // chunks(0) panics; an image without columns has no rows to yield
        self.data
            .chunks(self.width.max(1))
            .take(if self.width == 0 { 0 } else { self.height })
    }

    fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Image<U>, E> {
        let data = self.data.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(Image {
            width: self.width,
            height: self.height,
            data,
        })
    }

    fn map<U>(self, f: impl FnMut(T) -> U) -> Image<U> {
        Image {
            width: self.width,
            height: self.height,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

/// A native value of any supported shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value (command without argument or result).
    #[default]
    Void,
    /// Single element.
    Scalar(Scalar),
    /// One-dimensional sequence.
    Spectrum(Vec<Scalar>),
    /// Two-dimensional grid.
    Image(Image<Scalar>),
}

impl Value {
    /// Short description of the value's shape and kind, for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Void => "void".to_owned(),
            Self::Scalar(s) => format!("{} scalar", s.kind()),
            Self::Spectrum(items) => format!("spectrum[{}]", items.len()),
            Self::Image(image) => format!("image[{}x{}]", image.width(), image.height()),
        }
    }
}

/// Conversion from a native [`Value`].
pub trait FromValue: Sized {
    /// Converts the value, failing if its shape or kind does not match.
    fn from_value(value: Value) -> Result<Self, CodecError>;
}

/// Conversion into a native [`Value`].
pub trait IntoValue {
    /// Converts into a value.
    fn into_value(self) -> Value;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        Ok(value)
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Void => Ok(()),
            other => Err(CodecError::mismatch("void", format!("got {}", other.describe()))),
        }
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Void
    }
}

impl FromValue for Scalar {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Scalar(s) => Ok(s),
            other => Err(CodecError::mismatch("scalar", format!("got {}", other.describe()))),
        }
    }
}

impl IntoValue for Scalar {
    fn into_value(self) -> Value {
        Value::Scalar(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Scalar(Scalar::String(self.to_owned()))
    }
}

macro_rules! native_scalar {
    ($ty:ty, $variant:ident) => {
        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, CodecError> {
                match value {
                    Value::Scalar(Scalar::$variant(v)) => Ok(v),
                    other => Err(CodecError::mismatch(
                        stringify!($ty),
                        format!("got {}", other.describe()),
                    )),
                }
            }
        }

        impl IntoValue for $ty {
            fn into_value(self) -> Value {
                Value::Scalar(Scalar::$variant(self))
            }
        }

        impl FromValue for Vec<$ty> {
            fn from_value(value: Value) -> Result<Self, CodecError> {
                match value {
                    Value::Spectrum(items) => items
                        .into_iter()
                        .map(|item| match item {
                            Scalar::$variant(v) => Ok(v),
                            other => Err(CodecError::mismatch(
                                stringify!($ty),
                                format!("got {} element", other.kind()),
                            )),
                        })
                        .collect(),
                    other => Err(CodecError::mismatch(
                        concat!("Vec<", stringify!($ty), ">"),
                        format!("got {}", other.describe()),
                    )),
                }
            }
        }

        impl IntoValue for Vec<$ty> {
            fn into_value(self) -> Value {
                Value::Spectrum(self.into_iter().map(Scalar::$variant).collect())
            }
        }

        impl FromValue for Image<$ty> {
            fn from_value(value: Value) -> Result<Self, CodecError> {
                match value {
                    Value::Image(image) => image.try_map(|item| match item {
                        Scalar::$variant(v) => Ok(v),
                        other => Err(CodecError::mismatch(
                            stringify!($ty),
                            format!("got {} element", other.kind()),
                        )),
                    }),
                    other => Err(CodecError::mismatch(
                        concat!("Image<", stringify!($ty), ">"),
                        format!("got {}", other.describe()),
                    )),
                }
            }
        }

        impl IntoValue for Image<$ty> {
            fn into_value(self) -> Value {
                Value::Image(self.map(Scalar::$variant))
            }
        }
    };
}

native_scalar!(bool, Boolean);
native_scalar!(u8, UChar);
native_scalar!(i16, Short);
native_scalar!(u16, UShort);
native_scalar!(i32, Long);
native_scalar!(u32, ULong);
native_scalar!(i64, Long64);
native_scalar!(u64, ULong64);
native_scalar!(f32, Float);
native_scalar!(f64, Double);
native_scalar!(String, String);
native_scalar!(DevState, State);
native_scalar!(Encoded, Encoded);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_scalar_conversion() {
        let value = 42.5f64.into_value();
        assert_eq!(value, Value::Scalar(Scalar::Double(42.5)));
        assert_eq!(f64::from_value(value.clone()).unwrap(), 42.5);

        let err = i32::from_value(value).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { expected: "i32", .. }));
    }

    #[test]
    fn test_typed_spectrum_conversion() {
        let value = vec![1i16, -2, 3].into_value();
        assert_eq!(value.describe(), "spectrum[3]");
        assert_eq!(Vec::<i16>::from_value(value).unwrap(), vec![1, -2, 3]);

        let mixed = Value::Spectrum(vec![Scalar::Short(1), Scalar::Long(2)]);
        assert!(Vec::<i16>::from_value(mixed).is_err());
    }

    #[test]
    fn test_image_rows() {
        let image = Image::from_rows(vec![vec![1u16, 2, 3], vec![4, 5, 6]]).unwrap();
        assert_eq!(image.width(), 3);
        assert_eq!(image.height(), 2);
        assert_eq!(image.data(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(image.get(0, 1), Some(&4));
        assert_eq!(image.get(3, 0), None);

        let rows: Vec<&[u16]> = image.rows().collect();
        assert_eq!(rows, vec![&[1, 2, 3][..], &[4, 5, 6][..]]);

        assert!(Image::from_rows(vec![vec![1u16], vec![2, 3]]).is_none());
        assert!(Image::new(2, 2, vec![1u8, 2, 3]).is_none());
    }

    #[test]
    fn test_typed_image_conversion() {
        let image = Image::new(2, 1, vec![0.5f32, 1.5]).unwrap();
        let value = image.clone().into_value();
        assert_eq!(value.describe(), "image[2x1]");
        assert_eq!(Image::<f32>::from_value(value).unwrap(), image);
        assert_eq!(image.into_data(), vec![0.5, 1.5]);
    }

    #[test]
    fn test_integer_widening_view() {
        assert_eq!(Scalar::ULong64(u64::MAX).as_integer(), Some(i128::from(u64::MAX)));
        assert_eq!(Scalar::Double(1.0).as_integer(), None);
    }
}
