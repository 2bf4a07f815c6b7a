//! Element codecs for the standard scalar types.

use std::mem::size_of;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::ElementCodec;
use crate::error::CodecError;
use crate::types::{DevState, Encoded, Scalar, ScalarKind};

fn ensure_remaining(buf: &Bytes, needed: usize, expected: &'static str) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::mismatch(
            expected,
            format!(
                "payload truncated: need {needed} bytes, have {}",
                buf.remaining()
            ),
        ));
    }
    Ok(())
}

/// Range-checked integer conversion used by every integer codec.
fn integer<T: TryFrom<i128>>(value: &Scalar) -> Result<T, CodecError> {
    let expected = std::any::type_name::<T>();
    let wide = value
        .as_integer()
        .ok_or_else(|| CodecError::insertion(expected, value.kind()))?;
    T::try_from(wide)
        .map_err(|_| CodecError::insertion(expected, format!("{value} (out of range)")))
}

fn get_string(buf: &mut Bytes, expected: &'static str) -> Result<String, CodecError> {
    ensure_remaining(buf, 4, expected)?;
    let len = buf.get_u32_le() as usize;
    ensure_remaining(buf, len, expected)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| CodecError::mismatch(expected, format!("invalid UTF-8: {e}")))
}

fn put_string(buf: &mut BytesMut, value: &str, expected: &'static str) -> Result<(), CodecError> {
    let len = u32::try_from(value.len())
        .map_err(|_| CodecError::insertion(expected, format!("string of {} bytes", value.len())))?;
    buf.put_u32_le(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

macro_rules! integer_codec {
    ($(#[$doc:meta])* $name:ident, $kind:ident, $ty:ty, $get:ident, $put:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl ElementCodec for $name {
            fn kind(&self) -> ScalarKind {
                ScalarKind::$kind
            }

            fn decode(&self, buf: &mut Bytes) -> Result<Scalar, CodecError> {
                ensure_remaining(buf, size_of::<$ty>(), stringify!($ty))?;
                Ok(Scalar::$kind(buf.$get()))
            }

            fn encode(&self, value: &Scalar, buf: &mut BytesMut) -> Result<(), CodecError> {
                buf.$put(integer::<$ty>(value)?);
                Ok(())
            }
        }
    };
}

integer_codec!(
    /// Unsigned byte codec.
    UCharCodec, UChar, u8, get_u8, put_u8
);
integer_codec!(
    /// 16-bit signed codec.
    ShortCodec, Short, i16, get_i16_le, put_i16_le
);
integer_codec!(
    /// 16-bit unsigned codec.
    UShortCodec, UShort, u16, get_u16_le, put_u16_le
);
integer_codec!(
    /// 32-bit signed codec.
    LongCodec, Long, i32, get_i32_le, put_i32_le
);
integer_codec!(
    /// 32-bit unsigned codec.
    ULongCodec, ULong, u32, get_u32_le, put_u32_le
);
integer_codec!(
    /// 64-bit signed codec.
    Long64Codec, Long64, i64, get_i64_le, put_i64_le
);
integer_codec!(
    /// 64-bit unsigned codec.
    ULong64Codec, ULong64, u64, get_u64_le, put_u64_le
);

/// 32-bit float codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatCodec;

impl ElementCodec for FloatCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::Float
    }

    fn decode(&self, buf: &mut Bytes) -> Result<Scalar, CodecError> {
        ensure_remaining(buf, 4, "f32")?;
        Ok(Scalar::Float(buf.get_f32_le()))
    }

    #[allow(clippy::cast_precision_loss)]
    fn encode(&self, value: &Scalar, buf: &mut BytesMut) -> Result<(), CodecError> {
        let v = match *value {
            Scalar::Float(v) => v,
            Scalar::UChar(v) => f32::from(v),
            Scalar::Short(v) => f32::from(v),
            Scalar::UShort(v) => f32::from(v),
            _ => return Err(CodecError::insertion("f32", value.kind())),
        };
        buf.put_f32_le(v);
        Ok(())
    }
}

/// 64-bit float codec.
///
/// Accepts integers and `f32` on insertion.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleCodec;

impl ElementCodec for DoubleCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::Double
    }

    fn decode(&self, buf: &mut Bytes) -> Result<Scalar, CodecError> {
        ensure_remaining(buf, 8, "f64")?;
        Ok(Scalar::Double(buf.get_f64_le()))
    }

    #[allow(clippy::cast_precision_loss)]
    fn encode(&self, value: &Scalar, buf: &mut BytesMut) -> Result<(), CodecError> {
        let v = match *value {
            Scalar::Double(v) => v,
            Scalar::Float(v) => f64::from(v),
            _ => match value.as_integer() {
                Some(i) => i as f64,
                None => return Err(CodecError::insertion("f64", value.kind())),
            },
        };
        buf.put_f64_le(v);
        Ok(())
    }
}

/// Boolean codec (one byte, 0 or 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanCodec;

impl ElementCodec for BooleanCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::Boolean
    }

    fn decode(&self, buf: &mut Bytes) -> Result<Scalar, CodecError> {
        ensure_remaining(buf, 1, "bool")?;
        match buf.get_u8() {
            0 => Ok(Scalar::Boolean(false)),
            1 => Ok(Scalar::Boolean(true)),
            other => Err(CodecError::mismatch("bool", format!("byte {other:#04x}"))),
        }
    }

    fn encode(&self, value: &Scalar, buf: &mut BytesMut) -> Result<(), CodecError> {
        match value {
            Scalar::Boolean(v) => {
                buf.put_u8(u8::from(*v));
                Ok(())
            }
            other => Err(CodecError::insertion("bool", other.kind())),
        }
    }
}

/// Length-prefixed UTF-8 string codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl ElementCodec for StringCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::String
    }

    fn decode(&self, buf: &mut Bytes) -> Result<Scalar, CodecError> {
        get_string(buf, "String").map(Scalar::String)
    }

    fn encode(&self, value: &Scalar, buf: &mut BytesMut) -> Result<(), CodecError> {
        match value {
            Scalar::String(v) => put_string(buf, v, "String"),
            other => Err(CodecError::insertion("String", other.kind())),
        }
    }
}

/// Device state codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateCodec;

impl ElementCodec for StateCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::State
    }

    fn decode(&self, buf: &mut Bytes) -> Result<Scalar, CodecError> {
        ensure_remaining(buf, 4, "DevState")?;
        let raw = buf.get_u32_le();
        DevState::from_u32(raw)
            .map(Scalar::State)
            .ok_or_else(|| CodecError::mismatch("DevState", format!("unknown state {raw}")))
    }

    fn encode(&self, value: &Scalar, buf: &mut BytesMut) -> Result<(), CodecError> {
        match value {
            Scalar::State(state) => {
                buf.put_u32_le(state.as_u32());
                Ok(())
            }
            other => Err(CodecError::insertion("DevState", other.kind())),
        }
    }
}

/// Encoded data codec: format name followed by opaque bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodedCodec;

impl ElementCodec for EncodedCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::Encoded
    }

    fn decode(&self, buf: &mut Bytes) -> Result<Scalar, CodecError> {
        let format = get_string(buf, "Encoded")?;
        ensure_remaining(buf, 4, "Encoded")?;
        let len = buf.get_u32_le() as usize;
        ensure_remaining(buf, len, "Encoded")?;
        let data = buf.split_to(len).to_vec();
        Ok(Scalar::Encoded(Encoded { format, data }))
    }

    fn encode(&self, value: &Scalar, buf: &mut BytesMut) -> Result<(), CodecError> {
        match value {
            Scalar::Encoded(encoded) => {
                put_string(buf, &encoded.format, "Encoded")?;
                let len = u32::try_from(encoded.data.len()).map_err(|_| {
                    CodecError::insertion("Encoded", format!("{} bytes", encoded.data.len()))
                })?;
                buf.put_u32_le(len);
                buf.put_slice(&encoded.data);
                Ok(())
            }
            other => Err(CodecError::insertion("Encoded", other.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(codec: &dyn ElementCodec, value: &Scalar) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::new();
        codec.encode(value, &mut buf)?;
        Ok(buf.freeze())
    }

    #[test]
    fn test_integer_range_checks() {
        assert!(encode(&ShortCodec, &Scalar::Long(1234)).is_ok());

        let err = encode(&ShortCodec, &Scalar::Long(70_000)).unwrap_err();
        assert!(matches!(err, CodecError::TypeInsertion { expected: "i16", .. }));

        let err = encode(&ULongCodec, &Scalar::Short(-1)).unwrap_err();
        assert!(matches!(err, CodecError::TypeInsertion { expected: "u32", .. }));

        let err = encode(&LongCodec, &Scalar::Double(1.0)).unwrap_err();
        assert!(matches!(err, CodecError::TypeInsertion { .. }));
    }

    #[test]
    fn test_little_endian_layout() {
        let bytes = encode(&UShortCodec, &Scalar::UShort(0x1234)).unwrap();
        assert_eq!(&bytes[..], &[0x34, 0x12]);

        let bytes = encode(&StringCodec, &Scalar::String("ok".into())).unwrap();
        assert_eq!(&bytes[..], &[2, 0, 0, 0, b'o', b'k']);
    }

    #[test]
    fn test_double_widening() {
        let bytes = encode(&DoubleCodec, &Scalar::Long(-3)).unwrap();
        let mut buf = bytes;
        assert_eq!(DoubleCodec.decode(&mut buf).unwrap(), Scalar::Double(-3.0));

        assert!(encode(&FloatCodec, &Scalar::Double(1.0)).is_err());
    }

    #[test]
    fn test_truncated_payload() {
        let mut buf = Bytes::from_static(&[0x01, 0x02]);
        let err = LongCodec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { expected: "i32", .. }));

        let mut buf = Bytes::from_static(&[5, 0, 0, 0, b'a']);
        assert!(StringCodec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_invalid_boolean_and_state() {
        let mut buf = Bytes::from_static(&[2]);
        assert!(BooleanCodec.decode(&mut buf).is_err());

        let mut buf = Bytes::from_static(&[99, 0, 0, 0]);
        assert!(StateCodec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_encoded_value() {
        let value = Scalar::Encoded(Encoded::new("GRAY8", vec![1, 2, 3]));
        let mut buf = encode(&EncodedCodec, &value).unwrap();
        assert_eq!(EncodedCodec.decode(&mut buf).unwrap(), value);
        assert!(buf.is_empty());
    }
}
