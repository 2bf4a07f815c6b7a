//! Remote type and shape tags.
//!
//! Both tags are open newtypes over the numbers the remote protocol reports,
//! so a device may announce a tag this crate has never heard of. Resolution
//! to a codec or format strategy happens by table lookup.

use std::fmt;

/// Element type tag reported by the remote protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(pub u16);

impl TypeTag {
    /// No value.
    pub const VOID: Self = Self(0);
    /// Boolean.
    pub const BOOLEAN: Self = Self(1);
    /// 16-bit signed integer.
    pub const SHORT: Self = Self(2);
    /// 32-bit signed integer.
    pub const LONG: Self = Self(3);
    /// 32-bit float.
    pub const FLOAT: Self = Self(4);
    /// 64-bit float.
    pub const DOUBLE: Self = Self(5);
    /// 16-bit unsigned integer.
    pub const USHORT: Self = Self(6);
    /// 32-bit unsigned integer.
    pub const ULONG: Self = Self(7);
    /// UTF-8 string.
    pub const STRING: Self = Self(8);
    /// Sequence of unsigned bytes.
    pub const VAR_CHAR_ARRAY: Self = Self(9);
    /// Sequence of 16-bit signed integers.
    pub const VAR_SHORT_ARRAY: Self = Self(10);
    /// Sequence of 32-bit signed integers.
    pub const VAR_LONG_ARRAY: Self = Self(11);
    /// Sequence of 32-bit floats.
    pub const VAR_FLOAT_ARRAY: Self = Self(12);
    /// Sequence of 64-bit floats.
    pub const VAR_DOUBLE_ARRAY: Self = Self(13);
    /// Sequence of 16-bit unsigned integers.
    pub const VAR_USHORT_ARRAY: Self = Self(14);
    /// Sequence of 32-bit unsigned integers.
    pub const VAR_ULONG_ARRAY: Self = Self(15);
    /// Sequence of strings.
    pub const VAR_STRING_ARRAY: Self = Self(16);
    /// Device state.
    pub const STATE: Self = Self(19);
    /// Sequence of booleans.
    pub const VAR_BOOLEAN_ARRAY: Self = Self(21);
    /// Unsigned byte.
    pub const UCHAR: Self = Self(22);
    /// 64-bit signed integer.
    pub const LONG64: Self = Self(23);
    /// 64-bit unsigned integer.
    pub const ULONG64: Self = Self(24);
    /// Sequence of 64-bit signed integers.
    pub const VAR_LONG64_ARRAY: Self = Self(25);
    /// Sequence of 64-bit unsigned integers.
    pub const VAR_ULONG64_ARRAY: Self = Self(26);
    /// Format string plus opaque bytes.
    pub const ENCODED: Self = Self(28);

    /// Returns the protocol name of a well-known tag.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0 => "DevVoid",
            1 => "DevBoolean",
            2 => "DevShort",
            3 => "DevLong",
            4 => "DevFloat",
            5 => "DevDouble",
            6 => "DevUShort",
            7 => "DevULong",
            8 => "DevString",
            9 => "DevVarCharArray",
            10 => "DevVarShortArray",
            11 => "DevVarLongArray",
            12 => "DevVarFloatArray",
            13 => "DevVarDoubleArray",
            14 => "DevVarUShortArray",
            15 => "DevVarULongArray",
            16 => "DevVarStringArray",
            19 => "DevState",
            21 => "DevVarBooleanArray",
            22 => "DevUChar",
            23 => "DevLong64",
            24 => "DevULong64",
            25 => "DevVarLong64Array",
            26 => "DevVarULong64Array",
            28 => "DevEncoded",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "#{}", self.0),
        }
    }
}

/// Shape tag reported by the remote protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatTag(pub u8);

impl FormatTag {
    /// Single value.
    pub const SCALAR: Self = Self(0);
    /// One-dimensional sequence.
    pub const SPECTRUM: Self = Self(1);
    /// Two-dimensional row-major grid.
    pub const IMAGE: Self = Self(2);
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SCALAR => f.write_str("SCALAR"),
            Self::SPECTRUM => f.write_str("SPECTRUM"),
            Self::IMAGE => f.write_str("IMAGE"),
            Self(other) => write!(f, "#{other}"),
        }
    }
}
