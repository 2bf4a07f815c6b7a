//! Value codec registry.
//!
//! A [`CodecRegistry`] maps remote [`TypeTag`]s to [`Codec`]s. Resolution is a
//! table lookup, so new tags are plugged in by registering an
//! [`ElementCodec`] without touching any consumer:
//!
//! ```
//! use devproxy::codec::{Arity, CodecRegistry, scalar::DoubleCodec};
//! use devproxy::wire::TypeTag;
//!
//! let mut registry = CodecRegistry::standard();
//! registry.register(TypeTag(1000), Arity::Scalar, DoubleCodec);
//! assert!(registry.lookup(TypeTag(1000)).is_ok());
//! ```

pub mod scalar;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use bytes::{Bytes, BytesMut};

use crate::error::CodecError;
use crate::types::{Scalar, ScalarKind, Value};
use crate::wire::{TypeTag, WireValue};

use self::scalar::{
    BooleanCodec, DoubleCodec, EncodedCodec, FloatCodec, Long64Codec, LongCodec, ShortCodec,
    StateCodec, StringCodec, UCharCodec, ULong64Codec, ULongCodec, UShortCodec,
};

/// Converts single elements between wire bytes and [`Scalar`]s.
pub trait ElementCodec: Send + Sync + fmt::Debug {
    /// Native kind produced by [`decode`](Self::decode).
    fn kind(&self) -> ScalarKind;

    /// Reads one element from the front of `buf`.
    fn decode(&self, buf: &mut Bytes) -> Result<Scalar, CodecError>;

    /// Appends one element to `buf`.
    fn encode(&self, value: &Scalar, buf: &mut BytesMut) -> Result<(), CodecError>;
}

/// How many elements a tag carries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No value at all.
    Void,
    /// A single element.
    Scalar,
    /// A variable-length sequence of elements.
    Sequence,
}

/// Codec resolved for one type tag.
#[derive(Debug, Clone)]
pub struct Codec {
    tag: TypeTag,
    arity: Arity,
    element: Option<Arc<dyn ElementCodec>>,
}

impl Codec {
    /// Returns the tag this codec was registered for.
    #[must_use]
    pub const fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Returns the arity of the tag.
    #[must_use]
    pub const fn arity(&self) -> Arity {
        self.arity
    }

    /// Returns the element codec, `None` for void tags.
    #[must_use]
    pub fn element(&self) -> Option<&dyn ElementCodec> {
        self.element.as_deref()
    }

    /// Returns the element kind, `None` for void tags.
    #[must_use]
    pub fn kind(&self) -> Option<ScalarKind> {
        self.element.as_ref().map(|e| e.kind())
    }

    /// Name of the native type this codec produces for its arity.
    #[must_use]
    pub fn native_name(&self) -> String {
        match (self.arity, self.kind()) {
            (Arity::Scalar, Some(kind)) => kind.native_name().to_owned(),
            (Arity::Sequence, Some(kind)) => format!("Vec<{}>", kind.native_name()),
            _ => "()".to_owned(),
        }
    }

    /// Element codec for the insert path; a void tag accepts no value.
    pub(crate) fn insert_element(&self, value: &Value) -> Result<&dyn ElementCodec, CodecError> {
        self.element().ok_or_else(|| {
            CodecError::insertion(self.tag.name().unwrap_or("registered type"), value.describe())
        })
    }

    pub(crate) fn require_element(&self) -> Result<&dyn ElementCodec, CodecError> {
        self.element()
            .ok_or_else(|| CodecError::mismatch("element type", format!("{} is void", self.tag)))
    }

    /// Extracts a whole value from a container of this codec's tag.
    pub fn extract(&self, wire: &WireValue) -> Result<Value, CodecError> {
        if self.arity == Arity::Void {
            return Ok(Value::Void);
        }
        check_tag(self.tag, wire)?;
        let element = self.require_element()?;
        match self.arity {
            Arity::Scalar => {
                let mut items = decode_elements(element, wire.payload(), 1)?;
                Ok(Value::Scalar(items.remove(0)))
            }
            _ => decode_elements(element, wire.payload(), wire.dim_x()).map(Value::Spectrum),
        }
    }

    /// Inserts a whole value into `wire`, tagging it with this codec's tag.
    pub fn insert(&self, wire: &mut WireValue, value: &Value) -> Result<(), CodecError> {
        let expected = self.tag.name().unwrap_or("registered type");
        match (self.arity, value) {
            (Arity::Void, Value::Void) => {
                wire.set(self.tag, 0, 0, Bytes::new());
                Ok(())
            }
            (Arity::Scalar, Value::Scalar(item)) => {
                let element = self.insert_element(value)?;
                let payload = encode_elements(element, std::slice::from_ref(item))?;
                wire.set(self.tag, 1, 0, payload);
                Ok(())
            }
            (Arity::Sequence, Value::Spectrum(items)) => {
                let payload = encode_elements(self.insert_element(value)?, items)?;
                wire.set(self.tag, items.len(), 0, payload);
                Ok(())
            }
            (_, other) => Err(CodecError::insertion(expected, other.describe())),
        }
    }
}

/// Fails unless the container carries the expected tag.
pub(crate) fn check_tag(expected: TypeTag, wire: &WireValue) -> Result<(), CodecError> {
    if wire.tag() != expected {
        return Err(CodecError::mismatch(
            expected.name().unwrap_or("registered type"),
            format!("container carries {}", wire.tag()),
        ));
    }
    Ok(())
}

/// Decodes exactly `count` elements; leftover bytes are a mismatch.
pub(crate) fn decode_elements(
    element: &dyn ElementCodec,
    payload: &Bytes,
    count: usize,
) -> Result<Vec<Scalar>, CodecError> {
    let mut buf = payload.clone();
    // capacity is bounded by the payload, never by the reported count
    let mut items = Vec::with_capacity(count.min(payload.len()));
    for _ in 0..count {
        items.push(element.decode(&mut buf)?);
    }
    if !buf.is_empty() {
        return Err(CodecError::mismatch(
            element.kind().native_name(),
            format!("{} trailing bytes after {count} elements", buf.len()),
        ));
    }
    Ok(items)
}

/// Encodes all elements into a fresh payload.
pub(crate) fn encode_elements(
    element: &dyn ElementCodec,
    items: &[Scalar],
) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    for item in items {
        element.encode(item, &mut buf)?;
    }
    Ok(buf.freeze())
}

static SHARED: LazyLock<Arc<CodecRegistry>> = LazyLock::new(|| Arc::new(CodecRegistry::standard()));

/// Table of type tag to codec.
#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<TypeTag, Codec>,
}

impl CodecRegistry {
    /// Creates a registry with no entries.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a registry holding every standard tag.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register_void(TypeTag::VOID);

        registry.register(TypeTag::BOOLEAN, Arity::Scalar, BooleanCodec);
        registry.register(TypeTag::UCHAR, Arity::Scalar, UCharCodec);
        registry.register(TypeTag::SHORT, Arity::Scalar, ShortCodec);
        registry.register(TypeTag::USHORT, Arity::Scalar, UShortCodec);
        registry.register(TypeTag::LONG, Arity::Scalar, LongCodec);
        registry.register(TypeTag::ULONG, Arity::Scalar, ULongCodec);
        registry.register(TypeTag::LONG64, Arity::Scalar, Long64Codec);
        registry.register(TypeTag::ULONG64, Arity::Scalar, ULong64Codec);
        registry.register(TypeTag::FLOAT, Arity::Scalar, FloatCodec);
        registry.register(TypeTag::DOUBLE, Arity::Scalar, DoubleCodec);
        registry.register(TypeTag::STRING, Arity::Scalar, StringCodec);
        registry.register(TypeTag::STATE, Arity::Scalar, StateCodec);
        registry.register(TypeTag::ENCODED, Arity::Scalar, EncodedCodec);

        registry.register(TypeTag::VAR_BOOLEAN_ARRAY, Arity::Sequence, BooleanCodec);
        registry.register(TypeTag::VAR_CHAR_ARRAY, Arity::Sequence, UCharCodec);
        registry.register(TypeTag::VAR_SHORT_ARRAY, Arity::Sequence, ShortCodec);
        registry.register(TypeTag::VAR_USHORT_ARRAY, Arity::Sequence, UShortCodec);
        registry.register(TypeTag::VAR_LONG_ARRAY, Arity::Sequence, LongCodec);
        registry.register(TypeTag::VAR_ULONG_ARRAY, Arity::Sequence, ULongCodec);
        registry.register(TypeTag::VAR_LONG64_ARRAY, Arity::Sequence, Long64Codec);
        registry.register(TypeTag::VAR_ULONG64_ARRAY, Arity::Sequence, ULong64Codec);
        registry.register(TypeTag::VAR_FLOAT_ARRAY, Arity::Sequence, FloatCodec);
        registry.register(TypeTag::VAR_DOUBLE_ARRAY, Arity::Sequence, DoubleCodec);
        registry.register(TypeTag::VAR_STRING_ARRAY, Arity::Sequence, StringCodec);
        registry
    }

    /// Returns the process-wide standard registry.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED)
    }

    /// Registers (or replaces) the codec for `tag`.
    pub fn register(&mut self, tag: TypeTag, arity: Arity, element: impl ElementCodec + 'static) {
        let codec = Codec {
            tag,
            arity,
            element: Some(Arc::new(element)),
        };
        self.codecs.insert(tag, codec);
    }

    /// Registers `tag` as carrying no value.
    pub fn register_void(&mut self, tag: TypeTag) {
        let codec = Codec {
            tag,
            arity: Arity::Void,
            element: None,
        };
        self.codecs.insert(tag, codec);
    }

    /// Resolves the codec for `tag`.
    pub fn lookup(&self, tag: TypeTag) -> Result<Codec, CodecError> {
        self.codecs
            .get(&tag)
            .cloned()
            .ok_or(CodecError::UnsupportedType(tag))
    }

    /// Returns true if `tag` has a codec.
    #[must_use]
    pub fn contains(&self, tag: TypeTag) -> bool {
        self.codecs.contains_key(&tag)
    }

    /// Number of registered tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}
