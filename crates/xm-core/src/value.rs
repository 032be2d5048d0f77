//! Scalar element types for agent and message variables.
//!
//! The runtime stores every variable as a contiguous column of one scalar
//! type.  Columns are type-erased in storage, so every access path carries a
//! [`ScalarType`] tag; runtime type checks are tag comparisons.
//!
//! Supported element types are 64-bit signed integers (`int`) and IEEE-754
//! doubles (`double`).  Dynamic-array and record element types are a declared
//! restriction of this runtime, not a silent omission: the registration APIs
//! are expressed in terms of `ScalarType` so nothing else can be declared.

use std::fmt;

use thiserror::Error;

// ── ScalarType ────────────────────────────────────────────────────────────────

/// Tag identifying the element type of a memory or message column.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ScalarType {
    /// 64-bit signed integer, spelled `int` in model files.
    Int,
    /// 64-bit float, spelled `double` in model files.
    Double,
}

impl ScalarType {
    /// The model-file spelling of this type.
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::Int => "int",
            ScalarType::Double => "double",
        }
    }

    /// Parse a model-file type name.  Returns `None` for unsupported names.
    pub fn parse(name: &str) -> Option<ScalarType> {
        match name {
            "int" => Some(ScalarType::Int),
            "double" => Some(ScalarType::Double),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ScalarValue ───────────────────────────────────────────────────────────────

/// A single tagged variable value, used on cold paths: message rows under
/// construction, population-file parsing, and diagnostics.  Hot paths move
/// raw typed columns instead.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum ScalarValue {
    Int(i64),
    Double(f64),
}

impl ScalarValue {
    /// The type tag of this value.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::Int(_) => ScalarType::Int,
            ScalarValue::Double(_) => ScalarType::Double,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(v) => Some(*v),
            ScalarValue::Double(_) => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            ScalarValue::Double(v) => Some(*v),
            ScalarValue::Int(_) => None,
        }
    }

    /// Parse textual content as `expected`, as population readers must.
    pub fn parse_as(text: &str, expected: ScalarType) -> Result<ScalarValue, CastError> {
        let text = text.trim();
        match expected {
            ScalarType::Int => text
                .parse::<i64>()
                .map(ScalarValue::Int)
                .map_err(|_| CastError {
                    value: text.to_owned(),
                    expected,
                }),
            ScalarType::Double => text
                .parse::<f64>()
                .map(ScalarValue::Double)
                .map_err(|_| CastError {
                    value: text.to_owned(),
                    expected,
                }),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::Double(v) => write!(f, "{v}"),
        }
    }
}

/// Textual content could not be cast to the declared scalar type.
#[derive(Debug, Clone, Error)]
#[error("value {value:?} is not a valid {expected}")]
pub struct CastError {
    pub value: String,
    pub expected: ScalarType,
}

// ── Scalar trait ──────────────────────────────────────────────────────────────

/// Rust-side element types usable in typed columns.
///
/// Implemented for exactly `i64` and `f64`; the trait exists so the typed
/// store and iterator APIs (`register_var::<T>`, `get::<T>`, `set::<T>`) can
/// be generic while registration stays closed over the supported tags.
pub trait Scalar: Copy + Default + PartialEq + Send + Sync + 'static {
    /// The tag this Rust type registers under.
    const TYPE: ScalarType;

    /// Unwrap a tagged value of this type; `None` on tag mismatch.
    fn from_value(v: ScalarValue) -> Option<Self>;

    /// Wrap into a tagged value.
    fn into_value(self) -> ScalarValue;
}

impl Scalar for i64 {
    const TYPE: ScalarType = ScalarType::Int;

    fn from_value(v: ScalarValue) -> Option<Self> {
        v.as_int()
    }

    fn into_value(self) -> ScalarValue {
        ScalarValue::Int(self)
    }
}

impl Scalar for f64 {
    const TYPE: ScalarType = ScalarType::Double;

    fn from_value(v: ScalarValue) -> Option<Self> {
        v.as_double()
    }

    fn into_value(self) -> ScalarValue {
        ScalarValue::Double(self)
    }
}
