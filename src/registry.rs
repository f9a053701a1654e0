//! Type resolution for decoding arguments and results.
//!
//! The decoder never owns a registry of handlers; it consults this trait,
//! implemented by the connection layer, to learn what shape a decoded
//! argument or result is expected to have. This keeps the codec testable
//! with a mock binding.
//!
//! # Example
//!
//! ```
//! use hubwire::{PayloadType, TypeRegistry};
//!
//! struct Binding;
//!
//! impl TypeRegistry for Binding {
//!     fn result_type_for(&self, _request_id: u64) -> PayloadType {
//!         PayloadType::Int
//!     }
//!
//!     fn param_types_for(&self, target: &str) -> Option<Vec<PayloadType>> {
//!         (target == "Add").then(|| vec![PayloadType::Int, PayloadType::Int])
//!     }
//! }
//! ```

use rmpv::Value;

use crate::error::{HubwireError, Result};
use crate::protocol::timestamp::Timestamp;

/// Expected wire shape of a decoded value.
///
/// The wire format is self-describing, so a declared type acts as a shape
/// check rather than a parse directive; [`Timestamp`](PayloadType::Timestamp)
/// additionally decodes the extension payload so malformed lengths surface
/// at decode time. Nil is admissible for every declared type (a null
/// argument).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    Nil,
    Bool,
    Int,
    Float,
    Str,
    Bin,
    Array,
    Map,
    /// Timestamp extension value (ext type −1).
    Timestamp,
    /// No expectation; accept any value as-is.
    Raw,
}

impl PayloadType {
    /// Check a decoded value against this declared type.
    pub fn validate(self, value: &Value) -> Result<()> {
        if value.is_nil() {
            return Ok(());
        }
        let ok = match self {
            PayloadType::Nil => false, // non-nil handled above
            PayloadType::Bool => matches!(value, Value::Boolean(_)),
            PayloadType::Int => matches!(value, Value::Integer(_)),
            PayloadType::Float => matches!(value, Value::F32(_) | Value::F64(_)),
            PayloadType::Str => value.as_str().is_some(),
            PayloadType::Bin => matches!(value, Value::Binary(_)),
            PayloadType::Array => matches!(value, Value::Array(_)),
            PayloadType::Map => matches!(value, Value::Map(_)),
            PayloadType::Timestamp => {
                Timestamp::from_value(value)?;
                true
            }
            PayloadType::Raw => true,
        };
        if ok {
            Ok(())
        } else {
            Err(HubwireError::Malformed(format!(
                "expected {self:?} value, wire carries {value:?}"
            )))
        }
    }
}

/// External collaborator mapping invocation ids and target names to the
/// types the decoder should read payloads against.
pub trait TypeRegistry {
    /// Expected result type for the invocation with the given request id.
    fn result_type_for(&self, request_id: u64) -> PayloadType;

    /// Declared parameter types of the first registered handler for
    /// `target`, or `None` when nothing is registered — the decoder then
    /// falls back to an untyped best-effort read.
    fn param_types_for(&self, target: &str) -> Option<Vec<PayloadType>>;
}

/// A registry that resolves nothing.
///
/// Every result decodes untyped and every target falls back to the
/// best-effort argument read.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRegistry;

impl TypeRegistry for NullRegistry {
    fn result_type_for(&self, _request_id: u64) -> PayloadType {
        PayloadType::Raw
    }

    fn param_types_for(&self, _target: &str) -> Option<Vec<PayloadType>> {
        None
    }
}
