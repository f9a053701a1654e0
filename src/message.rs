//! Hub message model.
//!
//! One [`Message`] is the unit handed to the encoder and produced by the
//! decoder. Each variant carries only the fields relevant to its kind, so a
//! decoded message cannot expose stale fields from another kind.
//!
//! Payload slots (`arguments`, `item`, `result`) hold [`rmpv::Value`] —
//! hub payloads are dynamically typed on the wire. Use [`to_wire_value`] /
//! [`from_wire_value`] to bridge to concrete serde types.
//!
//! # Example
//!
//! ```
//! use hubwire::{Message, MessageKind, to_wire_value};
//!
//! let msg = Message::Invocation {
//!     invocation_id: "1".to_string(),
//!     target: "Add".to_string(),
//!     arguments: vec![to_wire_value(&2i32).unwrap(), to_wire_value(&3i32).unwrap()],
//!     stream_ids: None,
//! };
//! assert_eq!(msg.kind(), MessageKind::Invocation);
//! ```

use rmpv::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Completion result-kind byte: error string follows.
pub const RESULT_KIND_ERROR: u8 = 1;
/// Completion result-kind byte: void, no result slot.
pub const RESULT_KIND_VOID: u8 = 2;
/// Completion result-kind byte: non-void result value follows.
pub const RESULT_KIND_NON_VOID: u8 = 3;

/// Numeric message-kind tags, first element of every encoded message array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Invocation = 1,
    StreamItem = 2,
    Completion = 3,
    StreamInvocation = 4,
    CancelInvocation = 5,
    Ping = 6,
    Close = 7,
}

impl MessageKind {
    /// Numeric wire tag for this kind.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Map a wire tag back to a kind. Unknown tags return `None`.
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(MessageKind::Invocation),
            2 => Some(MessageKind::StreamItem),
            3 => Some(MessageKind::Completion),
            4 => Some(MessageKind::StreamInvocation),
            5 => Some(MessageKind::CancelInvocation),
            6 => Some(MessageKind::Ping),
            7 => Some(MessageKind::Close),
            _ => None,
        }
    }
}

/// A single hub protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Non-streaming call of a remote target.
    Invocation {
        /// Correlates the call with its eventual completion. May be empty
        /// for fire-and-forget invocations.
        invocation_id: String,
        /// Remote-callable name.
        target: String,
        /// Ordered, opaque call arguments.
        arguments: Vec<Value>,
        /// Upload-channel ids. `None` and `Some(vec![])` are wire-distinct:
        /// the slot is only written when `Some`.
        stream_ids: Option<Vec<String>>,
    },

    /// Call of a remote target that responds with a stream of items.
    StreamInvocation {
        invocation_id: String,
        target: String,
        arguments: Vec<Value>,
        stream_ids: Option<Vec<String>>,
    },

    /// One item of an active stream.
    StreamItem {
        invocation_id: String,
        /// Opaque stream payload.
        item: Value,
    },

    /// Terminal outcome of an invocation or stream.
    ///
    /// `error` and `result` are kept as separate fields; the wire
    /// result-kind byte is derived at encode time and error wins when both
    /// are set. An empty error string counts as no error.
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },

    /// Ask the remote end to stop an active stream.
    CancelInvocation { invocation_id: String },

    /// Keep-alive. Carries nothing.
    Ping,

    /// Connection-close notice.
    Close {
        error: Option<String>,
        /// Decode-only: absent on the wire means `false`.
        allow_reconnect: bool,
    },
}

impl Message {
    /// The kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Invocation { .. } => MessageKind::Invocation,
            Message::StreamItem { .. } => MessageKind::StreamItem,
            Message::Completion { .. } => MessageKind::Completion,
            Message::StreamInvocation { .. } => MessageKind::StreamInvocation,
            Message::CancelInvocation { .. } => MessageKind::CancelInvocation,
            Message::Ping => MessageKind::Ping,
            Message::Close { .. } => MessageKind::Close,
        }
    }

    /// Invocation id, where the kind carries one.
    pub fn invocation_id(&self) -> Option<&str> {
        match self {
            Message::Invocation { invocation_id, .. }
            | Message::StreamInvocation { invocation_id, .. }
            | Message::StreamItem { invocation_id, .. }
            | Message::Completion { invocation_id, .. }
            | Message::CancelInvocation { invocation_id } => Some(invocation_id),
            Message::Ping | Message::Close { .. } => None,
        }
    }
}

/// Derive the Completion result-kind byte.
///
/// Error wins over result; a nil result counts as void, matching the
/// reference client's null check.
pub(crate) fn completion_result_kind(error: &Option<String>, result: &Option<Value>) -> u8 {
    match error {
        Some(e) if !e.is_empty() => RESULT_KIND_ERROR,
        _ => match result {
            Some(v) if !v.is_nil() => RESULT_KIND_NON_VOID,
            _ => RESULT_KIND_VOID,
        },
    }
}

/// Convert a serde-serializable value into an opaque wire value.
pub fn to_wire_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(rmpv::ext::to_value(value)?)
}

/// Read a decoded wire value back into a concrete type.
pub fn from_wire_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(rmpv::ext::from_value(value)?)
}
