//! Protocol module - varint framing, timestamp extension, message codec.
//!
//! The entry point is [`MessagePackHubProtocol`], which owns the codec
//! configuration, the scratch-buffer pool, and the unknown-tag counter, and
//! exposes the encode/decode surface to the owning connection.
//!
//! # Example
//!
//! ```
//! use hubwire::{Message, MessagePackHubProtocol, NullRegistry, TransferMode};
//!
//! let protocol = MessagePackHubProtocol::new();
//! assert_eq!(protocol.name(), "messagepack");
//! assert_eq!(protocol.transfer_mode(), TransferMode::Binary);
//!
//! let frame = protocol.encode(&Message::Ping).unwrap();
//!
//! let mut messages = Vec::new();
//! protocol
//!     .parse_messages(frame.as_slice(), &NullRegistry, &mut messages)
//!     .unwrap();
//! assert_eq!(messages, vec![Message::Ping]);
//! ```

mod decoder;
mod encoder;
pub mod timestamp;
pub mod varint;

use std::sync::atomic::{AtomicU64, Ordering};

use rmpv::Value;

pub use encoder::EncodedFrame;

use crate::error::{HubwireError, Result};
use crate::message::Message;
use crate::pool::BufferPool;
use crate::registry::{PayloadType, TypeRegistry};

/// Wire name this codec reports to the owning connection.
pub const PROTOCOL_NAME: &str = "messagepack";

/// How the owning connection must frame this protocol's traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Text,
    Binary,
}

/// Codec configuration.
///
/// One codec serves both serializer variants of the reference
/// implementation; `suppress_type_info` strips `$type` map entries from
/// encoded values, the only type information the dynamic value model
/// carries.
#[derive(Debug, Clone, Default)]
pub struct ProtocolConfig {
    pub suppress_type_info: bool,
}

/// The MessagePack hub protocol codec.
///
/// Synchronous and lock-free per call: concurrent encodes and decodes are
/// safe, the only shared state being the buffer pool and the unknown-tag
/// counter.
pub struct MessagePackHubProtocol {
    config: ProtocolConfig,
    pool: BufferPool,
    unknown_messages: AtomicU64,
}

impl MessagePackHubProtocol {
    /// Codec with default configuration and a fresh buffer pool.
    pub fn new() -> Self {
        Self::with_config(ProtocolConfig::default())
    }

    /// Codec with explicit configuration.
    pub fn with_config(config: ProtocolConfig) -> Self {
        Self {
            config,
            pool: BufferPool::new(),
            unknown_messages: AtomicU64::new(0),
        }
    }

    /// Protocol identity reported to the owning connection.
    #[inline]
    pub fn name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    /// This codec speaks binary frames, not text lines.
    #[inline]
    pub fn transfer_mode(&self) -> TransferMode {
        TransferMode::Binary
    }

    /// Validate supplied arguments against a target's declared parameter
    /// types, before any bytes are written.
    ///
    /// This is arity validation only — values pass through unchanged; use
    /// [`from_wire_value`](crate::from_wire_value) for concrete conversion.
    pub fn coerce_arguments<'a>(
        &self,
        param_types: &[PayloadType],
        arguments: &'a [Value],
    ) -> Result<&'a [Value]> {
        if param_types.len() > arguments.len() {
            return Err(HubwireError::ArgumentArity {
                declared: param_types.len(),
                supplied: arguments.len(),
            });
        }
        Ok(arguments)
    }

    /// Serialize one message into a framed segment ready to transmit.
    ///
    /// Never fails for well-formed messages; malformed argument and
    /// stream-id combinations are the caller's responsibility.
    pub fn encode(&self, message: &Message) -> Result<EncodedFrame> {
        encoder::encode_message(message, &self.config, &self.pool)
    }

    /// Decode a region of concatenated frames into `out`.
    ///
    /// Clears `out` first, then appends one message per frame in encounter
    /// order. A per-frame error leaves prior appended entries intact and
    /// carries a resume offset (see
    /// [`resume_offset`](HubwireError::resume_offset)); pass the remainder
    /// of the region to [`decode_frames`](Self::decode_frames) to skip the
    /// poisoned frame.
    pub fn parse_messages(
        &self,
        data: &[u8],
        registry: &dyn TypeRegistry,
        out: &mut Vec<Message>,
    ) -> Result<()> {
        out.clear();
        self.decode_frames(data, registry, out)
    }

    /// Like [`parse_messages`](Self::parse_messages) but appends without
    /// clearing, for resuming after a skipped frame.
    pub fn decode_frames(
        &self,
        data: &[u8],
        registry: &dyn TypeRegistry,
        out: &mut Vec<Message>,
    ) -> Result<()> {
        decoder::decode_frames(data, registry, out, &self.unknown_messages)
    }

    /// Number of frames dropped so far for carrying an unrecognized kind
    /// tag. Dropping is a deliberate compatibility choice; this counter is
    /// the observability hook for version-skew debugging.
    pub fn unknown_message_count(&self) -> u64 {
        self.unknown_messages.load(Ordering::Relaxed)
    }

    /// The scratch-buffer pool backing [`encode`](Self::encode).
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

impl Default for MessagePackHubProtocol {
    fn default() -> Self {
        Self::new()
    }
}
