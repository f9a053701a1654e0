//! Error types for hubwire.

use thiserror::Error;

/// Main error type for all hubwire operations.
#[derive(Debug, Error)]
pub enum HubwireError {
    /// Varint or frame boundary exceeds the decode region.
    ///
    /// Fatal to the whole decode batch: once a length prefix cannot be
    /// trusted, neither can any subsequent offset.
    #[error("framing error: {0}")]
    Framing(String),

    /// Completion message carried an out-of-range result-kind byte.
    #[error("unknown completion result kind {0}")]
    UnknownResultKind(u8),

    /// Fewer arguments supplied than parameter types declared.
    ///
    /// Raised by [`coerce_arguments`](crate::MessagePackHubProtocol::coerce_arguments)
    /// before any bytes are written.
    #[error("{declared} parameter types declared but only {supplied} arguments supplied")]
    ArgumentArity { declared: usize, supplied: usize },

    /// Timestamp extension payload length not in {4, 8, 12}.
    #[error("unsupported timestamp extension payload length {0}")]
    UnsupportedExtensionLength(usize),

    /// A message element had the wrong shape (missing slot, wrong type).
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A single frame failed to decode.
    ///
    /// Prior appended messages are intact. `resume` is the offset of the
    /// next frame, so callers can skip the poisoned frame and keep going.
    #[error("frame at offset {offset} failed to decode: {source}")]
    Frame {
        offset: usize,
        resume: usize,
        #[source]
        source: Box<HubwireError>,
    },

    /// MessagePack value serialization error.
    #[error("value encode error: {0}")]
    ValueEncode(#[from] rmpv::encode::Error),

    /// MessagePack value deserialization error.
    #[error("value decode error: {0}")]
    ValueDecode(#[from] rmpv::decode::Error),

    /// Conversion between a serde type and a wire value failed.
    #[error("value conversion error: {0}")]
    ValueConvert(#[from] rmpv::ext::Error),
}

impl HubwireError {
    /// Offset of the next frame after a per-frame decode error, if any.
    ///
    /// Framing errors return `None`: subsequent offsets cannot be trusted.
    pub fn resume_offset(&self) -> Option<usize> {
        match self {
            HubwireError::Frame { resume, .. } => Some(*resume),
            _ => None,
        }
    }
}

/// Result type alias using HubwireError.
pub type Result<T> = std::result::Result<T, HubwireError>;
