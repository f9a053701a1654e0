//! # hubwire
//!
//! Binary codec for a SignalR-style hub protocol: typed RPC messages
//! (invocations, streaming items, completions, cancellations, pings,
//! connection-close notices) serialized as MessagePack arrays and framed
//! with a varint length prefix, suitable for a persistent duplex
//! connection.
//!
//! ## Architecture
//!
//! - **Framing**: `<varint length><body>`, frames concatenated with no
//!   separator ([`protocol::varint`])
//! - **Bodies**: MessagePack arrays, kind tag first ([`Message`])
//! - **Extension**: timestamps as ext type −1 in 4/8/12-byte layouts
//!   ([`Timestamp`])
//! - **Type resolution**: the connection layer implements [`TypeRegistry`]
//!   so decoded arguments and results are checked against declared types
//! - **Buffers**: encoding scratch comes from a shared [`BufferPool`] with
//!   scoped checkout
//!
//! Connection establishment, transport retry, and the send/receive loop
//! are the owning connection's concern, not this crate's.
//!
//! ## Example
//!
//! ```
//! use hubwire::{Message, MessagePackHubProtocol, NullRegistry, to_wire_value};
//!
//! let protocol = MessagePackHubProtocol::new();
//!
//! let frame = protocol
//!     .encode(&Message::Invocation {
//!         invocation_id: "1".to_string(),
//!         target: "Echo".to_string(),
//!         arguments: vec![to_wire_value(&"hello").unwrap()],
//!         stream_ids: None,
//!     })
//!     .unwrap();
//!
//! let mut messages = Vec::new();
//! protocol
//!     .parse_messages(frame.as_slice(), &NullRegistry, &mut messages)
//!     .unwrap();
//! assert_eq!(messages.len(), 1);
//! ```

pub mod error;
pub mod message;
pub mod pool;
pub mod protocol;
pub mod registry;

pub use error::{HubwireError, Result};
pub use message::{from_wire_value, to_wire_value, Message, MessageKind};
pub use pool::{BufferPool, PooledBuf};
pub use protocol::timestamp::{Timestamp, Zone};
pub use protocol::{
    EncodedFrame, MessagePackHubProtocol, ProtocolConfig, TransferMode, PROTOCOL_NAME,
};
pub use registry::{NullRegistry, PayloadType, TypeRegistry};
