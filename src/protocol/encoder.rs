//! Message encoder: one typed message to one framed byte segment.
//!
//! Every message serializes as a fixed-arity MessagePack array whose first
//! element is the numeric kind tag. The frame layout is
//! `<varint length><body>`: worst-case prefix space is reserved up front,
//! the body is written behind it, and the true length is back-filled
//! right-aligned against the body once known. The returned segment covers
//! exactly prefix + body; unused reserved bytes are excluded, not
//! zero-filled.

use std::fmt;

use bytes::{BufMut, Bytes};
use rmpv::Value;

use super::varint::{required_byte_count, write_varint_at, MAX_PREFIX_LEN};
use super::ProtocolConfig;
use crate::error::Result;
use crate::message::{completion_result_kind, Message, RESULT_KIND_ERROR, RESULT_KIND_NON_VOID};
use crate::pool::{BufferPool, PooledBuf};

/// Map key the reference serializer uses for embedded type information.
const TYPE_INFO_KEY: &str = "$type";

/// Initial scratch-buffer checkout size.
const ENCODE_BUFFER_SIZE: usize = 256;

/// One encoded frame: varint length prefix plus message body.
///
/// Owns its pooled buffer; the buffer is released back to the pool when the
/// frame is dropped.
pub struct EncodedFrame {
    buf: PooledBuf,
    offset: usize,
    len: usize,
}

impl EncodedFrame {
    /// The framed bytes, ready to transmit.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.offset..self.offset + self.len]
    }

    /// Length of the framed segment in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the segment out into an owned `Bytes`, releasing the pooled
    /// buffer as soon as the frame is dropped.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_slice())
    }
}

impl AsRef<[u8]> for EncodedFrame {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for EncodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedFrame")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Serialize one message into a framed segment.
pub(crate) fn encode_message(
    message: &Message,
    config: &ProtocolConfig,
    pool: &BufferPool,
) -> Result<EncodedFrame> {
    let body = build_body(message, config);

    let mut buf = pool.acquire(ENCODE_BUFFER_SIZE);
    buf.put_bytes(0, MAX_PREFIX_LEN);
    {
        let mut writer = (&mut *buf).writer();
        rmpv::encode::write_value(&mut writer, &body)?;
    }

    let content_len = buf.len() - MAX_PREFIX_LEN;
    let prefix_len = required_byte_count(content_len as u32);
    let offset = MAX_PREFIX_LEN - prefix_len;
    write_varint_at(&mut buf[..], offset, content_len as u32);

    Ok(EncodedFrame {
        buf,
        offset,
        len: prefix_len + content_len,
    })
}

/// Build the per-kind message array, tag first.
fn build_body(message: &Message, config: &ProtocolConfig) -> Value {
    match message {
        // [tag, headers, invocation_id, target, args[], stream_ids[]?]
        Message::Invocation {
            invocation_id,
            target,
            arguments,
            stream_ids,
        }
        | Message::StreamInvocation {
            invocation_id,
            target,
            arguments,
            stream_ids,
        } => {
            let mut items = vec![
                tag_value(message),
                empty_headers(),
                str_value(invocation_id),
                str_value(target),
                Value::Array(arguments.iter().map(|a| prepare_value(a, config)).collect()),
            ];
            // absent vs empty stream id array are wire-distinct
            if let Some(ids) = stream_ids {
                items.push(Value::Array(ids.iter().map(|id| str_value(id)).collect()));
            }
            Value::Array(items)
        }

        // [2, headers, invocation_id, item]
        Message::StreamItem {
            invocation_id,
            item,
        } => Value::Array(vec![
            tag_value(message),
            empty_headers(),
            str_value(invocation_id),
            prepare_value(item, config),
        ]),

        // [3, headers, invocation_id, result_kind, result?]
        Message::Completion {
            invocation_id,
            result,
            error,
        } => {
            let result_kind = completion_result_kind(error, result);
            let mut items = vec![
                tag_value(message),
                empty_headers(),
                str_value(invocation_id),
                Value::from(u64::from(result_kind)),
            ];
            if result_kind == RESULT_KIND_ERROR {
                items.push(str_value(error.as_deref().unwrap_or_default()));
            } else if result_kind == RESULT_KIND_NON_VOID {
                if let Some(value) = result {
                    items.push(prepare_value(value, config));
                }
            }
            // void result omits the slot entirely
            Value::Array(items)
        }

        // [5, headers, invocation_id]
        Message::CancelInvocation { invocation_id } => Value::Array(vec![
            tag_value(message),
            empty_headers(),
            str_value(invocation_id),
        ]),

        // [6]
        Message::Ping => Value::Array(vec![tag_value(message)]),

        // [7, error?] — allow_reconnect is decode-only
        Message::Close { error, .. } => match error {
            Some(e) if !e.is_empty() => Value::Array(vec![tag_value(message), str_value(e)]),
            _ => Value::Array(vec![tag_value(message)]),
        },
    }
}

fn tag_value(message: &Message) -> Value {
    Value::from(u64::from(message.kind().tag()))
}

/// Headers are always written as an empty map.
fn empty_headers() -> Value {
    Value::Map(Vec::new())
}

fn str_value(s: &str) -> Value {
    Value::from(s)
}

fn prepare_value(value: &Value, config: &ProtocolConfig) -> Value {
    if config.suppress_type_info {
        strip_type_info(value)
    } else {
        value.clone()
    }
}

/// Recursively drop `$type` map entries, the only type information the
/// dynamic value model carries.
fn strip_type_info(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(strip_type_info).collect()),
        Value::Map(entries) => Value::Map(
            entries
                .iter()
                .filter(|(key, _)| key.as_str() != Some(TYPE_INFO_KEY))
                .map(|(key, val)| (key.clone(), strip_type_info(val)))
                .collect(),
        ),
        other => other.clone(),
    }
}
