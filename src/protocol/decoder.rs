//! Message decoder: a region of concatenated frames to typed messages.
//!
//! The decode loop reads one varint length, interprets exactly that many
//! bytes as one message body, and appends one decoded message per frame.
//! Frames with an unrecognized kind tag are dropped (counted and logged,
//! never an error) for forward compatibility; a frame whose body fails to
//! decode poisons only itself, and the error carries the offset of the next
//! frame so callers can skip and continue.

use std::sync::atomic::{AtomicU64, Ordering};

use rmpv::Value;
use tracing::debug;

use super::varint::read_varint;
use crate::error::{HubwireError, Result};
use crate::message::{Message, MessageKind};
use crate::registry::{PayloadType, TypeRegistry};

/// Decode every frame in `data`, appending messages to `out`.
///
/// Unknown-tag drops are counted into `unknown_messages`. Framing errors
/// propagate as-is (batch-fatal); per-frame errors are wrapped in
/// [`HubwireError::Frame`] with a resume offset.
pub(crate) fn decode_frames(
    data: &[u8],
    registry: &dyn TypeRegistry,
    out: &mut Vec<Message>,
    unknown_messages: &AtomicU64,
) -> Result<()> {
    let mut offset = 0;
    while offset < data.len() {
        let frame_start = offset;
        let len = read_varint(data, &mut offset)? as usize;
        let end = offset.checked_add(len).filter(|&end| end <= data.len()).ok_or_else(|| {
            HubwireError::Framing(format!(
                "frame at offset {frame_start} claims {len} bytes, only {} remain",
                data.len() - offset
            ))
        })?;

        match decode_one(&data[offset..end], registry) {
            Ok(Some(message)) => out.push(message),
            Ok(None) => {
                unknown_messages.fetch_add(1, Ordering::Relaxed);
            }
            Err(source) => {
                return Err(HubwireError::Frame {
                    offset: frame_start,
                    resume: end,
                    source: Box::new(source),
                })
            }
        }
        offset = end;
    }
    Ok(())
}

/// Decode one message body. `Ok(None)` means the tag was unrecognized and
/// the frame is dropped.
fn decode_one(body: &[u8], registry: &dyn TypeRegistry) -> Result<Option<Message>> {
    let mut cursor = body;
    let value = rmpv::decode::read_value(&mut cursor)?;
    let Value::Array(items) = value else {
        return Err(HubwireError::Malformed(
            "message body is not an array".to_string(),
        ));
    };

    let arity = items.len();
    let mut it = items.into_iter();
    let tag = it
        .next()
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HubwireError::Malformed("missing message kind tag".to_string()))?;

    let Some(kind) = MessageKind::from_tag(tag) else {
        debug!(tag, "dropping message with unrecognized kind tag");
        return Ok(None);
    };

    let message = match kind {
        MessageKind::Invocation | MessageKind::StreamInvocation => {
            read_headers(it.next())?;
            let invocation_id = read_string(it.next(), "invocation id")?;
            let target = read_string(it.next(), "target")?;
            let arguments = read_arguments(it.next(), &target, registry)?;
            let stream_ids = read_stream_ids(it.next())?;
            if kind == MessageKind::Invocation {
                Message::Invocation {
                    invocation_id,
                    target,
                    arguments,
                    stream_ids,
                }
            } else {
                Message::StreamInvocation {
                    invocation_id,
                    target,
                    arguments,
                    stream_ids,
                }
            }
        }

        MessageKind::StreamItem => {
            read_headers(it.next())?;
            let invocation_id = read_string(it.next(), "invocation id")?;
            let item = it
                .next()
                .ok_or_else(|| HubwireError::Malformed("missing stream item".to_string()))?;
            result_type(&invocation_id, registry).validate(&item)?;
            Message::StreamItem {
                invocation_id,
                item,
            }
        }

        MessageKind::Completion => {
            read_headers(it.next())?;
            let invocation_id = read_string(it.next(), "invocation id")?;
            let result_kind = it.next().and_then(|v| v.as_u64()).ok_or_else(|| {
                HubwireError::Malformed("missing completion result kind".to_string())
            })?;
            match result_kind {
                1 => {
                    let error = read_string(it.next(), "completion error")?;
                    Message::Completion {
                        invocation_id,
                        result: None,
                        error: Some(error),
                    }
                }
                2 => Message::Completion {
                    invocation_id,
                    result: None,
                    error: None,
                },
                3 => {
                    let value = it.next().ok_or_else(|| {
                        HubwireError::Malformed("missing completion result".to_string())
                    })?;
                    result_type(&invocation_id, registry).validate(&value)?;
                    Message::Completion {
                        invocation_id,
                        result: Some(value),
                        error: None,
                    }
                }
                other => {
                    return Err(HubwireError::UnknownResultKind(
                        u8::try_from(other).unwrap_or(u8::MAX),
                    ))
                }
            }
        }

        MessageKind::CancelInvocation => {
            read_headers(it.next())?;
            let invocation_id = read_string(it.next(), "invocation id")?;
            Message::CancelInvocation { invocation_id }
        }

        // extra elements, if any, are ignored
        MessageKind::Ping => Message::Ping,

        MessageKind::Close => {
            let error = match it.next() {
                None | Some(Value::Nil) => None,
                Some(value) => Some(read_string(Some(value), "close error")?),
            };
            // absent boolean slot must not raise: default false
            let allow_reconnect = if arity >= 3 {
                it.next().and_then(|v| v.as_bool()).unwrap_or(false)
            } else {
                false
            };
            Message::Close {
                error,
                allow_reconnect,
            }
        }
    };

    Ok(Some(message))
}

/// Headers are always present on the wire for the invocation and
/// completion families; tolerate any map (or nil) without keeping it.
fn read_headers(value: Option<Value>) -> Result<()> {
    match value {
        Some(Value::Map(_)) | Some(Value::Nil) => Ok(()),
        _ => Err(HubwireError::Malformed(
            "missing headers map".to_string(),
        )),
    }
}

/// Read a string slot. Nil maps to an empty string (blocking-less
/// invocations carry no id).
fn read_string(value: Option<Value>, what: &str) -> Result<String> {
    match value {
        Some(Value::Nil) => Ok(String::new()),
        Some(Value::String(s)) => s
            .into_str()
            .ok_or_else(|| HubwireError::Malformed(format!("{what} is not valid UTF-8"))),
        _ => Err(HubwireError::Malformed(format!("missing {what}"))),
    }
}

/// Read the argument array, positionally typed when the target has a
/// registered handler, untyped best-effort otherwise.
fn read_arguments(
    value: Option<Value>,
    target: &str,
    registry: &dyn TypeRegistry,
) -> Result<Vec<Value>> {
    let Some(Value::Array(raw)) = value else {
        return Err(HubwireError::Malformed(
            "missing arguments array".to_string(),
        ));
    };
    match registry.param_types_for(target) {
        Some(types) => {
            if raw.len() < types.len() {
                return Err(HubwireError::Malformed(format!(
                    "target {target:?} declares {} parameters, wire carries {}",
                    types.len(),
                    raw.len()
                )));
            }
            // decoded length never exceeds the declared list
            let mut arguments = Vec::with_capacity(types.len());
            for (value, ty) in raw.into_iter().zip(types) {
                ty.validate(&value)?;
                arguments.push(value);
            }
            Ok(arguments)
        }
        None => Ok(raw),
    }
}

/// Stream ids slot: absent or nil means none; an empty array is distinct.
fn read_stream_ids(value: Option<Value>) -> Result<Option<Vec<String>>> {
    match value {
        None | Some(Value::Nil) => Ok(None),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s
                    .into_str()
                    .ok_or_else(|| HubwireError::Malformed("stream id is not valid UTF-8".to_string())),
                _ => Err(HubwireError::Malformed(
                    "stream id is not a string".to_string(),
                )),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        _ => Err(HubwireError::Malformed(
            "stream ids slot is not an array".to_string(),
        )),
    }
}

/// Resolve the expected result type for an invocation id. Ids that are not
/// integers fall back to an untyped read.
fn result_type(invocation_id: &str, registry: &dyn TypeRegistry) -> PayloadType {
    invocation_id
        .parse::<u64>()
        .map(|id| registry.result_type_for(id))
        .unwrap_or(PayloadType::Raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NullRegistry;

    fn decode(data: &[u8]) -> Result<Vec<Message>> {
        let mut out = Vec::new();
        let unknown = AtomicU64::new(0);
        decode_frames(data, &NullRegistry, &mut out, &unknown)?;
        Ok(out)
    }

    /// Frame up a hand-built msgpack body.
    fn frame(body: &[u8]) -> Vec<u8> {
        assert!(body.len() < 128);
        let mut data = vec![body.len() as u8];
        data.extend_from_slice(body);
        data
    }

    #[test]
    fn test_empty_region_decodes_to_nothing() {
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_ping_frame() {
        let messages = decode(&frame(&[0x91, 0x06])).unwrap();
        assert_eq!(messages, vec![Message::Ping]);
    }

    #[test]
    fn test_ping_ignores_extra_elements() {
        // [6, "extra"]
        let messages = decode(&frame(&[0x92, 0x06, 0xa5, b'e', b'x', b't', b'r', b'a'])).unwrap();
        assert_eq!(messages, vec![Message::Ping]);
    }

    #[test]
    fn test_close_without_error_or_boolean() {
        let messages = decode(&frame(&[0x91, 0x07])).unwrap();
        assert_eq!(
            messages,
            vec![Message::Close {
                error: None,
                allow_reconnect: false
            }]
        );
    }

    #[test]
    fn test_close_with_error_and_allow_reconnect() {
        // [7, "bye", true]
        let messages = decode(&frame(&[0x93, 0x07, 0xa3, b'b', b'y', b'e', 0xc3])).unwrap();
        assert_eq!(
            messages,
            vec![Message::Close {
                error: Some("bye".to_string()),
                allow_reconnect: true
            }]
        );
    }

    #[test]
    fn test_close_missing_boolean_defaults_false() {
        // [7, "bye"]
        let messages = decode(&frame(&[0x92, 0x07, 0xa3, b'b', b'y', b'e'])).unwrap();
        assert_eq!(
            messages,
            vec![Message::Close {
                error: Some("bye".to_string()),
                allow_reconnect: false
            }]
        );
    }

    #[test]
    fn test_unknown_tag_dropped_and_counted() {
        // [9] then a ping
        let mut data = frame(&[0x91, 0x09]);
        data.extend_from_slice(&frame(&[0x91, 0x06]));

        let mut out = Vec::new();
        let unknown = AtomicU64::new(0);
        decode_frames(&data, &NullRegistry, &mut out, &unknown).unwrap();

        assert_eq!(out, vec![Message::Ping]);
        assert_eq!(unknown.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_unknown_result_kind_is_per_frame_error() {
        // good ping, then completion [3, {}, "1", 9], then another ping
        let mut data = frame(&[0x91, 0x06]);
        let bad_frame = frame(&[0x94, 0x03, 0x80, 0xa1, b'1', 0x09]);
        let bad_start = data.len();
        data.extend_from_slice(&bad_frame);
        data.extend_from_slice(&frame(&[0x91, 0x06]));

        let mut out = Vec::new();
        let unknown = AtomicU64::new(0);
        let err = decode_frames(&data, &NullRegistry, &mut out, &unknown).unwrap_err();

        // prior append intact
        assert_eq!(out, vec![Message::Ping]);

        let resume = match err {
            HubwireError::Frame {
                offset,
                resume,
                ref source,
            } => {
                assert_eq!(offset, bad_start);
                assert!(matches!(**source, HubwireError::UnknownResultKind(9)));
                resume
            }
            other => panic!("expected Frame error, got {other:?}"),
        };

        // caller can skip the poisoned frame and continue
        decode_frames(&data[resume..], &NullRegistry, &mut out, &unknown).unwrap();
        assert_eq!(out, vec![Message::Ping, Message::Ping]);
    }

    #[test]
    fn test_frame_length_overrun_is_framing_error() {
        // claims 10 bytes, provides 2
        let data = [0x0a, 0x91, 0x06];
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, HubwireError::Framing(_)));
        assert_eq!(err.resume_offset(), None);
    }

    #[test]
    fn test_non_array_body_is_per_frame_error() {
        // body is the string "hi"
        let err = decode(&frame(&[0xa2, b'h', b'i'])).unwrap_err();
        assert!(matches!(err, HubwireError::Frame { .. }));
    }

    #[test]
    fn test_cancel_invocation() {
        // [5, {}, "77"]
        let messages = decode(&frame(&[0x93, 0x05, 0x80, 0xa2, b'7', b'7'])).unwrap();
        assert_eq!(
            messages,
            vec![Message::CancelInvocation {
                invocation_id: "77".to_string()
            }]
        );
    }

    #[test]
    fn test_nil_invocation_id_maps_to_empty() {
        // [5, {}, nil]
        let messages = decode(&frame(&[0x93, 0x05, 0x80, 0xc0])).unwrap();
        assert_eq!(
            messages,
            vec![Message::CancelInvocation {
                invocation_id: String::new()
            }]
        );
    }

    #[test]
    fn test_typed_arguments_validated_positionally() {
        struct Binding;
        impl TypeRegistry for Binding {
            fn result_type_for(&self, _request_id: u64) -> PayloadType {
                PayloadType::Raw
            }
            fn param_types_for(&self, target: &str) -> Option<Vec<PayloadType>> {
                (target == "Add").then(|| vec![PayloadType::Int, PayloadType::Int])
            }
        }

        // [1, {}, "1", "Add", [2, 3]]
        let body = [
            0x95, 0x01, 0x80, 0xa1, b'1', 0xa3, b'A', b'd', b'd', 0x92, 0x02, 0x03,
        ];
        let mut out = Vec::new();
        let unknown = AtomicU64::new(0);
        decode_frames(&frame(&body), &Binding, &mut out, &unknown).unwrap();
        match &out[0] {
            Message::Invocation { arguments, .. } => {
                assert_eq!(arguments.len(), 2);
                assert_eq!(arguments[0].as_u64(), Some(2));
            }
            other => panic!("expected invocation, got {other:?}"),
        }

        // [1, {}, "1", "Add", ["x", 3]] — first argument has the wrong shape
        let body = [
            0x95, 0x01, 0x80, 0xa1, b'1', 0xa3, b'A', b'd', b'd', 0x92, 0xa1, b'x', 0x03,
        ];
        let mut out = Vec::new();
        let err = decode_frames(&frame(&body), &Binding, &mut out, &unknown).unwrap_err();
        assert!(matches!(err, HubwireError::Frame { .. }));

        // too few wire arguments for the declared list
        let body = [0x95, 0x01, 0x80, 0xa1, b'1', 0xa3, b'A', b'd', b'd', 0x91, 0x02];
        let mut out = Vec::new();
        let err = decode_frames(&frame(&body), &Binding, &mut out, &unknown).unwrap_err();
        assert!(matches!(err, HubwireError::Frame { .. }));
    }

    #[test]
    fn test_untyped_fallback_when_target_unregistered() {
        // [1, {}, "1", "Mystery", [1, "two"]]
        let body = [
            0x95, 0x01, 0x80, 0xa1, b'1', 0xa7, b'M', b'y', b's', b't', b'e', b'r', b'y', 0x92,
            0x01, 0xa3, b't', b'w', b'o',
        ];
        let messages = decode(&frame(&body)).unwrap();
        match &messages[0] {
            Message::Invocation { arguments, .. } => {
                assert_eq!(arguments.len(), 2);
                assert_eq!(arguments[1].as_str(), Some("two"));
            }
            other => panic!("expected invocation, got {other:?}"),
        }
    }
}
