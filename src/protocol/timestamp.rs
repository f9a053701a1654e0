//! Timestamp extension codec.
//!
//! The only recognized MessagePack extension kind on this protocol, ext
//! type −1, with three big-endian layouts selected by magnitude:
//!
//! ```text
//! 4 bytes   u32 seconds                      nanos == 0, secs fits u32
//! 8 bytes   u64 = nanos << 34 | secs         0 <= secs < 2^34
//! 12 bytes  u32 nanos, i64 secs              full range
//! ```
//!
//! Decoding dispatches purely on payload length; any other length is
//! rejected as malformed. Sub-100-nanosecond precision is lost silently on
//! encode.

use rmpv::Value;

use crate::error::{HubwireError, Result};

/// MessagePack extension type for timestamps.
pub const TIMESTAMP_EXT_TYPE: i8 = -1;

const NANOS_PER_SEC: u32 = 1_000_000_000;
const SECS_34_BIT_MAX: i64 = (1 << 34) - 1;

/// Zone semantics of a timestamp value.
///
/// Only `Local` values are normalized to UTC before encoding; `Unspecified`
/// values pass through untouched. The asymmetry is deliberate: downstream
/// consumers rely on unspecified values arriving unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Utc,
    /// Wall-clock time with an explicit offset east of UTC.
    Local { offset_secs: i32 },
    Unspecified,
}

/// A point in time, seconds and nanoseconds relative to the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
    zone: Zone,
}

impl Timestamp {
    /// Create a timestamp with the given zone, carrying excess nanoseconds
    /// into the seconds field.
    pub fn new(secs: i64, nanos: u32, zone: Zone) -> Self {
        Self {
            secs: secs + i64::from(nanos / NANOS_PER_SEC),
            nanos: nanos % NANOS_PER_SEC,
            zone,
        }
    }

    /// UTC timestamp.
    pub fn utc(secs: i64, nanos: u32) -> Self {
        Self::new(secs, nanos, Zone::Utc)
    }

    /// Wall-clock timestamp with an explicit UTC offset.
    pub fn local(secs: i64, nanos: u32, offset_secs: i32) -> Self {
        Self::new(secs, nanos, Zone::Local { offset_secs })
    }

    /// Timestamp with unknown zone semantics; never normalized.
    pub fn unspecified(secs: i64, nanos: u32) -> Self {
        Self::new(secs, nanos, Zone::Unspecified)
    }

    /// The Unix epoch.
    pub fn epoch() -> Self {
        Self::utc(0, 0)
    }

    #[inline]
    pub fn secs(&self) -> i64 {
        self.secs
    }

    #[inline]
    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    #[inline]
    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Normalize for encoding: local becomes its UTC equivalent,
    /// unspecified and UTC pass through.
    pub fn normalized(self) -> Self {
        match self.zone {
            Zone::Local { offset_secs } => Self {
                secs: self.secs - i64::from(offset_secs),
                nanos: self.nanos,
                zone: Zone::Utc,
            },
            Zone::Utc | Zone::Unspecified => self,
        }
    }

    /// Encode into the smallest fitting extension payload.
    pub fn encode(&self) -> Vec<u8> {
        let ts = self.normalized();
        // coarsen to 100 ns ticks
        let nanos = ts.nanos - ts.nanos % 100;

        if nanos == 0 && ts.secs >= 0 && ts.secs <= i64::from(u32::MAX) {
            (ts.secs as u32).to_be_bytes().to_vec()
        } else if ts.secs >= 0 && ts.secs <= SECS_34_BIT_MAX {
            let packed = (u64::from(nanos) << 34) | ts.secs as u64;
            packed.to_be_bytes().to_vec()
        } else {
            let mut payload = Vec::with_capacity(12);
            payload.extend_from_slice(&nanos.to_be_bytes());
            payload.extend_from_slice(&ts.secs.to_be_bytes());
            payload
        }
    }

    /// Decode an extension payload, dispatching on its length.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        match payload.len() {
            4 => {
                let secs = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                Ok(Self::utc(i64::from(secs), 0))
            }
            8 => {
                let mut word = [0u8; 8];
                word.copy_from_slice(payload);
                let packed = u64::from_be_bytes(word);
                let secs = (packed & ((1 << 34) - 1)) as i64;
                let nanos = (packed >> 34) as u32;
                Ok(Self::utc(secs, nanos))
            }
            12 => {
                let nanos = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let mut word = [0u8; 8];
                word.copy_from_slice(&payload[4..12]);
                let secs = i64::from_be_bytes(word);
                Ok(Self::utc(secs, nanos))
            }
            other => Err(HubwireError::UnsupportedExtensionLength(other)),
        }
    }

    /// Wrap as a wire value, ready to ride inside arguments or results.
    pub fn to_value(&self) -> Value {
        Value::Ext(TIMESTAMP_EXT_TYPE, self.encode())
    }

    /// Read a timestamp back out of a wire value.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value.as_ext() {
            Some((TIMESTAMP_EXT_TYPE, payload)) => Self::decode(payload),
            Some((tag, _)) => Err(HubwireError::Malformed(format!(
                "extension type {tag} is not a timestamp"
            ))),
            None => Err(HubwireError::Malformed(format!(
                "expected timestamp extension, wire carries {value:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_encodes_to_four_bytes() {
        let payload = Timestamp::epoch().encode();
        assert_eq!(payload, vec![0, 0, 0, 0]);
        assert_eq!(Timestamp::decode(&payload).unwrap(), Timestamp::epoch());
    }

    #[test]
    fn test_four_byte_boundary() {
        // Largest second count that still fits the 4-byte layout
        let max = Timestamp::utc(i64::from(u32::MAX), 0);
        assert_eq!(max.encode().len(), 4);

        // One past it needs the 8-byte layout
        let over = Timestamp::utc(i64::from(u32::MAX) + 1, 0);
        assert_eq!(over.encode().len(), 8);
    }

    #[test]
    fn test_nonzero_nanos_selects_eight_bytes() {
        let ts = Timestamp::utc(1_600_000_000, 500_000_000);
        let payload = ts.encode();
        assert_eq!(payload.len(), 8);
        assert_eq!(Timestamp::decode(&payload).unwrap(), ts);
    }

    #[test]
    fn test_twelve_byte_layouts() {
        // Before 1970
        let pre_epoch = Timestamp::utc(-1, 0);
        let payload = pre_epoch.encode();
        assert_eq!(payload.len(), 12);
        assert_eq!(Timestamp::decode(&payload).unwrap(), pre_epoch);

        // Beyond the 34-bit second range
        let far_future = Timestamp::utc((1 << 34) + 10, 7_700);
        let payload = far_future.encode();
        assert_eq!(payload.len(), 12);
        assert_eq!(Timestamp::decode(&payload).unwrap(), far_future);
    }

    #[test]
    fn test_nanos_coarsened_to_100ns_ticks() {
        let ts = Timestamp::utc(100, 123_456_789);
        let decoded = Timestamp::decode(&ts.encode()).unwrap();
        assert_eq!(decoded.nanos(), 123_456_700);
        assert_eq!(decoded.secs(), 100);
    }

    #[test]
    fn test_local_normalized_to_utc_before_encoding() {
        // 10:00 at UTC+2 is 08:00 UTC
        let local = Timestamp::local(36_000, 0, 7_200);
        let decoded = Timestamp::decode(&local.encode()).unwrap();
        assert_eq!(decoded.secs(), 28_800);
        assert_eq!(decoded.zone(), Zone::Utc);
    }

    #[test]
    fn test_unspecified_passes_through_unchanged() {
        let ts = Timestamp::unspecified(36_000, 0);
        let decoded = Timestamp::decode(&ts.encode()).unwrap();
        assert_eq!(decoded.secs(), 36_000);
    }

    #[test]
    fn test_unsupported_lengths_rejected() {
        for len in [0usize, 1, 3, 5, 7, 9, 11, 13, 16] {
            let err = Timestamp::decode(&vec![0u8; len]).unwrap_err();
            match err {
                HubwireError::UnsupportedExtensionLength(got) => assert_eq!(got, len),
                other => panic!("expected UnsupportedExtensionLength, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_eight_byte_packing_is_big_endian() {
        let ts = Timestamp::utc(1, 100);
        let payload = ts.encode();
        let packed = u64::from_be_bytes(payload.try_into().unwrap());
        assert_eq!(packed & ((1 << 34) - 1), 1);
        assert_eq!(packed >> 34, 100);
    }

    #[test]
    fn test_value_roundtrip_and_wrong_ext_tag() {
        let ts = Timestamp::utc(42, 0);
        let value = ts.to_value();
        assert_eq!(Timestamp::from_value(&value).unwrap(), ts);

        let wrong = Value::Ext(5, vec![0, 0, 0, 42]);
        assert!(Timestamp::from_value(&wrong).is_err());
    }

    #[test]
    fn test_nanos_overflow_carries_into_seconds() {
        let ts = Timestamp::utc(1, 2_500_000_000);
        assert_eq!(ts.secs(), 3);
        assert_eq!(ts.nanos(), 500_000_000);
    }
}
