// Packet codec: turns application values into self-delimiting byte frames and back
use crate::error::{Error, Result};
use bincode::{DefaultOptions, Options};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Length prefix of a bincode frame (big-endian u32)
pub const FRAME_HEADER_LEN: usize = 4;

/// Default upper bound for one encoded packet (16 MiB)
pub const DEFAULT_MAX_PACKET_SIZE: u64 = 16 * 1024 * 1024;

/// Serializes packets to bytes and reconstructs them from a receive backlog.
///
/// A codec is self-framing: `decode` must be able to tell where one value ends
/// without help from the caller.
pub trait Codec: Send + Sync {
    type Packet;

    /// Encode one packet. Fails with [`Error::NotEncodable`] if the value cannot be serialized.
    fn encode(&self, packet: &Self::Packet) -> Result<Vec<u8>>;

    /// Decode one packet from the front of `input`.
    ///
    /// Returns the packet and the number of bytes it occupied, or `Ok(None)` when
    /// `input` only holds part of a value; the caller appends more bytes and tries
    /// again. Malformed data fails with [`Error::Protocol`].
    fn decode(&self, input: &[u8]) -> Result<Option<(Self::Packet, usize)>>;
}

/// Length-prefixed bincode codec for any serde type.
pub struct BincodeCodec<T> {
    limit: u64,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_PACKET_SIZE)
    }

    /// Packets whose encoding exceeds `limit` bytes are refused in both directions.
    pub fn with_limit(limit: u64) -> Self {
        BincodeCodec {
            limit: limit.min(u32::MAX as u64),
            _phantom: PhantomData,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    fn options(&self) -> impl Options {
        DefaultOptions::new().with_limit(self.limit)
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BincodeCodec<T> {
    fn clone(&self) -> Self {
        Self::with_limit(self.limit)
    }
}

impl<T> fmt::Debug for BincodeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BincodeCodec").field("limit", &self.limit).finish()
    }
}

impl<T: Serialize + DeserializeOwned> Codec for BincodeCodec<T> {
    type Packet = T;

    fn encode(&self, packet: &T) -> Result<Vec<u8>> {
        let payload = self
            .options()
            .serialize(packet)
            .map_err(|e| Error::NotEncodable(e.to_string()))?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    fn decode(&self, input: &[u8]) -> Result<Option<(T, usize)>> {
        if input.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes([input[0], input[1], input[2], input[3]]) as usize;
        if len as u64 > self.limit {
            return Err(Error::Protocol(format!(
                "frame of {} bytes exceeds limit of {} bytes",
                len, self.limit
            )));
        }

        let total_len = FRAME_HEADER_LEN + len;
        if input.len() < total_len {
            return Ok(None);
        }

        self.options()
            .deserialize(&input[FRAME_HEADER_LEN..total_len])
            .map(|packet| Some((packet, total_len)))
            .map_err(|e| Error::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serializer};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Message {
        Ping(u32),
        Text(String),
    }

    struct Refuses;

    impl Serialize for Refuses {
        fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refused"))
        }
    }

    impl<'de> Deserialize<'de> for Refuses {
        fn deserialize<D: serde::Deserializer<'de>>(_d: D) -> std::result::Result<Self, D::Error> {
            Ok(Refuses)
        }
    }

    fn decode_at(codec: &BincodeCodec<Message>, input: &[u8], offset: &mut usize) -> Option<Message> {
        let (packet, used) = codec.decode(&input[*offset..]).unwrap()?;
        *offset += used;
        Some(packet)
    }

    #[test]
    fn decodes_consecutive_frames_and_leaves_the_rest() {
        let codec = BincodeCodec::<Message>::new();
        let mut backlog = codec.encode(&Message::Ping(7)).unwrap();
        backlog.extend(codec.encode(&Message::Text("hello".into())).unwrap());
        let third = codec.encode(&Message::Ping(9)).unwrap();
        backlog.extend_from_slice(&third[..3]);

        let mut offset = 0;
        assert_eq!(decode_at(&codec, &backlog, &mut offset), Some(Message::Ping(7)));
        assert_eq!(
            decode_at(&codec, &backlog, &mut offset),
            Some(Message::Text("hello".into()))
        );
        assert_eq!(decode_at(&codec, &backlog, &mut offset), None);
        assert_eq!(backlog.len() - offset, 3);

        backlog.extend_from_slice(&third[3..]);
        assert_eq!(decode_at(&codec, &backlog, &mut offset), Some(Message::Ping(9)));
        assert_eq!(offset, backlog.len());
    }

    #[test]
    fn many_small_frames_decode_in_place() {
        let codec = BincodeCodec::<Message>::new();
        let frame = codec.encode(&Message::Ping(1)).unwrap();
        let backlog = frame.repeat(100_000);

        let mut offset = 0;
        let mut decoded = 0;
        while decode_at(&codec, &backlog, &mut offset).is_some() {
            decoded += 1;
        }
        assert_eq!(decoded, 100_000);
        assert_eq!(offset, backlog.len());
    }

    #[test]
    fn partial_header_waits_for_more_bytes() {
        let codec = BincodeCodec::<Message>::new();
        assert!(codec.decode(&[0u8, 0]).unwrap().is_none());
    }

    #[test]
    fn oversized_frame_is_a_protocol_error() {
        let codec = BincodeCodec::<Message>::with_limit(64);
        let input = 1000u32.to_be_bytes();
        assert!(matches!(codec.decode(&input), Err(Error::Protocol(_))));
    }

    #[test]
    fn garbage_payload_is_a_protocol_error() {
        let codec = BincodeCodec::<Message>::new();
        let mut input = 3u32.to_be_bytes().to_vec();
        input.extend_from_slice(&[0xff, 0xff, 0xff]);
        assert!(matches!(codec.decode(&input), Err(Error::Protocol(_))));
    }

    #[test]
    fn limit_is_capped_by_the_length_prefix() {
        assert_eq!(BincodeCodec::<Message>::new().limit(), DEFAULT_MAX_PACKET_SIZE);
        assert_eq!(BincodeCodec::<Message>::with_limit(64).limit(), 64);
        assert_eq!(BincodeCodec::<Message>::with_limit(u64::MAX).limit(), u32::MAX as u64);
    }

    #[test]
    fn refusing_serializer_is_not_encodable() {
        let codec = BincodeCodec::<Refuses>::new();
        assert!(matches!(codec.encode(&Refuses), Err(Error::NotEncodable(_))));
    }

    #[test]
    fn value_over_limit_is_not_encodable() {
        let codec = BincodeCodec::<Message>::with_limit(8);
        let big = Message::Text("x".repeat(64));
        assert!(matches!(codec.encode(&big), Err(Error::NotEncodable(_))));
    }
}
