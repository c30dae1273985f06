//! Pluggable payload encoding.
//!
//! The gateway never touches `serde_json` directly; it goes through a
//! [`Codec`] so another JSON implementation can be swapped in without
//! changing the connection code.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::error::ProtoError;
use crate::frame::Frame;

/// Encodes values to bytes and decodes them back.
pub trait Codec: Send + Sync + 'static {
    /// Encode any serializable value.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, ProtoError>;

    /// Decode a value from bytes.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ProtoError>;

    /// Encode a value into a frame payload.
    fn encode_payload<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Box<RawValue>, ProtoError> {
        let bytes = self.encode(value)?;
        let text = String::from_utf8(bytes).map_err(|e| ProtoError::Encoding(e.to_string()))?;
        RawValue::from_string(text).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Decode the payload of `frame` into `T`.
    fn decode_payload<T: DeserializeOwned>(&self, frame: &Frame) -> Result<T, ProtoError> {
        let bytes = frame
            .data_bytes()
            .ok_or(ProtoError::MissingPayload(frame.op.code()))?;
        self.decode(bytes)
    }

    /// Encode a whole frame for the wire.
    fn encode_frame(&self, frame: &Frame) -> Result<Vec<u8>, ProtoError> {
        self.encode(frame)
    }

    /// Decode a whole frame from the wire.
    fn decode_frame(&self, bytes: &[u8]) -> Result<Frame, ProtoError> {
        self.decode(bytes)
    }
}

/// The default codec, backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, ProtoError> {
        serde_json::to_vec(value).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ProtoError> {
        serde_json::from_slice(bytes).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}
