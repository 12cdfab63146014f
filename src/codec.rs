//! External codec contracts (§6): the core never bakes in a concrete
//! wire serialization beyond the neutral [`Value`] representation, and
//! ships exactly one concrete [`Compressor`] so the LPS aggregator and
//! tests have something real to compress against. Grounded on
//! `original_source/src/serialization/Serializer.hpp` and
//! `src/compression/Compressor.hpp`.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// The core's neutral payload representation — what a `Serializer` would
/// decode a byte stream into, or encode one from. Concrete serializers
/// (JSON, TLV, AMF3, Protobuf) are out of scope; this is just the shared
/// shape they would produce.
pub type Value = serde_json::Value;

/// Decodes a byte stream into a [`Value`] and back. No concrete
/// implementation ships beyond what tests need; real deployments supply
/// their own.
pub trait Serializer: Send + Sync {
    /// Decodes `bytes` into a [`Value`].
    fn decode(&self, bytes: &[u8]) -> io::Result<Value>;
    /// Encodes `value` into bytes.
    fn encode(&self, value: &Value) -> io::Result<Vec<u8>>;
}

/// Symmetric byte-stream compression, used by the LPS aggregator's
/// optional gzip deflation (§4.11).
pub trait Compressor: Send + Sync {
    /// Compresses `data`.
    fn deflate(&self, data: &[u8]) -> io::Result<Vec<u8>>;
    /// Decompresses `data`.
    fn inflate(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

/// A `flate2`-backed gzip [`Compressor`], the one concrete implementation
/// this crate ships.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn deflate(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn inflate(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// A `serde_json`-backed [`Serializer`], used by tests and any handler
/// that wants the default JSON behavior without writing its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn decode(&self, bytes: &[u8]) -> io::Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn encode(&self, value: &Value) -> io::Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trips() {
        let gz = GzipCompressor;
        let original = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = gz.deflate(&original).unwrap();
        let restored = gz.inflate(&compressed).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn json_serializer_round_trips() {
        let codec = JsonSerializer;
        let value = serde_json::json!({"a": 1, "b": [true, null]});
        let bytes = codec.encode(&value).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }
}
