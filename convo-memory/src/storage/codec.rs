//! Warm Payload Codec
//!
//! `TigerStyle`: Warm blocks are stored as JSON. Payloads over the threshold
//! are gzip-compressed. Decoding returns exactly the encoded block.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::error::StorageResult;
use crate::constants::TIER_COMPRESSION_LEVEL;
use crate::entities::ConversationBlock;

/// A serialized Warm-tier block.
#[derive(Debug, Clone)]
pub struct WarmPayload {
    bytes: Vec<u8>,
    compressed: bool,
    original_size: usize,
}

impl WarmPayload {
    /// Serialize `block`, compressing when the JSON exceeds `threshold_bytes`.
    ///
    /// # Errors
    /// Returns `StorageError::Codec` if serialization or compression fails.
    pub fn encode(block: &ConversationBlock, threshold_bytes: usize) -> StorageResult<Self> {
        let json = serde_json::to_vec(block)?;
        let original_size = json.len();

        if original_size <= threshold_bytes {
            return Ok(Self {
                bytes: json,
                compressed: false,
                original_size,
            });
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(TIER_COMPRESSION_LEVEL));
        encoder.write_all(&json)?;
        let bytes = encoder.finish()?;

        tracing::trace!(
            block_id = %block.id,
            original_size,
            compressed_size = bytes.len(),
            "compressed warm payload"
        );

        Ok(Self {
            bytes,
            compressed: true,
            original_size,
        })
    }

    /// Reconstruct the block.
    ///
    /// # Errors
    /// Returns `StorageError::Codec` if the payload is corrupt.
    pub fn decode(&self) -> StorageResult<ConversationBlock> {
        let mut block: ConversationBlock = if self.compressed {
            let mut json = Vec::with_capacity(self.original_size);
            GzDecoder::new(self.bytes.as_slice()).read_to_end(&mut json)?;
            serde_json::from_slice(&json)?
        } else {
            serde_json::from_slice(&self.bytes)?
        };
        block.compressed_size = self.compressed.then_some(self.bytes.len());
        Ok(block)
    }

    /// Whether the payload is gzip-compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Serialized JSON size.
    #[must_use]
    pub fn original_size(&self) -> usize {
        self.original_size
    }

    /// Bytes actually held.
    #[must_use]
    pub fn stored_size(&self) -> usize {
        self.bytes.len()
    }

    /// `stored / original`, 1.0 when uncompressed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 1.0;
        }
        self.stored_size() as f64 / self.original_size as f64
    }

    /// Bytes saved by compression.
    #[must_use]
    pub fn bytes_saved(&self) -> usize {
        self.original_size.saturating_sub(self.stored_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TIER_COMPRESSION_THRESHOLD_BYTES_DEFAULT;
    use crate::entities::BlockSource;
    use crate::storage::StorageError;
    use chrono::{DateTime, Utc};

    fn block(content: String) -> ConversationBlock {
        let t0 = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        ConversationBlock::new("s1", 3, content, BlockSource::Agent, "m3", t0).with_id("b3")
    }

    #[test]
    fn test_small_payload_stays_plain() {
        let original = block("short answer".into());
        let payload = WarmPayload::encode(&original, TIER_COMPRESSION_THRESHOLD_BYTES_DEFAULT).unwrap();

        assert!(!payload.is_compressed());
        assert_eq!(payload.bytes_saved(), 0);
        assert!((payload.ratio() - 1.0).abs() < f64::EPSILON);
        assert_eq!(payload.decode().unwrap(), original);
    }

    #[test]
    fn test_large_payload_compresses_losslessly() {
        let original = block("the deployment pipeline retries failed stages. ".repeat(100));
        let payload = WarmPayload::encode(&original, TIER_COMPRESSION_THRESHOLD_BYTES_DEFAULT).unwrap();

        assert!(payload.is_compressed());
        assert!(payload.stored_size() < payload.original_size());
        assert!(payload.ratio() < 0.5);

        let decoded = payload.decode().unwrap();
        assert_eq!(decoded.content, original.content);
        assert_eq!(decoded.compressed_size, Some(payload.stored_size()));
    }

    #[test]
    fn test_corrupt_payload_is_codec_error() {
        let mut payload = WarmPayload::encode(&block("x".repeat(4096)), 16).unwrap();
        payload.bytes.truncate(10);
        assert!(matches!(payload.decode(), Err(StorageError::Codec { .. })));
    }
}
