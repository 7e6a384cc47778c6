//! FlateDecode (zlib/deflate).

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match ZlibDecoder::new(input).read_to_end(&mut output) {
            Ok(_) => Ok(output),
            Err(e) if !output.is_empty() => {
                // Truncated streams are common; keep what inflated cleanly.
                log::warn!(
                    "FlateDecode partial recovery: extracted {} bytes before corruption: {}",
                    output.len(),
                    e
                );
                Ok(output)
            },
            Err(e) => {
                log::info!("Zlib decode failed ({}), trying raw deflate", e);
                output.clear();
                DeflateDecoder::new(input)
                    .read_to_end(&mut output)
                    .map_err(|deflate_err| {
                        Error::Decode(format!(
                            "FlateDecode failed: zlib: {}, raw deflate: {}",
                            e, deflate_err
                        ))
                    })?;
                Ok(output)
            },
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

/// Compress `data` with zlib for a `/FlateDecode` stream.
pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flate_round_trip() {
        let data = b"0 0 0 1 0 0 0 2 0 0 0 3".repeat(20);
        let compressed = flate_encode(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(FlateDecoder.decode(&compressed).unwrap(), data);
    }

    #[test]
    fn test_flate_truncated_keeps_prefix() {
        let data: Vec<u8> = (0..20_000u32).flat_map(|i| i.to_be_bytes()).collect();
        let compressed = flate_encode(&data).unwrap();
        let truncated = &compressed[..compressed.len() / 2];
        let decoded = FlateDecoder.decode(truncated).unwrap();
        assert!(!decoded.is_empty());
        assert_eq!(&data[..decoded.len()], &decoded[..]);
    }

    #[test]
    fn test_flate_garbage_fails() {
        assert!(FlateDecoder.decode(b"\xff\xff\xff\xff not zlib").is_err());
    }
}
