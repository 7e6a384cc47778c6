//! ASCIIHexDecode.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCIIHexDecode filter implementation. Whitespace is ignored, `>` ends
/// the data and an odd final digit is padded with `0`.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let end = input.iter().position(|&c| c == b'>').unwrap_or(input.len());
        let mut digits = input[..end]
            .iter()
            .copied()
            .filter(|c| !c.is_ascii_whitespace() && *c != 0);

        let mut output = Vec::with_capacity(end / 2);
        while let Some(high) = digits.next() {
            let low = digits.next().unwrap_or(b'0');
            output.push((nibble(high)? << 4) | nibble(low)?);
        }
        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

fn nibble(digit: u8) -> Result<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        _ => Err(Error::Decode(format!(
            "ASCIIHexDecode: invalid hex digit '{}'",
            digit as char
        ))),
    }
}
