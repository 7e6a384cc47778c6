//! Object stream parsing (PDF 1.5+).
//!
//! An object stream (`/Type /ObjStm`) packs several non-stream objects into
//! one compressed stream:
//!
//! ```text
//! N 0 obj
//! << /Type /ObjStm /N 3 /First 14 /Filter /FlateDecode >>
//! stream
//! 10 0 11 15 12 28      % (object number, offset relative to /First) pairs
//! <dict>                % object 10
//! ...
//! endstream
//! ```
//!
//! Linearized output never contains object streams; their members are
//! expanded into ordinary indirect objects.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::parser::parse_object_with_limit;
use crate::stream::Stream;
use std::collections::HashMap;

/// Parse an object stream and return its members keyed by object number.
///
/// Members that fail to parse are skipped with a warning. `max_decompressed_size`
/// of 0 disables the size check.
pub fn parse_object_stream(
    stream: &Stream,
    max_nesting: usize,
    max_decompressed_size: usize,
) -> Result<HashMap<u32, Object>> {
    let dict = &stream.dict;

    if let Some(type_name) = dict.get("Type").and_then(|t| t.as_name()) {
        if type_name != "ObjStm" {
            return Err(Error::InvalidPdf(format!("expected /Type /ObjStm, got /Type /{}", type_name)));
        }
    }

    let n = dict
        .get("N")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::InvalidPdf("object stream missing /N entry".to_string()))?;
    let first = dict
        .get("First")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::InvalidPdf("object stream missing /First entry".to_string()))?;

    if !(0..=1_000_000).contains(&n) {
        return Err(Error::InvalidPdf(format!("invalid object stream /N value: {}", n)));
    }
    if !(0..=10_000_000).contains(&first) {
        return Err(Error::InvalidPdf(format!("invalid object stream /First value: {}", first)));
    }
    let (n, first) = (n as usize, first as usize);

    let decoded = stream.decode()?;
    if max_decompressed_size > 0 && decoded.len() > max_decompressed_size {
        return Err(Error::Decode(format!(
            "object stream decodes to {} bytes, limit is {}",
            decoded.len(),
            max_decompressed_size
        )));
    }
    if decoded.len() < first {
        return Err(Error::InvalidPdf(format!(
            "object stream data too short: {} bytes, expected at least {}",
            decoded.len(),
            first
        )));
    }

    let pairs = parse_object_number_pairs(&decoded[..first], n)?;
    let objects_data = &decoded[first..];
    let mut result = HashMap::with_capacity(pairs.len());

    for (obj_num, offset) in pairs {
        let Some(obj_data) = objects_data.get(offset..) else {
            log::warn!(
                "Object {} offset {} is beyond stream data length {}",
                obj_num,
                offset,
                objects_data.len()
            );
            continue;
        };
        match parse_object_with_limit(obj_data, max_nesting) {
            Ok((_, obj)) => {
                result.insert(obj_num, obj);
            },
            Err(e) => log::warn!("Failed to parse object {} from object stream: {:?}", obj_num, e),
        }
    }

    Ok(result)
}

/// Read `count` (object number, offset) integer pairs.
fn parse_object_number_pairs(data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut remaining = data;

    for i in 0..count {
        let mut next_int = || -> Result<i64> {
            match token(remaining) {
                Ok((rest, Token::Integer(value))) if value >= 0 => {
                    remaining = rest;
                    Ok(value)
                },
                _ => Err(Error::ParseError {
                    offset: (data.len() - remaining.len()) as u64,
                    reason: format!("failed to parse object stream pair {}", i),
                }),
            }
        };
        let obj_num = next_int()?;
        let offset = next_int()?;
        pairs.push((obj_num as u32, offset as usize));
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dictionary;

    fn objstm(n: i64, first: i64, data: &[u8]) -> Stream {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("ObjStm"));
        dict.insert("N".to_string(), Object::Integer(n));
        dict.insert("First".to_string(), Object::Integer(first));
        Stream::new(dict, data.to_vec())
    }

    #[test]
    fn test_parse_simple_object_stream() {
        let data = b"10 0 11 11 << /A 1 >> [ 1 2 3 ]";
        let objects = parse_object_stream(&objstm(2, 11, data), 100, 0).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[&10].as_dict().unwrap().get("A"), Some(&Object::Integer(1)));
        assert_eq!(objects[&11].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_compressed_object_stream() {
        let data = b"5 0 << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>";
        let mut stream = objstm(1, 4, b"");
        stream.dict.insert("Filter".to_string(), Object::name("FlateDecode"));
        stream.set_data(crate::decoders::flate_encode(data).unwrap());

        let objects = parse_object_stream(&stream, 100, 0).unwrap();
        assert!(objects[&5].has_type("Font"));
    }

    #[test]
    fn test_offset_beyond_data_is_skipped() {
        let data = b"1 0 2 500 (one)";
        let objects = parse_object_stream(&objstm(2, 10, data), 100, 0).unwrap();
        assert_eq!(objects.len(), 1);
        assert!(objects.contains_key(&1));
    }

    #[test]
    fn test_invalid_object_streams() {
        let mut wrong_type = objstm(1, 4, b"1 0 null");
        wrong_type.dict.insert("Type".to_string(), Object::name("XRef"));
        assert!(parse_object_stream(&wrong_type, 100, 0).is_err());

        assert!(parse_object_stream(&objstm(1, 50, b"1 0 null"), 100, 0).is_err());
        assert!(parse_object_stream(&objstm(2, 4, b"1 0 null"), 100, 0).is_err());
        assert!(parse_object_stream(&objstm(-1, 0, b""), 100, 0).is_err());
    }

    #[test]
    fn test_decompressed_size_limit() {
        let data = b"1 0 (payload)";
        assert!(parse_object_stream(&objstm(1, 4, data), 100, 4).is_err());
    }
}
