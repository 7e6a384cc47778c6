//! PDF object parser.
//!
//! Combines lexer tokens into direct objects (arrays, dictionaries, strings,
//! numbers, names) and indirect references. Stream payloads are not handled
//! here: the parser stops in front of the `stream` keyword and the caller
//! decides how the payload is materialized (see [`crate::lazy_parser`]).

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dictionary, Object, ObjectRef};
use nom::IResult;

/// Default nesting limit for arrays and dictionaries.
pub const DEFAULT_MAX_NESTING: usize = 256;

/// Decode escape sequences in PDF literal strings (ISO 32000-1, 7.3.4.2).
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd` (1-3 digits) and line
/// continuations. Unknown escapes keep the backslash.
///
/// ```
/// # use pdf_linearizer::parser::decode_literal_string_escapes;
/// assert_eq!(decode_literal_string_escapes(b"Section \\247 71.01"), b"Section \xa7 71.01");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            result.push(raw[i]);
            i += 1;
            continue;
        }

        let escaped = raw[i + 1];
        i += 2;
        match escaped {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0C),
            b'(' | b')' | b'\\' => result.push(escaped),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut value = u32::from(escaped - b'0');
                for _ in 0..2 {
                    match raw.get(i) {
                        Some(&d) if (b'0'..=b'7').contains(&d) => {
                            value = value * 8 + u32::from(d - b'0');
                            i += 1;
                        },
                        _ => break,
                    }
                }
                result.push((value & 0xFF) as u8);
            },
            _ => {
                // Unknown escape: keep the backslash, reprocess the character.
                result.push(b'\\');
                i -= 1;
            },
        }
    }

    result
}

/// Decode a hex string body to bytes.
///
/// Whitespace is ignored; an odd trailing digit is padded with `0`.
///
/// ```
/// # use pdf_linearizer::parser::decode_hex;
/// assert_eq!(decode_hex(b"48656C6C6F").unwrap(), b"Hello");
/// assert_eq!(decode_hex(b"ABC").unwrap(), vec![0xAB, 0xC0]);
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|&c| {
            (c as char).to_digit(16).map(|d| d as u8).ok_or_else(|| Error::ParseError {
                offset: 0,
                reason: format!("Invalid hex digit: {:?}", c as char),
            })
        })
        .collect::<Result<_>>()?;

    Ok(digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect())
}

/// Parse a PDF object from input bytes.
///
/// ```
/// use pdf_linearizer::parser::parse_object;
///
/// let (_, obj) = parse_object(b"<< /Type /Page /Parent 3 0 R >>").unwrap();
/// assert!(obj.has_type("Page"));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    parse_object_with_limit(input, DEFAULT_MAX_NESTING)
}

/// Parse a PDF object, failing when arrays/dictionaries nest deeper than `max_nesting`.
pub fn parse_object_with_limit(input: &[u8], max_nesting: usize) -> IResult<&[u8], Object> {
    parse_nested(input, max_nesting)
}

fn parse_nested(input: &[u8], depth_left: usize) -> IResult<&[u8], Object> {
    let (rest, tok) = token(input)?;

    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Integer(i) => {
            // `N G R` is a reference; anything else leaves the integer alone.
            if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if let (Ok(id), Ok(gen)) = (u32::try_from(i), u16::try_from(gen)) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(id, gen))));
                    }
                }
            }
            Ok((rest, Object::Integer(i)))
        },
        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::LiteralString(bytes) => Ok((rest, Object::String(decode_literal_string_escapes(bytes)))),
        Token::HexString(hex) => match decode_hex(hex) {
            Ok(decoded) => Ok((rest, Object::String(decoded))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::HexDigit))),
        },
        Token::Name(name) => Ok((rest, Object::Name(name))),
        Token::ArrayStart | Token::DictStart if depth_left == 0 => {
            Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::TooLarge)))
        },
        Token::ArrayStart => parse_array(rest, depth_left - 1),
        Token::DictStart => parse_dictionary(rest, depth_left - 1),
        _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    }
}

/// `[ obj1 obj2 ... ]`. An array cut off by end of input returns what was read.
fn parse_array(input: &[u8], depth_left: usize) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::ArrayEnd)) => return Ok((rest, Object::Array(items))),
            Ok(_) => {
                let (rest, item) = parse_nested(remaining, depth_left)?;
                items.push(item);
                remaining = rest;
            },
            Err(nom::Err::Error(_)) if is_exhausted(remaining) => {
                return Ok((&remaining[remaining.len()..], Object::Array(items)));
            },
            Err(e) => return Err(e),
        }
    }
}

/// `<< /Key value ... >>`. Keys must be names.
fn parse_dictionary(input: &[u8], depth_left: usize) -> IResult<&[u8], Object> {
    let mut dict = Dictionary::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::DictEnd)) => return Ok((rest, Object::Dictionary(dict))),
            Ok((rest, Token::Name(key))) => {
                let (rest, value) = parse_nested(rest, depth_left)?;
                // A null value is equivalent to the key being absent.
                if !value.is_null() {
                    dict.insert(key, value);
                }
                remaining = rest;
            },
            Ok(_) => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    remaining,
                    nom::error::ErrorKind::Tag,
                )))
            },
            Err(nom::Err::Error(_)) if is_exhausted(remaining) => {
                return Ok((&remaining[remaining.len()..], Object::Dictionary(dict)));
            },
            Err(e) => return Err(e),
        }
    }
}

fn is_exhausted(input: &[u8]) -> bool {
    crate::lexer::skip_ws(input)
        .map(|(rest, _)| rest.is_empty())
        .unwrap_or(false)
}

/// Parse an indirect object header `N G obj`.
pub fn parse_indirect_header(input: &[u8]) -> IResult<&[u8], ObjectRef> {
    let (rest, id) = token(input)?;
    let (rest, gen) = token(rest)?;
    let (rest, keyword) = token(rest)?;
    match (id, gen, keyword) {
        (Token::Integer(id), Token::Integer(gen), Token::ObjStart) => {
            match (u32::try_from(id), u16::try_from(gen)) {
                (Ok(id), Ok(gen)) => Ok((rest, ObjectRef::new(id, gen))),
                _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))),
            }
        },
        _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    }
}

/// Parse a complete direct object from a standalone buffer, mapping nom errors
/// to [`Error::ParseError`] relative to `base_offset`.
pub fn parse_object_at(input: &[u8], base_offset: u64, max_nesting: usize) -> Result<(usize, Object)> {
    match parse_object_with_limit(input, max_nesting) {
        Ok((rest, obj)) => Ok((input.len() - rest.len(), obj)),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(Error::ParseError {
            offset: base_offset + (input.len() - e.input.len()) as u64,
            reason: format!("{:?}", e.code),
        }),
        Err(nom::Err::Incomplete(_)) => Err(Error::UnexpectedEof),
    }
}
