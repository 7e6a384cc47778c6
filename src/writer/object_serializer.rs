//! PDF object serialization.
//!
//! Serializes COS objects to their byte representation according to
//! PDF specification ISO 32000-1:2008, Section 7.3. Output is compact:
//! dictionary keys are sorted and separated by single spaces.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use std::collections::HashMap;
use std::io::Write;

/// Serializer for COS objects.
///
/// A serializer either writes references as they are, or renumbers them
/// through a table of pre-assigned object numbers. In the renumbering mode a
/// reference without an entry is an error: the serializer never invents an
/// object number.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSerializer<'a> {
    numbering: Option<&'a HashMap<ObjectRef, u32>>,
}

impl<'a> ObjectSerializer<'a> {
    /// Serializer that writes references unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer that maps every reference through `numbering`.
    pub fn renumbering(numbering: &'a HashMap<ObjectRef, u32>) -> Self {
        Self {
            numbering: Some(numbering),
        }
    }

    /// Output reference for `key`.
    ///
    /// Returns [`Error::ForbiddenOperation`] when renumbering and `key` has
    /// no pre-assigned number.
    pub fn map_reference(&self, key: ObjectRef) -> Result<ObjectRef> {
        match self.numbering {
            None => Ok(key),
            Some(numbering) => numbering.get(&key).map(|&n| ObjectRef::new(n, 0)).ok_or_else(|| {
                Error::ForbiddenOperation(format!("cannot assign an object number to {} while linearizing", key))
            }),
        }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj)?;
        Ok(buf)
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.serialize(obj)?).into_owned())
    }

    /// Write a direct object.
    ///
    /// Streams are indirect by definition; a stream nested inside another
    /// object is rejected.
    pub fn write_object<W: Write>(&self, w: &mut W, obj: &Object) -> Result<()> {
        match obj {
            Object::Null => w.write_all(b"null")?,
            Object::Boolean(b) => w.write_all(if *b { b"true" } else { b"false" })?,
            Object::Integer(i) => write!(w, "{}", i)?,
            Object::Real(r) => write_real(w, *r)?,
            Object::String(s) => write_string(w, s)?,
            Object::Name(n) => write_name(w, n)?,
            Object::Array(arr) => self.write_array(w, arr)?,
            Object::Dictionary(dict) => self.write_dictionary(w, dict)?,
            Object::Stream(_) => {
                return Err(Error::InvalidPdf("stream objects must be indirect".to_string()));
            },
            Object::Reference(r) => {
                let mapped = self.map_reference(*r)?;
                write!(w, "{} {} R", mapped.id, mapped.gen)?;
            },
        }
        Ok(())
    }

    fn write_array<W: Write>(&self, w: &mut W, arr: &[Object]) -> Result<()> {
        w.write_all(b"[")?;
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                w.write_all(b" ")?;
            }
            self.write_object(w, obj)?;
        }
        w.write_all(b"]")?;
        Ok(())
    }

    /// Write a dictionary with sorted keys.
    pub fn write_dictionary<W: Write>(&self, w: &mut W, dict: &Dictionary) -> Result<()> {
        w.write_all(b"<<")?;

        // Sort keys for deterministic output
        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();

        for key in keys {
            if let Some(value) = dict.get(key) {
                write_name(w, key)?;
                w.write_all(b" ")?;
                self.write_object(w, value)?;
            }
        }
        w.write_all(b">>")?;
        Ok(())
    }
}

/// Write a real number with at most five decimal places.
fn write_real<W: Write>(w: &mut W, value: f64) -> std::io::Result<()> {
    if !value.is_finite() {
        log::warn!("Non-finite real {} written as 0", value);
        return w.write_all(b"0");
    }
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        write!(w, "{}", value as i64)
    } else {
        // Format with enough precision, then trim trailing zeros
        let formatted = format!("{:.5}", value);
        let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
        match trimmed {
            "" | "-" | "-0" => w.write_all(b"0"),
            _ => w.write_all(trimmed.as_bytes()),
        }
    }
}

/// Write a PDF string.
///
/// Uses literal string syntax `(...)` with escaping for printable data,
/// hex string syntax `<...>` otherwise.
fn write_string<W: Write>(w: &mut W, data: &[u8]) -> std::io::Result<()> {
    let is_printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

    if is_printable {
        w.write_all(b"(")?;
        for &byte in data {
            match byte {
                b'(' => w.write_all(b"\\(")?,
                b')' => w.write_all(b"\\)")?,
                b'\\' => w.write_all(b"\\\\")?,
                b'\n' => w.write_all(b"\\n")?,
                b'\r' => w.write_all(b"\\r")?,
                b'\t' => w.write_all(b"\\t")?,
                _ => w.write_all(&[byte])?,
            }
        }
        w.write_all(b")")
    } else {
        w.write_all(b"<")?;
        for byte in data {
            write!(w, "{:02X}", byte)?;
        }
        w.write_all(b">")
    }
}

/// Write a PDF name.
///
/// Names hold one char per source byte. Anything outside the regular
/// printable range is escaped as `#xx`.
fn write_name<W: Write>(w: &mut W, name: &str) -> std::io::Result<()> {
    w.write_all(b"/")?;
    for ch in name.chars() {
        let code = ch as u32;
        if code > 0xFF {
            let mut utf8 = [0u8; 4];
            for byte in ch.encode_utf8(&mut utf8).bytes() {
                write!(w, "#{:02X}", byte)?;
            }
            continue;
        }
        let byte = code as u8;
        match byte {
            b'!'
            | b'"'
            | b'$'..=b'&'
            | b'\''
            | b'*'..=b'.'
            | b'0'..=b'9'
            | b';'
            | b'?'
            | b'@'
            | b'A'..=b'Z'
            | b'^'..=b'z'
            | b'|'
            | b'~' => w.write_all(&[byte])?,
            _ => write!(w, "#{:02X}", byte)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Stream;

    fn show(obj: &Object) -> String {
        ObjectSerializer::new().serialize_to_string(obj).unwrap()
    }

    #[test]
    fn test_serialize_primitives() {
        assert_eq!(show(&Object::Null), "null");
        assert_eq!(show(&Object::Boolean(true)), "true");
        assert_eq!(show(&Object::Boolean(false)), "false");
        assert_eq!(show(&Object::Integer(-42)), "-42");
    }

    #[test]
    fn test_serialize_real() {
        assert_eq!(show(&Object::Real(612.0)), "612");
        assert_eq!(show(&Object::Real(0.5)), "0.5");
        assert_eq!(show(&Object::Real(-1.25)), "-1.25");
        assert_eq!(show(&Object::Real(1.0 / 3.0)), "0.33333");
        assert_eq!(show(&Object::Real(0.000001)), "0");
        assert_eq!(show(&Object::Real(f64::NAN)), "0");
    }

    #[test]
    fn test_serialize_strings() {
        assert_eq!(show(&Object::String(b"Hello (World)".to_vec())), "(Hello \\(World\\))");
        assert_eq!(show(&Object::String(b"a\\b\n".to_vec())), "(a\\\\b\\n)");
        assert_eq!(show(&Object::String(vec![0x00, 0xFF, 0x10])), "<00FF10>");
    }

    #[test]
    fn test_serialize_names() {
        assert_eq!(show(&Object::name("Type")), "/Type");
        assert_eq!(show(&Object::name("A B")), "/A#20B");
        assert_eq!(show(&Object::name("Font#1")), "/Font#231");
        assert_eq!(show(&Object::name("a/b")), "/a#2Fb");
        assert_eq!(show(&Object::name("f(x)")), "/f#28x#29");
        // Latin-1 byte from the source file
        assert_eq!(show(&Object::name("caf\u{e9}")), "/caf#E9");
    }

    #[test]
    fn test_serialize_dictionary_sorted() {
        let dict = Object::dict(vec![
            ("Type", Object::name("Page")),
            ("Count", Object::Integer(3)),
            ("Kids", Object::Array(vec![Object::Integer(1), Object::Null])),
        ]);
        assert_eq!(show(&dict), "<</Count 3/Kids [1 null]/Type /Page>>");
    }

    #[test]
    fn test_references_unchanged_by_default() {
        assert_eq!(show(&Object::Reference(ObjectRef::new(12, 3))), "12 3 R");
    }

    #[test]
    fn test_renumbering() {
        let mut numbering = HashMap::new();
        numbering.insert(ObjectRef::new(40, 2), 7);
        let serializer = ObjectSerializer::renumbering(&numbering);

        let obj = Object::Array(vec![Object::Reference(ObjectRef::new(40, 2))]);
        assert_eq!(serializer.serialize_to_string(&obj).unwrap(), "[7 0 R]");

        let unknown = Object::Reference(ObjectRef::new(41, 0));
        assert!(matches!(serializer.serialize(&unknown), Err(Error::ForbiddenOperation(_))));
    }

    #[test]
    fn test_nested_stream_rejected() {
        let nested = Object::Array(vec![Object::Stream(Stream::new(Dictionary::new(), b"x".to_vec()))]);
        assert!(ObjectSerializer::new().serialize(&nested).is_err());
    }
}
