//! Cross-reference reading.
//!
//! Supports traditional xref tables (PDF 1.0-1.4) and cross-reference
//! streams (PDF 1.5+). Following the `/Prev` chain is driven by
//! [`LazyParser`](crate::lazy_parser::LazyParser), since xref streams are
//! ordinary indirect objects read through the same object reader.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::parser::parse_object_with_limit;
use crate::stream::Stream;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

/// Cross-reference table entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryType {
    /// Entry for a free object
    Free,
    /// Entry for an uncompressed object at a byte offset
    Uncompressed,
    /// Entry for an object in an object stream (PDF 1.5+)
    Compressed,
}

/// Cross-reference table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XRefEntry {
    /// Type of entry
    pub entry_type: XRefEntryType,
    /// Byte offset (uncompressed), object stream number (compressed) or next free object
    pub offset: u64,
    /// Generation number (uncompressed) or index within the object stream (compressed)
    pub generation: u16,
}

impl XRefEntry {
    /// Create a new uncompressed entry.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Uncompressed,
            offset,
            generation,
        }
    }

    /// Create a new compressed entry (object in object stream).
    pub fn compressed(stream_obj_num: u64, index_in_stream: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Compressed,
            offset: stream_obj_num,
            generation: index_in_stream,
        }
    }

    /// Create a new free entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Free,
            offset: next_free,
            generation,
        }
    }

    /// Whether the entry describes an object that exists.
    pub fn in_use(&self) -> bool {
        self.entry_type != XRefEntryType::Free
    }
}

/// Cross-reference table that maps object numbers to their locations.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    /// Trailer dictionary (for xref streams, this is the stream dictionary)
    trailer: Option<Dictionary>,
}

impl CrossRefTable {
    /// Create a new empty cross-reference table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = Some(trailer);
    }

    /// Get the trailer dictionary if present.
    pub fn trailer(&self) -> Option<&Dictionary> {
        self.trailer.as_ref()
    }

    /// Add an entry to the cross-reference table.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Get an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// All object numbers in the table, ascending.
    pub fn object_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self.entries.keys().copied().collect();
        numbers.sort_unstable();
        numbers
    }

    /// Merge entries from an older section.
    ///
    /// Entries already present win; this is the incremental-update rule
    /// when walking `/Prev` from newest to oldest.
    pub fn merge_from(&mut self, other: CrossRefTable) {
        for (obj_num, entry) in other.entries {
            self.entries.entry(obj_num).or_insert(entry);
        }
        if self.trailer.is_none() {
            self.trailer = other.trailer;
        }
    }

    /// Get the number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the byte offset of the last xref section by scanning the file tail
/// for `startxref`.
pub fn find_xref_offset<R: Read + Seek>(reader: &mut R) -> Result<u64> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    let read_size = file_size.min(2048);
    reader.seek(SeekFrom::End(-(read_size as i64)))?;

    let mut buf = Vec::new();
    reader.take(read_size).read_to_end(&mut buf)?;

    let content = String::from_utf8_lossy(&buf);
    let keyword_pos = content.rfind("startxref").ok_or(Error::InvalidXref)?;

    split_lines(&content[keyword_pos + "startxref".len()..])
        .iter()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .filter(|line| line.chars().all(|c| c.is_ascii_digit()))
        .ok_or(Error::InvalidXref)?
        .parse::<u64>()
        .map_err(|_| Error::InvalidXref)
}

/// Whether the section at `offset` is a traditional table (`xref` keyword)
/// rather than an xref stream object.
pub fn is_traditional_xref<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<bool> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut peek = [0u8; 32];
    let n = reader.read(&mut peek)?;
    let text = String::from_utf8_lossy(&peek[..n]);
    Ok(text.trim_start().starts_with("xref"))
}

/// Parse a traditional cross-reference table and its trailer dictionary.
///
/// ```text
/// xref
/// 0 6
/// 0000000000 65535 f
/// 0000000018 00000 n
/// ...
/// trailer
/// << /Size 6 /Root 1 0 R >>
/// ```
pub fn parse_traditional_xref<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    max_nesting: usize,
) -> Result<CrossRefTable> {
    let content = read_section(reader, offset)?;

    let trailer_pos = find_keyword(&content, b"trailer");
    let table_text = String::from_utf8_lossy(&content[..trailer_pos.unwrap_or(content.len())]);
    let lines = split_lines(&table_text);

    let mut xref = CrossRefTable::new();
    let mut line_iter = lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty() && !l.starts_with('%'));

    match line_iter.next() {
        Some(first) if first.starts_with("xref") => {},
        _ => return Err(Error::InvalidXref),
    }

    let mut current: Option<(u32, u32)> = None;
    let mut index = 0u32;
    for line in line_iter {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match (current, parts.as_slice()) {
            (_, [start, count]) => {
                let start: u32 = start.parse().map_err(|_| Error::InvalidXref)?;
                let count: u32 = count.parse().map_err(|_| Error::InvalidXref)?;
                if count > 1_000_000 {
                    return Err(Error::InvalidPdf("xref subsection count exceeds limit".to_string()));
                }
                current = Some((start, count));
                index = 0;
            },
            (Some((start, count)), [off, gen, flag, ..]) if index < count => {
                let entry = match (off.parse::<u64>(), gen.parse::<u16>()) {
                    (Ok(off), Ok(gen)) if flag.starts_with('n') => XRefEntry::uncompressed(off, gen),
                    (Ok(off), Ok(gen)) if flag.starts_with('f') => XRefEntry::free(off, gen),
                    _ => {
                        log::warn!("Malformed xref entry for object {}: {:?}, treating as free", start + index, line);
                        XRefEntry::free(0, 65535)
                    },
                };
                xref.add_entry(start + index, entry);
                index += 1;
            },
            _ => log::warn!("Skipping unexpected line in xref table: {:?}", line),
        }
    }

    if let Some(pos) = trailer_pos {
        let after = &content[pos + b"trailer".len()..];
        let (_, trailer) = parse_object_with_limit(after, max_nesting).map_err(|_| Error::ParseError {
            offset: offset + (pos + b"trailer".len()) as u64,
            reason: "invalid trailer dictionary".to_string(),
        })?;
        match trailer {
            Object::Dictionary(dict) => xref.set_trailer(dict),
            other => {
                return Err(Error::InvalidObjectType {
                    expected: "Dictionary".to_string(),
                    found: other.type_name().to_string(),
                })
            },
        }
    }

    Ok(xref)
}

/// Read from `offset` until `startxref` (or end of file).
fn read_section<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<Vec<u8>> {
    const CHUNK: usize = 64 * 1024;
    reader.seek(SeekFrom::Start(offset))?;

    let mut content = Vec::new();
    let mut chunk = vec![0u8; CHUNK];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let search_from = content.len().saturating_sub(b"startxref".len());
        content.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_keyword(&content[search_from..], b"startxref") {
            content.truncate(search_from + pos);
            break;
        }
    }
    Ok(content)
}

fn find_keyword(haystack: &[u8], keyword: &[u8]) -> Option<usize> {
    haystack.windows(keyword.len()).position(|window| window == keyword)
}

/// Decode the entries of a cross-reference stream (`/Type /XRef`).
///
/// Each entry consists of three big-endian fields whose widths are given
/// by `/W`. Field 1 is the type (0 free, 1 uncompressed, 2 compressed;
/// defaults to 1 when its width is 0). `/Index` lists the subsections,
/// defaulting to `[0 Size]`. The stream dictionary becomes the trailer.
pub fn decode_xref_stream(stream: &Stream) -> Result<CrossRefTable> {
    let dict = &stream.dict;

    if let Some(type_name) = dict.get("Type").and_then(|t| t.as_name()) {
        if type_name != "XRef" {
            return Err(Error::InvalidPdf(format!("expected /Type /XRef, got /Type /{}", type_name)));
        }
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|o| o.as_array())
        .ok_or_else(|| Error::InvalidPdf("missing /W array in xref stream".to_string()))?
        .iter()
        .map(|w| w.as_integer().filter(|&w| (0..=8).contains(&w)).map(|w| w as usize))
        .collect::<Option<_>>()
        .ok_or_else(|| Error::InvalidPdf("invalid /W array".to_string()))?;
    let [w1, w2, w3] = widths[..] else {
        return Err(Error::InvalidPdf("invalid /W array length".to_string()));
    };
    let entry_size = w1 + w2 + w3;

    let size = dict
        .get("Size")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::InvalidPdf("missing /Size in xref stream".to_string()))? as u32;

    let ranges: Vec<(u32, u32)> = match dict.get("Index").and_then(|o| o.as_array()) {
        Some(index) => index
            .chunks(2)
            .map(|pair| match pair {
                [start, count] => Some((start.as_integer()? as u32, count.as_integer()? as u32)),
                _ => None,
            })
            .collect::<Option<_>>()
            .ok_or_else(|| Error::InvalidPdf("invalid /Index".to_string()))?,
        None => vec![(0, size)],
    };

    let data = stream.decode()?;
    let mut xref = CrossRefTable::new();
    let mut records = data.chunks_exact(entry_size.max(1));

    for (start, count) in ranges {
        for i in 0..count {
            let record = records
                .next()
                .filter(|_| entry_size > 0)
                .ok_or_else(|| Error::InvalidPdf("truncated xref stream data".to_string()))?;

            let entry_type = if w1 > 0 { read_int(&record[..w1]) } else { 1 };
            let field2 = read_int(&record[w1..w1 + w2]);
            let field3 = read_int(&record[w1 + w2..]);

            let entry = match entry_type {
                0 => XRefEntry::free(field2, field3 as u16),
                1 => XRefEntry::uncompressed(field2, field3 as u16),
                2 => XRefEntry::compressed(field2, field3 as u16),
                other => return Err(Error::InvalidPdf(format!("invalid xref entry type: {}", other))),
            };
            xref.add_entry(start + i, entry);
        }
    }

    let mut trailer = dict.clone();
    trailer.remove("Length");
    xref.set_trailer(trailer);
    Ok(xref)
}

/// Big-endian unsigned integer of up to 8 bytes.
fn read_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Split text into lines, accepting LF, CRLF and CR-only endings.
fn split_lines(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split(['\r', '\n'])
        .map(str::to_string)
        .collect()
}
