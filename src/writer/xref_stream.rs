//! Cross-reference stream encoding (ISO 32000-1:2008, Section 7.5.8).
//!
//! Each row is three big-endian fields: type (1 byte), offset or next free
//! object (`w2` bytes) and generation (2 bytes). Subsections named by
//! `/Index` are written in ascending object order.

use crate::decoders::flate_encode;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::stream::Stream;
use byteorder::{BigEndian, WriteBytesExt};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Width of the type field
const TYPE_WIDTH: usize = 1;
/// Width of the generation field
const GENERATION_WIDTH: usize = 2;

/// One row of an output cross-reference stream.
///
/// Entries order by object number, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrefEntry {
    /// Output object number
    pub number: u32,
    /// Byte offset of `N 0 obj`, or the next free object for free entries
    pub offset: u64,
    /// Generation number
    pub generation: u16,
    /// Whether the entry marks a free object
    pub free: bool,
}

impl XrefEntry {
    /// Entry for an object written at `offset`.
    pub fn in_use(number: u32, offset: u64) -> Self {
        Self {
            number,
            offset,
            generation: 0,
            free: false,
        }
    }

    /// Free entry, as used for object 0.
    pub fn free(number: u32, next_free: u64, generation: u16) -> Self {
        Self {
            number,
            offset: next_free,
            generation,
            free: true,
        }
    }

    fn type_field(&self) -> u64 {
        if self.free {
            0
        } else {
            1
        }
    }
}

impl Ord for XrefEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .number
            .cmp(&self.number)
            .then_with(|| self.offset.cmp(&other.offset))
            .then_with(|| self.generation.cmp(&other.generation))
            .then_with(|| self.free.cmp(&other.free))
    }
}

impl PartialOrd for XrefEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Minimum number of bytes needed to store `value`; at least 1.
pub fn bytes_needed(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

/// Encoding parameters for [`encode_xref_stream`].
#[derive(Debug, Clone, Copy)]
pub struct XrefStreamOptions {
    /// Fixed width of the offset field; computed from the largest value when `None`
    pub offset_width: Option<usize>,
    /// Compress the rows with FlateDecode
    pub compress: bool,
}

impl Default for XrefStreamOptions {
    fn default() -> Self {
        Self {
            offset_width: None,
            compress: true,
        }
    }
}

/// Build a cross-reference stream covering `ranges` of (first number, count).
///
/// Every number in every range needs exactly one entry in `entries`; a
/// range with a different number of entries fails with
/// [`Error::XrefEntryCountMismatch`]. `trailer` entries (such as `/Size`,
/// `/Root`, `/Prev`) are copied into the stream dictionary.
pub fn encode_xref_stream(
    entries: &[XrefEntry],
    ranges: &[(u32, u32)],
    trailer: &Dictionary,
    options: XrefStreamOptions,
) -> Result<Stream> {
    let by_number: BTreeMap<u32, &XrefEntry> = entries.iter().map(|e| (e.number, e)).collect();

    let mut rows: Vec<&XrefEntry> = Vec::with_capacity(entries.len());
    for &(start, count) in ranges {
        let range = start..start.saturating_add(count);
        let found: Vec<&XrefEntry> = by_number.range(range).map(|(_, e)| *e).collect();
        if found.len() != count as usize {
            return Err(Error::XrefEntryCountMismatch {
                expected: count as usize,
                found: found.len(),
            });
        }
        rows.extend(found);
    }
    if rows.len() != by_number.len() {
        log::warn!(
            "{} xref entries fall outside the /Index ranges and are dropped",
            by_number.len() - rows.len()
        );
    }

    let max_offset = rows.iter().map(|e| e.offset).max().unwrap_or(0);
    let offset_width = options.offset_width.unwrap_or_else(|| bytes_needed(max_offset));
    if bytes_needed(max_offset) > offset_width {
        return Err(Error::InvalidPdf(format!(
            "xref offset {} does not fit in {} bytes",
            max_offset, offset_width
        )));
    }

    let row_size = TYPE_WIDTH + offset_width + GENERATION_WIDTH;
    let mut data = Vec::with_capacity(rows.len() * row_size);
    for entry in &rows {
        data.write_uint::<BigEndian>(entry.type_field(), TYPE_WIDTH)?;
        data.write_uint::<BigEndian>(entry.offset, offset_width)?;
        data.write_u16::<BigEndian>(entry.generation)?;
    }

    let mut dict = trailer.clone();
    dict.insert("Type".to_string(), Object::name("XRef"));
    dict.insert(
        "W".to_string(),
        Object::Array(vec![
            Object::Integer(TYPE_WIDTH as i64),
            Object::Integer(offset_width as i64),
            Object::Integer(GENERATION_WIDTH as i64),
        ]),
    );
    dict.insert(
        "Index".to_string(),
        Object::Array(
            ranges
                .iter()
                .flat_map(|&(start, count)| [Object::Integer(start.into()), Object::Integer(count.into())])
                .collect(),
        ),
    );

    if options.compress {
        dict.insert("Filter".to_string(), Object::name("FlateDecode"));
        data = flate_encode(&data)?;
    }
    Ok(Stream::new(dict, data))
}
