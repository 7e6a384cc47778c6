//! Primary hint stream (ISO 32000-1:2008, Annex F.4).
//!
//! The hint stream holds two bit-packed tables:
//!
//! - the page offset hint table (header per Table F.3, one entry per page per
//!   Table F.4), and
//! - the shared object hint table (header per Table F.5, one entry per
//!   object group per Table F.6).
//!
//! Header fields are fixed-width big-endian integers. Per-page and per-group
//! entries are written item by item: item 1 for every page, then item 2 for
//! every page, and so on, each item starting on a byte boundary. Every value
//! is stored as a delta from the least value of its item, using the bit
//! width recorded in the header.

use crate::error::{Error, Result};
use byteorder::{BigEndian, WriteBytesExt};

/// Page offset hint table entry (Table F.4).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageHint {
    /// Objects in the page, page object included
    pub object_count: u32,
    /// Bytes from the page object to the end of the page's last private object
    pub length: u64,
    /// Shared object hint table entries referenced by this page
    pub shared_ids: Vec<u32>,
    /// Offset of the first content stream, relative to the page object
    pub content_offset: u64,
    /// Length of the page's content streams
    pub content_length: u64,
}

/// Shared object hint table entry (Table F.6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SharedGroupHint {
    /// Bytes covered by the group
    pub length: u64,
    /// Objects in the group
    pub object_count: u32,
}

/// Input for both hint tables.
#[derive(Debug, Clone, Default)]
pub struct HintTables {
    /// Offset of the first page's page object
    pub first_page_object_location: u64,
    /// One entry per page, in page order
    pub pages: Vec<PageHint>,
    /// Groups making up the first-page section
    pub first_page_groups: Vec<SharedGroupHint>,
    /// Object number of the first object in the shared objects section
    pub first_shared_object: u32,
    /// Offset of the first object in the shared objects section
    pub first_shared_location: u64,
    /// Groups in the shared objects section
    pub shared_groups: Vec<SharedGroupHint>,
}

/// Encoded hint stream payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedHints {
    /// Both tables, back to back
    pub data: Vec<u8>,
    /// Offset of the shared object hint table within `data` (the `/S` entry)
    pub shared_table_offset: usize,
}

impl HintTables {
    /// Serialize both tables.
    pub fn encode(&self) -> Result<EncodedHints> {
        let mut data = Vec::new();
        self.write_page_offset_table(&mut data)?;
        let shared_table_offset = data.len();
        self.write_shared_object_table(&mut data)?;
        Ok(EncodedHints {
            data,
            shared_table_offset,
        })
    }

    fn write_page_offset_table(&self, data: &mut Vec<u8>) -> Result<()> {
        let object_counts: Vec<u32> = self.pages.iter().map(|p| p.object_count).collect();
        let lengths = to_u32_values(self.pages.iter().map(|p| p.length), "page length")?;
        let content_offsets = to_u32_values(self.pages.iter().map(|p| p.content_offset), "content offset")?;
        let content_lengths = to_u32_values(self.pages.iter().map(|p| p.content_length), "content length")?;
        let shared_counts: Vec<u32> = self.pages.iter().map(|p| p.shared_ids.len() as u32).collect();

        let (min_objects, bits_objects) = calculate_delta_encoding(&object_counts);
        let (min_length, bits_length) = calculate_delta_encoding(&lengths);
        let (min_content_offset, bits_content_offset) = calculate_delta_encoding(&content_offsets);
        let (min_content_length, bits_content_length) = calculate_delta_encoding(&content_lengths);
        let bits_shared_count = bits_needed(shared_counts.iter().copied().max().unwrap_or(0));
        let max_shared_id = self.pages.iter().flat_map(|p| p.shared_ids.iter().copied()).max();
        let bits_shared_id = bits_needed(max_shared_id.unwrap_or(0));
        // Fractional positions are not tracked: every numerator is 0.
        let bits_numerator = 0u8;
        let denominator = 1u16;

        data.write_u32::<BigEndian>(min_objects)?;
        data.write_u32::<BigEndian>(to_u32(self.first_page_object_location, "first page location")?)?;
        data.write_u16::<BigEndian>(bits_objects.into())?;
        data.write_u32::<BigEndian>(min_length)?;
        data.write_u16::<BigEndian>(bits_length.into())?;
        data.write_u32::<BigEndian>(min_content_offset)?;
        data.write_u16::<BigEndian>(bits_content_offset.into())?;
        data.write_u32::<BigEndian>(min_content_length)?;
        data.write_u16::<BigEndian>(bits_content_length.into())?;
        data.write_u16::<BigEndian>(bits_shared_count.into())?;
        data.write_u16::<BigEndian>(bits_shared_id.into())?;
        data.write_u16::<BigEndian>(bits_numerator.into())?;
        data.write_u16::<BigEndian>(denominator)?;

        let mut bits = BitWriter::new();
        for &count in &object_counts {
            bits.write_bits((count - min_objects).into(), bits_objects);
        }
        bits.align();
        for &length in &lengths {
            bits.write_bits((length - min_length).into(), bits_length);
        }
        bits.align();
        for &count in &shared_counts {
            bits.write_bits(count.into(), bits_shared_count);
        }
        bits.align();
        for page in &self.pages {
            for &id in &page.shared_ids {
                bits.write_bits(id.into(), bits_shared_id);
            }
        }
        bits.align();
        for page in &self.pages {
            for _ in &page.shared_ids {
                bits.write_bits(0, bits_numerator);
            }
        }
        bits.align();
        for &offset in &content_offsets {
            bits.write_bits((offset - min_content_offset).into(), bits_content_offset);
        }
        bits.align();
        for &length in &content_lengths {
            bits.write_bits((length - min_content_length).into(), bits_content_length);
        }
        data.extend(bits.finish());
        Ok(())
    }

    fn write_shared_object_table(&self, data: &mut Vec<u8>) -> Result<()> {
        let groups: Vec<&SharedGroupHint> = self.first_page_groups.iter().chain(&self.shared_groups).collect();
        let lengths = to_u32_values(groups.iter().map(|g| g.length), "shared group length")?;
        let (min_length, bits_length) = calculate_delta_encoding(&lengths);
        let max_extra_objects = groups.iter().map(|g| g.object_count.saturating_sub(1)).max().unwrap_or(0);
        let bits_objects = bits_needed(max_extra_objects);

        data.write_u32::<BigEndian>(self.first_shared_object)?;
        data.write_u32::<BigEndian>(to_u32(self.first_shared_location, "shared section location")?)?;
        data.write_u32::<BigEndian>(self.first_page_groups.len() as u32)?;
        data.write_u32::<BigEndian>(groups.len() as u32)?;
        data.write_u16::<BigEndian>(bits_objects.into())?;
        data.write_u32::<BigEndian>(min_length)?;
        data.write_u16::<BigEndian>(bits_length.into())?;

        let mut bits = BitWriter::new();
        for &length in &lengths {
            bits.write_bits((length - min_length).into(), bits_length);
        }
        bits.align();
        // No MD5 signatures.
        for _ in &groups {
            bits.write_bits(0, 1);
        }
        bits.align();
        for group in &groups {
            bits.write_bits(group.object_count.saturating_sub(1).into(), bits_objects);
        }
        data.extend(bits.finish());
        Ok(())
    }
}

fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::InvalidPdf(format!("{} {} does not fit a 32-bit hint field", what, value)))
}

fn to_u32_values(values: impl Iterator<Item = u64>, what: &str) -> Result<Vec<u32>> {
    values.map(|v| to_u32(v, what)).collect()
}

/// Bit writer for hint table entries, most significant bit first.
#[derive(Debug, Default)]
pub struct BitWriter {
    buffer: Vec<u8>,
    current_byte: u8,
    bit_position: u8,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `num_bits` bits of `value`.
    pub fn write_bits(&mut self, value: u64, num_bits: u8) {
        for i in (0..num_bits).rev() {
            let bit = ((value >> i) & 1) as u8;
            self.current_byte = (self.current_byte << 1) | bit;
            self.bit_position += 1;

            if self.bit_position == 8 {
                self.buffer.push(self.current_byte);
                self.current_byte = 0;
                self.bit_position = 0;
            }
        }
    }

    /// Pad with zero bits up to the next byte boundary.
    pub fn align(&mut self) {
        if self.bit_position > 0 {
            self.current_byte <<= 8 - self.bit_position;
            self.buffer.push(self.current_byte);
            self.current_byte = 0;
            self.bit_position = 0;
        }
    }

    /// Finish and return the bytes written so far.
    pub fn finish(mut self) -> Vec<u8> {
        self.align();
        self.buffer
    }
}

/// Number of bits needed to represent `value`.
pub fn bits_needed(value: u32) -> u8 {
    (32 - value.leading_zeros()) as u8
}

/// Least value and bit width of the largest delta from it.
pub fn calculate_delta_encoding(values: &[u32]) -> (u32, u8) {
    let Some(&min) = values.iter().min() else {
        return (0, 0);
    };
    let max_delta = values.iter().map(|&v| v - min).max().unwrap_or(0);
    (min, bits_needed(max_delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ReadBytesExt;
    use std::io::Cursor;

    #[test]
    fn test_bits_needed() {
        assert_eq!(bits_needed(0), 0);
        assert_eq!(bits_needed(1), 1);
        assert_eq!(bits_needed(3), 2);
        assert_eq!(bits_needed(4), 3);
        assert_eq!(bits_needed(255), 8);
        assert_eq!(bits_needed(256), 9);
    }

    #[test]
    fn test_delta_encoding() {
        assert_eq!(calculate_delta_encoding(&[10, 15, 20, 25]), (10, 4));
        assert_eq!(calculate_delta_encoding(&[7, 7]), (7, 0));
        assert_eq!(calculate_delta_encoding(&[]), (0, 0));
    }

    #[test]
    fn test_bit_writer() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3);
        writer.write_bits(0b1100, 4);
        writer.write_bits(0b1, 1);
        writer.write_bits(0b11, 2);
        writer.align();
        writer.write_bits(0xFF, 8);
        assert_eq!(writer.finish(), vec![0b1011_1001, 0b1100_0000, 0xFF]);
    }

    fn two_page_tables() -> HintTables {
        HintTables {
            first_page_object_location: 1200,
            pages: vec![
                PageHint {
                    object_count: 4,
                    length: 900,
                    shared_ids: Vec::new(),
                    content_offset: 100,
                    content_length: 300,
                },
                PageHint {
                    object_count: 2,
                    length: 400,
                    shared_ids: vec![1, 3],
                    content_offset: 60,
                    content_length: 200,
                },
            ],
            first_page_groups: vec![
                SharedGroupHint {
                    length: 100,
                    object_count: 1,
                },
                SharedGroupHint {
                    length: 300,
                    object_count: 1,
                },
            ],
            first_shared_object: 9,
            first_shared_location: 5000,
            shared_groups: vec![SharedGroupHint {
                length: 50,
                object_count: 1,
            }],
        }
    }

    #[test]
    fn test_page_offset_header() {
        let encoded = two_page_tables().encode().unwrap();
        let mut r = Cursor::new(&encoded.data);

        assert_eq!(r.read_u32::<BigEndian>().unwrap(), 2); // least object count
        assert_eq!(r.read_u32::<BigEndian>().unwrap(), 1200); // first page location
        assert_eq!(r.read_u16::<BigEndian>().unwrap(), 2); // delta 2 needs 2 bits
        assert_eq!(r.read_u32::<BigEndian>().unwrap(), 400); // least page length
        assert_eq!(r.read_u16::<BigEndian>().unwrap(), 9); // delta 500
        assert_eq!(r.read_u32::<BigEndian>().unwrap(), 60);
        assert_eq!(r.read_u16::<BigEndian>().unwrap(), 6); // delta 40
        assert_eq!(r.read_u32::<BigEndian>().unwrap(), 200);
        assert_eq!(r.read_u16::<BigEndian>().unwrap(), 7); // delta 100
        assert_eq!(r.read_u16::<BigEndian>().unwrap(), 2); // up to 2 shared refs
        assert_eq!(r.read_u16::<BigEndian>().unwrap(), 2); // ids up to 3
        assert_eq!(r.read_u16::<BigEndian>().unwrap(), 0);
        assert_eq!(r.read_u16::<BigEndian>().unwrap(), 1);

        // Item 1: object count deltas 2 and 0 in 2 bits each.
        assert_eq!(r.read_u8().unwrap(), 0b1000_0000);
    }

    #[test]
    fn test_shared_table_offset_and_header() {
        let encoded = two_page_tables().encode().unwrap();
        let mut r = Cursor::new(&encoded.data[encoded.shared_table_offset..]);

        assert_eq!(r.read_u32::<BigEndian>().unwrap(), 9);
        assert_eq!(r.read_u32::<BigEndian>().unwrap(), 5000);
        assert_eq!(r.read_u32::<BigEndian>().unwrap(), 2);
        assert_eq!(r.read_u32::<BigEndian>().unwrap(), 3);
        assert_eq!(r.read_u16::<BigEndian>().unwrap(), 0); // single-object groups
        assert_eq!(r.read_u32::<BigEndian>().unwrap(), 50);
        assert_eq!(r.read_u16::<BigEndian>().unwrap(), 8); // delta 250
        // Length deltas 50, 250, 0 in 8 bits each.
        assert_eq!(r.read_u8().unwrap(), 50);
        assert_eq!(r.read_u8().unwrap(), 250);
        assert_eq!(r.read_u8().unwrap(), 0);
        // Signature flags, all clear.
        assert_eq!(r.read_u8().unwrap(), 0);
    }

    #[test]
    fn test_empty_tables() {
        let encoded = HintTables::default().encode().unwrap();
        // Fixed headers only: 36 bytes (F.3) and 24 bytes (F.5).
        assert_eq!(encoded.shared_table_offset, 36);
        assert_eq!(encoded.data.len(), 60);
    }

    #[test]
    fn test_oversized_value_rejected() {
        let mut tables = two_page_tables();
        tables.pages[0].length = u64::from(u32::MAX) + 1;
        assert!(tables.encode().is_err());
    }
}
