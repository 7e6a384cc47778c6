//! COS serializer that emits virtual parts instead of a byte sink.
//!
//! [`LinearizingWriter`] differs from an ordinary PDF writer in four ways:
//!
//! - Object numbers are fixed before writing starts. A reference to an
//!   object without a pre-assigned number fails with
//!   [`Error::ForbiddenOperation`].
//! - Output accumulates in an in-memory buffer that is cut into
//!   [`VirtualPart::Bytes`] parts. A stream whose body lives in the source
//!   file becomes a [`VirtualPart::Slice`] and is never read.
//! - The current position is the cached length of the closed parts plus the
//!   buffer length; only parts appended since the last query are summed.
//! - Regions can be reserved ahead of time with [`write_dummy_xref`] and
//!   padded up to a measured position with [`fill_until`].
//!
//! [`write_dummy_xref`]: LinearizingWriter::write_dummy_xref
//! [`fill_until`]: LinearizingWriter::fill_until

use super::linearizer::LinearizerConfig;
use super::object_serializer::ObjectSerializer;
use super::virtual_part::{inflated_length_total, VirtualPart, WrittenObjectStore};
use super::xref_stream::{encode_xref_stream, XrefEntry, XrefStreamOptions};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::stream::{Stream, StreamBody};
use bytes::Bytes;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;

/// Offset width of dummy xref streams; covers any file below 4 GiB.
const DUMMY_OFFSET_WIDTH: usize = 4;

/// Binary comment after the header line marking the file as binary.
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Writer producing an ordered list of virtual parts.
#[derive(Debug)]
pub struct LinearizingWriter {
    numbering: HashMap<ObjectRef, u32>,
    config: LinearizerConfig,
    buffer: Vec<u8>,
    parts: Vec<VirtualPart>,
    /// Total length of `parts[..last_count]`
    closed_length: u64,
    last_count: usize,
    written: HashSet<u32>,
    xref: BTreeMap<u32, XrefEntry>,
}

impl LinearizingWriter {
    /// Create a writer over a complete `source key -> output number` table.
    pub fn new(numbering: HashMap<ObjectRef, u32>, config: LinearizerConfig) -> Self {
        Self {
            numbering,
            config,
            buffer: Vec::new(),
            parts: Vec::new(),
            closed_length: 0,
            last_count: 0,
            written: HashSet::new(),
            xref: BTreeMap::new(),
        }
    }

    /// Pre-assigned output number of `key`.
    ///
    /// The writer never assigns numbers itself: an unknown key is an
    /// [`Error::ForbiddenOperation`].
    pub fn assign_number(&self, key: ObjectRef) -> Result<u32> {
        self.numbering.get(&key).copied().ok_or_else(|| {
            Error::ForbiddenOperation(format!("cannot assign an object number to {} while linearizing", key))
        })
    }

    /// Current output position.
    pub fn current_pos(&mut self) -> u64 {
        if self.last_count < self.parts.len() {
            self.closed_length += inflated_length_total(&self.parts[self.last_count..]);
            self.last_count = self.parts.len();
        }
        self.closed_length + self.buffer.len() as u64
    }

    /// Number of closed parts.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Write the `%PDF-M.m` header and a binary marker comment.
    pub fn write_header(&mut self, version: (u8, u8)) -> Result<()> {
        writeln!(self.buffer, "%PDF-{}.{}", version.0, version.1)?;
        self.buffer.extend_from_slice(BINARY_MARKER);
        Ok(())
    }

    /// Write the source object `key` under its pre-assigned number.
    ///
    /// Objects already written in the current pass are skipped.
    pub fn write_object(&mut self, key: ObjectRef, object: &Object) -> Result<()> {
        let number = self.assign_number(key)?;
        if !self.begin_object(number) {
            log::debug!("Object {} ({}) already written, skipping", number, key);
            return Ok(());
        }
        let numbering = std::mem::take(&mut self.numbering);
        let result = self.write_body(&ObjectSerializer::renumbering(&numbering), object);
        self.numbering = numbering;
        result
    }

    /// Write an object generated by the linearizer (xref, hint stream).
    ///
    /// References inside `object` must already use output numbers.
    pub fn write_numbered(&mut self, number: u32, object: &Object) -> Result<()> {
        if !self.begin_object(number) {
            log::debug!("Object {} already written, skipping", number);
            return Ok(());
        }
        self.write_body(&ObjectSerializer::new(), object)
    }

    /// Write an object whose body is already serialized.
    pub fn write_raw_object(&mut self, number: u32, body: &[u8]) -> Result<()> {
        if !self.begin_object(number) {
            log::debug!("Object {} already written, skipping", number);
            return Ok(());
        }
        self.buffer.extend_from_slice(body);
        self.buffer.extend_from_slice(b"\nendobj\n");
        self.coalesce();
        Ok(())
    }

    /// Record the xref entry and write `N 0 obj`. Returns false if `number`
    /// was already written in this pass.
    fn begin_object(&mut self, number: u32) -> bool {
        if !self.written.insert(number) {
            return false;
        }
        let offset = self.current_pos();
        self.xref.insert(number, XrefEntry::in_use(number, offset));
        self.buffer.extend_from_slice(format!("{} 0 obj\n", number).as_bytes());
        true
    }

    fn write_body(&mut self, serializer: &ObjectSerializer<'_>, object: &Object) -> Result<()> {
        match object {
            Object::Stream(stream) => self.write_stream(serializer, stream)?,
            other => {
                serializer.write_object(&mut self.buffer, other)?;
                self.buffer.extend_from_slice(b"\nendobj\n");
            },
        }
        self.coalesce();
        Ok(())
    }

    fn write_stream(&mut self, serializer: &ObjectSerializer<'_>, stream: &Stream) -> Result<()> {
        let length = Object::Integer(stream.raw_length() as i64);
        if stream.dict.get("Length") == Some(&length) {
            serializer.write_dictionary(&mut self.buffer, &stream.dict)?;
        } else {
            let mut dict = stream.dict.clone();
            dict.insert("Length".to_string(), length);
            serializer.write_dictionary(&mut self.buffer, &dict)?;
        }
        self.buffer.extend_from_slice(b"\nstream\r\n");

        match stream.body() {
            StreamBody::InMemory(data) => self.buffer.extend_from_slice(data),
            StreamBody::FileSlice(slice) => {
                self.flush_buffer();
                self.parts.push(VirtualPart::Slice {
                    path: slice.path.clone(),
                    offset: slice.offset,
                    length: slice.length,
                });
            },
        }
        self.buffer.extend_from_slice(b"\r\nendstream\nendobj\n");
        Ok(())
    }

    fn coalesce(&mut self) {
        if self.buffer.len() > self.config.coalesce_threshold {
            self.flush_buffer();
        }
    }

    fn flush_buffer(&mut self) {
        if !self.buffer.is_empty() {
            let data = std::mem::take(&mut self.buffer);
            self.parts.push(VirtualPart::Bytes(Bytes::from(data)));
        }
    }

    /// Pad with a comment line until the output reaches `target`.
    ///
    /// Fails with [`Error::LayoutUnderEstimate`] when the output is already
    /// past `target`.
    pub fn fill_until(&mut self, target: u64) -> Result<()> {
        let current = self.current_pos();
        if target < current {
            return Err(Error::LayoutUnderEstimate {
                current,
                requested: target,
            });
        }
        let gap = (target - current) as usize;
        match gap {
            0 => {},
            1 => self.buffer.push(b'\n'),
            _ => {
                self.buffer.resize(self.buffer.len() + gap - 1, b'%');
                self.buffer.push(b'\n');
            },
        }
        if gap > 0 {
            log::trace!("Padded {} bytes up to offset {}", gap, target);
        }
        Ok(())
    }

    /// Write `startxref`, the 10-digit xref offset and `%%EOF`.
    pub fn write_startxref(&mut self, xref_offset: u64) -> Result<()> {
        write!(self.buffer, "startxref\n{:010}\n%%EOF\n", xref_offset)?;
        Ok(())
    }

    /// Forget that `number` was written, so it can be written again.
    ///
    /// Returns whether the object had been written.
    pub fn remove_written_object(&mut self, number: u32) -> bool {
        self.xref.remove(&number);
        self.written.remove(&number)
    }

    /// Whether `number` was written in the current pass.
    pub fn is_written(&self, number: u32) -> bool {
        self.written.contains(&number)
    }

    /// Offset recorded for `number`.
    pub fn entry_offset(&self, number: u32) -> Option<u64> {
        self.xref.get(&number).map(|e| e.offset)
    }

    /// Recorded xref entries, highest object number first.
    pub fn xref_entries(&self) -> Vec<XrefEntry> {
        let mut entries: Vec<XrefEntry> = self.xref.values().copied().collect();
        entries.sort();
        entries
    }

    /// Write a placeholder xref stream as object `number` and reserve room
    /// for the real one.
    ///
    /// Offsets are random 32-bit values so the compressed size is an upper
    /// bound for real data. The stream is followed by
    /// `max(ceil(ratio * length), min_xref_overflow)` padding bytes. Returns
    /// the offset of the stream object.
    pub fn write_dummy_xref<R: Rng>(
        &mut self,
        number: u32,
        trailer: &Dictionary,
        ranges: &[(u32, u32)],
        rng: &mut R,
    ) -> Result<u64> {
        let entries: Vec<XrefEntry> = ranges
            .iter()
            .flat_map(|&(start, count)| start..start + count)
            .map(|n| {
                if n == 0 {
                    XrefEntry::free(0, 0, 65535)
                } else {
                    XrefEntry::in_use(n, u64::from(rng.gen::<u32>()))
                }
            })
            .collect();
        let options = XrefStreamOptions {
            offset_width: Some(DUMMY_OFFSET_WIDTH),
            compress: self.config.compress_xref,
        };
        let stream = encode_xref_stream(&entries, ranges, trailer, options)?;

        let offset = self.current_pos();
        self.write_numbered(number, &Object::Stream(stream))?;
        let length = self.current_pos() - offset;
        let overflow = ((length as f64 * self.config.xref_overflow_ratio).ceil() as u64).max(self.config.min_xref_overflow);
        log::debug!(
            "Dummy xref {} at {}: {} bytes plus {} bytes of overflow",
            number,
            offset,
            length,
            overflow
        );
        self.fill_until(offset + length + overflow)?;
        Ok(offset)
    }

    /// Write the real xref stream as object `number`, covering `ranges`.
    ///
    /// Every number in `ranges` other than 0 and `number` itself must have
    /// been written. Returns the offset of the stream object.
    pub fn write_xref(&mut self, number: u32, trailer: &Dictionary, ranges: &[(u32, u32)]) -> Result<u64> {
        let offset = self.current_pos();
        let mut entries: Vec<XrefEntry> = self
            .xref_entries()
            .into_iter()
            .filter(|e| e.number != number && ranges.iter().any(|&(s, c)| (s..s + c).contains(&e.number)))
            .collect();
        entries.push(XrefEntry::in_use(number, offset));
        if ranges.iter().any(|&(s, c)| s == 0 && c > 0) {
            entries.push(XrefEntry::free(0, 0, 65535));
        }
        entries.sort();

        let options = XrefStreamOptions {
            offset_width: None,
            compress: self.config.compress_xref,
        };
        let stream = encode_xref_stream(&entries, ranges, trailer, options)?;
        self.write_numbered(number, &Object::Stream(stream))?;
        log::debug!("Xref {} at {} with {} entries", number, offset, entries.len());
        Ok(offset)
    }

    /// Close the current part list and reset position tracking.
    ///
    /// Written-object and xref bookkeeping are kept; callers remove objects
    /// with [`remove_written_object`](Self::remove_written_object) before
    /// writing them again.
    pub fn take_parts(&mut self) -> Vec<VirtualPart> {
        self.flush_buffer();
        self.closed_length = 0;
        self.last_count = 0;
        std::mem::take(&mut self.parts)
    }

    /// Flush the buffer and hand over all parts.
    pub fn close(mut self) -> WrittenObjectStore {
        self.flush_buffer();
        WrittenObjectStore::from(self.parts)
    }
}
