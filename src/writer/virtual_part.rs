//! Deferred output units.
//!
//! The linearizing writer never emits into a single monotonic sink. It
//! produces an ordered list of [`VirtualPart`]s, each either an owned byte
//! buffer or a window into a source file. The list can be measured without
//! materializing slices; [`WrittenObjectStore::write_to`] streams the parts,
//! in order, into any sink.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// One unit of deferred output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualPart {
    /// Owned bytes.
    Bytes(Bytes),
    /// Read-only window `offset..offset + length` of a file.
    Slice {
        /// File holding the bytes
        path: Arc<Path>,
        /// Offset of the first byte
        offset: u64,
        /// Number of bytes
        length: u64,
    },
}

impl VirtualPart {
    /// Number of bytes this part contributes to the output.
    pub fn inflated_length(&self) -> u64 {
        match self {
            VirtualPart::Bytes(data) => data.len() as u64,
            VirtualPart::Slice { length, .. } => *length,
        }
    }

    /// Whether this part is a file slice.
    pub fn is_slice(&self) -> bool {
        matches!(self, VirtualPart::Slice { .. })
    }

    /// Stream this part into `sink`.
    ///
    /// A slice copies exactly `length` bytes and fails with
    /// [`Error::UnexpectedEof`] when the file is shorter.
    pub fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> Result<()> {
        match self {
            VirtualPart::Bytes(data) => sink.write_all(data)?,
            VirtualPart::Slice { path, offset, length } => {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(*offset))?;
                let copied = io::copy(&mut file.take(*length), sink)?;
                if copied < *length {
                    log::warn!(
                        "Source {} ended after {} of {} bytes at offset {}",
                        path.display(),
                        copied,
                        length,
                        offset
                    );
                    return Err(Error::UnexpectedEof);
                }
            },
        }
        Ok(())
    }
}

/// Sum of [`VirtualPart::inflated_length`] over `parts`.
pub fn inflated_length_total(parts: &[VirtualPart]) -> u64 {
    parts.iter().map(VirtualPart::inflated_length).sum()
}

/// Ordered, append-only list of virtual parts.
///
/// The concatenation of all parts in list order is the output document.
#[derive(Debug, Clone, Default)]
pub struct WrittenObjectStore {
    parts: Vec<VirtualPart>,
    total_length: u64,
}

impl WrittenObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a part.
    pub fn append(&mut self, part: VirtualPart) {
        self.total_length += part.inflated_length();
        self.parts.push(part);
    }

    /// Total output length in bytes.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Parts in output order.
    pub fn parts(&self) -> &[VirtualPart] {
        &self.parts
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the store holds no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Remove and return all parts, leaving the store empty.
    pub fn take_parts(&mut self) -> Vec<VirtualPart> {
        self.total_length = 0;
        std::mem::take(&mut self.parts)
    }

    /// Emit every part, in order, into `sink`.
    pub fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> Result<()> {
        for part in &self.parts {
            part.write_to(sink)?;
        }
        sink.flush()?;
        Ok(())
    }

    /// Materialize the whole document in memory.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(usize::try_from(self.total_length).unwrap_or(0));
        self.write_to(&mut out)?;
        Ok(out)
    }
}

impl From<Vec<VirtualPart>> for WrittenObjectStore {
    fn from(parts: Vec<VirtualPart>) -> Self {
        let mut store = Self::new();
        for part in parts {
            store.append(part);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_file(data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    fn slice(path: &Path, offset: u64, length: u64) -> VirtualPart {
        VirtualPart::Slice {
            path: Arc::from(path),
            offset,
            length,
        }
    }

    #[test]
    fn test_inflated_length() {
        assert_eq!(VirtualPart::Bytes(Bytes::from_static(b"abc")).inflated_length(), 3);
        assert_eq!(slice(Path::new("/nonexistent"), 10, 2048).inflated_length(), 2048);
    }

    #[test]
    fn test_inflated_length_total() {
        let parts = vec![
            VirtualPart::Bytes(Bytes::from_static(b"%PDF-1.7\n")),
            slice(Path::new("/nonexistent"), 0, 100),
            VirtualPart::Bytes(Bytes::new()),
        ];
        assert_eq!(inflated_length_total(&parts), 109);
        assert_eq!(inflated_length_total(&[]), 0);
    }

    #[test]
    fn test_store_writes_parts_in_order() {
        let file = source_file(b"0123456789abcdef");
        let mut store = WrittenObjectStore::new();
        store.append(VirtualPart::Bytes(Bytes::from_static(b"<")));
        store.append(slice(file.path(), 4, 6));
        store.append(VirtualPart::Bytes(Bytes::from_static(b">")));

        assert_eq!(store.total_length(), 8);
        assert_eq!(store.to_vec().unwrap(), b"<456789>");
    }

    #[test]
    fn test_short_slice_fails() {
        let file = source_file(b"short");
        let mut store = WrittenObjectStore::new();
        store.append(slice(file.path(), 2, 10));

        let mut out = Vec::new();
        assert!(matches!(store.write_to(&mut out), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn test_slice_never_reads_past_length() {
        let file = source_file(b"AAAABBBBCCCC");
        let mut out = Vec::new();
        slice(file.path(), 4, 4).write_to(&mut out).unwrap();
        assert_eq!(out, b"BBBB");
    }

    #[test]
    fn test_take_parts_resets_store() {
        let mut store = WrittenObjectStore::from(vec![VirtualPart::Bytes(Bytes::from_static(b"xy"))]);
        assert_eq!(store.len(), 1);
        let parts = store.take_parts();
        assert_eq!(parts.len(), 1);
        assert!(store.is_empty());
        assert_eq!(store.total_length(), 0);
    }
}
