//! Stream objects whose payload is either held in memory or referenced
//! as a slice of the source file.
//!
//! A referenced stream never copies its payload: both [`Stream::open_raw`] and
//! [`Stream::open_decoded`] read straight from the source file through a
//! [`SlicedFileReader`]. Writing to the stream drops the reference.

use crate::decoders::{self, DecodeParams};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Window into a source file holding a stream's raw (encoded) payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSlice {
    /// Source file path. The path is stored instead of a handle so the
    /// slice outlives the parser that produced it.
    pub path: Arc<Path>,
    /// Byte offset of the first payload byte
    pub offset: u64,
    /// Payload length in bytes
    pub length: u64,
}

/// Storage for a stream payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamBody {
    /// Payload held in memory
    InMemory(Bytes),
    /// Payload left in the source file
    FileSlice(FileSlice),
}

impl StreamBody {
    /// Length of the raw payload in bytes.
    pub fn len(&self) -> u64 {
        match self {
            StreamBody::InMemory(data) => data.len() as u64,
            StreamBody::FileSlice(slice) => slice.length,
        }
    }

    /// Whether the raw payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A COS stream: dictionary plus a tagged body.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Stream dictionary
    pub dict: Dictionary,
    body: StreamBody,
}

impl Stream {
    /// Create an in-memory stream. `/Length` is set from `data`.
    pub fn new(dict: Dictionary, data: impl Into<Bytes>) -> Self {
        let mut stream = Self {
            dict,
            body: StreamBody::InMemory(Bytes::new()),
        };
        stream.set_data(data);
        stream
    }

    /// Create a stream whose payload stays in `path` at `offset..offset + length`.
    pub fn referenced(dict: Dictionary, path: impl Into<Arc<Path>>, offset: u64, length: u64) -> Self {
        let mut stream = Self {
            dict,
            body: StreamBody::InMemory(Bytes::new()),
        };
        stream.set_reference(path, offset, length);
        stream
    }

    /// Point the stream at a slice of `path`. Also sets `/Length`.
    pub fn set_reference(&mut self, path: impl Into<Arc<Path>>, offset: u64, length: u64) {
        self.dict
            .insert("Length".to_string(), Object::Integer(length as i64));
        self.body = StreamBody::FileSlice(FileSlice {
            path: path.into(),
            offset,
            length,
        });
    }

    /// Replace the payload with in-memory data, dropping any file reference.
    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        let data = data.into();
        self.dict
            .insert("Length".to_string(), Object::Integer(data.len() as i64));
        self.body = StreamBody::InMemory(data);
    }

    /// Current body.
    pub fn body(&self) -> &StreamBody {
        &self.body
    }

    /// Whether the payload is a slice of the source file.
    pub fn is_referenced(&self) -> bool {
        matches!(self.body, StreamBody::FileSlice(_))
    }

    /// Length of the raw payload in bytes.
    pub fn raw_length(&self) -> u64 {
        self.body.len()
    }

    /// Open the raw (still encoded) payload.
    pub fn open_raw(&self) -> Result<Box<dyn Read + Send>> {
        match &self.body {
            StreamBody::InMemory(data) => Ok(Box::new(Cursor::new(data.clone()))),
            StreamBody::FileSlice(slice) => Ok(Box::new(SlicedFileReader::open(
                &slice.path,
                slice.offset,
                slice.length,
            )?)),
        }
    }

    /// Read the whole raw payload into memory.
    pub fn raw_bytes(&self) -> Result<Bytes> {
        match &self.body {
            StreamBody::InMemory(data) => Ok(data.clone()),
            StreamBody::FileSlice(slice) => {
                let mut buf = Vec::with_capacity(slice.length as usize);
                self.open_raw()?.read_to_end(&mut buf)?;
                if (buf.len() as u64) < slice.length {
                    return Err(Error::UnexpectedEof);
                }
                Ok(Bytes::from(buf))
            },
        }
    }

    /// Filter names declared in `/Filter`, in application order.
    pub fn filters(&self) -> Vec<String> {
        match self.dict.get("Filter") {
            Some(Object::Name(name)) => vec![name.clone()],
            Some(Object::Array(arr)) => arr
                .iter()
                .filter_map(|obj| obj.as_name().map(|s| s.to_string()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Open the payload with its filter chain applied.
    ///
    /// A lone `/FlateDecode` without a predictor is inflated on the fly;
    /// other chains are decoded in memory.
    pub fn open_decoded(&self) -> Result<Box<dyn Read + Send>> {
        let filters = self.filters();
        let params = DecodeParams::from_object(self.dict.get("DecodeParms"));

        if filters.is_empty() {
            return self.open_raw();
        }
        if filters.len() == 1 && filters[0] == "FlateDecode" && params.is_none() {
            return Ok(Box::new(ZlibDecoder::new(self.open_raw()?)));
        }

        let raw = self.raw_bytes()?;
        let decoded = decoders::decode_stream_with_params(&raw, &filters, params.as_ref())?;
        Ok(Box::new(Cursor::new(decoded)))
    }

    /// Decode the whole payload into memory.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let filters = self.filters();
        let params = DecodeParams::from_object(self.dict.get("DecodeParms"));
        let raw = self.raw_bytes()?;
        decoders::decode_stream_with_params(&raw, &filters, params.as_ref())
    }

    /// Start writing a new raw payload.
    ///
    /// The file reference is dropped immediately; the written bytes become
    /// the in-memory body (and `/Length`) when the writer is dropped.
    pub fn open_write(&mut self) -> StreamWriter<'_> {
        self.set_data(Bytes::new());
        StreamWriter {
            stream: self,
            buffer: Vec::new(),
        }
    }
}

/// Writer returned by [`Stream::open_write`].
pub struct StreamWriter<'a> {
    stream: &'a mut Stream,
    buffer: Vec<u8>,
}

impl Write for StreamWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for StreamWriter<'_> {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.buffer);
        self.stream.set_data(data);
    }
}

/// Byte reader over `length` bytes of a file starting at `offset`.
///
/// `index` counts bytes consumed since construction. Reads never return more
/// than [`available`](Self::available) bytes, and [`skip`](Self::skip) moves
/// the cursor without clamping it to the slice, so skipping past the end
/// leaves the reader exhausted.
#[derive(Debug)]
pub struct SlicedFileReader {
    file: BufReader<File>,
    index: u64,
    length: u64,
}

impl SlicedFileReader {
    /// Open `path` and position the reader at `offset`.
    pub fn open(path: &Path, offset: u64, length: u64) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = Self {
            file: BufReader::new(file),
            index: 0,
            length,
        };
        reader.skip(offset)?;
        reader.index = 0;
        Ok(reader)
    }

    /// Bytes left in the slice; 0 once the cursor reaches or passes the end.
    pub fn available(&self) -> u64 {
        self.length.saturating_sub(self.index)
    }

    /// Bytes consumed or skipped since construction.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Slice length.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the slice is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Advance the cursor by exactly `n` bytes.
    pub fn skip(&mut self, n: u64) -> io::Result<u64> {
        let delta = i64::try_from(n)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip distance too large"))?;
        self.file.seek_relative(delta)?;
        self.index = self.index.saturating_add(n);
        Ok(n)
    }

    /// Raw file access is refused: a caller positioning the handle itself
    /// would desynchronise the cursor from the slice bounds.
    pub fn file_channel(&self) -> Result<&File> {
        Err(Error::UnsupportedOperation(
            "Obtaining a file channel is not supported because a correct offset cannot be ensured"
                .to_string(),
        ))
    }
}

impl Read for SlicedFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.available();
        if available == 0 || buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(usize::try_from(available).unwrap_or(usize::MAX));
        let n = self.file.read(&mut buf[..len])?;
        self.index += n as u64;
        Ok(n)
    }
}
