//! Parser adapter that leaves large stream payloads in the source file.
//!
//! Every indirect object is read through the cross-reference table. Stream
//! objects whose declared `/Length` reaches
//! [`ParserOptions::slice_threshold`] are not buffered: the parser records
//! where the payload begins, skips `/Length` bytes, checks for `endstream`
//! and builds a [`Stream::referenced`] over the source path. Smaller streams
//! are read into memory.
//!
//! # Example
//!
//! ```no_run
//! use pdf_linearizer::lazy_parser::LazyParser;
//!
//! let doc = LazyParser::parse("input.pdf")?;
//! println!("{} objects", doc.len());
//! # Ok::<(), pdf_linearizer::Error>(())
//! ```

use crate::document::{parse_header, CosDocument};
use crate::error::{Error, Result};
use crate::lexer::{is_regular, token, Token};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::{parse_indirect_header, parse_object_with_limit};
use crate::parser_config::ParserOptions;
use crate::stream::Stream;
use crate::xref::{
    decode_xref_stream, find_xref_offset, is_traditional_xref, parse_traditional_xref, CrossRefTable,
    XRefEntryType,
};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// Bytes read for an object before the window is grown
const INITIAL_WINDOW: usize = 4096;

/// Upper bound on `/Prev` hops
const MAX_XREF_CHAIN: usize = 64;

/// Reader over one source file.
pub struct LazyParser {
    path: Arc<Path>,
    reader: BufReader<File>,
    file_len: u64,
    options: ParserOptions,
    xref: CrossRefTable,
}

impl std::fmt::Debug for LazyParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyParser")
            .field("path", &self.path)
            .field("file_len", &self.file_len)
            .field("options", &self.options)
            .field("xref_entries", &self.xref.len())
            .finish()
    }
}

/// Outcome of checking the bytes after a stream payload.
enum StreamEnd {
    Valid,
    Mismatch(String),
}

impl LazyParser {
    /// Parse `path` with default (lenient) options.
    pub fn parse(path: impl AsRef<Path>) -> Result<CosDocument> {
        Self::parse_with_options(path, ParserOptions::default())
    }

    /// Parse `path` with explicit options.
    pub fn parse_with_options(path: impl AsRef<Path>, options: ParserOptions) -> Result<CosDocument> {
        Self::open(path, options)?.into_document()
    }

    /// Open `path` and load its cross-reference chain.
    pub fn open(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self> {
        let path: Arc<Path> = Arc::from(path.as_ref());
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        let mut parser = Self {
            path,
            reader: BufReader::new(file),
            file_len,
            options,
            xref: CrossRefTable::new(),
        };
        parser.load_xref_chain()?;
        Ok(parser)
    }

    /// Source file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merged cross-reference table.
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Read every live object into a [`CosDocument`].
    pub fn into_document(mut self) -> Result<CosDocument> {
        let version = parse_header(&mut self.reader)?;
        let trailer = self.xref.trailer().cloned().ok_or(Error::InvalidXref)?;
        if trailer.contains_key("Encrypt") {
            return Err(Error::Unsupported("encrypted documents".to_string()));
        }

        let mut doc = CosDocument::new(version, trailer).with_source(self.path.clone());
        let mut object_streams: BTreeMap<u32, Vec<u32>> = BTreeMap::new();

        for number in self.xref.object_numbers() {
            let Some(entry) = self.xref.get(number).cloned() else {
                continue;
            };
            match entry.entry_type {
                XRefEntryType::Free => {},
                XRefEntryType::Compressed => {
                    object_streams.entry(entry.offset as u32).or_default().push(number);
                },
                XRefEntryType::Uncompressed => match self.read_object_at(entry.offset) {
                    Ok((key, object)) if key.id == number => {
                        doc.insert(key, object);
                    },
                    Ok((key, _)) => {
                        let reason = format!("xref entry for object {} points at object {}", number, key);
                        if self.options.strict {
                            return Err(Error::ParseError {
                                offset: entry.offset,
                                reason,
                            });
                        }
                        log::warn!("{}, skipping", reason);
                    },
                    Err(e) if !self.options.strict => {
                        log::warn!("Failed to read object {} at offset {}: {}", number, entry.offset, e);
                    },
                    Err(e) => return Err(e),
                },
            }
        }

        for (stream_number, members) in object_streams {
            let generation = self.xref.get(stream_number).map_or(0, |e| e.generation);
            let stream = doc
                .get(ObjectRef::new(stream_number, generation))
                .and_then(|obj| obj.as_stream())
                .cloned();
            let Some(stream) = stream else {
                log::warn!("Object stream {} not found, {} objects lost", stream_number, members.len());
                continue;
            };
            let mut expanded =
                parse_object_stream(&stream, self.options.max_nesting, self.options.max_decompressed_size)?;
            for number in members {
                if let Some(object) = expanded.remove(&number) {
                    doc.insert(ObjectRef::new(number, 0), object);
                }
            }
        }

        log::debug!("Parsed {} objects from {}", doc.len(), self.path.display());
        Ok(doc)
    }

    /// Walk the xref sections from the newest back through `/Prev`.
    fn load_xref_chain(&mut self) -> Result<()> {
        let mut next = Some(find_xref_offset(&mut self.reader)?);
        let mut visited = HashSet::new();

        while let Some(offset) = next {
            if visited.len() >= MAX_XREF_CHAIN {
                log::warn!("Xref chain longer than {} sections, stopping", MAX_XREF_CHAIN);
                break;
            }
            if !visited.insert(offset) {
                log::warn!("Xref chain loops back to offset {}", offset);
                break;
            }

            let section = self.read_xref_section(offset)?;
            next = section
                .trailer()
                .and_then(|t| t.get("Prev"))
                .and_then(|p| p.as_integer())
                .and_then(|p| u64::try_from(p).ok());
            log::debug!("Xref section at {} has {} entries", offset, section.len());
            self.xref.merge_from(section);
        }
        Ok(())
    }

    fn read_xref_section(&mut self, offset: u64) -> Result<CrossRefTable> {
        if is_traditional_xref(&mut self.reader, offset)? {
            let mut table = parse_traditional_xref(&mut self.reader, offset, self.options.max_nesting)?;
            let hybrid = table
                .trailer()
                .and_then(|t| t.get("XRefStm"))
                .and_then(|o| o.as_integer())
                .and_then(|o| u64::try_from(o).ok());
            if let Some(stream_offset) = hybrid {
                table.merge_from(self.read_xref_stream(stream_offset)?);
            }
            Ok(table)
        } else {
            self.read_xref_stream(offset)
        }
    }

    fn read_xref_stream(&mut self, offset: u64) -> Result<CrossRefTable> {
        match self.read_object_at(offset)? {
            (_, Object::Stream(stream)) => decode_xref_stream(&stream),
            (key, other) => Err(Error::InvalidPdf(format!(
                "object {} at xref offset {} is a {}, not an xref stream",
                key,
                offset,
                other.type_name()
            ))),
        }
    }

    fn read_window(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(len);
        (&mut self.reader).take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Read the indirect object starting at `offset`.
    ///
    /// The read window grows until the object and its trailing `stream` or
    /// `endobj` keyword fit.
    pub fn read_object_at(&mut self, offset: u64) -> Result<(ObjectRef, Object)> {
        if offset >= self.file_len {
            return Err(Error::ParseError {
                offset,
                reason: format!("object offset beyond end of file ({} bytes)", self.file_len),
            });
        }

        let mut window = INITIAL_WINDOW;
        loop {
            let buf = self.read_window(offset, window)?;
            let at_eof = buf.len() < window;

            let (rest, key) = parse_indirect_header(&buf).map_err(|_| Error::ParseError {
                offset,
                reason: "expected 'N G obj'".to_string(),
            })?;
            let (rest, object) = match parse_object_with_limit(rest, self.options.max_nesting) {
                Ok(parsed) => parsed,
                Err(_) if !at_eof => {
                    window *= 4;
                    continue;
                },
                Err(_) => {
                    return Err(Error::ParseError {
                        offset,
                        reason: format!("invalid body for object {}", key),
                    })
                },
            };

            match token(rest) {
                Ok((after, Token::StreamStart)) => {
                    let Object::Dictionary(dict) = object else {
                        return Err(Error::ParseError {
                            offset,
                            reason: format!("object {} has 'stream' after a non-dictionary", key),
                        });
                    };
                    let keyword_end = offset + (buf.len() - after.len()) as u64;
                    let stream = self.read_stream(dict, keyword_end)?;
                    return Ok((key, Object::Stream(stream)));
                },
                Ok((_, Token::ObjEnd)) => return Ok((key, object)),
                Err(_) if !at_eof => {
                    window *= 4;
                    continue;
                },
                _ if self.options.strict => {
                    return Err(Error::ParseError {
                        offset,
                        reason: format!("missing 'endobj' after object {}", key),
                    })
                },
                _ => {
                    log::warn!("Missing 'endobj' after object {} at offset {}", key, offset);
                    return Ok((key, object));
                },
            }
        }
    }

    /// Build the stream whose `stream` keyword ends at `keyword_end`.
    fn read_stream(&mut self, mut dict: Dictionary, keyword_end: u64) -> Result<Stream> {
        let data_start = self.skip_stream_eol(keyword_end)?;

        let declared = match self.declared_length(&dict)? {
            Some(len) if data_start + len <= self.file_len => Some(len),
            Some(len) => {
                log::warn!(
                    "Stream at {} declares /Length {} past end of file ({} bytes)",
                    data_start,
                    len,
                    self.file_len
                );
                None
            },
            None => None,
        };

        let length = match declared {
            Some(len) => match self.check_stream_end(data_start + len)? {
                StreamEnd::Valid => len,
                StreamEnd::Mismatch(_) if !self.options.strict && len < self.options.slice_threshold => {
                    log::warn!("Stream at {} does not end after /Length {}, rescanning", data_start, len);
                    self.scan_for_endstream(data_start)?
                },
                StreamEnd::Mismatch(actual) => {
                    return Err(Error::ParseError {
                        offset: data_start + len,
                        reason: format!(
                            "expected='endstream' actual='{}' at offset {}",
                            actual,
                            data_start + len
                        ),
                    })
                },
            },
            None if self.options.strict => {
                return Err(Error::ParseError {
                    offset: data_start,
                    reason: "stream without a valid /Length".to_string(),
                })
            },
            None => {
                log::warn!("Stream at {} has no usable /Length, scanning for 'endstream'", data_start);
                self.scan_for_endstream(data_start)?
            },
        };

        if length >= self.options.slice_threshold {
            log::debug!("Referencing {} stream bytes at offset {}", length, data_start);
            return Ok(Stream::referenced(dict, self.path.clone(), data_start, length));
        }

        let data = self.read_window(data_start, length as usize)?;
        if (data.len() as u64) < length {
            return Err(Error::UnexpectedEof);
        }
        dict.remove("Length");
        Ok(Stream::new(dict, data))
    }

    /// Skip the EOL after the `stream` keyword and return the payload start.
    fn skip_stream_eol(&mut self, keyword_end: u64) -> Result<u64> {
        let eol = self.read_window(keyword_end, 2)?;
        match eol.as_slice() {
            [b'\r', b'\n', ..] => Ok(keyword_end + 2),
            [b'\n', ..] => Ok(keyword_end + 1),
            [b'\r', ..] if !self.options.strict => {
                log::warn!("CR-only end of line after 'stream' at offset {}", keyword_end);
                Ok(keyword_end + 1)
            },
            _ if !self.options.strict => {
                log::warn!("Missing end of line after 'stream' at offset {}", keyword_end);
                Ok(keyword_end)
            },
            _ => Err(Error::ParseError {
                offset: keyword_end,
                reason: "'stream' must be followed by CRLF or LF".to_string(),
            }),
        }
    }

    /// Declared `/Length`, resolving an indirect value through the xref.
    ///
    /// `dict` is left untouched; the stream constructors store the direct
    /// value.
    fn declared_length(&mut self, dict: &Dictionary) -> Result<Option<u64>> {
        match dict.get("Length") {
            Some(Object::Integer(len)) => Ok(u64::try_from(*len).ok()),
            Some(Object::Reference(key)) => {
                let entry = self
                    .xref
                    .get(key.id)
                    .filter(|e| e.entry_type == XRefEntryType::Uncompressed)
                    .cloned();
                let Some(entry) = entry else {
                    log::warn!("Indirect /Length {} is not an uncompressed object", key);
                    return Ok(None);
                };
                match self.read_object_at(entry.offset) {
                    Ok((_, Object::Integer(len))) => Ok(u64::try_from(len).ok()),
                    Ok((_, other)) => {
                        log::warn!("Indirect /Length {} is a {}", key, other.type_name());
                        Ok(None)
                    },
                    Err(e) if !self.options.strict => {
                        log::warn!("Failed to resolve indirect /Length {}: {}", key, e);
                        Ok(None)
                    },
                    Err(e) => Err(e),
                }
            },
            _ => Ok(None),
        }
    }

    /// Check the keyword at `pos`, just past the declared payload.
    fn check_stream_end(&mut self, pos: u64) -> Result<StreamEnd> {
        let probe = self.read_window(pos, 32)?;
        let trimmed: &[u8] = {
            let start = probe
                .iter()
                .position(|&b| !crate::lexer::is_whitespace(b))
                .unwrap_or(probe.len());
            &probe[start..]
        };

        if let Some(after) = trimmed.strip_prefix(b"endstream") {
            if after.first().is_some_and(|&b| is_regular(b)) {
                if self.options.strict {
                    return Ok(StreamEnd::Mismatch(String::from_utf8_lossy(trimmed).into_owned()));
                }
                log::warn!("Near-miss 'endstream' keyword at offset {}, accepting", pos);
            }
            return Ok(StreamEnd::Valid);
        }
        if trimmed.starts_with(b"endobj") {
            if self.options.strict {
                return Ok(StreamEnd::Mismatch("endobj".to_string()));
            }
            log::warn!("Found 'endobj' where 'endstream' was expected at offset {}", pos);
            return Ok(StreamEnd::Valid);
        }

        let shown = &trimmed[..trimmed.len().min(16)];
        Ok(StreamEnd::Mismatch(String::from_utf8_lossy(shown).into_owned()))
    }

    /// Find the next `endstream` after `data_start` and return the payload
    /// length, excluding the EOL that precedes the keyword.
    fn scan_for_endstream(&mut self, data_start: u64) -> Result<u64> {
        const CHUNK: usize = 64 * 1024;
        const KEYWORD: &[u8] = b"endstream";

        let mut pos = data_start;
        let mut tail: Vec<u8> = Vec::new();
        loop {
            let chunk = self.read_window(pos, CHUNK)?;
            if chunk.is_empty() {
                return Err(Error::ParseError {
                    offset: data_start,
                    reason: "no 'endstream' before end of file".to_string(),
                });
            }
            let base = pos - tail.len() as u64;
            tail.extend_from_slice(&chunk);
            if let Some(found) = tail.windows(KEYWORD.len()).position(|w| w == KEYWORD) {
                let mut end = base + found as u64;
                let before = &tail[..found];
                if before.ends_with(b"\r\n") {
                    end -= 2;
                } else if before.ends_with(b"\n") || before.ends_with(b"\r") {
                    end -= 1;
                }
                return Ok(end.max(data_start) - data_start);
            }
            pos += chunk.len() as u64;
            let keep = tail.len().min(KEYWORD.len() - 1);
            tail.drain(..tail.len() - keep);
        }
    }
}
