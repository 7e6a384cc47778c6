//! Linearization orchestrator.
//!
//! [`Linearizer::linearize`] turns a [`CosDocument`] into a linearized
//! ("Fast Web View") file, ISO 32000-1:2008 Annex F. The output layout is:
//!
//! ```text
//! %PDF-1.x header
//! 1 0 obj   linearization dictionary
//! 2 0 obj   first-page xref stream (objects 1 .. first page section)
//! startxref (main xref) %%EOF
//! 3 0 obj   catalog
//! 4 0 obj   first page, then every object it needs
//! ...       pages 2..N, each followed by its private objects
//! ...       objects shared by several later pages
//! ...       everything else (page tree, outlines, info)
//! H 0 obj   primary hint stream
//! M 0 obj   main xref stream (object 0 and the remainder)
//! startxref (first-page xref) %%EOF
//! ```
//!
//! The work runs in four phases:
//!
//! - **A** partitions the objects into the first-page set and the remainder
//!   and numbers them in output order.
//! - **B** writes everything once with placeholder values and records the
//!   offsets of every region.
//! - **C** writes everything again with the real values, padding each region
//!   up to its measured end.
//! - **D** hands the collected virtual parts to the caller.
//!
//! # Example
//!
//! ```no_run
//! use pdf_linearizer::{LazyParser, Linearizer};
//!
//! let doc = LazyParser::parse("input.pdf")?;
//! let store = Linearizer::default().linearize(doc)?;
//! let mut out = std::fs::File::create("linearized.pdf")?;
//! store.write_to(&mut out)?;
//! # Ok::<(), pdf_linearizer::Error>(())
//! ```

use super::hint::{HintTables, PageHint, SharedGroupHint};
use super::linearizing_writer::LinearizingWriter;
use super::virtual_part::WrittenObjectStore;
use crate::document::CosDocument;
use crate::error::{Error, Result};
use crate::lazy_parser::LazyParser;
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser_config::ParserOptions;
use crate::stream::Stream;
use indexmap::IndexSet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default size at which the writer cuts its buffer into a part.
pub const DEFAULT_COALESCE_THRESHOLD: usize = 128 * 1024;

/// Default share of a dummy xref stream's length added as padding.
pub const DEFAULT_XREF_OVERFLOW_RATIO: f64 = 0.003;

/// Default minimum padding after a dummy xref stream.
pub const DEFAULT_MIN_XREF_OVERFLOW: u64 = 11;

const LINEARIZATION_DICT_NUMBER: u32 = 1;
const FIRST_PAGE_XREF_NUMBER: u32 = 2;
const FIRST_SECTION_NUMBER: u32 = 3;

/// `/Prev` of the dummy first-page xref; as wide as any 10-digit offset.
const PREV_PLACEHOLDER: i64 = 9_999_999_999;

/// Cross-reference streams need PDF 1.5.
const MIN_OUTPUT_VERSION: (u8, u8) = (1, 5);

/// Linearizer settings.
///
/// # Example
///
/// ```
/// use pdf_linearizer::LinearizerConfig;
///
/// let config = LinearizerConfig {
///     rng_seed: Some(42),
///     ..LinearizerConfig::default()
/// };
/// assert_eq!(config.coalesce_threshold, 128 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearizerConfig {
    /// Buffer size at which the writer closes a bytes part
    pub coalesce_threshold: usize,
    /// Padding after a dummy xref stream, as a share of its length
    pub xref_overflow_ratio: f64,
    /// Minimum padding after a dummy xref stream, in bytes
    pub min_xref_overflow: u64,
    /// Seed for the placeholder xref offsets; drawn from the OS when `None`
    pub rng_seed: Option<u64>,
    /// Compress xref streams with FlateDecode
    pub compress_xref: bool,
    /// Header version; defaults to the source version (at least 1.5)
    pub version: Option<(u8, u8)>,
}

impl Default for LinearizerConfig {
    fn default() -> Self {
        Self {
            coalesce_threshold: DEFAULT_COALESCE_THRESHOLD,
            xref_overflow_ratio: DEFAULT_XREF_OVERFLOW_RATIO,
            min_xref_overflow: DEFAULT_MIN_XREF_OVERFLOW,
            rng_seed: None,
            compress_xref: true,
            version: None,
        }
    }
}

/// A page after the first with the objects only it uses.
#[derive(Debug, Clone)]
struct PageSection {
    page: ObjectRef,
    private: Vec<ObjectRef>,
    /// Everything the page needs, page object first
    closure: IndexSet<ObjectRef>,
}

/// Output order and numbering produced by phase A.
#[derive(Debug)]
struct Layout {
    catalog: ObjectRef,
    /// Page 1 and everything it needs, page object first
    first_page_closure: IndexSet<ObjectRef>,
    /// Catalog followed by `first_page_closure`
    first_page: Vec<ObjectRef>,
    later_pages: Vec<PageSection>,
    shared: IndexSet<ObjectRef>,
    /// Pages 2..N with private objects, shared objects, then the rest
    remainder: Vec<ObjectRef>,
    numbering: HashMap<ObjectRef, u32>,
}

impl Layout {
    fn page_count(&self) -> usize {
        1 + self.later_pages.len()
    }

    fn number(&self, key: ObjectRef) -> Result<u32> {
        self.numbering
            .get(&key)
            .copied()
            .ok_or(Error::ObjectNotFound(key.id, key.gen))
    }

    fn remainder_start(&self) -> u32 {
        FIRST_SECTION_NUMBER + self.first_page.len() as u32
    }

    fn hint_number(&self) -> u32 {
        self.remainder_start() + self.remainder.len() as u32
    }

    fn main_xref_number(&self) -> u32 {
        self.hint_number() + 1
    }

    fn size(&self) -> u32 {
        self.main_xref_number() + 1
    }

    /// Linearization dictionary, both xref streams and the first section.
    fn first_page_ranges(&self) -> [(u32, u32); 1] {
        [(LINEARIZATION_DICT_NUMBER, self.first_page.len() as u32 + 2)]
    }

    /// Free object 0, the remainder, the hint stream and the main xref.
    fn main_ranges(&self) -> [(u32, u32); 2] {
        [(0, 1), (self.remainder_start(), self.remainder.len() as u32 + 2)]
    }
}

/// Offsets recorded by the measuring pass.
#[derive(Debug)]
struct Measurements {
    first_page_xref_offset: u64,
    first_page_startxref_pos: u64,
    end_of_first_page: u64,
    hint_offset: u64,
    hint_length: u64,
    hint_stream: Object,
    main_xref_offset: u64,
    main_startxref_pos: u64,
    total_length: u64,
}

/// Linearizes documents.
#[derive(Debug, Clone, Default)]
pub struct Linearizer {
    config: LinearizerConfig,
    parser_options: ParserOptions,
}

impl Linearizer {
    /// Create a linearizer with `config`.
    pub fn new(config: LinearizerConfig) -> Self {
        Self {
            config,
            parser_options: ParserOptions::default(),
        }
    }

    /// Options used by [`linearize_path`](Self::linearize_path) to parse its input.
    pub fn with_parser_options(mut self, options: ParserOptions) -> Self {
        self.parser_options = options;
        self
    }

    /// Settings in use.
    pub fn config(&self) -> &LinearizerConfig {
        &self.config
    }

    /// Linearize `doc` and return the output as virtual parts.
    ///
    /// Objects unreachable from the trailer are dropped and references to
    /// missing objects become `null`. Fails with
    /// [`Error::LayoutUnderEstimate`] if a region grew between the two passes.
    pub fn linearize(&self, mut doc: CosDocument) -> Result<WrittenObjectStore> {
        let layout = plan_layout(&mut doc)?;
        log::info!(
            "Linearizing {} pages: {} first-page objects, {} remaining, {} shared",
            layout.page_count(),
            layout.first_page.len(),
            layout.remainder.len(),
            layout.shared.len()
        );

        let version = self.output_version(&doc);
        let mut writer = LinearizingWriter::new(layout.numbering.clone(), self.config);
        let mut rng = match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let measured = self.measure(&doc, &layout, version, &mut writer, &mut rng)?;
        log::debug!(
            "Pass 1: E={} H=[{} {}] T={} L={}",
            measured.end_of_first_page,
            measured.hint_offset,
            measured.hint_length,
            measured.main_xref_offset,
            measured.total_length
        );

        let discarded = writer.take_parts();
        log::debug!("Discarding {} parts from the measuring pass", discarded.len());
        drop(discarded);

        self.emit(&doc, &layout, version, &mut writer, &measured)?;
        let store = writer.close();
        log::info!("Linearized output: {} bytes in {} parts", store.total_length(), store.len());
        Ok(store)
    }

    /// Parse `input`, linearize it and write the result to `output`.
    ///
    /// Returns the number of bytes written. `output` must not be `input`:
    /// large streams are copied from the source while the output is written.
    pub fn linearize_path(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<u64> {
        let (input, output) = (input.as_ref(), output.as_ref());
        if let (Ok(a), Ok(b)) = (input.canonicalize(), output.canonicalize()) {
            if a == b {
                return Err(Error::UnsupportedOperation(format!(
                    "output {} would overwrite the source file",
                    output.display()
                )));
            }
        }

        let doc = LazyParser::parse_with_options(input, self.parser_options)?;
        let store = self.linearize(doc)?;
        write_output(&store, output)?;
        Ok(store.total_length())
    }

    fn output_version(&self, doc: &CosDocument) -> (u8, u8) {
        let requested = self.config.version.unwrap_or_else(|| doc.version());
        if requested < MIN_OUTPUT_VERSION {
            log::debug!(
                "Raising header version from {}.{} to {}.{} for xref streams",
                requested.0,
                requested.1,
                MIN_OUTPUT_VERSION.0,
                MIN_OUTPUT_VERSION.1
            );
            return MIN_OUTPUT_VERSION;
        }
        requested
    }

    /// Phase B: write with placeholders and record where everything lands.
    fn measure(
        &self,
        doc: &CosDocument,
        layout: &Layout,
        version: (u8, u8),
        writer: &mut LinearizingWriter,
        rng: &mut StdRng,
    ) -> Result<Measurements> {
        writer.write_header(version)?;
        writer.write_raw_object(LINEARIZATION_DICT_NUMBER, &linearization_dict(layout, None)?)?;

        let first_trailer = trailer(doc, layout, Some(PREV_PLACEHOLDER))?;
        let first_page_xref_offset =
            writer.write_dummy_xref(FIRST_PAGE_XREF_NUMBER, &first_trailer, &layout.first_page_ranges(), rng)?;
        let first_page_startxref_pos = writer.current_pos();
        writer.write_startxref(0)?;

        write_objects(doc, writer, &layout.first_page)?;
        let end_of_first_page = writer.current_pos();
        write_objects(doc, writer, &layout.remainder)?;

        let hint_offset = writer.current_pos();
        let hint_stream = build_hint_stream(doc, layout, writer, end_of_first_page, hint_offset)?;
        writer.write_numbered(layout.hint_number(), &hint_stream)?;
        let hint_length = writer.current_pos() - hint_offset;

        let main_trailer = trailer(doc, layout, None)?;
        let main_xref_offset =
            writer.write_dummy_xref(layout.main_xref_number(), &main_trailer, &layout.main_ranges(), rng)?;
        let main_startxref_pos = writer.current_pos();
        writer.write_startxref(first_page_xref_offset)?;

        Ok(Measurements {
            first_page_xref_offset,
            first_page_startxref_pos,
            end_of_first_page,
            hint_offset,
            hint_length,
            hint_stream,
            main_xref_offset,
            main_startxref_pos,
            total_length: writer.current_pos(),
        })
    }

    /// Phase C: write again with the measured values.
    fn emit(
        &self,
        doc: &CosDocument,
        layout: &Layout,
        version: (u8, u8),
        writer: &mut LinearizingWriter,
        m: &Measurements,
    ) -> Result<()> {
        writer.write_header(version)?;
        writer.remove_written_object(LINEARIZATION_DICT_NUMBER);
        writer.write_raw_object(LINEARIZATION_DICT_NUMBER, &linearization_dict(layout, Some(m))?)?;

        writer.remove_written_object(FIRST_PAGE_XREF_NUMBER);
        let first_trailer = trailer(doc, layout, Some(m.main_xref_offset as i64))?;
        let offset = writer.write_xref(FIRST_PAGE_XREF_NUMBER, &first_trailer, &layout.first_page_ranges())?;
        if offset != m.first_page_xref_offset {
            return Err(Error::LayoutUnderEstimate {
                current: offset,
                requested: m.first_page_xref_offset,
            });
        }
        writer.fill_until(m.first_page_startxref_pos)?;
        writer.write_startxref(m.main_xref_offset)?;

        rewrite_objects(doc, layout, writer, &layout.first_page)?;
        writer.fill_until(m.end_of_first_page)?;
        rewrite_objects(doc, layout, writer, &layout.remainder)?;

        writer.fill_until(m.hint_offset)?;
        writer.remove_written_object(layout.hint_number());
        writer.write_numbered(layout.hint_number(), &m.hint_stream)?;
        writer.fill_until(m.hint_offset + m.hint_length)?;

        writer.remove_written_object(layout.main_xref_number());
        let main_trailer = trailer(doc, layout, None)?;
        writer.write_xref(layout.main_xref_number(), &main_trailer, &layout.main_ranges())?;
        writer.fill_until(m.main_startxref_pos)?;
        writer.write_startxref(m.first_page_xref_offset)?;

        let end = writer.current_pos();
        if end != m.total_length {
            return Err(Error::LayoutUnderEstimate {
                current: end,
                requested: m.total_length,
            });
        }
        Ok(())
    }
}

/// Linearize `input` into `output` with default settings.
pub fn linearize_file(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<u64> {
    Linearizer::default().linearize_path(input, output)
}

/// Sibling of `output` that receives the bytes until they are complete.
fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("linearized"));
    name.push(".partial");
    output.with_file_name(name)
}

/// Write `store` next to `output` and rename it into place once complete.
///
/// On failure neither `output` nor the partial file is left behind.
fn write_output(store: &WrittenObjectStore, output: &Path) -> Result<()> {
    let partial = partial_path(output);
    let written = File::create(&partial).map_err(Error::from).and_then(|file| {
        let mut sink = BufWriter::new(file);
        store.write_to(&mut sink)?;
        sink.flush()?;
        Ok(())
    });
    let renamed = written.and_then(|()| std::fs::rename(&partial, output).map_err(Error::from));
    if let Err(e) = renamed {
        if let Err(cleanup) = std::fs::remove_file(&partial) {
            log::debug!("Could not remove {}: {}", partial.display(), cleanup);
        }
        return Err(e);
    }
    Ok(())
}

fn write_objects(doc: &CosDocument, writer: &mut LinearizingWriter, keys: &[ObjectRef]) -> Result<()> {
    for &key in keys {
        let object = doc.get(key).ok_or(Error::ObjectNotFound(key.id, key.gen))?;
        writer.write_object(key, object)?;
    }
    Ok(())
}

fn rewrite_objects(
    doc: &CosDocument,
    layout: &Layout,
    writer: &mut LinearizingWriter,
    keys: &[ObjectRef],
) -> Result<()> {
    for &key in keys {
        writer.remove_written_object(layout.number(key)?);
    }
    write_objects(doc, writer, keys)
}

/// Body of object 1. Offsets use 10 digits so both passes have the same width.
fn linearization_dict(layout: &Layout, m: Option<&Measurements>) -> Result<Vec<u8>> {
    let (e, h_offset, h_length, l, t) = m
        .map(|m| (m.end_of_first_page, m.hint_offset, m.hint_length, m.total_length, m.main_xref_offset))
        .unwrap_or_default();
    let first_page = layout
        .first_page_closure
        .first()
        .copied()
        .ok_or_else(|| Error::InvalidPdf("document has no pages".to_string()))?;
    Ok(format!(
        "<</E {:010}/H [{:010} {:010}]/L {:010}/Linearized 1/N {}/O {}/T {:010}>>",
        e,
        h_offset,
        h_length,
        l,
        layout.page_count(),
        layout.number(first_page)?,
        t
    )
    .into_bytes())
}

/// Trailer entries of an xref stream, with references in output numbering.
fn trailer(doc: &CosDocument, layout: &Layout, prev: Option<i64>) -> Result<Dictionary> {
    let mut dict = Dictionary::new();
    dict.insert("Size".to_string(), Object::Integer(layout.size().into()));
    dict.insert(
        "Root".to_string(),
        Object::Reference(ObjectRef::new(layout.number(layout.catalog)?, 0)),
    );
    if let Some(number) = doc.info_ref().and_then(|info| layout.numbering.get(&info)) {
        dict.insert("Info".to_string(), Object::Reference(ObjectRef::new(*number, 0)));
    }
    match doc.trailer().get("ID") {
        Some(Object::Array(ids)) if ids.iter().all(|id| matches!(id, Object::String(_))) => {
            dict.insert("ID".to_string(), Object::Array(ids.clone()));
        },
        Some(other) => log::warn!("Ignoring malformed trailer /ID ({})", other.type_name()),
        None => {},
    }
    if let Some(prev) = prev {
        dict.insert("Prev".to_string(), Object::Integer(prev));
    }
    Ok(dict)
}

/// Phase A: prune, partition and number the objects.
fn plan_layout(doc: &mut CosDocument) -> Result<Layout> {
    doc.push_inherited_attributes_to_pages()?;

    let reachable = doc.reachable_refs();
    let before = doc.len();
    doc.retain(|key, _| reachable.contains(&key));
    if doc.len() < before {
        log::debug!("Dropped {} unreachable objects", before - doc.len());
    }
    null_dangling_references(doc);

    let catalog = doc.catalog_ref()?;
    if !doc.contains(catalog) {
        return Err(Error::ObjectNotFound(catalog.id, catalog.gen));
    }
    let pages = doc.page_refs()?;
    let Some((&first, later)) = pages.split_first() else {
        return Err(Error::InvalidPdf("document has no pages".to_string()));
    };

    let page_set: HashSet<ObjectRef> = pages.iter().copied().collect();
    let mut barriers: HashSet<ObjectRef> = doc.page_tree_node_refs()?.into_iter().collect();
    barriers.insert(catalog);

    let first_page_closure = page_closure(doc, first, &page_set, &barriers);
    let mut first_section: IndexSet<ObjectRef> = IndexSet::with_capacity(first_page_closure.len() + 1);
    first_section.insert(catalog);
    first_section.extend(first_page_closure.iter().copied());

    let closures: Vec<(ObjectRef, IndexSet<ObjectRef>)> = later
        .iter()
        .map(|&page| (page, page_closure(doc, page, &page_set, &barriers)))
        .collect();

    let mut usage: HashMap<ObjectRef, usize> = HashMap::new();
    for (_, closure) in &closures {
        for key in closure.iter().skip(1).filter(|k| !first_section.contains(*k)) {
            *usage.entry(*key).or_default() += 1;
        }
    }

    let shared: IndexSet<ObjectRef> = closures
        .iter()
        .flat_map(|(_, closure)| closure.iter().skip(1))
        .filter(|k| usage.get(*k).is_some_and(|&n| n > 1))
        .copied()
        .collect();

    let later_pages: Vec<PageSection> = closures
        .into_iter()
        .map(|(page, closure)| {
            let private = closure
                .iter()
                .skip(1)
                .filter(|k| usage.get(*k) == Some(&1))
                .copied()
                .collect();
            PageSection { page, private, closure }
        })
        .collect();

    let mut placed: HashSet<ObjectRef> = first_section.iter().copied().collect();
    let mut remainder = Vec::with_capacity(doc.len().saturating_sub(placed.len()));
    for section in &later_pages {
        for &key in std::iter::once(&section.page).chain(&section.private) {
            if placed.insert(key) {
                remainder.push(key);
            }
        }
    }
    for &key in &shared {
        if placed.insert(key) {
            remainder.push(key);
        }
    }
    let other: Vec<ObjectRef> = doc.iter().map(|(k, _)| k).filter(|k| !placed.contains(k)).collect();
    remainder.extend(other);

    let numbering: HashMap<ObjectRef, u32> = first_section
        .iter()
        .chain(&remainder)
        .zip(FIRST_SECTION_NUMBER..)
        .map(|(key, number)| (*key, number))
        .collect();

    Ok(Layout {
        catalog,
        first_page_closure,
        first_page: first_section.into_iter().collect(),
        later_pages,
        shared,
        remainder,
        numbering,
    })
}

/// Replace references to missing objects with `null`.
fn null_dangling_references(doc: &mut CosDocument) {
    let present: HashSet<ObjectRef> = doc.iter().map(|(k, _)| k).collect();
    let mut nulled = 0usize;
    for (_, object) in doc.iter_mut() {
        object.map_references(&mut |r| {
            if present.contains(&r) {
                Object::Reference(r)
            } else {
                nulled += 1;
                Object::Null
            }
        });
    }
    if nulled > 0 {
        log::warn!("Replaced {} references to missing objects with null", nulled);
    }
}

/// Objects needed to render `page`, page object first, in depth-first order.
///
/// The walk does not follow `/Parent`, and stops at other pages, page tree
/// nodes and the catalog.
fn page_closure(
    doc: &CosDocument,
    page: ObjectRef,
    pages: &HashSet<ObjectRef>,
    barriers: &HashSet<ObjectRef>,
) -> IndexSet<ObjectRef> {
    let mut closure = IndexSet::new();
    let mut stack = vec![page];

    while let Some(key) = stack.pop() {
        if closure.contains(&key) {
            continue;
        }
        let Some(object) = doc.get(key) else {
            continue;
        };
        closure.insert(key);

        let mut children = Vec::new();
        object.for_each_reference(&mut |name, r| {
            if name == "Parent" || r == page || pages.contains(&r) || barriers.contains(&r) {
                return;
            }
            if !closure.contains(&r) {
                children.push(r);
            }
        });
        stack.extend(children.into_iter().rev());
    }
    closure
}

/// Content streams of `page`.
fn contents_of(doc: &CosDocument, page: ObjectRef) -> Vec<ObjectRef> {
    let Some(contents) = doc.get(page).and_then(|p| p.as_dict()).and_then(|d| d.get("Contents")) else {
        return Vec::new();
    };
    match contents {
        Object::Reference(r) => match doc.get(*r) {
            Some(Object::Array(items)) => items.iter().filter_map(|o| o.as_reference()).collect(),
            Some(_) => vec![*r],
            None => Vec::new(),
        },
        Object::Array(items) => items.iter().filter_map(|o| o.as_reference()).collect(),
        _ => Vec::new(),
    }
}

/// Byte length of every written object: the distance to the next object.
fn object_lengths(writer: &LinearizingWriter, end: u64) -> HashMap<u32, u64> {
    let mut entries: Vec<(u64, u32)> = writer
        .xref_entries()
        .into_iter()
        .filter(|e| !e.free && e.offset < end)
        .map(|e| (e.offset, e.number))
        .collect();
    entries.sort_unstable();

    let mut lengths = HashMap::with_capacity(entries.len());
    for (i, &(offset, number)) in entries.iter().enumerate() {
        let next = entries.get(i + 1).map_or(end, |&(o, _)| o);
        lengths.insert(number, next - offset);
    }
    lengths
}

/// Build the primary hint stream from the offsets of the measuring pass.
fn build_hint_stream(
    doc: &CosDocument,
    layout: &Layout,
    writer: &LinearizingWriter,
    end_of_first_page: u64,
    hint_offset: u64,
) -> Result<Object> {
    let lengths = object_lengths(writer, hint_offset);
    let offset_of = |key: ObjectRef| -> Result<u64> {
        writer
            .entry_offset(layout.number(key)?)
            .ok_or(Error::ObjectNotFound(key.id, key.gen))
    };
    let length_of = |key: ObjectRef| -> Result<u64> {
        Ok(lengths.get(&layout.number(key)?).copied().unwrap_or(0))
    };
    let content_hint = |page: ObjectRef, section: &dyn Fn(ObjectRef) -> bool| -> Result<(u64, u64)> {
        let page_offset = offset_of(page)?;
        let contents: Vec<ObjectRef> = contents_of(doc, page).into_iter().filter(|c| section(*c)).collect();
        let Some(&first) = contents.first() else {
            return Ok((0, 0));
        };
        let offset = offset_of(first)?.saturating_sub(page_offset);
        let length = contents.iter().map(|&c| length_of(c)).sum::<Result<u64>>()?;
        Ok((offset, length))
    };

    let first_page = layout
        .first_page_closure
        .first()
        .copied()
        .ok_or_else(|| Error::InvalidPdf("document has no pages".to_string()))?;
    let first_page_location = offset_of(first_page)?;
    let (content_offset, content_length) = content_hint(first_page, &|c| layout.first_page_closure.contains(&c))?;
    let mut pages = vec![PageHint {
        object_count: layout.first_page_closure.len() as u32,
        length: end_of_first_page.saturating_sub(first_page_location),
        shared_ids: Vec::new(),
        content_offset,
        content_length,
    }];

    let first_page_count = layout.first_page_closure.len();
    let shared_id = |key: &ObjectRef| -> Option<u32> {
        layout
            .first_page_closure
            .get_index_of(key)
            .or_else(|| layout.shared.get_index_of(key).map(|i| i + first_page_count))
            .map(|i| i as u32)
    };

    for section in &layout.later_pages {
        let mut length = length_of(section.page)?;
        for &key in &section.private {
            length += length_of(key)?;
        }
        let own: HashSet<ObjectRef> = section.private.iter().copied().collect();
        let (content_offset, content_length) = content_hint(section.page, &|c| own.contains(&c))?;
        pages.push(PageHint {
            object_count: 1 + section.private.len() as u32,
            length,
            shared_ids: section.closure.iter().skip(1).filter_map(|k| shared_id(k)).collect(),
            content_offset,
            content_length,
        });
    }

    let group = |key: ObjectRef| -> Result<SharedGroupHint> {
        Ok(SharedGroupHint {
            length: length_of(key)?,
            object_count: 1,
        })
    };
    let first_page_groups = layout
        .first_page_closure
        .iter()
        .map(|&k| group(k))
        .collect::<Result<Vec<_>>>()?;
    let shared_groups = layout.shared.iter().map(|&k| group(k)).collect::<Result<Vec<_>>>()?;
    let (first_shared_object, first_shared_location) = match layout.shared.first() {
        Some(&key) => (layout.number(key)?, offset_of(key)?),
        None => (0, 0),
    };

    let tables = HintTables {
        first_page_object_location: first_page_location,
        pages,
        first_page_groups,
        first_shared_object,
        first_shared_location,
        shared_groups,
    };
    let encoded = tables.encode()?;
    log::debug!(
        "Hint stream: {} bytes, shared table at {}",
        encoded.data.len(),
        encoded.shared_table_offset
    );

    let mut dict = Dictionary::new();
    dict.insert("S".to_string(), Object::Integer(encoded.shared_table_offset as i64));
    Ok(Object::Stream(Stream::new(dict, encoded.data)))
}
