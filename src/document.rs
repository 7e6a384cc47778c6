//! In-memory COS document.
//!
//! A [`CosDocument`] owns every indirect object of a PDF, keyed by
//! [`ObjectRef`], together with the trailer dictionary and header version.
//! It is produced by [`LazyParser`](crate::lazy_parser::LazyParser) and
//! consumed by the [`Linearizer`](crate::writer::Linearizer).

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// Maximum number of hops when following a chain of references
const MAX_RESOLVE_DEPTH: usize = 32;

/// Page attributes that may be inherited from an ancestor `/Pages` node
/// (ISO 32000-1:2008, Table 30).
pub const INHERITABLE_PAGE_ATTRIBUTES: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// Parsed PDF document: indirect objects plus trailer.
#[derive(Debug, Clone)]
pub struct CosDocument {
    version: (u8, u8),
    trailer: Dictionary,
    objects: BTreeMap<ObjectRef, Object>,
    source: Option<Arc<Path>>,
}

impl CosDocument {
    /// Create an empty document with the given header version and trailer.
    pub fn new(version: (u8, u8), trailer: Dictionary) -> Self {
        Self {
            version,
            trailer,
            objects: BTreeMap::new(),
            source: None,
        }
    }

    /// Record the file this document was parsed from.
    pub fn with_source(mut self, path: impl Into<Arc<Path>>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Source file, if the document was parsed from disk.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Header version as (major, minor).
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Override the header version.
    pub fn set_version(&mut self, version: (u8, u8)) {
        self.version = version;
    }

    /// Trailer dictionary.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Mutable trailer dictionary.
    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.trailer
    }

    /// Look up an indirect object.
    pub fn get(&self, key: ObjectRef) -> Option<&Object> {
        self.objects.get(&key)
    }

    /// Look up an indirect object for modification.
    pub fn get_mut(&mut self, key: ObjectRef) -> Option<&mut Object> {
        self.objects.get_mut(&key)
    }

    /// Insert or replace an indirect object.
    pub fn insert(&mut self, key: ObjectRef, object: Object) -> Option<Object> {
        self.objects.insert(key, object)
    }

    /// Remove an indirect object.
    pub fn remove(&mut self, key: ObjectRef) -> Option<Object> {
        self.objects.remove(&key)
    }

    /// Whether an indirect object exists.
    pub fn contains(&self, key: ObjectRef) -> bool {
        self.objects.contains_key(&key)
    }

    /// Number of indirect objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the document holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate objects in key order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectRef, &Object)> {
        self.objects.iter().map(|(k, v)| (*k, v))
    }

    /// Iterate objects mutably in key order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ObjectRef, &mut Object)> {
        self.objects.iter_mut().map(|(k, v)| (*k, v))
    }

    /// Keep only the objects for which `keep` returns true.
    pub fn retain<F: FnMut(ObjectRef, &Object) -> bool>(&mut self, mut keep: F) {
        self.objects.retain(|k, v| keep(*k, v));
    }

    /// Follow `object` through indirect references to a direct value.
    ///
    /// Returns `None` for a dangling reference or a reference cycle.
    pub fn resolve<'a>(&'a self, object: &'a Object) -> Option<&'a Object> {
        let mut current = object;
        for _ in 0..MAX_RESOLVE_DEPTH {
            match current {
                Object::Reference(r) => current = self.objects.get(r)?,
                other => return Some(other),
            }
        }
        log::warn!("Reference chain deeper than {} hops", MAX_RESOLVE_DEPTH);
        None
    }

    /// Resolve a dictionary entry of `dict`.
    pub fn resolve_entry<'a>(&'a self, dict: &'a Dictionary, key: &str) -> Option<&'a Object> {
        dict.get(key).and_then(|value| self.resolve(value))
    }

    /// Reference to the document catalog (`/Root`).
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer
            .get("Root")
            .and_then(|r| r.as_reference())
            .ok_or_else(|| Error::InvalidPdf("trailer missing /Root reference".to_string()))
    }

    /// Reference to the document information dictionary (`/Info`), if any.
    pub fn info_ref(&self) -> Option<ObjectRef> {
        self.trailer.get("Info").and_then(|r| r.as_reference())
    }

    /// Document catalog dictionary.
    pub fn catalog(&self) -> Result<&Dictionary> {
        let root = self.catalog_ref()?;
        let catalog = self
            .objects
            .get(&root)
            .ok_or(Error::ObjectNotFound(root.id, root.gen))?;
        catalog.as_dict().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: catalog.type_name().to_string(),
        })
    }

    /// Reference to the root of the page tree.
    pub fn pages_root_ref(&self) -> Result<ObjectRef> {
        self.catalog()?
            .get("Pages")
            .and_then(|p| p.as_reference())
            .ok_or_else(|| Error::InvalidPdf("catalog missing /Pages reference".to_string()))
    }

    /// Leaf pages in document order.
    pub fn page_refs(&self) -> Result<Vec<ObjectRef>> {
        let mut pages = Vec::new();
        self.walk_page_tree(|key, is_leaf| {
            if is_leaf {
                pages.push(key);
            }
        })?;
        Ok(pages)
    }

    /// Intermediate `/Pages` nodes, root first.
    pub fn page_tree_node_refs(&self) -> Result<Vec<ObjectRef>> {
        let mut nodes = Vec::new();
        self.walk_page_tree(|key, is_leaf| {
            if !is_leaf {
                nodes.push(key);
            }
        })?;
        Ok(nodes)
    }

    /// Depth-first walk of the page tree. Each node is visited once even if
    /// the tree contains a cycle; missing kids are skipped with a warning.
    fn walk_page_tree<F: FnMut(ObjectRef, bool)>(&self, mut visit: F) -> Result<()> {
        let root = self.pages_root_ref()?;
        let mut visited = HashSet::new();
        let mut stack = vec![root];

        while let Some(node_ref) = stack.pop() {
            if !visited.insert(node_ref) {
                log::warn!("Page tree node {} visited twice, skipping", node_ref);
                continue;
            }
            let Some(dict) = self.objects.get(&node_ref).and_then(|o| o.as_dict()) else {
                log::warn!("Page tree node {} is missing or not a dictionary", node_ref);
                continue;
            };

            let kids = dict.get("Kids").and_then(|k| self.resolve(k)).and_then(|k| k.as_array());
            let is_leaf = match dict.get("Type").and_then(|t| t.as_name()) {
                Some("Page") => true,
                Some("Pages") => false,
                _ => kids.is_none(),
            };
            visit(node_ref, is_leaf);

            if !is_leaf {
                if let Some(kids) = kids {
                    // Reverse so the first kid is popped first.
                    stack.extend(kids.iter().rev().filter_map(|k| k.as_reference()));
                }
            }
        }
        Ok(())
    }

    /// Find an inheritable attribute on `page` or its nearest ancestor.
    pub fn inherited_attribute(&self, page: ObjectRef, name: &str) -> Option<&Object> {
        let mut visited = HashSet::new();
        let mut current = page;
        while visited.insert(current) {
            let dict = self.objects.get(&current)?.as_dict()?;
            if let Some(value) = dict.get(name) {
                return Some(value);
            }
            current = dict.get("Parent")?.as_reference()?;
        }
        None
    }

    /// Copy inherited page attributes onto every page that lacks them and
    /// strip them from the intermediate `/Pages` nodes.
    ///
    /// Afterwards each page is self-contained, so the objects it needs can be
    /// found without walking `/Parent`.
    pub fn push_inherited_attributes_to_pages(&mut self) -> Result<()> {
        let pages = self.page_refs()?;
        let nodes = self.page_tree_node_refs()?;

        for page in &pages {
            let mut inherited = Vec::new();
            let own = self.objects.get(page).and_then(|o| o.as_dict());
            for name in INHERITABLE_PAGE_ATTRIBUTES {
                if own.is_some_and(|d| d.contains_key(name)) {
                    continue;
                }
                if let Some(value) = self.inherited_attribute(*page, name) {
                    inherited.push((name, value.clone()));
                }
            }
            if inherited.is_empty() {
                continue;
            }
            if let Some(dict) = self.objects.get_mut(page).and_then(|o| o.as_dict_mut()) {
                log::debug!("Page {} inherits {} attribute(s)", page, inherited.len());
                for (name, value) in inherited {
                    dict.insert(name.to_string(), value);
                }
            }
        }

        for node in nodes {
            if let Some(dict) = self.objects.get_mut(&node).and_then(|o| o.as_dict_mut()) {
                for name in INHERITABLE_PAGE_ATTRIBUTES {
                    dict.remove(name);
                }
            }
        }
        Ok(())
    }

    /// All objects transitively reachable from the trailer's `/Root` and `/Info`.
    pub fn reachable_refs(&self) -> HashSet<ObjectRef> {
        let mut reached = HashSet::new();
        let mut stack: Vec<ObjectRef> = Vec::new();
        Object::Dictionary(self.trailer.clone()).for_each_reference(&mut |key, r| {
            if key == "Root" || key == "Info" {
                stack.push(r);
            }
        });

        while let Some(key) = stack.pop() {
            let Some(object) = self.objects.get(&key) else {
                continue;
            };
            if !reached.insert(key) {
                continue;
            }
            object.for_each_reference(&mut |_, r| {
                if !reached.contains(&r) {
                    stack.push(r);
                }
            });
        }
        reached
    }
}

/// Parse the `%PDF-M.m` header.
///
/// The marker may be preceded by up to 1024 bytes of garbage, which some
/// producers emit and readers accept.
///
/// # Example
///
/// ```
/// use pdf_linearizer::document::parse_header;
/// use std::io::Cursor;
///
/// let mut cursor = Cursor::new(b"%PDF-1.7\n".to_vec());
/// assert_eq!(parse_header(&mut cursor).unwrap(), (1, 7));
/// ```
pub fn parse_header<R: Read + Seek>(reader: &mut R) -> Result<(u8, u8)> {
    reader.seek(SeekFrom::Start(0))?;
    let mut head = Vec::with_capacity(1032);
    reader.take(1032).read_to_end(&mut head)?;

    let start = head
        .windows(5)
        .position(|w| w == b"%PDF-")
        .filter(|&p| p <= 1024)
        .ok_or_else(|| {
            let shown = &head[..head.len().min(8)];
            Error::InvalidHeader(String::from_utf8_lossy(shown).into_owned())
        })?;

    let version = &head[start + 5..];
    match version {
        [major, b'.', minor, ..] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            if start > 0 {
                log::warn!("PDF header found at offset {} instead of 0", start);
            }
            Ok((major - b'0', minor - b'0'))
        },
        _ => Err(Error::InvalidHeader(String::from_utf8_lossy(
            &head[start..head.len().min(start + 8)],
        )
        .into_owned())),
    }
}
