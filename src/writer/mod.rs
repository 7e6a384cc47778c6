//! Linearized PDF output.
//!
//! ## Architecture
//!
//! ```text
//! CosDocument
//!     ↓
//! [Linearizer] (layout, measuring pass, final pass)
//!     ↓
//! [LinearizingWriter] (fixed numbering, padding, xref streams)
//!     ↓
//! [ObjectSerializer] (COS syntax)
//!     ↓
//! WrittenObjectStore (bytes parts + source file slices)
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use pdf_linearizer::writer::linearize_file;
//!
//! let written = linearize_file("input.pdf", "output.pdf")?;
//! println!("{} bytes", written);
//! # Ok::<(), pdf_linearizer::Error>(())
//! ```

pub mod hint;
mod linearizer;
mod linearizing_writer;
mod object_serializer;
mod virtual_part;
pub mod xref_stream;

pub use linearizer::{
    linearize_file, Linearizer, LinearizerConfig, DEFAULT_COALESCE_THRESHOLD, DEFAULT_MIN_XREF_OVERFLOW,
    DEFAULT_XREF_OVERFLOW_RATIO,
};
pub use linearizing_writer::LinearizingWriter;
pub use object_serializer::ObjectSerializer;
pub use virtual_part::{inflated_length_total, VirtualPart, WrittenObjectStore};

use crate::document::CosDocument;
use crate::error::Result;

/// Linearize `doc` with default settings.
pub fn linearize(doc: CosDocument) -> Result<WrittenObjectStore> {
    Linearizer::default().linearize(doc)
}
