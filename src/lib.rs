#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]
#![cfg_attr(test, allow(dead_code))]

//! # PDF Linearizer
//!
//! Rewrites PDF files as linearized ("Fast Web View") files, ISO 32000-1:2008
//! Annex F, without loading large stream payloads into memory.
//!
//! ## Core Features
//!
//! - **Lazy parsing**: stream bodies at or above a size threshold are kept as
//!   references into the source file instead of being read
//! - **Virtual output**: the result is a list of in-memory byte parts and
//!   source file slices, copied to the destination only at the end
//! - **Two-pass layout**: placeholder cross-reference streams are measured
//!   in a first pass and replaced in place in the second
//! - **Hint tables**: page offset and shared object hint tables for viewers
//!   that load pages incrementally
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_linearizer::{LazyParser, Linearizer, LinearizerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = LazyParser::parse("input.pdf")?;
//! let store = Linearizer::new(LinearizerConfig::default()).linearize(doc)?;
//!
//! let mut out = std::fs::File::create("output.pdf")?;
//! store.write_to(&mut out)?;
//! println!("{} bytes in {} parts", store.total_length(), store.len());
//! # Ok(())
//! # }
//! ```
//!
//! Or in one call:
//!
//! ```no_run
//! pdf_linearizer::linearize_file("input.pdf", "output.pdf")?;
//! # Ok::<(), pdf_linearizer::Error>(())
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade; install any logger (for
//! example `env_logger`) to see per-phase progress.

#![warn(missing_docs)]

// Error handling
pub mod error;

// COS object model and parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
/// Parser configuration options
pub mod parser_config;
pub mod stream;
pub mod xref;

// Stream decoders
pub mod decoders;

// Lazy loading of source documents
pub mod lazy_parser;

// Linearized output
pub mod writer;

// Re-exports
pub use document::CosDocument;
pub use error::{Error, Result};
pub use lazy_parser::LazyParser;
pub use object::{Dictionary, Object, ObjectRef};
pub use parser_config::ParserOptions;
pub use stream::{SlicedFileReader, Stream};
pub use writer::{linearize, linearize_file, Linearizer, LinearizerConfig, VirtualPart, WrittenObjectStore};
