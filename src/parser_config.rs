//! Parser configuration for lenient/strict parsing.

/// Default size at or above which stream payloads stay in the source file.
pub const DEFAULT_SLICE_THRESHOLD: u64 = 1024;

/// Options controlling how [`LazyParser`](crate::lazy_parser::LazyParser)
/// reads a file.
///
/// # Example
///
/// ```
/// use pdf_linearizer::parser_config::ParserOptions;
///
/// let strict = ParserOptions::strict();
/// assert!(strict.strict);
///
/// let custom = ParserOptions {
///     slice_threshold: 4096,
///     ..ParserOptions::lenient()
/// };
/// assert_eq!(custom.slice_threshold, 4096);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    /// Fail on spec violations (true) or recover with a warning (false).
    ///
    /// Lenient mode accepts a CR-only EOL after `stream`, `endobj` or
    /// `endstreamXYZ` in place of `endstream`, and scans for `endstream`
    /// when `/Length` is missing or wrong.
    pub strict: bool,

    /// Streams whose declared length is at least this many bytes are kept
    /// as file slices; shorter ones are read into memory.
    pub slice_threshold: u64,

    /// Maximum object nesting depth.
    ///
    /// PDF Spec: ISO 32000-1:2008, Section H.1 - Implementation Limits
    pub max_nesting: usize,

    /// Maximum decompressed size of xref and object streams, in bytes.
    ///
    /// Set to 0 to disable the check.
    pub max_decompressed_size: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: any violation is an error.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::lenient()
        }
    }

    /// Lenient mode: recover from common producer mistakes.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            slice_threshold: DEFAULT_SLICE_THRESHOLD,
            max_nesting: 100, // PDF spec recommended limit
            max_decompressed_size: 100 * 1024 * 1024, // 100 MB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_lenient() {
        let opts = ParserOptions::default();
        assert!(!opts.strict);
        assert_eq!(opts.slice_threshold, 1024);
    }

    #[test]
    fn test_strict_keeps_limits() {
        let opts = ParserOptions::strict();
        assert!(opts.strict);
        assert_eq!(opts.max_nesting, ParserOptions::lenient().max_nesting);
        assert_eq!(opts.slice_threshold, DEFAULT_SLICE_THRESHOLD);
    }
}
