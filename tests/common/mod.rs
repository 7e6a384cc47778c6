//! Fixture PDFs shared by the integration tests.

#![allow(dead_code)]

use pdf_linearizer::{CosDocument, LazyParser, Object, ObjectRef, ParserOptions, WrittenObjectStore};
use std::io::Write;
use tempfile::NamedTempFile;

pub const CATALOG: u32 = 1;
pub const PAGES: u32 = 2;
pub const INFO: u32 = 3;
pub const FIRST_FONT: u32 = 10;
pub const FIRST_PAGE: u32 = 100;
pub const FIRST_CONTENT: u32 = 200;
pub const FIRST_IMAGE: u32 = 300;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Writes objects one after another and finishes with a traditional xref.
pub struct PdfBuilder {
    out: Vec<u8>,
    offsets: Vec<(u32, usize)>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            out: b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec(),
            offsets: Vec::new(),
        }
    }

    pub fn position(&self) -> usize {
        self.out.len()
    }

    /// Object `num` with `body` between `obj` and `endobj`.
    pub fn object(&mut self, num: u32, body: &str) -> &mut Self {
        self.offsets.push((num, self.out.len()));
        self.out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", num, body).as_bytes());
        self
    }

    /// Bytes from `N 0 obj` up to the first payload byte.
    pub fn stream_header(num: u32, dict: &str, length: usize) -> String {
        format!("{} 0 obj\n<< {} /Length {} >>\nstream\n", num, dict, length)
    }

    /// Stream object `num`; returns the offset of its payload.
    pub fn stream(&mut self, num: u32, dict: &str, payload: &[u8]) -> usize {
        self.offsets.push((num, self.out.len()));
        self.out
            .extend_from_slice(Self::stream_header(num, dict, payload.len()).as_bytes());
        let offset = self.out.len();
        self.out.extend_from_slice(payload);
        self.out.extend_from_slice(b"\nendstream\nendobj\n");
        offset
    }

    /// Pad with a comment line so the next object starts at `position`.
    pub fn pad_to(&mut self, position: usize) -> &mut Self {
        let gap = position - self.out.len();
        assert!(gap >= 2);
        self.out.push(b'%');
        self.out.extend(std::iter::repeat(b' ').take(gap - 2));
        self.out.push(b'\n');
        self
    }

    pub fn finish(mut self, root: u32, info: Option<u32>) -> Vec<u8> {
        let size = self.offsets.iter().map(|(n, _)| *n).max().unwrap_or(0) + 1;
        let xref_pos = self.out.len();
        self.out
            .extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", size).as_bytes());
        for num in 1..size {
            match self.offsets.iter().find(|(n, _)| *n == num) {
                Some((_, off)) => self
                    .out
                    .extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes()),
                None => self.out.extend_from_slice(b"0000000000 65535 f \n"),
            }
        }
        let info = info.map(|i| format!("/Info {} 0 R ", i)).unwrap_or_default();
        self.out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root {} 0 R {}/ID [<0102> <0102>] >>\nstartxref\n{}\n%%EOF\n",
                size, root, info, xref_pos
            )
            .as_bytes(),
        );
        self.out
    }
}

/// Page description for [`document_pdf`].
#[derive(Debug, Clone, Default)]
pub struct PageSpec {
    /// Indices of the fonts used by the page
    pub fonts: Vec<u32>,
    /// Length of an image XObject private to the page
    pub image_len: Option<usize>,
}

pub fn image_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// Catalog, page tree, info, fonts `FIRST_FONT + i`, pages `FIRST_PAGE + i`,
/// contents `FIRST_CONTENT + i` and images `FIRST_IMAGE + i`.
pub fn document_pdf(pages: &[PageSpec]) -> Vec<u8> {
    let mut pdf = PdfBuilder::new();
    let kids: Vec<String> = (0..pages.len()).map(|i| format!("{} 0 R", FIRST_PAGE + i as u32)).collect();

    pdf.object(CATALOG, &format!("<< /Type /Catalog /Pages {} 0 R >>", PAGES));
    pdf.object(
        PAGES,
        &format!(
            "<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 612 792] >>",
            kids.join(" "),
            pages.len()
        ),
    );
    pdf.object(INFO, "<< /Producer (fixture) >>");

    let font_count = pages.iter().flat_map(|p| p.fonts.iter()).max().map_or(0, |m| m + 1);
    for i in 0..font_count {
        pdf.object(
            FIRST_FONT + i,
            &format!("<< /Type /Font /Subtype /Type1 /BaseFont /Font{} >>", i),
        );
    }

    for (i, page) in pages.iter().enumerate() {
        let i = i as u32;
        let fonts: Vec<String> = page
            .fonts
            .iter()
            .map(|f| format!("/F{} {} 0 R", f, FIRST_FONT + f))
            .collect();
        let xobject = page
            .image_len
            .map(|_| format!("/XObject << /Im0 {} 0 R >>", FIRST_IMAGE + i))
            .unwrap_or_default();
        pdf.object(
            FIRST_PAGE + i,
            &format!(
                "<< /Type /Page /Parent {} 0 R /Contents {} 0 R /Resources << /Font << {} >> {} >> >>",
                PAGES,
                FIRST_CONTENT + i,
                fonts.join(" "),
                xobject
            ),
        );
        let text = format!("BT /F0 12 Tf 72 720 Td (Page {}) Tj ET", i + 1);
        pdf.stream(FIRST_CONTENT + i, "", text.as_bytes());
        if let Some(len) = page.image_len {
            pdf.stream(
                FIRST_IMAGE + i,
                "/Type /XObject /Subtype /Image /Width 1 /Height 1 /BitsPerComponent 8 /ColorSpace /DeviceGray",
                &image_payload(len),
            );
        }
    }
    pdf.finish(CATALOG, Some(INFO))
}

pub fn write_temp(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

/// Write `store` to a temporary file.
pub fn materialize(store: &WrittenObjectStore) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    store.write_to(file.as_file_mut()).unwrap();
    file.flush().unwrap();
    file
}

pub fn reparse(file: &NamedTempFile) -> CosDocument {
    LazyParser::parse(file.path()).unwrap()
}

/// Offset of object `num` according to the file's xref.
pub fn xref_offset(file: &NamedTempFile, num: u32) -> u64 {
    let parser = LazyParser::open(file.path(), ParserOptions::default()).unwrap();
    parser.xref().get(num).unwrap().offset
}

/// Integer entry of the linearization dictionary (object 1).
pub fn lin_value(doc: &CosDocument, key: &str) -> i64 {
    let dict = doc.get(ObjectRef::new(1, 0)).and_then(|o| o.as_dict()).unwrap();
    dict.get(key).and_then(Object::as_integer).unwrap()
}

/// Output number of the object whose dictionary has `/BaseFont /name`.
pub fn find_font(doc: &CosDocument, name: &str) -> u32 {
    doc.iter()
        .find(|(_, o)| {
            o.as_dict()
                .and_then(|d| d.get("BaseFont"))
                .and_then(Object::as_name)
                == Some(name)
        })
        .map(|(k, _)| k.id)
        .unwrap()
}
