//! End-to-end linearization: parse a fixture, linearize it, read it back.

mod common;

use common::*;
use pdf_linearizer::writer::LinearizingWriter;
use pdf_linearizer::{
    linearize_file, Error, LazyParser, Linearizer, LinearizerConfig, Object, ObjectRef, ParserOptions,
    SlicedFileReader, VirtualPart,
};
use std::collections::HashMap;
use std::io::Read;

fn seeded(config: LinearizerConfig) -> Linearizer {
    Linearizer::new(LinearizerConfig {
        rng_seed: Some(7),
        ..config
    })
}

#[test]
fn test_single_page_large_image_becomes_slice() {
    init_logging();
    let source = write_temp(&document_pdf(&[PageSpec {
        fonts: vec![0],
        image_len: Some(50_000),
    }]));

    let doc = LazyParser::parse(source.path()).unwrap();
    let image = doc.get(ObjectRef::new(FIRST_IMAGE, 0)).and_then(|o| o.as_stream()).unwrap();
    assert!(image.is_referenced());

    let store = seeded(LinearizerConfig::default()).linearize(doc).unwrap();
    let slices: Vec<&VirtualPart> = store.parts().iter().filter(|p| p.is_slice()).collect();
    assert_eq!(slices.len(), 1);
    match slices[0] {
        VirtualPart::Slice { path, length, .. } => {
            assert_eq!(*length, 50_000);
            assert_eq!(&**path, source.path());
        },
        other => panic!("expected a slice, got {:?}", other),
    }

    let output = materialize(&store);
    let out = reparse(&output);
    let image = out
        .iter()
        .find_map(|(_, o)| o.as_stream().filter(|s| s.dict.get("Subtype") == Some(&Object::name("Image"))))
        .unwrap();
    assert_eq!(image.raw_bytes().unwrap().as_ref(), image_payload(50_000).as_slice());
}

#[test]
fn test_linearization_dictionary() {
    init_logging();
    let pages = vec![
        PageSpec {
            fonts: vec![0],
            image_len: None,
        },
        PageSpec {
            fonts: vec![1],
            image_len: Some(4096),
        },
        PageSpec {
            fonts: vec![0, 1],
            image_len: None,
        },
    ];
    let source = write_temp(&document_pdf(&pages));
    let store = seeded(LinearizerConfig::default())
        .linearize(LazyParser::parse(source.path()).unwrap())
        .unwrap();
    let output = materialize(&store);
    let doc = reparse(&output);

    assert_eq!(lin_value(&doc, "Linearized"), 1);
    assert_eq!(lin_value(&doc, "L") as u64, store.total_length());
    assert_eq!(lin_value(&doc, "L") as u64, std::fs::metadata(output.path()).unwrap().len());
    assert_eq!(lin_value(&doc, "N"), 3);

    let first_page = lin_value(&doc, "O") as u32;
    assert_eq!(doc.page_refs().unwrap()[0], ObjectRef::new(first_page, 0));

    let main_xref = lin_value(&doc, "T") as u64;
    let prev = LazyParser::open(output.path(), ParserOptions::default())
        .unwrap()
        .xref()
        .trailer()
        .and_then(|t| t.get("Prev"))
        .and_then(Object::as_integer)
        .unwrap();
    assert_eq!(prev as u64, main_xref);

    let bytes = std::fs::read(output.path()).unwrap();
    let hint = doc.get(ObjectRef::new(1, 0)).and_then(|o| o.as_dict()).unwrap()["H"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o.as_integer().unwrap() as usize)
        .collect::<Vec<_>>();
    assert!(bytes[hint[0]..].starts_with(format!("{} 0 obj", xref_number(&doc) - 1).as_bytes()));
    assert_eq!(hint[0] + hint[1], main_xref as usize);
}

/// The main xref is the highest numbered object.
fn xref_number(doc: &pdf_linearizer::CosDocument) -> u32 {
    doc.iter().map(|(k, _)| k.id).max().unwrap()
}

#[test]
fn test_first_page_boundary() {
    init_logging();
    let source = write_temp(&document_pdf(&[
        PageSpec {
            fonts: vec![0],
            image_len: None,
        },
        PageSpec {
            fonts: vec![1],
            image_len: None,
        },
    ]));
    let store = seeded(LinearizerConfig::default())
        .linearize(LazyParser::parse(source.path()).unwrap())
        .unwrap();
    let output = materialize(&store);
    let doc = reparse(&output);
    let end_of_first_page = lin_value(&doc, "E") as u64;

    let font_a = find_font(&doc, "Font0");
    let font_b = find_font(&doc, "Font1");
    assert!(xref_offset(&output, font_a) < end_of_first_page);
    assert!(xref_offset(&output, font_b) >= end_of_first_page);

    let pages = doc.page_refs().unwrap();
    assert!(xref_offset(&output, pages[0].id) < end_of_first_page);
    assert_eq!(xref_offset(&output, pages[1].id), end_of_first_page);
}

#[test]
fn test_lazy_slice_keeps_source_offset() {
    init_logging();
    let mut pdf = PdfBuilder::new();
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] /Contents 5 0 R >>");
    let header = PdfBuilder::stream_header(5, "", 2048).len();
    pdf.pad_to(10_000 - header);
    let payload = vec![b'q'; 2048];
    let payload_offset = pdf.stream(5, "", &payload);
    assert_eq!(payload_offset, 10_000);
    let source = write_temp(&pdf.finish(1, None));

    let doc = LazyParser::parse(source.path()).unwrap();
    let store = seeded(LinearizerConfig::default()).linearize(doc).unwrap();
    let slice = store.parts().iter().find(|p| p.is_slice()).unwrap();
    assert_eq!(
        slice,
        &VirtualPart::Slice {
            path: source.path().into(),
            offset: 10_000,
            length: 2048
        }
    );
}

#[test]
fn test_threshold_keeps_small_streams_in_memory() {
    let source = write_temp(&document_pdf(&[PageSpec {
        fonts: vec![0],
        image_len: Some(4096),
    }]));
    let options = ParserOptions {
        slice_threshold: 8192,
        ..ParserOptions::default()
    };
    let doc = LazyParser::parse_with_options(source.path(), options).unwrap();
    let store = seeded(LinearizerConfig::default()).linearize(doc).unwrap();
    assert!(store.parts().iter().all(|p| !p.is_slice()));
}

#[test]
fn test_many_tiny_objects_are_coalesced() {
    init_logging();
    let mut pdf = PdfBuilder::new();
    let tiny: Vec<String> = (0..200).map(|i| format!("{} 0 R", 10 + i)).collect();
    pdf.object(1, &format!("<< /Type /Catalog /Pages 2 0 R /Tiny [{}] >>", tiny.join(" ")));
    pdf.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] >>");
    for i in 0..200 {
        pdf.object(10 + i, &format!("{}", i));
    }
    let source = write_temp(&pdf.finish(1, None));

    let config = LinearizerConfig {
        coalesce_threshold: 1024,
        ..LinearizerConfig::default()
    };
    let store = seeded(config)
        .linearize(LazyParser::parse(source.path()).unwrap())
        .unwrap();
    assert!(store.len() > 3);
    assert!(store.parts().iter().all(|p| !p.is_slice()));

    let default_store = seeded(LinearizerConfig::default())
        .linearize(LazyParser::parse(source.path()).unwrap())
        .unwrap();
    assert_eq!(default_store.len(), 1);

    let doc = reparse(&materialize(&store));
    assert_eq!(doc.len(), 200 + 3 + 4);
    assert_eq!(lin_value(&doc, "L") as u64, store.total_length());
}

#[test]
fn test_unreachable_objects_are_dropped() {
    let mut pdf = PdfBuilder::new();
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] /Annots [9 0 R] >>");
    pdf.object(4, "(orphan)");
    let source = write_temp(&pdf.finish(1, None));

    let store = seeded(LinearizerConfig::default())
        .linearize(LazyParser::parse(source.path()).unwrap())
        .unwrap();
    let doc = reparse(&materialize(&store));
    assert!(doc.iter().all(|(_, o)| o.as_string() != Some(b"orphan".as_slice())));

    let page = doc.get(doc.page_refs().unwrap()[0]).and_then(|o| o.as_dict()).unwrap();
    assert_eq!(page.get("Annots"), Some(&Object::Array(vec![Object::Null])));
}

#[test]
fn test_linearize_file_round_trip() {
    init_logging();
    let source = write_temp(&document_pdf(&[
        PageSpec {
            fonts: vec![0],
            image_len: Some(3000),
        },
        PageSpec {
            fonts: vec![0],
            image_len: None,
        },
    ]));
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.pdf");

    let written = linearize_file(source.path(), &target).unwrap();
    assert_eq!(written, std::fs::metadata(&target).unwrap().len());

    let doc = LazyParser::parse(&target).unwrap();
    assert_eq!(doc.page_refs().unwrap().len(), 2);
    assert_eq!(doc.version(), (1, 5));
    assert!(doc.info_ref().is_some());
}

#[test]
fn test_linearize_in_place_is_rejected() {
    let source = write_temp(&document_pdf(&[PageSpec::default()]));
    let err = linearize_file(source.path(), source.path()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)));
}

#[test]
fn test_failed_linearization_keeps_existing_output() {
    let mut pdf = PdfBuilder::new();
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    let source = write_temp(&pdf.finish(1, None));
    let dir = tempfile::tempdir().unwrap();
    let fresh = dir.path().join("fresh.pdf");
    let existing = dir.path().join("existing.pdf");
    std::fs::write(&existing, b"previous").unwrap();

    assert!(linearize_file(source.path(), &fresh).is_err());
    assert!(linearize_file(source.path(), &existing).is_err());

    assert!(!fresh.exists());
    assert_eq!(std::fs::read(&existing).unwrap(), b"previous");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_padding_under_estimate() {
    let mut writer = LinearizingWriter::new(HashMap::new(), LinearizerConfig::default());
    writer.write_header((1, 7)).unwrap();
    let err = writer.fill_until(3).unwrap_err();
    assert!(matches!(
        err,
        Error::LayoutUnderEstimate {
            current: 15,
            requested: 3
        }
    ));
}

#[test]
fn test_writer_never_assigns_numbers() {
    let numbering = HashMap::from([(ObjectRef::new(1, 0), 3)]);
    let mut writer = LinearizingWriter::new(numbering, LinearizerConfig::default());
    let object = Object::dict(vec![("Next", Object::Reference(ObjectRef::new(9, 0)))]);

    let err = writer.write_object(ObjectRef::new(1, 0), &object).unwrap_err();
    assert!(matches!(err, Error::ForbiddenOperation(_)));
    let err = writer.write_object(ObjectRef::new(9, 0), &Object::Null).unwrap_err();
    assert!(matches!(err, Error::ForbiddenOperation(_)));
}

#[test]
fn test_sliced_reader_overshoot() {
    let data: Vec<u8> = (0..100u8).collect();
    let file = write_temp(&data);

    let mut reader = SlicedFileReader::open(file.path(), 10, 20).unwrap();
    let mut buf = [0u8; 64];
    let n = reader.read(&mut buf).unwrap();
    assert!(n <= 20);
    assert_eq!(buf[0], 10);

    reader.skip(50).unwrap();
    assert_eq!(reader.available(), 0);
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
    assert!(reader.index() >= 50);
}

#[test]
fn test_encrypted_source_is_unsupported() {
    let mut pdf = PdfBuilder::new();
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    pdf.object(5, "<< /Filter /Standard /V 1 /R 2 >>");
    let mut bytes = pdf.finish(1, None);
    let trailer = bytes.windows(7).position(|w| w == b"/Root 1").unwrap();
    bytes.splice(trailer..trailer, b"/Encrypt 5 0 R ".iter().copied());
    let source = write_temp(&bytes);

    assert!(matches!(LazyParser::parse(source.path()), Err(Error::Unsupported(_))));
}

#[test]
fn test_document_without_pages() {
    let mut pdf = PdfBuilder::new();
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    let source = write_temp(&pdf.finish(1, None));

    let doc = LazyParser::parse(source.path()).unwrap();
    assert!(matches!(
        seeded(LinearizerConfig::default()).linearize(doc),
        Err(Error::InvalidPdf(_))
    ));
}
