#![cfg(feature = "native")]

use std::io::Write;

use mupdf::pdf::{Encryption, PdfDocument, PdfWriteOptions, Permission};
use pdf_render::backend::DocumentSource;
use pdf_render::backend::mupdf::MupdfBackend;
use pdf_render::backend::synthetic::{BOTTOM_LEFT, BOTTOM_RIGHT, TOP_LEFT, TOP_RIGHT};
use pdf_render::engine::{Pixels, RenderOutput};
use pdf_render::raster::RenderRequest;
use pdf_render::registry::DocumentId;
use pdf_render::{BridgeConfig, Engine};

struct TestPage {
    media: [f64; 4],
    crop: Option<[f64; 4]>,
    rotate: i32,
}

impl TestPage {
    fn new(width: f64, height: f64, rotate: i32) -> Self {
        Self {
            media: [0.0, 0.0, width, height],
            crop: None,
            rotate,
        }
    }
}

fn rect(r: [f64; 4]) -> String {
    format!("[{} {} {} {}]", r[0], r[1], r[2], r[3])
}

/// Fills each quadrant of the media box with the synthetic backend's colours.
fn quadrant_content(media: [f64; 4]) -> String {
    let [x0, y0, x1, y1] = media;
    let (w, h) = ((x1 - x0) / 2.0, (y1 - y0) / 2.0);
    let fill = |rgb: &str, x: f64, y: f64| format!("{rgb} rg {x} {y} {w} {h} re f\n");
    [
        fill("1 0 0", x0, y0 + h),
        fill("0 1 0", x0 + w, y0 + h),
        fill("0 0 1", x0, y0),
        fill("1 1 0", x0 + w, y0),
    ]
    .concat()
}

fn build_pdf(pages: &[TestPage]) -> Vec<u8> {
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 3 + 2 * i))
        .collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        ),
    ];
    for (i, page) in pages.iter().enumerate() {
        let crop = page
            .crop
            .map(|c| format!(" /CropBox {}", rect(c)))
            .unwrap_or_default();
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox {}{crop} /Rotate {} /Contents {} 0 R >>",
            rect(page.media),
            page.rotate,
            4 + 2 * i
        ));
        let content = quadrant_content(page.media);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ));
    }

    let mut out = b"%PDF-1.7\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        write!(out, "{} 0 obj\n{body}\nendobj\n", i + 1).unwrap();
    }
    let xref = out.len();
    write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).unwrap();
    for offset in offsets {
        write!(out, "{offset:010} 00000 n \n").unwrap();
    }
    write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
        objects.len() + 1
    )
    .unwrap();
    out
}

fn engine() -> Engine<MupdfBackend> {
    let config = BridgeConfig {
        inline_buffer_limit: usize::MAX,
        ..BridgeConfig::default()
    };
    Engine::new(MupdfBackend::new(), config)
}

fn open(engine: &mut Engine<MupdfBackend>, bytes: Vec<u8>) -> DocumentId {
    engine.open(&DocumentSource::Bytes(bytes)).unwrap().doc_id
}

fn render_page(
    engine: &mut Engine<MupdfBackend>,
    doc_id: DocumentId,
    page_number: i64,
) -> (RenderOutput, Vec<u8>) {
    let output = engine
        .render(doc_id, page_number, &RenderRequest::default())
        .unwrap();
    let Pixels::Inline(bytes) = output.pixels.clone() else {
        panic!("expected inline pixels");
    };
    (output, bytes)
}

fn assert_pixel(bytes: &[u8], width: u32, x: u32, y: u32, expected: [u8; 4]) {
    let offset = ((y * width + x) * 4) as usize;
    let actual = &bytes[offset..offset + 4];
    let close = actual
        .iter()
        .zip(expected)
        .all(|(a, e)| a.abs_diff(e) <= 2);
    assert!(close, "pixel ({x}, {y}) is {actual:?}, expected {expected:?}");
}

#[test]
fn test_plain_document_info() {
    let mut engine = engine();
    let bytes = build_pdf(&[
        TestPage::new(100.0, 80.0, 0),
        TestPage::new(60.0, 40.0, 90),
    ]);
    let info = engine.open(&DocumentSource::Bytes(bytes)).unwrap();

    let meta = info.meta;
    assert_eq!(meta.page_count, 2);
    assert_eq!((meta.version_major, meta.version_minor), (1, 7));
    assert!(!meta.is_encrypted);
    assert!(meta.allows_copying);
    assert!(meta.allows_printing);
    assert!(meta.is_unlocked);

    let page = engine.page_info(info.doc_id, 2).unwrap();
    assert_eq!((page.width, page.height), (40.0, 60.0));
}

#[test]
fn test_encryption_permissions_are_reported() {
    let plain = build_pdf(&[TestPage::new(100.0, 80.0, 0)]);
    let doc = PdfDocument::from_bytes(&plain).unwrap();
    let mut options = PdfWriteOptions::default();
    options
        .set_encryption(Encryption::Aes128)
        .set_permissions(Permission::PRINT)
        .set_owner_password("owner");
    let mut encrypted = Vec::new();
    doc.write_to_with_options(&mut encrypted, options).unwrap();

    let mut engine = engine();
    let meta = engine
        .open(&DocumentSource::Bytes(encrypted))
        .unwrap()
        .meta;
    assert!(meta.is_encrypted);
    assert!(meta.is_unlocked);
    assert!(meta.allows_printing);
    assert!(!meta.allows_copying);
}

#[test]
fn test_unrotated_page_corners() {
    let mut engine = engine();
    let doc_id = open(&mut engine, build_pdf(&[TestPage::new(100.0, 80.0, 0)]));
    let (output, bytes) = render_page(&mut engine, doc_id, 1);

    assert_eq!((output.width, output.height), (100, 80));
    assert_pixel(&bytes, 100, 5, 5, TOP_LEFT);
    assert_pixel(&bytes, 100, 94, 5, TOP_RIGHT);
    assert_pixel(&bytes, 100, 5, 74, BOTTOM_LEFT);
    assert_pixel(&bytes, 100, 94, 74, BOTTOM_RIGHT);
}

#[test]
fn test_rotated_page_corners() {
    let mut engine = engine();
    let pages = [
        TestPage::new(100.0, 80.0, 90),
        TestPage::new(100.0, 80.0, 180),
        TestPage::new(100.0, 80.0, 270),
    ];
    let doc_id = open(&mut engine, build_pdf(&pages));

    let expected = [
        (1, BOTTOM_LEFT, TOP_RIGHT),
        (2, BOTTOM_RIGHT, TOP_LEFT),
        (3, TOP_RIGHT, BOTTOM_LEFT),
    ];
    for (page_number, origin, far_corner) in expected {
        let (output, bytes) = render_page(&mut engine, doc_id, page_number);
        let (w, h) = (output.width, output.height);
        assert_pixel(&bytes, w, 5, 5, origin);
        assert_pixel(&bytes, w, w - 6, h - 6, far_corner);
    }
}

#[test]
fn test_cropped_page_keeps_media_box_placement() {
    let mut engine = engine();
    let page = TestPage {
        media: [0.0, 0.0, 200.0, 160.0],
        crop: Some([0.0, 0.0, 100.0, 80.0]),
        rotate: 0,
    };
    let doc_id = open(&mut engine, build_pdf(&[page]));
    let (output, bytes) = render_page(&mut engine, doc_id, 1);

    assert_eq!((output.width, output.height), (200, 160));
    // only the bottom-left quadrant lies inside the crop box
    assert_pixel(&bytes, 200, 50, 120, BOTTOM_LEFT);
    assert_pixel(&bytes, 200, 50, 40, [0xFF; 4]);
    assert_pixel(&bytes, 200, 150, 120, [0xFF; 4]);
}

#[test]
fn test_offset_media_box_is_moved_to_the_origin() {
    let mut engine = engine();
    let page = TestPage {
        media: [30.0, -20.0, 130.0, 60.0],
        crop: None,
        rotate: 0,
    };
    let doc_id = open(&mut engine, build_pdf(&[page]));
    let (_, bytes) = render_page(&mut engine, doc_id, 1);

    assert_pixel(&bytes, 100, 2, 2, TOP_LEFT);
    assert_pixel(&bytes, 100, 97, 77, BOTTOM_RIGHT);
}

#[test]
fn test_aliased_render_leaves_later_renders_antialiased() {
    let mut engine = engine();
    let doc_id = open(&mut engine, build_pdf(&[TestPage::new(100.0, 80.0, 0)]));
    let aliased = RenderRequest {
        antialias: false,
        ..RenderRequest::default()
    };
    let level = mupdf::Context::get().aa_level();
    engine.render(doc_id, 1, &aliased).unwrap();

    assert_eq!(mupdf::Context::get().aa_level(), level);
}
