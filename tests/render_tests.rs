use pdf_render::backend::DocumentSource;
use pdf_render::backend::synthetic::{
    BOTTOM_LEFT, BOTTOM_RIGHT, DocumentLayout, SyntheticBackend, TOP_LEFT, TOP_RIGHT,
};
use pdf_render::engine::{Pixels, RenderOutput};
use pdf_render::raster::RenderRequest;
use pdf_render::registry::DocumentId;
use pdf_render::viewport::Viewport;
use pdf_render::{BridgeConfig, Engine};

fn inline_engine() -> Engine<SyntheticBackend> {
    let config = BridgeConfig {
        inline_buffer_limit: usize::MAX,
        ..BridgeConfig::default()
    };
    Engine::new(SyntheticBackend::new(), config)
}

fn open(engine: &mut Engine<SyntheticBackend>, layout: &DocumentLayout) -> DocumentId {
    engine
        .open(&DocumentSource::Bytes(layout.to_bytes()))
        .unwrap()
        .doc_id
}

fn render(
    engine: &mut Engine<SyntheticBackend>,
    doc_id: DocumentId,
    request: &RenderRequest,
) -> (RenderOutput, Vec<u8>) {
    let output = engine.render(doc_id, 1, request).unwrap();
    let Pixels::Inline(bytes) = output.pixels.clone() else {
        panic!("expected inline pixels");
    };
    (output, bytes)
}

fn pixel(bytes: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let offset = ((y * width + x) * 4) as usize;
    [
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ]
}

fn viewport_request(viewport: Viewport) -> RenderRequest {
    RenderRequest {
        viewport,
        ..RenderRequest::default()
    }
}

#[test]
fn test_rotation_swaps_effective_size() {
    let mut engine = inline_engine();
    let layout = DocumentLayout::new()
        .page(200.0, 100.0, 0)
        .page(200.0, 100.0, 90)
        .page(200.0, 100.0, 180)
        .page(200.0, 100.0, 270)
        .page(200.0, 100.0, -90);
    let doc_id = open(&mut engine, &layout);

    let sizes: Vec<_> = (1..=5)
        .map(|n| {
            let page = engine.page_info(doc_id, n).unwrap();
            (page.width, page.height)
        })
        .collect();
    assert_eq!(
        sizes,
        vec![
            (200.0, 100.0),
            (100.0, 200.0),
            (200.0, 100.0),
            (100.0, 200.0),
            (100.0, 200.0),
        ]
    );
}

#[test]
fn test_default_request_renders_whole_page_one_to_one() {
    let mut engine = inline_engine();
    let doc_id = open(&mut engine, &DocumentLayout::new().page(100.0, 80.0, 0));
    let (output, bytes) = render(&mut engine, doc_id, &RenderRequest::default());

    assert_eq!((output.x, output.y), (0, 0));
    assert_eq!((output.width, output.height), (100, 80));
    assert_eq!((output.full_width, output.full_height), (100.0, 80.0));
    assert_eq!((output.page_width, output.page_height), (100.0, 80.0));
    assert_eq!(bytes.len(), 100 * 80 * 4);

    assert_eq!(pixel(&bytes, 100, 0, 0), TOP_LEFT);
    assert_eq!(pixel(&bytes, 100, 99, 0), TOP_RIGHT);
    assert_eq!(pixel(&bytes, 100, 0, 79), BOTTOM_LEFT);
    assert_eq!(pixel(&bytes, 100, 99, 79), BOTTOM_RIGHT);
}

#[test]
fn test_top_left_quadrant_of_double_size_page() {
    let mut engine = inline_engine();
    let doc_id = open(&mut engine, &DocumentLayout::new().page(100.0, 80.0, 0));
    let request = viewport_request(
        Viewport::default()
            .with_size(100, 80)
            .with_full_size(200.0, 160.0),
    );
    let (output, bytes) = render(&mut engine, doc_id, &request);

    assert_eq!((output.width, output.height), (100, 80));
    assert!(
        bytes.chunks_exact(4).all(|px| px == TOP_LEFT),
        "quadrant must only contain the top-left colour"
    );
}

#[test]
fn test_tiles_reassemble_the_full_render() {
    let mut engine = inline_engine();
    let doc_id = open(&mut engine, &DocumentLayout::new().page(100.0, 80.0, 0));
    let full_request = viewport_request(
        Viewport::default()
            .with_size(200, 160)
            .with_full_size(200.0, 160.0),
    );
    let (_, full) = render(&mut engine, doc_id, &full_request);

    for (tx, ty) in [(0, 0), (100, 0), (0, 80), (100, 80)] {
        let request = viewport_request(
            Viewport::default()
                .with_origin(tx, ty)
                .with_size(100, 80)
                .with_full_size(200.0, 160.0),
        );
        let (_, tile) = render(&mut engine, doc_id, &request);
        for y in 0..80 {
            for x in 0..100 {
                assert_eq!(
                    pixel(&tile, 100, x, y),
                    pixel(&full, 200, x + tx as u32, y + ty as u32),
                    "tile ({tx}, {ty}) pixel ({x}, {y})"
                );
            }
        }
    }
}

#[test]
fn test_rotated_pages_put_the_right_corner_at_the_origin() {
    let mut engine = inline_engine();
    let layout = DocumentLayout::new()
        .page(100.0, 50.0, 90)
        .page(100.0, 50.0, 180)
        .page(100.0, 50.0, 270);
    let doc_id = open(&mut engine, &layout);

    let expected = [(1, BOTTOM_LEFT), (2, BOTTOM_RIGHT), (3, TOP_RIGHT)];
    for (page_number, corner) in expected {
        let output = engine
            .render(doc_id, page_number, &RenderRequest::default())
            .unwrap();
        let Pixels::Inline(bytes) = &output.pixels else {
            panic!("expected inline pixels");
        };
        assert_eq!(
            pixel(bytes, output.width, 0, 0),
            corner,
            "page {page_number}"
        );
    }
}

#[test]
fn test_offset_media_box_is_moved_to_the_origin() {
    let mut engine = inline_engine();
    let mut layout = DocumentLayout::new().page(60.0, 40.0, 90);
    layout.pages[0].x0 = 30.0;
    layout.pages[0].y0 = -20.0;
    let doc_id = open(&mut engine, &layout);

    let (output, bytes) = render(&mut engine, doc_id, &RenderRequest::default());
    assert_eq!((output.width, output.height), (40, 60));
    assert_eq!(pixel(&bytes, 40, 0, 0), BOTTOM_LEFT);
    assert_eq!(pixel(&bytes, 40, 39, 59), TOP_RIGHT);
}

#[test]
fn test_background_fill_and_transparency() {
    let mut engine = inline_engine();
    let doc_id = open(&mut engine, &DocumentLayout::new().page(100.0, 80.0, 0));
    let viewport = Viewport::default().with_origin(-10, 0).with_size(20, 20);

    let (_, filled) = render(&mut engine, doc_id, &viewport_request(viewport));
    assert_eq!(pixel(&filled, 20, 0, 0), [0xFF; 4]);
    assert_eq!(pixel(&filled, 20, 15, 0), TOP_LEFT);

    let transparent = RenderRequest {
        viewport,
        background_fill: false,
        ..RenderRequest::default()
    };
    let (_, clear) = render(&mut engine, doc_id, &transparent);
    assert_eq!(pixel(&clear, 20, 0, 0), [0; 4]);
    assert_eq!(pixel(&clear, 20, 15, 0), TOP_LEFT);
}

#[test]
fn test_antialias_flag_reaches_the_backend() {
    let backend = SyntheticBackend::new();
    let stats = backend.stats();
    let mut engine = Engine::new(backend, BridgeConfig::default());
    let doc_id = open(&mut engine, &DocumentLayout::new().page(10.0, 10.0, 0));

    engine
        .render(doc_id, 1, &RenderRequest::default())
        .unwrap();
    let aliased = RenderRequest {
        antialias: false,
        ..RenderRequest::default()
    };
    engine.render(doc_id, 1, &aliased).unwrap();

    assert_eq!(stats.draws(), 2);
    assert_eq!(stats.aliased_draws(), 1);
}

#[test]
fn test_pages_are_cached_across_calls() {
    let backend = SyntheticBackend::new();
    let stats = backend.stats();
    let mut engine = Engine::new(backend, BridgeConfig::default());
    let doc_id = open(&mut engine, &DocumentLayout::new().page(10.0, 10.0, 0));

    engine.page_info(doc_id, 1).unwrap();
    engine.page_info(doc_id, 1).unwrap();
    engine
        .render(doc_id, 1, &RenderRequest::default())
        .unwrap();
    assert_eq!(stats.page_loads(), 1);
}

#[test]
fn test_zero_area_page_is_rejected() {
    let mut engine = inline_engine();
    let doc_id = open(&mut engine, &DocumentLayout::new().page(0.0, 80.0, 0));

    let err = engine
        .render(doc_id, 1, &RenderRequest::default())
        .unwrap_err();
    assert_eq!(err.code(), "invalid_argument");
}

#[test]
fn test_oversized_render_is_rejected_before_allocation() {
    let backend = SyntheticBackend::new();
    let stats = backend.stats();
    let mut engine = Engine::new(backend, BridgeConfig::default());
    let doc_id = open(&mut engine, &DocumentLayout::new().page(10.0, 10.0, 0));

    let request = viewport_request(Viewport::default().with_size(20_000, 10));
    let err = engine.render(doc_id, 1, &request).unwrap_err();
    assert_eq!(err.code(), "invalid_argument");
    assert_eq!(stats.draws(), 0);
    assert!(engine.buffers().is_empty());
}

#[test]
fn test_closed_document_cannot_be_rendered() {
    let mut engine = inline_engine();
    let doc_id = open(&mut engine, &DocumentLayout::new().page(10.0, 10.0, 0));
    engine.close(doc_id);

    let err = engine
        .render(doc_id, 1, &RenderRequest::default())
        .unwrap_err();
    assert_eq!(err.code(), "invalid_argument");
    assert!(err.to_string().contains("No document found"));
}

#[test]
fn test_document_ids_keep_growing_across_open_close_cycles() {
    let mut engine = inline_engine();
    let layout = DocumentLayout::new().page(10.0, 10.0, 0);
    let mut previous = open(&mut engine, &layout);

    for _ in 0..100 {
        engine.close(previous);
        let next = open(&mut engine, &layout);
        assert!(next > previous);
        assert!(engine.info(previous).is_err());
        previous = next;
    }
    assert_eq!(engine.open_documents(), 1);
}
