//! Deterministic in-process backend for tests
//!
//! Documents are small JSON descriptions instead of PDF files. Every page
//! paints each quadrant of its media box (in unrotated user space) with a
//! distinct opaque colour, so rotation, scaling and tiling can be checked
//! pixel by pixel.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::{DocumentMeta, DocumentSource, NativeDocument, NativePage, PdfBackend};
use crate::error::NativeError;
use crate::geometry::{PageGeometry, Rect, Rotation, Transform};
use crate::raster::{BYTES_PER_PIXEL, PixelRegion};

pub const TOP_LEFT: [u8; 4] = [0xFF, 0x00, 0x00, 0xFF];
pub const TOP_RIGHT: [u8; 4] = [0x00, 0xFF, 0x00, 0xFF];
pub const BOTTOM_LEFT: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];
pub const BOTTOM_RIGHT: [u8; 4] = [0xFF, 0xFF, 0x00, 0xFF];

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLayout {
    #[serde(default)]
    pub x0: f64,
    #[serde(default)]
    pub y0: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: i32,
}

/// JSON description of a synthetic document
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLayout {
    #[serde(default = "default_version")]
    pub version: (i32, i32),
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default = "default_true")]
    pub allows_copying: bool,
    #[serde(default = "default_true")]
    pub allows_printing: bool,
    pub pages: Vec<PageLayout>,
}

fn default_version() -> (i32, i32) {
    (1, 7)
}

fn default_true() -> bool {
    true
}

impl Default for DocumentLayout {
    fn default() -> Self {
        Self {
            version: default_version(),
            encrypted: false,
            allows_copying: true,
            allows_printing: true,
            pages: Vec::new(),
        }
    }
}

impl DocumentLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page(mut self, width: f64, height: f64, rotation: i32) -> Self {
        self.pages.push(PageLayout {
            x0: 0.0,
            y0: 0.0,
            width,
            height,
            rotation,
        });
        self
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Counters shared between a backend and the test observing it
#[derive(Clone, Debug, Default)]
pub struct SyntheticStats {
    opens: Arc<AtomicUsize>,
    page_loads: Arc<AtomicUsize>,
    draws: Arc<AtomicUsize>,
    aliased_draws: Arc<AtomicUsize>,
}

impl SyntheticStats {
    #[must_use]
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn page_loads(&self) -> usize {
        self.page_loads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn draws(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }

    /// Draws requested with anti-aliasing disabled
    #[must_use]
    pub fn aliased_draws(&self) -> usize {
        self.aliased_draws.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SyntheticBackend {
    stats: SyntheticStats,
}

impl SyntheticBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> SyntheticStats {
        self.stats.clone()
    }
}

impl PdfBackend for SyntheticBackend {
    type Document = SyntheticDocument;

    fn open(&self, source: &DocumentSource) -> Result<Self::Document, NativeError> {
        let bytes = match source {
            DocumentSource::File(path) => std::fs::read(path).map_err(|e| {
                NativeError::generic(format!("Failed to read {}: {e}", path.display()))
            })?,
            DocumentSource::Bytes(bytes) => bytes.clone(),
        };
        let layout: DocumentLayout = serde_json::from_slice(&bytes)
            .map_err(|e| NativeError::generic(format!("Not a synthetic document: {e}")))?;

        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(SyntheticDocument {
            layout,
            stats: self.stats.clone(),
        })
    }
}

#[derive(Debug)]
pub struct SyntheticDocument {
    layout: DocumentLayout,
    stats: SyntheticStats,
}

impl NativeDocument for SyntheticDocument {
    type Page = SyntheticPage;

    fn meta(&self) -> DocumentMeta {
        DocumentMeta {
            page_count: self.layout.pages.len(),
            version_major: self.layout.version.0,
            version_minor: self.layout.version.1,
            is_encrypted: self.layout.encrypted,
            allows_copying: self.layout.allows_copying,
            allows_printing: self.layout.allows_printing,
            is_unlocked: !self.layout.encrypted,
        }
    }

    fn load_page(&self, index: usize) -> Result<Self::Page, NativeError> {
        let page = self
            .layout
            .pages
            .get(index)
            .ok_or_else(|| NativeError::generic(format!("No page at index {index}")))?;
        let serial = self.stats.page_loads.fetch_add(1, Ordering::SeqCst);

        Ok(SyntheticPage {
            geometry: PageGeometry::new(
                Rect::new(page.x0, page.y0, page.x0 + page.width, page.y0 + page.height),
                Rotation::from_degrees(page.rotation),
            ),
            serial,
            stats: self.stats.clone(),
        })
    }
}

#[derive(Debug)]
pub struct SyntheticPage {
    geometry: PageGeometry,
    serial: usize,
    stats: SyntheticStats,
}

impl SyntheticPage {
    /// Order in which this page object was loaded
    #[must_use]
    pub fn serial(&self) -> usize {
        self.serial
    }

    fn colour_at(&self, u: f64, v: f64) -> Option<[u8; 4]> {
        let media = self.geometry.media_box;
        if !media.contains(u, v) {
            return None;
        }
        let mid_x = (media.x0 + media.x1) / 2.0;
        let mid_y = (media.y0 + media.y1) / 2.0;
        Some(match (u < mid_x, v >= mid_y) {
            (true, true) => TOP_LEFT,
            (false, true) => TOP_RIGHT,
            (true, false) => BOTTOM_LEFT,
            (false, false) => BOTTOM_RIGHT,
        })
    }
}

impl NativePage for SyntheticPage {
    fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    fn draw(
        &self,
        target: &mut PixelRegion<'_>,
        transform: &Transform,
        antialias: bool,
    ) -> Result<(), NativeError> {
        let inverse = transform
            .invert()
            .ok_or_else(|| NativeError::generic("Degenerate page transform"))?;

        self.stats.draws.fetch_add(1, Ordering::SeqCst);
        if !antialias {
            self.stats.aliased_draws.fetch_add(1, Ordering::SeqCst);
        }

        for py in 0..target.height() {
            let row = target.row_mut(py);
            for (px, pixel) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                let (u, v) = inverse.apply(px as f64 + 0.5, f64::from(py) + 0.5);
                if let Some(colour) = self.colour_at(u, v) {
                    pixel.copy_from_slice(&colour);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_round_trips_through_open() {
        let backend = SyntheticBackend::new();
        let bytes = DocumentLayout::new().page(100.0, 50.0, 90).to_bytes();
        let doc = backend.open(&DocumentSource::Bytes(bytes)).unwrap();

        assert_eq!(doc.meta().page_count, 1);
        let page = doc.load_page(0).unwrap();
        assert_eq!(page.geometry().rotation, Rotation::Degrees90);
        assert_eq!(backend.stats().page_loads(), 1);
        assert!(doc.load_page(1).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let backend = SyntheticBackend::new();
        assert!(
            backend
                .open(&DocumentSource::Bytes(b"%PDF-1.7".to_vec()))
                .is_err()
        );
        assert_eq!(backend.stats().opens(), 0);
    }
}
