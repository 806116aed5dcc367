//! Native PDF library seam
//!
//! The registry and the rasteriser only talk to these traits. Handles are
//! not required to be `Send`: the engine keeps every native object on its
//! own thread.

#[cfg(feature = "native")]
pub mod mupdf;
#[cfg(any(test, feature = "test-utils"))]
pub mod synthetic;

use std::path::PathBuf;

use crate::error::NativeError;
use crate::geometry::{PageGeometry, Transform};
use crate::raster::PixelRegion;

/// Where a document is read from
#[derive(Clone, Debug)]
pub enum DocumentSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl DocumentSource {
    /// Short description for logs
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

/// Document-level facts reported by the native library
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocumentMeta {
    pub page_count: usize,
    pub version_major: i32,
    pub version_minor: i32,
    pub is_encrypted: bool,
    pub allows_copying: bool,
    pub allows_printing: bool,
    pub is_unlocked: bool,
}

/// Entry point into a native PDF library
pub trait PdfBackend {
    type Document: NativeDocument;

    fn open(&self, source: &DocumentSource) -> Result<Self::Document, NativeError>;
}

pub trait NativeDocument {
    type Page: NativePage;

    fn meta(&self) -> DocumentMeta;

    /// Loads a page by 0-based index.
    fn load_page(&self, index: usize) -> Result<Self::Page, NativeError>;
}

pub trait NativePage {
    /// Media box and rotation as stored in the document
    fn geometry(&self) -> PageGeometry;

    /// Draws the page into `target`.
    ///
    /// `transform` maps page user space (bottom-left origin, unrotated) to
    /// the pixel space of `target` (top-left origin). Pixels outside the
    /// drawn content keep their current value.
    fn draw(
        &self,
        target: &mut PixelRegion<'_>,
        transform: &Transform,
        antialias: bool,
    ) -> Result<(), NativeError>;
}

/// Parses a `PDF-x.y` style version string into `(major, minor)`.
#[must_use]
pub fn parse_version(format: &str) -> Option<(i32, i32)> {
    let version = format
        .trim()
        .trim_start_matches("PDF")
        .trim_start_matches(['-', ' ']);
    let (major, minor) = version.split_once('.')?;
    Some((major.trim().parse().ok()?, minor.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_strings() {
        assert_eq!(parse_version("PDF 1.7"), Some((1, 7)));
        assert_eq!(parse_version("PDF-2.0"), Some((2, 0)));
        assert_eq!(parse_version("1.4"), Some((1, 4)));
        assert_eq!(parse_version("XPS"), None);
    }
}
