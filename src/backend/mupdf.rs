//! MuPDF backend

use log::debug;
use mupdf::pdf::{PdfDocument, PdfPage, Permission};
use mupdf::{Colorspace, Context, Device, Matrix, MetadataName, Pixmap};

use super::{DocumentMeta, DocumentSource, NativeDocument, NativePage, PdfBackend, parse_version};
use crate::error::NativeError;
use crate::geometry::{PageGeometry, Rect, Rotation, Transform};
use crate::raster::{BYTES_PER_PIXEL, PixelRegion};

#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PdfBackend for MupdfBackend {
    type Document = MupdfDocument;

    fn open(&self, source: &DocumentSource) -> Result<Self::Document, NativeError> {
        let doc = match source {
            DocumentSource::File(path) => PdfDocument::open(path.to_string_lossy().as_ref())?,
            DocumentSource::Bytes(bytes) => PdfDocument::from_bytes(bytes)?,
        };
        MupdfDocument::new(doc)
    }
}

pub struct MupdfDocument {
    doc: PdfDocument,
    meta: DocumentMeta,
}

impl MupdfDocument {
    fn new(doc: PdfDocument) -> Result<Self, NativeError> {
        let page_count = doc.page_count()?.max(0) as usize;
        let (version_major, version_minor) = doc
            .metadata(MetadataName::Format)
            .ok()
            .and_then(|format| parse_version(&format))
            .unwrap_or((1, 0));
        let permissions = encryption_permissions(&doc)?;
        let granted = |flag: Permission| {
            permissions
                .as_ref()
                .is_none_or(|bits| bits.contains(flag))
        };

        let meta = DocumentMeta {
            page_count,
            version_major,
            version_minor,
            is_encrypted: permissions.is_some(),
            allows_copying: granted(Permission::COPY),
            allows_printing: granted(Permission::PRINT),
            is_unlocked: !doc.needs_password()?,
        };
        debug!("Opened PDF {version_major}.{version_minor} with {page_count} pages");

        Ok(Self { doc, meta })
    }
}

/// `/P` bits of the encryption dictionary, `None` for unencrypted files.
///
/// `PdfDocument::permissions` reports every permission as granted once
/// `/P` carries bits outside the known flags, which the usual negative
/// values do.
fn encryption_permissions(doc: &PdfDocument) -> Result<Option<Permission>, NativeError> {
    let Some(encrypt) = doc.trailer()?.get_dict("Encrypt")? else {
        return Ok(None);
    };
    let bits = match encrypt.get_dict("P")? {
        Some(p) => p.as_int()?,
        None => -1,
    };
    Ok(Some(Permission::from_bits_truncate(bits as u32)))
}

impl NativeDocument for MupdfDocument {
    type Page = MupdfPage;

    fn meta(&self) -> DocumentMeta {
        self.meta
    }

    fn load_page(&self, index: usize) -> Result<Self::Page, NativeError> {
        let index = i32::try_from(index)
            .map_err(|_| NativeError::generic(format!("Page index {index} out of range")))?;
        let page = PdfPage::try_from(self.doc.load_page(index)?)?;
        let media = page.media_box()?;
        let geometry = PageGeometry::new(
            Rect::new(
                f64::from(media.x0),
                f64::from(media.y0),
                f64::from(media.x1),
                f64::from(media.y1),
            ),
            Rotation::from_degrees(page.rotation()?),
        );
        let page_ctm = from_matrix(&page.ctm()?);

        Ok(MupdfPage {
            page,
            geometry,
            page_ctm,
        })
    }
}

pub struct MupdfPage {
    page: PdfPage,
    geometry: PageGeometry,
    /// Matrix MuPDF applies before the caller's one when running the page.
    /// Built from the crop box, so it differs from the media box geometry
    /// on cropped pages.
    page_ctm: Transform,
}

impl NativePage for MupdfPage {
    fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    fn draw(
        &self,
        target: &mut PixelRegion<'_>,
        transform: &Transform,
        antialias: bool,
    ) -> Result<(), NativeError> {
        let ctm = self
            .page_ctm
            .invert()
            .ok_or_else(|| NativeError::generic("Page has no area"))?
            .then(transform);

        let width = i32::try_from(target.width())
            .map_err(|_| NativeError::generic("Target too wide"))?;
        let height = i32::try_from(target.height())
            .map_err(|_| NativeError::generic("Target too tall"))?;

        let mut pixmap = Pixmap::new_with_w_h(&Colorspace::device_rgb(), width, height, true)?;
        copy_rows(target, &mut pixmap, Direction::IntoPixmap)?;

        {
            let _aa = AntialiasScope::enter(antialias);
            let device = Device::from_pixmap(&pixmap)?;
            self.page.run(&device, &to_matrix(&ctm))?;
        }

        copy_rows(target, &mut pixmap, Direction::FromPixmap)
    }
}

/// Switches anti-aliasing off for its lifetime when asked to and restores
/// the previous level on drop.
struct AntialiasScope {
    previous: Option<i32>,
}

impl AntialiasScope {
    fn enter(antialias: bool) -> Self {
        if antialias {
            return Self { previous: None };
        }
        let mut ctx = Context::get();
        let previous = ctx.aa_level();
        ctx.set_aa_level(0);
        Self {
            previous: Some(previous),
        }
    }
}

impl Drop for AntialiasScope {
    fn drop(&mut self) {
        if let Some(level) = self.previous {
            Context::get().set_aa_level(level);
        }
    }
}

fn to_matrix(t: &Transform) -> Matrix {
    Matrix::new(
        t.a as f32, t.b as f32, t.c as f32, t.d as f32, t.e as f32, t.f as f32,
    )
}

fn from_matrix(m: &Matrix) -> Transform {
    Transform::new(
        f64::from(m.a),
        f64::from(m.b),
        f64::from(m.c),
        f64::from(m.d),
        f64::from(m.e),
        f64::from(m.f),
    )
}

#[derive(Clone, Copy)]
enum Direction {
    IntoPixmap,
    FromPixmap,
}

fn copy_rows(
    region: &mut PixelRegion<'_>,
    pixmap: &mut Pixmap,
    direction: Direction,
) -> Result<(), NativeError> {
    let n = pixmap.n() as usize;
    if n != BYTES_PER_PIXEL {
        return Err(NativeError::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let stride = pixmap.stride() as usize;
    let row_bytes = region.row_bytes();
    let samples = pixmap.samples_mut();
    if row_bytes > stride || samples.len() < stride * region.height() as usize {
        return Err(NativeError::generic("Pixmap buffer size mismatch"));
    }

    for y in 0..region.height() {
        let start = y as usize * stride;
        let native = &mut samples[start..start + row_bytes];
        match direction {
            Direction::IntoPixmap => native.copy_from_slice(region.row(y)),
            Direction::FromPixmap => region.row_mut(y).copy_from_slice(native),
        }
    }
    Ok(())
}
