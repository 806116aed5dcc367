//! Single-threaded executor for decoded method calls
//!
//! The engine owns every native handle. It is driven either directly (tests,
//! CLI) or from the worker thread of [`crate::service::Service`].

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use flume::{Sender, TrySendError};
use log::{debug, error};

use crate::backend::{DocumentMeta, DocumentSource, NativePage, PdfBackend};
use crate::buffers::{BufferHandle, BufferTable};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::geometry;
use crate::raster::{self, RenderRequest};
use crate::registry::{DocumentId, DocumentRegistry, TextureId};
use crate::texture::{FrameBoard, TextureRegistry, TextureUpdate};

/// One typed operation
#[derive(Clone, Debug)]
pub enum Call {
    OpenFile(PathBuf),
    OpenData(Vec<u8>),
    OpenAsset(String),
    Info(DocumentId),
    Close(DocumentId),
    Page {
        doc_id: DocumentId,
        page_number: i64,
    },
    Render {
        doc_id: DocumentId,
        page_number: i64,
        request: RenderRequest,
    },
    ReleaseBuffer(BufferHandle),
    AllocTexture,
    ReleaseTexture(TextureId),
    ResizeTexture {
        tex_id: TextureId,
        width: u32,
        height: u32,
    },
    UpdateTexture {
        tex_id: TextureId,
        doc_id: DocumentId,
        page_number: i64,
        update: TextureUpdate,
        /// Backing size to switch to before drawing
        tex_size: Option<(u32, u32)>,
    },
}

impl Call {
    /// Wire name of the method this call came from
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::OpenFile(_) => "file",
            Self::OpenData(_) => "data",
            Self::OpenAsset(_) => "asset",
            Self::Info(_) => "info",
            Self::Close(_) => "close",
            Self::Page { .. } => "page",
            Self::Render { .. } => "render",
            Self::ReleaseBuffer(_) => "releaseBuffer",
            Self::AllocTexture => "allocTex",
            Self::ReleaseTexture(_) => "releaseTex",
            Self::ResizeTexture { .. } => "resizeTex",
            Self::UpdateTexture { .. } => "updateTex",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocumentInfo {
    pub doc_id: DocumentId,
    pub meta: DocumentMeta,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageInfo {
    pub doc_id: DocumentId,
    pub page_number: i64,
    /// Effective size
    pub width: f64,
    pub height: f64,
}

/// Where the pixels of a render ended up
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pixels {
    Inline(Vec<u8>),
    Parked { handle: BufferHandle, size: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderOutput {
    pub doc_id: DocumentId,
    pub page_number: i64,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub full_width: f64,
    pub full_height: f64,
    pub page_width: f64,
    pub page_height: f64,
    pub pixels: Pixels,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Document(DocumentInfo),
    Page(PageInfo),
    Render(RenderOutput),
    Texture(TextureId),
    /// Plain `0` acknowledgement
    Acknowledged,
    /// No value
    Empty,
}

pub struct Engine<B: PdfBackend> {
    backend: B,
    config: BridgeConfig,
    documents: DocumentRegistry<B::Document>,
    textures: TextureRegistry,
    buffers: Arc<BufferTable>,
    frame_listener: Option<Sender<TextureId>>,
}

impl<B: PdfBackend> Engine<B> {
    #[must_use]
    pub fn new(backend: B, config: BridgeConfig) -> Self {
        Self::with_shared(
            backend,
            config,
            Arc::new(BufferTable::new()),
            Arc::new(FrameBoard::new()),
        )
    }

    /// Engine whose parked buffers and frame slots are visible through the
    /// given shared tables.
    #[must_use]
    pub fn with_shared(
        backend: B,
        config: BridgeConfig,
        buffers: Arc<BufferTable>,
        frames: Arc<FrameBoard>,
    ) -> Self {
        Self {
            backend,
            config,
            documents: DocumentRegistry::new(),
            textures: TextureRegistry::with_board(frames),
            buffers,
            frame_listener: None,
        }
    }

    /// Receives the texture id after every published frame. A full listener
    /// misses the signal; the frame itself stays in its slot.
    pub fn set_frame_listener(&mut self, listener: Sender<TextureId>) {
        self.frame_listener = Some(listener);
    }

    #[must_use]
    pub fn buffers(&self) -> &Arc<BufferTable> {
        &self.buffers
    }

    #[must_use]
    pub fn open_documents(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn execute(&mut self, call: Call) -> BridgeResult<Reply> {
        let method = call.method();
        debug!("Executing {method}");

        let result = self.dispatch(call);
        if let Err(e) = &result {
            match e {
                BridgeError::Internal(_) => error!("{method} failed: {e}"),
                _ => debug!("{method} rejected: {e}"),
            }
        }
        result
    }

    fn dispatch(&mut self, call: Call) -> BridgeResult<Reply> {
        match call {
            Call::OpenFile(path) => self.open(&DocumentSource::File(path)).map(Reply::Document),
            Call::OpenData(bytes) => self.open(&DocumentSource::Bytes(bytes)).map(Reply::Document),
            Call::OpenAsset(name) => self.open_asset(&name).map(Reply::Document),
            Call::Info(doc_id) => self.info(doc_id).map(Reply::Document),
            Call::Close(doc_id) => {
                self.close(doc_id);
                Ok(Reply::Acknowledged)
            }
            Call::Page {
                doc_id,
                page_number,
            } => self.page_info(doc_id, page_number).map(Reply::Page),
            Call::Render {
                doc_id,
                page_number,
                request,
            } => self
                .render(doc_id, page_number, &request)
                .map(Reply::Render),
            Call::ReleaseBuffer(handle) => {
                self.buffers.release(handle)?;
                Ok(Reply::Empty)
            }
            Call::AllocTexture => Ok(Reply::Texture(self.textures.alloc())),
            Call::ReleaseTexture(tex_id) => {
                self.textures.release(tex_id)?;
                Ok(Reply::Empty)
            }
            Call::ResizeTexture {
                tex_id,
                width,
                height,
            } => {
                self.textures.resize(tex_id, width, height)?;
                Ok(Reply::Empty)
            }
            Call::UpdateTexture {
                tex_id,
                doc_id,
                page_number,
                update,
                tex_size,
            } => {
                self.update_texture(tex_id, doc_id, page_number, &update, tex_size)?;
                Ok(Reply::Acknowledged)
            }
        }
    }

    pub fn open(&mut self, source: &DocumentSource) -> BridgeResult<DocumentInfo> {
        let doc_id = self.documents.open(&self.backend, source)?;
        self.info(doc_id)
    }

    /// Opens a document bundled below the configured asset directory.
    pub fn open_asset(&mut self, name: &str) -> BridgeResult<DocumentInfo> {
        let Some(dir) = &self.config.asset_dir else {
            return Err(BridgeError::not_supported(
                "Asset documents need an asset directory",
            ));
        };
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(BridgeError::invalid(format!("Invalid asset name '{name}'")));
        }
        let path = dir.join(relative);
        self.open(&DocumentSource::File(path))
    }

    pub fn info(&self, doc_id: DocumentId) -> BridgeResult<DocumentInfo> {
        Ok(DocumentInfo {
            doc_id,
            meta: self.documents.meta(doc_id)?,
        })
    }

    /// Unknown ids are ignored.
    pub fn close(&mut self, doc_id: DocumentId) {
        if !self.documents.close(doc_id) {
            debug!("Close of unknown document {doc_id}");
        }
    }

    pub fn page_info(&mut self, doc_id: DocumentId, page_number: i64) -> BridgeResult<PageInfo> {
        let page = self.documents.page(doc_id, page_number)?;
        let size = geometry::effective_size(&page.geometry());
        Ok(PageInfo {
            doc_id,
            page_number,
            width: size.width,
            height: size.height,
        })
    }

    pub fn render(
        &mut self,
        doc_id: DocumentId,
        page_number: i64,
        request: &RenderRequest,
    ) -> BridgeResult<RenderOutput> {
        let page = self.documents.page(doc_id, page_number)?;
        let result = raster::render_to_buffer(&*page, request, self.config.max_dimension)?;

        let size = result.buffer.byte_len();
        let pixels = if size <= self.config.inline_buffer_limit {
            Pixels::Inline(result.buffer.into_bytes())
        } else {
            Pixels::Parked {
                handle: self.buffers.park(result.buffer),
                size,
            }
        };

        Ok(RenderOutput {
            doc_id,
            page_number,
            x: result.x,
            y: result.y,
            width: result.width,
            height: result.height,
            full_width: result.full_width,
            full_height: result.full_height,
            page_width: result.page_size.width,
            page_height: result.page_size.height,
            pixels,
        })
    }

    pub fn update_texture(
        &mut self,
        tex_id: TextureId,
        doc_id: DocumentId,
        page_number: i64,
        update: &TextureUpdate,
        tex_size: Option<(u32, u32)>,
    ) -> BridgeResult<()> {
        // validate the texture before touching the document
        self.textures.get_mut(tex_id)?;
        let page = self.documents.page(doc_id, page_number)?;

        if let Some((width, height)) = tex_size {
            self.textures.resize(tex_id, width, height)?;
        }
        let max_dimension = self.config.max_dimension;
        let frame = self
            .textures
            .get_mut(tex_id)?
            .update(&*page, update, max_dimension)?;
        debug!("Texture {tex_id} frame {} published", frame.sequence);

        if let Some(listener) = &self.frame_listener {
            match listener.try_send(tex_id) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!("Frame listener full, skipped {tex_id}"),
                Err(TrySendError::Disconnected(_)) => debug!("Frame listener is gone"),
            }
        }
        Ok(())
    }
}
