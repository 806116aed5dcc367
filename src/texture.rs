//! Persistent texture surfaces and their latest-frame register

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::backend::NativePage;
use crate::error::{BridgeError, BridgeResult};
use crate::geometry;
use crate::raster::{BACKGROUND_FILL, PixelBuffer};
use crate::registry::{Slots, TextureId};
use crate::viewport;

/// One published texture image
#[derive(Debug)]
pub struct Frame {
    /// Increments with every update of the owning texture
    pub sequence: u64,
    pub buffer: PixelBuffer,
}

/// Single-slot register holding the most recent frame.
///
/// Writers overwrite, the display side takes or peeks. Last write wins.
#[derive(Debug, Default)]
pub struct FrameSlot {
    frame: Mutex<Option<Arc<Frame>>>,
}

impl FrameSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current frame and returns the one it displaced.
    pub fn publish(&self, frame: Arc<Frame>) -> Option<Arc<Frame>> {
        self.frame
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .replace(frame)
    }

    /// Removes the current frame.
    pub fn take(&self) -> Option<Arc<Frame>> {
        self.frame
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    #[must_use]
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.frame
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Region update for a texture
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureUpdate {
    pub dest_x: u32,
    pub dest_y: u32,
    pub width: u32,
    pub height: u32,
    pub src_x: i32,
    pub src_y: i32,
    /// Defaults to the effective page size
    pub full_width: Option<f64>,
    pub full_height: Option<f64>,
    pub background_fill: bool,
    pub antialias: bool,
}

impl TextureUpdate {
    /// Update of a `width` x `height` region at the surface origin
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            dest_x: 0,
            dest_y: 0,
            width,
            height,
            src_x: 0,
            src_y: 0,
            full_width: None,
            full_height: None,
            background_fill: true,
            antialias: true,
        }
    }
}

pub struct PageTexture {
    width: u32,
    height: u32,
    sequence: u64,
    slot: Arc<FrameSlot>,
}

impl Default for PageTexture {
    fn default() -> Self {
        Self::new()
    }
}

impl PageTexture {
    #[must_use]
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            sequence: 0,
            slot: Arc::new(FrameSlot::new()),
        }
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    /// Records the backing size. Returns false when nothing changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if (self.width, self.height) == (width, height) {
            return false;
        }
        self.width = width;
        self.height = height;
        true
    }

    /// Draws part of `page` into a fresh surface and publishes it.
    pub fn update<P: NativePage>(
        &mut self,
        page: &P,
        update: &TextureUpdate,
        max_dimension: u32,
    ) -> BridgeResult<Arc<Frame>> {
        let page_geometry = page.geometry();
        let effective = geometry::effective_size(&page_geometry);
        if effective.is_empty() {
            return Err(BridgeError::invalid("Page has no area"));
        }

        let full_width = update
            .full_width
            .filter(|w| *w > 0.0)
            .unwrap_or(effective.width);
        let full_height = update
            .full_height
            .filter(|h| *h > 0.0)
            .unwrap_or(effective.height);
        let mapping = viewport::mapping(
            effective,
            update.src_x,
            update.src_y,
            update.width,
            update.height,
            full_width,
            full_height,
        );

        let mut buffer = PixelBuffer::filled(self.width, self.height, 0, max_dimension)?;
        {
            let mut region =
                buffer.sub_region_mut(update.dest_x, update.dest_y, update.width, update.height)?;
            if update.background_fill {
                region.fill(BACKGROUND_FILL);
            }
            let transform =
                geometry::rotation_transform(&page_geometry).then(&mapping.device_transform());
            page.draw(&mut region, &transform, update.antialias)?;
        }

        self.sequence += 1;
        let frame = Arc::new(Frame {
            sequence: self.sequence,
            buffer,
        });
        self.slot.publish(Arc::clone(&frame));
        Ok(frame)
    }
}

/// Frame slots of live textures, readable from any thread
#[derive(Debug, Default)]
pub struct FrameBoard {
    slots: Mutex<HashMap<TextureId, Arc<FrameSlot>>>,
}

impl FrameBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: TextureId) -> Option<Arc<FrameSlot>> {
        self.lock().get(&id).cloned()
    }

    fn insert(&self, id: TextureId, slot: Arc<FrameSlot>) {
        self.lock().insert(id, slot);
    }

    fn remove(&self, id: TextureId) {
        self.lock().remove(&id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TextureId, Arc<FrameSlot>>> {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Live textures keyed by id
#[derive(Default)]
pub struct TextureRegistry {
    textures: Slots<PageTexture>,
    board: Arc<FrameBoard>,
}

impl TextureRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that mirrors its frame slots into `board`
    #[must_use]
    pub fn with_board(board: Arc<FrameBoard>) -> Self {
        Self {
            textures: Slots::new(),
            board,
        }
    }

    pub fn alloc(&mut self) -> TextureId {
        let texture = PageTexture::new();
        let slot = texture.slot();
        let id = TextureId(self.textures.insert(texture));
        self.board.insert(id, slot);
        info!("Allocated texture {id}");
        id
    }

    pub fn get_mut(&mut self, id: TextureId) -> BridgeResult<&mut PageTexture> {
        self.textures.get_mut(id.0).ok_or_else(|| not_found(id))
    }

    #[must_use]
    pub fn slot(&self, id: TextureId) -> Option<Arc<FrameSlot>> {
        self.textures.get(id.0).map(PageTexture::slot)
    }

    pub fn resize(&mut self, id: TextureId, width: u32, height: u32) -> BridgeResult<()> {
        if self.get_mut(id)?.resize(width, height) {
            debug!("Resized texture {id} to {width}x{height}");
        }
        Ok(())
    }

    /// Drops the texture. Display-side holders of its frame slot keep the
    /// last frame.
    pub fn release(&mut self, id: TextureId) -> BridgeResult<()> {
        self.textures.remove(id.0).ok_or_else(|| not_found(id))?;
        self.board.remove(id);
        info!("Released texture {id}");
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

fn not_found(id: TextureId) -> BridgeError {
    BridgeError::invalid(format!("No texture found for id {id}"))
}
