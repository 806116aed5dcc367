//! Id registry for open documents, their pages, and textures

use std::rc::Rc;

use log::{debug, info};

use crate::backend::{DocumentMeta, DocumentSource, NativeDocument, PdfBackend};
use crate::error::{BridgeError, BridgeResult};

/// Opaque id handed across the message boundary.
///
/// Packs `(serial << 32) | slot_index`. Serials come from one counter per
/// [`Slots`], so keys grow with every allocation until the counter wraps,
/// and a key whose slot has since been reused no longer matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey(u64);

impl SlotKey {
    /// Never issued
    pub const INVALID: Self = Self(u64::MAX);

    const fn new(serial: u32, index: u32) -> Self {
        Self(((serial as u64) << 32) | index as u64)
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn serial(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Slot<T> {
    serial: u32,
    value: Option<T>,
}

/// Slot map with serial-checked keys
pub struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    next_serial: u32,
    len: usize,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slots<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Starts the serial counter at `serial`.
    #[must_use]
    pub fn starting_at(serial: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_serial: if serial == u32::MAX { 0 } else { serial },
            len: 0,
        }
    }

    fn take_serial(&mut self) -> u32 {
        let serial = self.next_serial;
        // u32::MAX is skipped so that INVALID can never be produced
        self.next_serial = match serial.wrapping_add(1) {
            u32::MAX => 0,
            next => next,
        };
        serial
    }

    pub fn insert(&mut self, value: T) -> SlotKey {
        let serial = self.take_serial();
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.serial = serial;
                slot.value = Some(value);
                index
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    serial,
                    value: Some(value),
                });
                index
            }
        };
        self.len += 1;
        SlotKey::new(serial, index)
    }

    #[must_use]
    pub fn get(&self, key: SlotKey) -> Option<&T> {
        self.slots
            .get(key.index() as usize)
            .filter(|slot| slot.serial == key.serial())
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index() as usize)
            .filter(|slot| slot.serial == key.serial())
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let slot = self
            .slots
            .get_mut(key.index() as usize)
            .filter(|slot| slot.serial == key.serial())?;
        let value = slot.value.take()?;
        self.free.push(key.index());
        self.len -= 1;
        Some(value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub SlotKey);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub SlotKey);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for TextureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct OpenDocument<D: NativeDocument> {
    doc: D,
    meta: DocumentMeta,
    /// Indexed by page number - 1; filled on first access
    pages: Vec<Option<Rc<D::Page>>>,
}

/// Open documents and their lazily loaded pages
pub struct DocumentRegistry<D: NativeDocument> {
    docs: Slots<OpenDocument<D>>,
}

impl<D: NativeDocument> Default for DocumentRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: NativeDocument> DocumentRegistry<D> {
    #[must_use]
    pub fn new() -> Self {
        Self { docs: Slots::new() }
    }

    /// Registry whose first id uses `serial`
    #[must_use]
    pub fn starting_at(serial: u32) -> Self {
        Self {
            docs: Slots::starting_at(serial),
        }
    }

    pub fn open<B>(&mut self, backend: &B, source: &DocumentSource) -> BridgeResult<DocumentId>
    where
        B: PdfBackend<Document = D>,
    {
        let doc = backend.open(source)?;
        let meta = doc.meta();
        let id = DocumentId(self.docs.insert(OpenDocument {
            doc,
            meta,
            pages: std::iter::repeat_with(|| None).take(meta.page_count).collect(),
        }));
        info!(
            "Opened document {id} from {} ({} pages)",
            source.describe(),
            meta.page_count
        );
        Ok(id)
    }

    pub fn meta(&self, id: DocumentId) -> BridgeResult<DocumentMeta> {
        self.docs
            .get(id.0)
            .map(|open| open.meta)
            .ok_or_else(|| not_found(id))
    }

    /// Resolves a 1-based page number, loading and caching it on first use.
    pub fn page(&mut self, id: DocumentId, page_number: i64) -> BridgeResult<Rc<D::Page>> {
        let open = self.docs.get_mut(id.0).ok_or_else(|| not_found(id))?;
        let count = open.pages.len();
        let index = usize::try_from(page_number)
            .ok()
            .filter(|&n| n >= 1 && n <= count)
            .map(|n| n - 1)
            .ok_or_else(|| {
                BridgeError::invalid(format!(
                    "Page number ({page_number}) out of range [1 {count}]"
                ))
            })?;

        if let Some(page) = &open.pages[index] {
            return Ok(Rc::clone(page));
        }

        let page = Rc::new(open.doc.load_page(index)?);
        debug!("Loaded page {page_number} of document {id}");
        open.pages[index] = Some(Rc::clone(&page));
        Ok(page)
    }

    /// Drops the document and its cached pages. Returns false for unknown ids.
    pub fn close(&mut self, id: DocumentId) -> bool {
        let closed = self.docs.remove(id.0).is_some();
        if closed {
            info!("Closed document {id}");
        }
        closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

fn not_found(id: DocumentId) -> BridgeError {
    BridgeError::invalid(format!("No document found for id {id}"))
}
