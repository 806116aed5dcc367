//! Handle table for render buffers that cross the message boundary

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::raster::PixelBuffer;

/// Handle of a parked buffer. Never 0; 0 means "no handle".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    #[must_use]
    pub const fn new(handle: u64) -> Self {
        Self(handle)
    }
}

impl std::fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parked render buffers, shared between the engine and readers.
#[derive(Debug)]
pub struct BufferTable {
    next_handle: AtomicU64,
    buffers: Mutex<HashMap<BufferHandle, Arc<PixelBuffer>>>,
}

impl Default for BufferTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Parks `buffer` until it is released and returns its handle.
    pub fn park(&self, buffer: PixelBuffer) -> BufferHandle {
        let mut handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        if handle == 0 {
            handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        }
        let handle = BufferHandle::new(handle);
        debug!("Parked {} byte buffer as {handle}", buffer.byte_len());
        self.buffers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(handle, Arc::new(buffer));
        handle
    }

    #[must_use]
    pub fn get(&self, handle: BufferHandle) -> Option<Arc<PixelBuffer>> {
        self.buffers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }

    /// Drops the table's reference. Readers holding the `Arc` keep the
    /// pixels alive until they are done.
    pub fn release(&self, handle: BufferHandle) -> BridgeResult<()> {
        let removed = self
            .buffers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&handle);

        match removed {
            Some(_) => {
                debug!("Released buffer {handle}");
                Ok(())
            }
            None => {
                warn!("Release of unknown buffer {handle}");
                Err(BridgeError::invalid(format!(
                    "No buffer found for address {handle}"
                )))
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
