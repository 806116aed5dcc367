//! Engine service - runs the engine on its own thread
//!
//! Native handles never leave the engine thread. Callers on any thread send
//! a call plus a one-shot reply channel; the display side reads texture
//! frames and parked buffers through shared tables without a round trip.

use std::sync::Arc;
use std::thread::JoinHandle;

use flume::{Receiver, Sender, TryRecvError};
use log::{debug, info, warn};
use serde_json::Value;

use crate::backend::PdfBackend;
use crate::buffers::{BufferHandle, BufferTable};
use crate::channel::{self, MethodCall};
use crate::config::BridgeConfig;
use crate::engine::{Call, Engine, Reply};
use crate::error::{BridgeError, BridgeResult};
use crate::raster::PixelBuffer;
use crate::registry::TextureId;
use crate::texture::{FrameBoard, FrameSlot};

const ENGINE_THREAD: &str = "pdf-engine";

/// Frame signals queued for the display side before new ones are dropped
pub const FRAME_EVENT_CAPACITY: usize = 64;

enum Request {
    Call {
        call: Call,
        reply: Sender<BridgeResult<Reply>>,
    },
    Shutdown,
}

/// Reply that has not necessarily arrived yet
#[derive(Debug)]
pub struct PendingReply {
    rx: Receiver<BridgeResult<Reply>>,
}

impl PendingReply {
    /// Blocks until the engine has answered.
    pub fn wait(self) -> BridgeResult<Reply> {
        self.rx.recv().unwrap_or_else(|_| Err(engine_gone()))
    }

    /// Returns the reply if it is ready.
    pub fn poll(&self) -> Option<BridgeResult<Reply>> {
        match self.rx.try_recv() {
            Ok(reply) => Some(reply),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(engine_gone())),
        }
    }
}

fn engine_gone() -> BridgeError {
    BridgeError::internal("engine thread has stopped")
}

/// Handle to a running engine
pub struct Service {
    request_tx: Sender<Request>,
    frame_rx: Receiver<TextureId>,
    buffers: Arc<BufferTable>,
    frames: Arc<FrameBoard>,
    worker: Option<JoinHandle<()>>,
}

impl Service {
    /// Starts the engine thread. `backend` is called on that thread, so the
    /// backend and everything it opens may be `!Send`.
    pub fn spawn<B, F>(backend: F, config: BridgeConfig) -> BridgeResult<Self>
    where
        B: PdfBackend + 'static,
        F: FnOnce() -> B + Send + 'static,
    {
        let (request_tx, request_rx) = flume::unbounded();
        let (frame_tx, frame_rx) = flume::bounded(FRAME_EVENT_CAPACITY);
        let buffers = Arc::new(BufferTable::new());
        let frames = Arc::new(FrameBoard::new());

        let worker = {
            let buffers = Arc::clone(&buffers);
            let frames = Arc::clone(&frames);
            std::thread::Builder::new()
                .name(ENGINE_THREAD.to_string())
                .spawn(move || {
                    let mut engine = Engine::with_shared(backend(), config, buffers, frames);
                    engine.set_frame_listener(frame_tx);
                    engine_loop(&mut engine, &request_rx);
                })
                .map_err(|e| BridgeError::internal(format!("failed to start engine: {e}")))?
        };
        info!("Engine thread started");

        Ok(Self {
            request_tx,
            frame_rx,
            buffers,
            frames,
            worker: Some(worker),
        })
    }

    /// Queues `call` without waiting for the reply.
    pub fn submit(&self, call: Call) -> PendingReply {
        let (reply, rx) = flume::bounded(1);
        if self.request_tx.send(Request::Call { call, reply }).is_err() {
            warn!("Engine thread is gone, dropping call");
        }
        PendingReply { rx }
    }

    /// Runs `call` and blocks for its reply.
    pub fn call(&self, call: Call) -> BridgeResult<Reply> {
        self.submit(call).wait()
    }

    /// Runs a wire-level method call and returns the reply envelope.
    pub fn handle(&self, call: &MethodCall) -> Value {
        channel::envelope(call.decode().and_then(|call| self.call(call)))
    }

    /// Frame register of a live texture
    #[must_use]
    pub fn frames(&self, tex_id: TextureId) -> Option<Arc<FrameSlot>> {
        self.frames.get(tex_id)
    }

    /// Ids of textures that have published a frame, in order. Signals are
    /// dropped while [`FRAME_EVENT_CAPACITY`] of them are unread.
    #[must_use]
    pub fn frame_events(&self) -> &Receiver<TextureId> {
        &self.frame_rx
    }

    /// Pixels of a parked render buffer
    #[must_use]
    pub fn buffer(&self, handle: BufferHandle) -> Option<Arc<PixelBuffer>> {
        self.buffers.get(handle)
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        let _ = self.request_tx.send(Request::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Engine thread panicked");
            }
        }
    }
}

fn engine_loop<B: PdfBackend>(engine: &mut Engine<B>, requests: &Receiver<Request>) {
    for request in requests {
        match request {
            Request::Call { call, reply } => {
                let result = engine.execute(call);
                if reply.send(result).is_err() {
                    debug!("Caller stopped waiting for a reply");
                }
            }
            Request::Shutdown => break,
        }
    }
    info!(
        "Engine stopped with {} documents and {} textures open",
        engine.open_documents(),
        engine.live_textures()
    );
}
