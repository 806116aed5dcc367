//! PDF render bridge
//!
//! Binds method-call messages (a method name plus a JSON argument) to a
//! native PDF library: documents and pages are tracked in an id registry,
//! pages are rasterised through a viewport transform into one-shot buffers
//! or persistent texture surfaces.

pub mod backend;
pub mod buffers;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod panic_handler;
pub mod raster;
pub mod registry;
pub mod service;
pub mod texture;
pub mod viewport;

pub use config::BridgeConfig;
pub use engine::{Call, Engine, Reply};
pub use error::{BridgeError, BridgeResult, NativeError};
pub use service::{PendingReply, Service};
