//! Local event registry and tracing setup

pub mod emitter;
pub mod tracing;

pub use emitter::{DEFAULT_MAX_LISTENERS, Emitter, Listener, ListenerId, listener};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
