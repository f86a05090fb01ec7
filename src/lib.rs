//! pybridge - call Python scoring callables from native code
//!
//! Resolves a `(module, attribute)` callable inside an embedded CPython,
//! marshals pod metrics into Python objects, invokes the callable and
//! decodes the result, keeping every reference count balanced on the way.

// Boundary modules
pub mod errors;
pub mod ffi;
pub mod interop;
pub mod metrics;

// Runtime and callers
pub mod runtime;
pub mod scorer;

// Infrastructure
pub mod config;
pub mod logging;

// Re-export commonly used items
pub use config::{Config, ConfigError, LoggingConfig, RuntimeConfig, ScorerConfig};
pub use errors::{BridgeError, Result, TextRole};
pub use ffi::{acquire, balanced, release, BorrowedHandle, LeakCheck, OwnedHandle};
pub use interop::{
    decode_scores, invoke, marshal, marshal_batch, marshal_json, resolve, unmarshal, Marshaled, Resolved,
    ScoredPod, SymbolRef,
};
pub use logging::{init_dev_logging, init_logging, init_prod_logging, LogConfig, LogFormat, LogOutput};
pub use metrics::{synthetic_fleet, FieldValue, MetricsRecord};
pub use runtime::{EmbeddedRuntime, Session};
pub use scorer::{top_pods, Scorer};
