//! Interoperability - crossing into the embedded interpreter
//!
//! Architecture:
//! - `resolve.rs` - `(module, attribute)` → owned callable
//! - `marshal.rs` - `MetricsRecord` → `dict` (plus batch and JSON forms)
//! - `call.rs` - invocation and the `Resolved → Marshaled` pipeline
//! - `decode.rs` - results back into native values

mod call;
mod decode;
mod marshal;
mod resolve;

pub use call::{invoke, invoke_with, Marshaled, Resolved};
pub use decode::{decode_scores, unmarshal, ScoredPod};
pub use marshal::{
    field_key, marshal, marshal_batch, marshal_batch_with, marshal_json, marshal_with, AggregateBuilder,
    FieldConverter, NativeConverter,
};
pub use resolve::{import, resolve, SymbolRef};
