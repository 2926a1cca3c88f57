//! Lambda declarations for queuegate
//!
//! Packages a function's code directory as an asset, declares the function
//! with its execution role, and binds it to a queue as a pull-based event source.

pub mod asset;
mod event_source;
mod function;
pub mod runtime;

pub use asset::{Asset, BOOTSTRAP_BUCKET};
pub use event_source::{EventSourceMapping, SqsEventSource};
pub use function::{Function, FunctionProps, LambdaError};
pub use runtime::Runtime;
