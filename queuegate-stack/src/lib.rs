//! The queuegate stack
//!
//! Composes the queue, the gateway's role, the REST API and the triggered
//! function into one stack, and writes the resulting cloud assembly.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use queuegate_stack::{write_assembly, OutputFormat, StackConfig, Topology};
//!
//! let topology = Topology::build(&StackConfig::default())?;
//! let template = topology.synth()?;
//! write_assembly(
//!     "cdk.out".as_ref(),
//!     topology.stack().name(),
//!     &template,
//!     &[topology.function().asset()],
//!     OutputFormat::Json,
//! )?;
//! # Ok::<(), queuegate_stack::StackError>(())
//! ```

pub mod assembly;
pub mod config;
mod error;
pub mod topology;

pub use assembly::{write_assembly, Assembly, AssetManifest, OutputFormat};
pub use config::{
    ApiConfig, EventSourceConfig, FunctionConfig, QueueAccess, QueueConfig, RoleConfig,
    RootMethod, StackConfig,
};
pub use error::StackError;
pub use topology::Topology;
