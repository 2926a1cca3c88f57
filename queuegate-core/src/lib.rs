//! Core types for queuegate
//!
//! This crate provides the pieces every declaration crate shares: the
//! deployment environment, logical id allocation and validation errors.

pub mod account;
pub mod error;
pub mod logical_id;

pub use account::Environment;
pub use error::{ErrorCode, ValidationError};
pub use logical_id::LogicalId;
