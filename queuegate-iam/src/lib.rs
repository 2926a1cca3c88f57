//! IAM declarations for queuegate
//!
//! Roles with a trust policy naming the service allowed to assume them,
//! managed policy attachments, and an accumulated default inline policy
//! that other constructs grant permissions into.

pub mod policy;
pub mod role;

pub use policy::{Effect, PolicyDocument, Principal, Statement};
pub use role::{IamError, ManagedPolicy, Role, RoleProps};
