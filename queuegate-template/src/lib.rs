//! CloudFormation template model for queuegate
//!
//! Provides:
//! - Intrinsic function expressions (`Ref`, `Fn::GetAtt`, `Fn::Join`, `Fn::Sub`)
//! - A [`Stack`] that collects typed resource declarations under stable logical ids
//! - Synthesis-time validation (reference integrity, dependency cycles)
//! - Change sets between two templates

pub mod diff;
pub mod expr;
pub mod stack;
pub mod template;
pub mod validate;

pub use diff::{diff, ChangeSet, PropertyChange, ResourceChange};
pub use expr::{Expr, Pseudo};
pub use stack::{CfnResource, Stack};
pub use template::{Output, RemovalPolicy, ResourceEntry, Template, TemplateError};
pub use validate::deployment_order;
