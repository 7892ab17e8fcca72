//! clustack Engine - stack compiler
//!
//! This crate turns a normalized [`clustack_core::ClusterSpec`] into CloudFormation
//! documents: one root stack, one control-plane stack and one stack per node pool.
//! Every cross-stack reference goes through the [`ReferenceGraph`], which keeps
//! exports and imports symmetric.

pub mod assembler;
pub mod control_plane;
pub mod document;
pub mod error;
pub mod node_pool;
pub mod payload;
pub mod reference;
pub mod root;
pub mod stack;
pub mod validate;

pub use assembler::{Compiler, CompilerBuilder, RenderedStack, StackSet, compile};
pub use document::{Output, Parameter, Resource, Template};
pub use error::{EngineError, Result};
pub use payload::{
    DEFAULT_VOLUME_ATTACH_MAX_ATTEMPTS, EtcdMember, InstanceRole, PayloadRenderer, PayloadRequest,
    TemplatePayloads,
};
pub use reference::{Attribute, ImportSource, Reference, ReferenceGraph, Target};
pub use stack::StackId;
pub use validate::{MAX_IAM_ROLE_NAME_LEN, MAX_USER_DATA_BYTES, MAX_USER_SECURITY_GROUPS};
