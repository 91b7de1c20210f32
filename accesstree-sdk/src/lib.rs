//! Public contract of the accesstree RBAC engine.
//!
//! This crate carries the data model (scope levels, materialized paths,
//! permissions, capabilities), the consumer-facing error type, and the
//! versioned [`AccessTreeClientV1`] trait implemented by the engine.

pub mod api;
pub mod errors;
pub mod models;

pub use api::AccessTreeClientV1;
pub use errors::AccessError;
pub use models::{
    CapType, Capability, CapabilityDef, CatalogSyncReport, ContextLevel, ContextNode, ContextPath,
    Permission, RiskMask, RoleAssignment, RoleOverride, Subject,
};
