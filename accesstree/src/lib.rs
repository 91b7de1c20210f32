//! Hierarchical RBAC resolution engine.
//!
//! Scopes form a tree (system → category → course → module → block, plus
//! user scopes) with materialized ancestor paths. The engine combines
//! role assignments, explicit permission overrides and scope inheritance
//! to answer `(capability, scope, subject)` questions, and keeps the
//! answer caches coherent across processes through dirty-path flags in
//! the shared store.
//!
//! Entry point: [`engine::AccessEngine`], wired from a SeaORM connection,
//! a [`domain::directory::ContextDirectory`] implementation supplied by
//! the embedding application, and an [`config::AccessConfig`].

pub mod config;
pub mod domain;
pub mod engine;
pub mod infra;

#[cfg(test)]
mod test_support;

pub use config::AccessConfig;
pub use engine::AccessEngine;
