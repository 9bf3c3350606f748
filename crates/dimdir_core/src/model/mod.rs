//! Domain model for the dimensional directory.
//!
//! # Responsibility
//! - Define canonical data structures shared by repositories and services.
//! - Keep pure identity/addressing logic free of persistence details.
//!
//! # Invariants
//! - `ContentId` is a pure function of normalized sentence text.
//! - Addresses are `(document, zero-based position)` pairs with a stable
//!   textual form.

pub mod address;
pub mod content;
pub mod document;
pub mod plane;
pub mod relation;
