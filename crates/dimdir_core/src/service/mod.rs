//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate registry, segmentation, and repository calls into
//!   document-level operations.
//! - Keep API layers decoupled from storage details.

pub mod directory_service;
