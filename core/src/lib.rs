//! Airyra Core Library
//!
//! This crate provides the foundational domain models, validation logic, and
//! trait interfaces for the Airyra task coordination service. All other
//! crates depend on the types and interfaces defined here.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`models`] - Core domain models (Task, Spec, Dependency, AuditEntry)
//! - [`error`] - Typed domain errors with stable wire codes
//! - [`id`] - Short random identifier generation (`ar-`/`sp-` prefixes)
//! - [`repository`] - Repository traits for data persistence
//! - [`validation`] - Input validation utilities
//!
//! # Example
//!
//! ```rust
//! use airyra_core::{
//!     models::NewTask,
//!     validation::Validator,
//! };
//!
//! let new_task = NewTask {
//!     title: "Wire up the claim endpoint".to_string(),
//!     description: Some("Conditional update, one winner".to_string()),
//!     priority: 1,
//!     parent_id: None,
//!     spec_id: None,
//! };
//!
//! // Validate the task before creation
//! Validator::validate_new_task(&new_task).unwrap();
//! ```

pub mod error;
pub mod id;
pub mod models;
pub mod repository;
pub mod validation;

// Re-export commonly used types at the crate root for convenience
pub use error::{DomainError, ErrorBody, ErrorCode, Result, WireError};
pub use models::{
    AuditAction, AuditEntry, Dependency, NewSpec, NewTask, Page, Paged, Pagination, Spec,
    SpecStatus, Task, TaskFilter, TaskStatus, UpdateSpec, UpdateTask,
};
pub use repository::{AuditRepository, DependencyRepository, SpecRepository, TaskRepository};
pub use validation::Validator;

/// Header carrying the self-asserted agent identity on every client request.
pub const AGENT_HEADER: &str = "X-Airyra-Agent";

/// Current version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
