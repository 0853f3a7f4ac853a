//! Per-project persistent store for the Airyra coordination service.
//!
//! Each project gets its own self-contained SQLite database file. This crate
//! provides the repository implementations over sqlx plus the process-wide
//! [`StoreManager`] that lazily creates and caches one store per project.
//!
//! # Features
//!
//! - SQLite with WAL mode for concurrent readers behind a single writer
//! - Embedded migration runner with a `_migrations` version table
//! - Atomic claim/release/complete via conditional updates
//! - Dependency writes with an in-transaction cycle check
//! - Audit entries written in the same transaction as the mutation
//!
//! # Usage
//!
//! ```rust,no_run
//! use airyra_store::StoreManager;
//! use airyra_core::repository::TaskRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = StoreManager::new("/var/lib/airyra/projects").await?;
//!     let store = manager.store_for("alpha").await?;
//!     store.health_check().await?;
//!     Ok(())
//! }
//! ```

mod common;
mod manager;
mod migrations;
mod sqlite;

pub use manager::StoreManager;
pub use migrations::{current_version, run_migrations};
pub use sqlite::ProjectStore;

// Re-export commonly used types from airyra-core for convenience
pub use airyra_core::{
    error::{DomainError, Result},
    models::{
        AuditAction, AuditEntry, Dependency, NewSpec, NewTask, Page, Spec, SpecStatus, Task,
        TaskFilter, TaskStatus, UpdateSpec, UpdateTask,
    },
    repository::{AuditRepository, DependencyRepository, SpecRepository, TaskRepository},
};
