use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::TaskStatus;

/// Result type alias for coordination operations
pub type Result<T> = std::result::Result<T, DomainError>;

/// Typed domain errors for the Airyra coordination service.
///
/// Every variant carries the structured context that travels with it on the
/// wire, maps to a stable upper-snake code ([`ErrorCode`]) and to a fixed
/// HTTP status. The client library reconstructs the same variant from the
/// wire payload, so callers see identical errors in-process and remotely.
///
/// # Examples
///
/// ```rust
/// use airyra_core::error::{DomainError, ErrorCode};
///
/// let err = DomainError::task_not_found("ar-0b5e3d");
/// assert_eq!(err.code(), ErrorCode::TaskNotFound);
/// assert_eq!(err.status_code(), 404);
///
/// let wire = err.to_wire();
/// assert_eq!(wire.code, "TASK_NOT_FOUND");
/// assert_eq!(DomainError::from_wire(wire), err);
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Unknown task id in this project
    #[error("task not found: {id}")]
    TaskNotFound { id: String },

    /// Unknown spec id in this project
    #[error("spec not found: {id}")]
    SpecNotFound { id: String },

    /// Task is in progress under another agent
    #[error("task is already claimed by {claimed_by}")]
    AlreadyClaimed {
        claimed_by: String,
        claimed_at: DateTime<Utc>,
    },

    /// Operation requires the claiming agent
    #[error("task is claimed by {claimed_by}")]
    NotOwner { claimed_by: String },

    /// The state machine forbids this edge
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// Input violates field constraints
    #[error("validation failed: {}", details.join("; "))]
    Validation { details: Vec<String> },

    /// Proposed dependency edge would close a cycle
    #[error("dependency would create a cycle: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    /// Removing an edge that does not exist
    #[error("dependency not found: {child_id} -> {parent_id}")]
    DependencyNotFound {
        child_id: String,
        parent_id: String,
    },

    /// Unknown project name
    #[error("project not found: {project}")]
    ProjectNotFound { project: String },

    /// Cancel applied to an already-cancelled spec
    #[error("spec is already cancelled: {id}")]
    SpecAlreadyCancelled { id: String },

    /// Reopen applied to a spec that is not cancelled
    #[error("spec is not cancelled: {id}")]
    SpecNotCancelled { id: String },

    /// A generated id collided with an existing row. Never leaves the
    /// engine: callers retry with a fresh id.
    #[error("duplicate id: {id}")]
    DuplicateId { id: String },

    /// Catch-all; the wire message is generic, details stay server-side
    #[error("internal error")]
    Internal { message: String },
}

/// Closed set of stable wire codes.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TaskNotFound,
    SpecNotFound,
    AlreadyClaimed,
    NotOwner,
    InvalidTransition,
    ValidationFailed,
    CycleDetected,
    DependencyNotFound,
    ProjectNotFound,
    SpecAlreadyCancelled,
    SpecNotCancelled,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TaskNotFound => "TASK_NOT_FOUND",
            ErrorCode::SpecNotFound => "SPEC_NOT_FOUND",
            ErrorCode::AlreadyClaimed => "ALREADY_CLAIMED",
            ErrorCode::NotOwner => "NOT_OWNER",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::CycleDetected => "CYCLE_DETECTED",
            ErrorCode::DependencyNotFound => "DEPENDENCY_NOT_FOUND",
            ErrorCode::ProjectNotFound => "PROJECT_NOT_FOUND",
            ErrorCode::SpecAlreadyCancelled => "SPEC_ALREADY_CANCELLED",
            ErrorCode::SpecNotCancelled => "SPEC_NOT_CANCELLED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DomainError {
    /// Create a not-found error for a task id
    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::TaskNotFound { id: id.into() }
    }

    /// Create a not-found error for a spec id
    pub fn spec_not_found(id: impl Into<String>) -> Self {
        Self::SpecNotFound { id: id.into() }
    }

    /// Create a validation error from collected violations
    pub fn validation(details: Vec<String>) -> Self {
        Self::Validation { details }
    }

    /// Create a validation error with a single violation
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::Validation {
            details: vec![detail.into()],
        }
    }

    /// Create an internal error; the message is logged, never sent
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a state transition error
    pub fn invalid_transition(from: TaskStatus, to: TaskStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DomainError::TaskNotFound { .. }
                | DomainError::SpecNotFound { .. }
                | DomainError::DependencyNotFound { .. }
                | DomainError::ProjectNotFound { .. }
        )
    }

    /// The stable wire code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            DomainError::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            DomainError::SpecNotFound { .. } => ErrorCode::SpecNotFound,
            DomainError::AlreadyClaimed { .. } => ErrorCode::AlreadyClaimed,
            DomainError::NotOwner { .. } => ErrorCode::NotOwner,
            DomainError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            DomainError::Validation { .. } => ErrorCode::ValidationFailed,
            DomainError::CycleDetected { .. } => ErrorCode::CycleDetected,
            DomainError::DependencyNotFound { .. } => ErrorCode::DependencyNotFound,
            DomainError::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            DomainError::SpecAlreadyCancelled { .. } => ErrorCode::SpecAlreadyCancelled,
            DomainError::SpecNotCancelled { .. } => ErrorCode::SpecNotCancelled,
            DomainError::DuplicateId { .. } | DomainError::Internal { .. } => {
                ErrorCode::InternalError
            }
        }
    }

    /// The fixed HTTP status for this error
    pub fn status_code(&self) -> u16 {
        match self.code() {
            ErrorCode::TaskNotFound
            | ErrorCode::SpecNotFound
            | ErrorCode::DependencyNotFound
            | ErrorCode::ProjectNotFound => 404,
            ErrorCode::AlreadyClaimed | ErrorCode::SpecAlreadyCancelled => 409,
            ErrorCode::NotOwner => 403,
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidTransition
            | ErrorCode::CycleDetected
            | ErrorCode::SpecNotCancelled => 400,
            ErrorCode::InternalError => 500,
        }
    }

    /// Structured context object sent with the error on the wire
    pub fn context(&self) -> Value {
        match self {
            DomainError::TaskNotFound { id }
            | DomainError::SpecNotFound { id }
            | DomainError::SpecAlreadyCancelled { id }
            | DomainError::SpecNotCancelled { id } => json!({ "id": id }),
            DomainError::AlreadyClaimed {
                claimed_by,
                claimed_at,
            } => json!({
                "claimed_by": claimed_by,
                "claimed_at": claimed_at.to_rfc3339(),
            }),
            DomainError::NotOwner { claimed_by } => json!({ "claimed_by": claimed_by }),
            DomainError::InvalidTransition { from, to } => json!({
                "from": from.as_str(),
                "to": to.as_str(),
            }),
            DomainError::Validation { details } => json!({ "details": details }),
            DomainError::CycleDetected { path } => json!({ "path": path }),
            DomainError::DependencyNotFound {
                child_id,
                parent_id,
            } => json!({ "child_id": child_id, "parent_id": parent_id }),
            DomainError::ProjectNotFound { project } => json!({ "project": project }),
            DomainError::DuplicateId { .. } | DomainError::Internal { .. } => json!({}),
        }
    }

    /// Serialize for the wire. Internal details are replaced by a generic
    /// message so nothing server-side leaks.
    pub fn to_wire(&self) -> WireError {
        WireError {
            code: self.code().as_str().to_string(),
            message: self.to_string(),
            context: self.context(),
        }
    }

    /// Rebuild the typed error from a wire payload. Unknown codes and
    /// missing context fields fold into [`DomainError::Internal`].
    pub fn from_wire(wire: WireError) -> Self {
        let ctx = &wire.context;
        let ctx_str = |key: &str| -> String {
            ctx.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        match wire.code.as_str() {
            "TASK_NOT_FOUND" => DomainError::TaskNotFound { id: ctx_str("id") },
            "SPEC_NOT_FOUND" => DomainError::SpecNotFound { id: ctx_str("id") },
            "ALREADY_CLAIMED" => DomainError::AlreadyClaimed {
                claimed_by: ctx_str("claimed_by"),
                claimed_at: ctx
                    .get("claimed_at")
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            },
            "NOT_OWNER" => DomainError::NotOwner {
                claimed_by: ctx_str("claimed_by"),
            },
            "INVALID_TRANSITION" => {
                let parse = |key: &str| ctx_str(key).parse::<TaskStatus>();
                match (parse("from"), parse("to")) {
                    (Ok(from), Ok(to)) => DomainError::InvalidTransition { from, to },
                    _ => DomainError::internal(wire.message.clone()),
                }
            }
            "VALIDATION_FAILED" => DomainError::Validation {
                details: ctx
                    .get("details")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            "CYCLE_DETECTED" => DomainError::CycleDetected {
                path: ctx
                    .get("path")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            "DEPENDENCY_NOT_FOUND" => DomainError::DependencyNotFound {
                child_id: ctx_str("child_id"),
                parent_id: ctx_str("parent_id"),
            },
            "PROJECT_NOT_FOUND" => DomainError::ProjectNotFound {
                project: ctx_str("project"),
            },
            "SPEC_ALREADY_CANCELLED" => DomainError::SpecAlreadyCancelled { id: ctx_str("id") },
            "SPEC_NOT_CANCELLED" => DomainError::SpecNotCancelled { id: ctx_str("id") },
            _ => DomainError::internal(wire.message),
        }
    }
}

/// Wire shape of a single error: `{ "code", "message", "context" }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub context: Value,
}

/// Top-level error response body: `{ "error": { ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: WireError,
}

impl From<DomainError> for ErrorBody {
    fn from(err: DomainError) -> Self {
        ErrorBody {
            error: err.to_wire(),
        }
    }
}
