use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work within a project.
///
/// Tasks move through a small state machine (see [`TaskStatus`]) and may be
/// claimed by exactly one agent at a time. `claimed_by`/`claimed_at` are set
/// iff the task is `in_progress`.
///
/// # Examples
///
/// ```rust
/// use airyra_core::models::{Task, TaskStatus};
/// use chrono::Utc;
///
/// let task = Task {
///     id: "ar-3fa9c1".to_string(),
///     parent_id: None,
///     spec_id: None,
///     title: "Implement ready-work query".to_string(),
///     description: None,
///     status: TaskStatus::Open,
///     priority: 2,
///     claimed_by: None,
///     claimed_at: None,
///     created_at: Utc::now(),
///     updated_at: Utc::now(),
/// };
///
/// assert!(task.status.can_transition_to(TaskStatus::InProgress));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Short unique identifier (`ar-` prefix)
    pub id: String,
    /// Optional parent task (hierarchy only, not a blocking relation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Optional owning spec (`sp-` prefix)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_id: Option<String>,
    /// Short task title
    pub title: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Urgency, 0 (most urgent) through 4
    pub priority: i64,
    /// Claiming agent identity; set iff status is `in_progress`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    /// When the current claim was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    /// Creation timestamp (UTC)
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp (UTC)
    pub updated_at: DateTime<Utc>,
}

/// Task lifecycle states.
///
/// Allowed transitions:
///
/// - `open` → `in_progress` (claim)
/// - `in_progress` → `open` (release)
/// - `in_progress` → `done` (mark done by the claimer)
/// - any state → `blocked` (block; this includes `done`, preserved from the
///   observed behavior of the protocol)
/// - `blocked` → `open` (unblock)
///
/// Every other edge is rejected with an `INVALID_TRANSITION` error.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Unclaimed and workable (dependencies permitting)
    Open,
    /// Claimed by an agent
    InProgress,
    /// Parked; excluded from the ready list
    Blocked,
    /// Terminal for the claim protocol; still deletable
    Done,
}

impl TaskStatus {
    /// Stable wire/storage string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        }
    }

    /// Whether the state machine allows moving from `self` to `to`.
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, to) {
            (Open, InProgress) => true,
            (InProgress, Open) => true,
            (InProgress, Done) => true,
            // block is allowed from any state, done included
            (_, Blocked) => true,
            (Blocked, Open) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(TaskStatus::Open),
            "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "done" => Ok(TaskStatus::Done),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Default priority assigned when a create request omits it.
pub const DEFAULT_PRIORITY: i64 = 2;

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

/// Data transfer object for creating new tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    /// Short task title
    pub title: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Urgency, 0 (most urgent) through 4
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// Optional parent task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Optional owning spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_id: Option<String>,
}

/// Partial update for a task; only non-`None` fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl UpdateTask {
    /// True when no field is set; such an update is a no-op.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.priority.is_none()
    }
}

/// A directed blocking edge: `child_id` is blocked until `parent_id` is done.
///
/// The same shape is used for edges between specs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    pub child_id: String,
    pub parent_id: String,
}

/// Persisted value of a manually cancelled spec.
pub const MANUAL_STATUS_CANCELLED: &str = "cancelled";

/// An epic-like grouping of tasks.
///
/// `task_count`, `done_count` and `status` are derived on read and never
/// persisted; only `manual_status` (null or `"cancelled"`) is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Spec {
    /// Short unique identifier (`sp-` prefix)
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Either absent or the literal `"cancelled"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of tasks whose `spec_id` points here (derived)
    pub task_count: i64,
    /// Subset of those tasks with status `done` (derived)
    pub done_count: i64,
    /// Derived lifecycle status
    pub status: SpecStatus,
}

/// Derived spec lifecycle status.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpecStatus {
    Draft,
    Active,
    Done,
    Cancelled,
}

impl SpecStatus {
    /// Compute the derived status from the persisted `manual_status` and the
    /// current task counts.
    pub fn derive(manual_status: Option<&str>, task_count: i64, done_count: i64) -> SpecStatus {
        if manual_status == Some(MANUAL_STATUS_CANCELLED) {
            SpecStatus::Cancelled
        } else if task_count == 0 {
            SpecStatus::Draft
        } else if done_count == task_count {
            SpecStatus::Done
        } else {
            SpecStatus::Active
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecStatus::Draft => "draft",
            SpecStatus::Active => "active",
            SpecStatus::Done => "done",
            SpecStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SpecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data transfer object for creating new specs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewSpec {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Partial update for a spec; only non-`None` fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UpdateSpec {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

/// What a task mutation did, as recorded in the audit log.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Claim,
    Release,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Claim => "claim",
            AuditAction::Release => "release",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "create" => Ok(AuditAction::Create),
            "update" => Ok(AuditAction::Update),
            "delete" => Ok(AuditAction::Delete),
            "claim" => Ok(AuditAction::Claim),
            "release" => Ok(AuditAction::Release),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

/// Immutable record of a task mutation. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// Monotonic entry id
    pub id: i64,
    pub task_id: String,
    pub action: AuditAction,
    /// Field name for per-field `update` diffs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
    /// Agent identity taken from the request header
    pub changed_by: String,
}

/// Filter criteria for task listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub spec_id: Option<String>,
}

/// Default page size for list endpoints.
pub const DEFAULT_PER_PAGE: u32 = 50;
/// Hard ceiling on page size; larger requests are clamped.
pub const MAX_PER_PAGE: u32 = 100;

/// A clamped pagination window: `page >= 1`, `per_page` in `[1, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    /// Build a window from raw request values, clamping out-of-range input.
    pub fn clamped(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::clamped(None, None)
    }
}

/// Pagination block of the list-response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// List-response envelope: `{ "data": [...], "pagination": {...} }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paged<T> {
    pub fn new(data: Vec<T>, page: Page, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            total.div_ceil(u64::from(page.per_page))
        };
        Self {
            data,
            pagination: Pagination {
                page: page.page,
                per_page: page.per_page,
                total,
                total_pages,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_round_trip() {
        for status in [
            TaskStatus::Open,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Done,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("archived".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: TaskStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(back, TaskStatus::Blocked);
    }

    #[test]
    fn test_transition_matrix() {
        use TaskStatus::*;

        assert!(Open.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Open));
        assert!(InProgress.can_transition_to(Done));
        assert!(Blocked.can_transition_to(Open));

        // block is reachable from every state
        for from in [Open, InProgress, Blocked, Done] {
            assert!(from.can_transition_to(Blocked), "{from} -> blocked");
        }

        // everything else is forbidden
        assert!(!Open.can_transition_to(Done));
        assert!(!Open.can_transition_to(Open));
        assert!(!Done.can_transition_to(Open));
        assert!(!Done.can_transition_to(InProgress));
        assert!(!Blocked.can_transition_to(InProgress));
        assert!(!Blocked.can_transition_to(Done));
    }

    #[test]
    fn test_spec_status_derivation() {
        assert_eq!(SpecStatus::derive(None, 0, 0), SpecStatus::Draft);
        assert_eq!(SpecStatus::derive(None, 3, 0), SpecStatus::Active);
        assert_eq!(SpecStatus::derive(None, 3, 2), SpecStatus::Active);
        assert_eq!(SpecStatus::derive(None, 3, 3), SpecStatus::Done);
        // manual cancellation wins over everything
        assert_eq!(
            SpecStatus::derive(Some(MANUAL_STATUS_CANCELLED), 3, 3),
            SpecStatus::Cancelled
        );
        assert_eq!(
            SpecStatus::derive(Some(MANUAL_STATUS_CANCELLED), 0, 0),
            SpecStatus::Cancelled
        );
    }

    #[test]
    fn test_page_clamping() {
        let page = Page::clamped(None, None);
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, DEFAULT_PER_PAGE);

        let page = Page::clamped(Some(0), Some(0));
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 1);

        let page = Page::clamped(Some(3), Some(1000));
        assert_eq!(page.page, 3);
        assert_eq!(page.per_page, MAX_PER_PAGE);
        assert_eq!(page.offset(), 200);
        assert_eq!(page.limit(), 100);
    }

    #[test]
    fn test_paged_envelope_totals() {
        let paged = Paged::new(vec![1, 2, 3], Page::clamped(Some(1), Some(3)), 7);
        assert_eq!(paged.pagination.total, 7);
        assert_eq!(paged.pagination.total_pages, 3);

        let empty: Paged<i32> = Paged::new(vec![], Page::default(), 0);
        assert_eq!(empty.pagination.total_pages, 0);
    }

    #[test]
    fn test_optional_fields_omitted_on_wire() {
        let task = Task {
            id: "ar-00aa11".to_string(),
            parent_id: None,
            spec_id: None,
            title: "t".to_string(),
            description: None,
            status: TaskStatus::Open,
            priority: 2,
            claimed_by: None,
            claimed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&task).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("claimed_by"));
        assert!(!obj.contains_key("claimed_at"));
        assert!(!obj.contains_key("description"));
        assert!(!obj.contains_key("parent_id"));
        assert_eq!(obj["status"], "open");
    }

    #[test]
    fn test_new_task_defaults_priority() {
        let new_task: NewTask = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert_eq!(new_task.priority, DEFAULT_PRIORITY);
        assert!(new_task.description.is_none());
    }

    #[test]
    fn test_update_task_is_empty() {
        assert!(UpdateTask::default().is_empty());
        let update = UpdateTask {
            priority: Some(0),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
