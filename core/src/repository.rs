use crate::{
    error::Result,
    models::{
        AuditEntry, Dependency, NewSpec, NewTask, Page, Spec, Task, TaskFilter, UpdateSpec,
        UpdateTask,
    },
};
use async_trait::async_trait;

/// Repository trait for task persistence and lifecycle operations.
///
/// Implementations must be thread-safe and support concurrent access. Every
/// mutating method takes the acting agent identity so the audit entry can be
/// written inside the same transaction as the mutation itself.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task under a caller-generated id.
    ///
    /// # Returns
    /// * `Ok(Task)` - The created task in `open` status
    /// * `Err(DomainError::TaskNotFound)` - If `parent_id` references a missing task
    /// * `Err(DomainError::SpecNotFound)` - If `spec_id` references a missing spec
    /// * `Err(DomainError::DuplicateId)` - If `id` already exists; callers retry
    async fn create_task(&self, id: &str, task: NewTask, agent: &str) -> Result<Task>;

    /// Get a task by id.
    ///
    /// # Returns
    /// * `Ok(Some(Task))` - The task if found
    /// * `Ok(None)` - If no task exists with that id
    async fn get_task(&self, id: &str) -> Result<Option<Task>>;

    /// List tasks matching the filter, newest window per `page`.
    ///
    /// # Returns
    /// * `Ok((tasks, total))` - One page of tasks plus the unpaginated count
    async fn list_tasks(&self, filter: TaskFilter, page: Page) -> Result<(Vec<Task>, u64)>;

    /// Apply a partial update, recording one audit diff per changed field.
    ///
    /// # Returns
    /// * `Ok(Task)` - The updated task
    /// * `Err(DomainError::TaskNotFound)` - If the task doesn't exist
    async fn update_task(&self, id: &str, updates: UpdateTask, agent: &str) -> Result<Task>;

    /// Delete a task. Dependency edges cascade; audit entries survive.
    async fn delete_task(&self, id: &str, agent: &str) -> Result<()>;

    /// Atomically claim an `open` task for `agent`.
    ///
    /// Among N concurrent claimers exactly one succeeds; the rest observe
    /// `AlreadyClaimed` (or `InvalidTransition` when the status is neither
    /// `open` nor `in_progress`).
    ///
    /// # Returns
    /// * `Ok(Task)` - The claimed task, now `in_progress`
    /// * `Err(DomainError::TaskNotFound)` - If the task doesn't exist
    /// * `Err(DomainError::AlreadyClaimed)` - If another agent holds the claim
    /// * `Err(DomainError::InvalidTransition)` - If the status forbids claiming
    async fn claim_task(&self, id: &str, agent: &str) -> Result<Task>;

    /// Release an `in_progress` task back to `open`.
    ///
    /// Requires the claiming agent unless `force` is set.
    ///
    /// # Returns
    /// * `Ok(Task)` - The released task with claim fields cleared
    /// * `Err(DomainError::NotOwner)` - If `agent` is not the claimer
    /// * `Err(DomainError::InvalidTransition)` - If the task is not `in_progress`
    async fn release_task(&self, id: &str, agent: &str, force: bool) -> Result<Task>;

    /// Mark an `in_progress` task `done`. Claimer only; claim fields clear.
    async fn complete_task(&self, id: &str, agent: &str) -> Result<Task>;

    /// Transition to `blocked` from any status, clearing any claim.
    async fn block_task(&self, id: &str, agent: &str) -> Result<Task>;

    /// Transition a `blocked` task back to `open`.
    async fn unblock_task(&self, id: &str, agent: &str) -> Result<Task>;

    /// List ready tasks: `open`, with every dependency parent `done`,
    /// ordered by priority ascending then creation time ascending.
    ///
    /// The result reflects a single database snapshot.
    async fn ready_tasks(&self, page: Page) -> Result<(Vec<Task>, u64)>;

    /// Verify database connectivity.
    async fn health_check(&self) -> Result<()>;
}

/// Repository trait for blocking edges between tasks and between specs.
///
/// Both graphs are DAGs at rest; the add methods run their cycle check in
/// the same transaction as the insert, so concurrent adders can never close
/// a cycle together.
#[async_trait]
pub trait DependencyRepository: Send + Sync {
    /// Add the edge "child is blocked until parent is done".
    ///
    /// # Returns
    /// * `Ok(Dependency)` - The inserted edge
    /// * `Err(DomainError::TaskNotFound)` - If either endpoint is missing
    /// * `Err(DomainError::CycleDetected)` - If the edge would close a cycle;
    ///   the context path starts and ends at the child
    /// * `Err(DomainError::Validation)` - Self-edge or duplicate edge
    async fn add_dependency(
        &self,
        child_id: &str,
        parent_id: &str,
        agent: &str,
    ) -> Result<Dependency>;

    /// Remove an edge.
    ///
    /// # Returns
    /// * `Err(DomainError::DependencyNotFound)` - If the edge doesn't exist
    async fn remove_dependency(&self, child_id: &str, parent_id: &str, agent: &str) -> Result<()>;

    /// Every edge where `id` appears as either endpoint, letting callers
    /// render both "depends on" and "blocks".
    async fn list_dependencies_for(&self, id: &str) -> Result<Vec<Dependency>>;

    /// Spec-graph analogue of [`add_dependency`](Self::add_dependency).
    async fn add_spec_dependency(&self, child_id: &str, parent_id: &str) -> Result<Dependency>;

    /// Spec-graph analogue of [`remove_dependency`](Self::remove_dependency).
    async fn remove_spec_dependency(&self, child_id: &str, parent_id: &str) -> Result<()>;

    /// Spec-graph analogue of [`list_dependencies_for`](Self::list_dependencies_for).
    async fn list_spec_dependencies_for(&self, id: &str) -> Result<Vec<Dependency>>;
}

/// Repository trait for specs. Derived fields (`task_count`, `done_count`,
/// `status`) are computed at read time, never persisted.
#[async_trait]
pub trait SpecRepository: Send + Sync {
    /// Insert a new spec under a caller-generated id.
    async fn create_spec(&self, id: &str, spec: NewSpec) -> Result<Spec>;

    /// Get a spec with derived counts and status.
    async fn get_spec(&self, id: &str) -> Result<Option<Spec>>;

    /// List specs with derived counts, one page at a time.
    async fn list_specs(&self, page: Page) -> Result<(Vec<Spec>, u64)>;

    /// Apply a partial update.
    async fn update_spec(&self, id: &str, updates: UpdateSpec) -> Result<Spec>;

    /// Delete a spec. Member tasks lose their `spec_id` but survive.
    async fn delete_spec(&self, id: &str) -> Result<()>;

    /// Set `manual_status` to `"cancelled"`.
    ///
    /// # Returns
    /// * `Err(DomainError::SpecAlreadyCancelled)` - If already cancelled
    async fn cancel_spec(&self, id: &str) -> Result<Spec>;

    /// Clear a `"cancelled"` `manual_status`.
    ///
    /// # Returns
    /// * `Err(DomainError::SpecNotCancelled)` - If not currently cancelled
    async fn reopen_spec(&self, id: &str) -> Result<Spec>;

    /// Specs that are not cancelled, not derived-done, and whose every
    /// parent spec is derived-done. Single-snapshot read.
    async fn ready_specs(&self) -> Result<Vec<Spec>>;

    /// Tasks whose `spec_id` is `spec_id`, paginated.
    async fn tasks_in_spec(&self, spec_id: &str, page: Page) -> Result<(Vec<Task>, u64)>;
}

/// Repository trait for the append-only audit log.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Full audit trail for a task, oldest first.
    async fn task_history(&self, task_id: &str) -> Result<Vec<AuditEntry>>;
}
