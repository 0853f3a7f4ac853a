//! Coordination engine: the orchestration layer between the HTTP surface
//! and the per-project repository.
//!
//! The engine holds no mutable state between requests; it validates input,
//! generates ids (retrying the rare collision), and delegates to the
//! repository, whose methods run the actual transactions.

use airyra_core::{
    error::{DomainError, Result},
    id,
    models::{
        AuditEntry, Dependency, NewSpec, NewTask, Page, Spec, Task, TaskFilter, UpdateSpec,
        UpdateTask,
    },
    repository::{AuditRepository, DependencyRepository, SpecRepository, TaskRepository},
    validation::Validator,
};
use std::sync::Arc;

// Bounded retry for generated-id collisions
const MAX_ID_ATTEMPTS: u8 = 5;

/// Per-request view over one project's repository.
///
/// Cloning is cheap; constructing one per request is the expected pattern.
#[derive(Clone)]
pub struct CoordinationEngine<R> {
    repo: Arc<R>,
}

impl<R> CoordinationEngine<R>
where
    R: TaskRepository + DependencyRepository + SpecRepository + AuditRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    // ----- tasks -----

    pub async fn create_task(&self, new_task: NewTask, agent: &str) -> Result<Task> {
        Validator::validate_agent(agent)?;
        Validator::validate_new_task(&new_task)?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let task_id = id::generate_task_id();
            match self.repo.create_task(&task_id, new_task.clone(), agent).await {
                Err(DomainError::DuplicateId { .. }) => continue,
                result => return result,
            }
        }
        Err(DomainError::internal(
            "exhausted id generation attempts for task",
        ))
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.repo
            .get_task(task_id)
            .await?
            .ok_or_else(|| DomainError::task_not_found(task_id))
    }

    pub async fn list_tasks(&self, filter: TaskFilter, page: Page) -> Result<(Vec<Task>, u64)> {
        self.repo.list_tasks(filter, page).await
    }

    pub async fn update_task(
        &self,
        task_id: &str,
        updates: UpdateTask,
        agent: &str,
    ) -> Result<Task> {
        Validator::validate_agent(agent)?;
        Validator::validate_task_update(&updates)?;
        self.repo.update_task(task_id, updates, agent).await
    }

    pub async fn delete_task(&self, task_id: &str, agent: &str) -> Result<()> {
        Validator::validate_agent(agent)?;
        self.repo.delete_task(task_id, agent).await
    }

    pub async fn claim_task(&self, task_id: &str, agent: &str) -> Result<Task> {
        Validator::validate_agent(agent)?;
        let task = self.repo.claim_task(task_id, agent).await?;
        tracing::info!(task_id, agent, "task claimed");
        Ok(task)
    }

    pub async fn release_task(&self, task_id: &str, agent: &str, force: bool) -> Result<Task> {
        Validator::validate_agent(agent)?;
        let task = self.repo.release_task(task_id, agent, force).await?;
        tracing::info!(task_id, agent, force, "task released");
        Ok(task)
    }

    pub async fn complete_task(&self, task_id: &str, agent: &str) -> Result<Task> {
        Validator::validate_agent(agent)?;
        let task = self.repo.complete_task(task_id, agent).await?;
        tracing::info!(task_id, agent, "task completed");
        Ok(task)
    }

    pub async fn block_task(&self, task_id: &str, agent: &str) -> Result<Task> {
        Validator::validate_agent(agent)?;
        self.repo.block_task(task_id, agent).await
    }

    pub async fn unblock_task(&self, task_id: &str, agent: &str) -> Result<Task> {
        Validator::validate_agent(agent)?;
        self.repo.unblock_task(task_id, agent).await
    }

    pub async fn ready_tasks(&self, page: Page) -> Result<(Vec<Task>, u64)> {
        self.repo.ready_tasks(page).await
    }

    // ----- task dependencies -----

    pub async fn add_dependency(
        &self,
        child_id: &str,
        parent_id: &str,
        agent: &str,
    ) -> Result<Dependency> {
        Validator::validate_agent(agent)?;
        self.repo.add_dependency(child_id, parent_id, agent).await
    }

    pub async fn remove_dependency(
        &self,
        child_id: &str,
        parent_id: &str,
        agent: &str,
    ) -> Result<()> {
        Validator::validate_agent(agent)?;
        self.repo
            .remove_dependency(child_id, parent_id, agent)
            .await
    }

    pub async fn list_dependencies(&self, task_id: &str) -> Result<Vec<Dependency>> {
        // 404 for an unknown task rather than an empty list
        self.get_task(task_id).await?;
        self.repo.list_dependencies_for(task_id).await
    }

    pub async fn task_history(&self, task_id: &str) -> Result<Vec<AuditEntry>> {
        self.get_task(task_id).await?;
        self.repo.task_history(task_id).await
    }

    // ----- specs -----

    pub async fn create_spec(&self, new_spec: NewSpec) -> Result<Spec> {
        Validator::validate_new_spec(&new_spec)?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let spec_id = id::generate_spec_id();
            match self.repo.create_spec(&spec_id, new_spec.clone()).await {
                Err(DomainError::DuplicateId { .. }) => continue,
                result => return result,
            }
        }
        Err(DomainError::internal(
            "exhausted id generation attempts for spec",
        ))
    }

    pub async fn get_spec(&self, spec_id: &str) -> Result<Spec> {
        self.repo
            .get_spec(spec_id)
            .await?
            .ok_or_else(|| DomainError::spec_not_found(spec_id))
    }

    pub async fn list_specs(&self, page: Page) -> Result<(Vec<Spec>, u64)> {
        self.repo.list_specs(page).await
    }

    pub async fn update_spec(&self, spec_id: &str, updates: UpdateSpec) -> Result<Spec> {
        Validator::validate_spec_update(&updates)?;
        self.repo.update_spec(spec_id, updates).await
    }

    pub async fn delete_spec(&self, spec_id: &str) -> Result<()> {
        self.repo.delete_spec(spec_id).await
    }

    pub async fn cancel_spec(&self, spec_id: &str) -> Result<Spec> {
        self.repo.cancel_spec(spec_id).await
    }

    pub async fn reopen_spec(&self, spec_id: &str) -> Result<Spec> {
        self.repo.reopen_spec(spec_id).await
    }

    /// Ready specs are computed from one snapshot; the window is applied
    /// here because the set is typically small.
    pub async fn ready_specs(&self, page: Page) -> Result<(Vec<Spec>, u64)> {
        let all = self.repo.ready_specs().await?;
        let total = all.len() as u64;
        let start = (page.offset() as usize).min(all.len());
        let end = (start + page.limit() as usize).min(all.len());
        Ok((all[start..end].to_vec(), total))
    }

    pub async fn tasks_in_spec(&self, spec_id: &str, page: Page) -> Result<(Vec<Task>, u64)> {
        self.repo.tasks_in_spec(spec_id, page).await
    }

    // ----- spec dependencies -----

    pub async fn add_spec_dependency(
        &self,
        child_id: &str,
        parent_id: &str,
    ) -> Result<Dependency> {
        self.repo.add_spec_dependency(child_id, parent_id).await
    }

    pub async fn remove_spec_dependency(&self, child_id: &str, parent_id: &str) -> Result<()> {
        self.repo.remove_spec_dependency(child_id, parent_id).await
    }

    pub async fn list_spec_dependencies(&self, spec_id: &str) -> Result<Vec<Dependency>> {
        self.get_spec(spec_id).await?;
        self.repo.list_spec_dependencies_for(spec_id).await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.repo.health_check().await
    }
}
