use crate::{
    error::{DomainError, Result},
    id,
    models::{NewSpec, NewTask, UpdateSpec, UpdateTask},
};

/// Longest accepted title, in characters.
const MAX_TITLE_LEN: usize = 500;
/// Longest accepted project name, in characters.
const MAX_PROJECT_NAME_LEN: usize = 100;
/// Valid priority range (0 = most urgent).
const PRIORITY_RANGE: std::ops::RangeInclusive<i64> = 0..=4;

/// Validation utilities for coordination operations.
///
/// The per-entity validators collect every violation before failing, so a
/// request with three bad fields reports all three in `details`.
pub struct Validator;

impl Validator {
    /// Validate a task or spec title: non-empty after trimming, bounded length.
    pub fn validate_title(title: &str) -> Result<()> {
        let mut details = Vec::new();
        Self::check_title(title, &mut details);
        if details.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(details))
        }
    }

    /// Validate a priority value against the 0..=4 range.
    pub fn validate_priority(priority: i64) -> Result<()> {
        let mut details = Vec::new();
        Self::check_priority(priority, &mut details);
        if details.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(details))
        }
    }

    /// Validate a project name.
    ///
    /// Project names become database file names, so path separators and
    /// drive-letter colons are rejected outright.
    pub fn validate_project_name(name: &str) -> Result<()> {
        let mut details = Vec::new();
        if name.trim().is_empty() {
            details.push("project name must not be empty".to_string());
        }
        if name.len() > MAX_PROJECT_NAME_LEN {
            details.push(format!(
                "project name must be at most {MAX_PROJECT_NAME_LEN} characters"
            ));
        }
        if name.contains(['/', '\\', ':']) {
            details.push("project name must not contain '/', '\\' or ':'".to_string());
        }
        if details.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(details))
        }
    }

    /// Validate an agent identity string. The value is opaque; only emptiness
    /// is rejected.
    pub fn validate_agent(agent: &str) -> Result<()> {
        if agent.trim().is_empty() {
            Err(DomainError::invalid("agent identity must not be empty"))
        } else {
            Ok(())
        }
    }

    /// Validate a complete task-create request.
    pub fn validate_new_task(task: &NewTask) -> Result<()> {
        let mut details = Vec::new();
        Self::check_title(&task.title, &mut details);
        Self::check_priority(task.priority, &mut details);
        if let Some(ref parent_id) = task.parent_id {
            if !id::is_valid_task_id(parent_id) {
                details.push(format!("parent_id is not a valid task id: '{parent_id}'"));
            }
        }
        if let Some(ref spec_id) = task.spec_id {
            if !id::is_valid_spec_id(spec_id) {
                details.push(format!("spec_id is not a valid spec id: '{spec_id}'"));
            }
        }
        if details.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(details))
        }
    }

    /// Validate a partial task update.
    pub fn validate_task_update(updates: &UpdateTask) -> Result<()> {
        let mut details = Vec::new();
        if let Some(ref title) = updates.title {
            Self::check_title(title, &mut details);
        }
        if let Some(priority) = updates.priority {
            Self::check_priority(priority, &mut details);
        }
        if details.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(details))
        }
    }

    /// Validate a complete spec-create request.
    pub fn validate_new_spec(spec: &NewSpec) -> Result<()> {
        Self::validate_title(&spec.title)
    }

    /// Validate a partial spec update.
    pub fn validate_spec_update(updates: &UpdateSpec) -> Result<()> {
        match updates.title {
            Some(ref title) => Self::validate_title(title),
            None => Ok(()),
        }
    }

    fn check_title(title: &str, details: &mut Vec<String>) {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            details.push("title must not be empty".to_string());
        }
        if trimmed.len() > MAX_TITLE_LEN {
            details.push(format!("title must be at most {MAX_TITLE_LEN} characters"));
        }
    }

    fn check_priority(priority: i64, details: &mut Vec<String>) {
        if !PRIORITY_RANGE.contains(&priority) {
            details.push(format!(
                "priority must be between {} and {}, got {priority}",
                PRIORITY_RANGE.start(),
                PRIORITY_RANGE.end()
            ));
        }
    }
}
