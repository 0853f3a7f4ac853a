use airyra_core::{
    error::{DomainError, Result},
    models::{AuditEntry, Page, Spec, SpecStatus, Task, TaskFilter},
};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};
use std::collections::{HashMap, HashSet, VecDeque};

/// Column list shared by every task SELECT.
pub(crate) const TASK_COLUMNS: &str =
    "id, parent_id, spec_id, title, description, status, priority, claimed_by, claimed_at, created_at, updated_at";

/// Convert a SQLite row to a Task model
pub(crate) fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let status_str: String = row.try_get("status").map_err(db_error)?;
    let status = status_str
        .parse()
        .map_err(|e: String| DomainError::internal(format!("corrupt status column: {e}")))?;

    Ok(Task {
        id: row.try_get("id").map_err(db_error)?,
        parent_id: row.try_get("parent_id").map_err(db_error)?,
        spec_id: row.try_get("spec_id").map_err(db_error)?,
        title: row.try_get("title").map_err(db_error)?,
        description: row.try_get("description").map_err(db_error)?,
        status,
        priority: row.try_get("priority").map_err(db_error)?,
        claimed_by: row.try_get("claimed_by").map_err(db_error)?,
        claimed_at: row.try_get("claimed_at").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
        updated_at: row.try_get("updated_at").map_err(db_error)?,
    })
}

/// Convert a SQLite row (spec columns plus `task_count`/`done_count`
/// aggregates) to a Spec model with its derived status.
pub(crate) fn row_to_spec(row: &SqliteRow) -> Result<Spec> {
    let manual_status: Option<String> = row.try_get("manual_status").map_err(db_error)?;
    let task_count: i64 = row.try_get("task_count").map_err(db_error)?;
    let done_count: i64 = row.try_get("done_count").map_err(db_error)?;
    let status = SpecStatus::derive(manual_status.as_deref(), task_count, done_count);

    Ok(Spec {
        id: row.try_get("id").map_err(db_error)?,
        title: row.try_get("title").map_err(db_error)?,
        description: row.try_get("description").map_err(db_error)?,
        manual_status,
        created_at: row.try_get("created_at").map_err(db_error)?,
        updated_at: row.try_get("updated_at").map_err(db_error)?,
        task_count,
        done_count,
        status,
    })
}

/// Convert a SQLite row to an AuditEntry model
pub(crate) fn row_to_audit_entry(row: &SqliteRow) -> Result<AuditEntry> {
    let action_str: String = row.try_get("action").map_err(db_error)?;
    let action = action_str
        .parse()
        .map_err(|e: String| DomainError::internal(format!("corrupt action column: {e}")))?;

    Ok(AuditEntry {
        id: row.try_get("id").map_err(db_error)?,
        task_id: row.try_get("task_id").map_err(db_error)?,
        action,
        field: row.try_get("field").map_err(db_error)?,
        old_value: row.try_get("old_value").map_err(db_error)?,
        new_value: row.try_get("new_value").map_err(db_error)?,
        changed_at: row.try_get("changed_at").map_err(db_error)?,
        changed_by: row.try_get("changed_by").map_err(db_error)?,
    })
}

/// Map a sqlx error to the generic internal domain error. The driver detail
/// is logged here and never put on the wire.
pub(crate) fn db_error(err: sqlx::Error) -> DomainError {
    tracing::error!(error = %err, "database operation failed");
    DomainError::internal(format!("database operation failed: {err}"))
}

/// True when `err` is a primary-key or unique-index violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}

/// Build the filtered, paginated task listing query.
pub(crate) fn build_task_filter_query(
    filter: &TaskFilter,
    page: Page,
) -> QueryBuilder<'static, Sqlite> {
    let mut qb = task_filter_base(&format!("SELECT {TASK_COLUMNS} FROM tasks"), filter);
    qb.push(" ORDER BY created_at ASC, id ASC LIMIT ");
    qb.push_bind(page.limit());
    qb.push(" OFFSET ");
    qb.push_bind(page.offset());
    qb
}

/// Build the companion count query for the same filter.
pub(crate) fn build_task_filter_count(filter: &TaskFilter) -> QueryBuilder<'static, Sqlite> {
    task_filter_base("SELECT COUNT(*) FROM tasks", filter)
}

fn task_filter_base(select: &str, filter: &TaskFilter) -> QueryBuilder<'static, Sqlite> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(select);
    let mut has_conditions = false;

    if let Some(status) = filter.status {
        qb.push(" WHERE status = ");
        qb.push_bind(status.as_str());
        has_conditions = true;
    }

    if let Some(ref spec_id) = filter.spec_id {
        if has_conditions {
            qb.push(" AND ");
        } else {
            qb.push(" WHERE ");
        }
        qb.push("spec_id = ");
        qb.push_bind(spec_id.clone());
    }

    qb
}

/// Search for a path that would close a cycle if the edge
/// `(child_id, parent_id)` were inserted.
///
/// `edges` is the current `(child, parent)` relation. The walk starts at
/// `parent_id` and follows declared parents breadth-first; reaching
/// `child_id` means the proposed edge closes a loop. The returned path has
/// the form `[child, parent, …, child]`.
pub(crate) fn find_cycle_path(
    edges: &[(String, String)],
    child_id: &str,
    parent_id: &str,
) -> Option<Vec<String>> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for (child, parent) in edges {
        adjacency.entry(child.as_str()).or_default().push(parent);
    }

    let mut predecessors: HashMap<&str, &str> = HashMap::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    visited.insert(parent_id);
    queue.push_back(parent_id);

    while let Some(node) = queue.pop_front() {
        if node == child_id {
            // walk predecessors back to the parent, then prepend the child
            // so the path reads child -> parent -> ... -> child
            let mut chain = vec![node];
            let mut current = node;
            while let Some(&pred) = predecessors.get(current) {
                chain.push(pred);
                current = pred;
            }
            chain.reverse();
            let mut path = Vec::with_capacity(chain.len() + 1);
            path.push(child_id.to_string());
            path.extend(chain.into_iter().map(str::to_string));
            return Some(path);
        }
        if let Some(parents) = adjacency.get(node) {
            for &next in parents {
                if visited.insert(next) {
                    predecessors.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
    }

    None
}

/// Stringify an optional column value for an audit diff.
pub(crate) fn audit_value(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

/// Current time, bound for every timestamp column in a single statement so
/// `updated_at`, `claimed_at` and `changed_at` agree within a transaction.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(c, p)| (c.to_string(), p.to_string()))
            .collect()
    }

    #[test]
    fn test_no_cycle_on_empty_graph() {
        assert_eq!(find_cycle_path(&[], "ar-a", "ar-b"), None);
    }

    #[test]
    fn test_no_cycle_on_chain_extension() {
        // b -> a exists; adding c -> b keeps the graph acyclic
        let existing = edges(&[("ar-b", "ar-a")]);
        assert_eq!(find_cycle_path(&existing, "ar-c", "ar-b"), None);
    }

    #[test]
    fn test_direct_cycle() {
        // b -> a exists; a -> b would close the two-node loop
        let existing = edges(&[("ar-b", "ar-a")]);
        let path = find_cycle_path(&existing, "ar-a", "ar-b").unwrap();
        assert_eq!(path, vec!["ar-a", "ar-b", "ar-a"]);
    }

    #[test]
    fn test_transitive_cycle_path_shape() {
        // x -> y, y -> z; proposing z -> x closes the triangle
        let existing = edges(&[("ar-x", "ar-y"), ("ar-y", "ar-z")]);
        let path = find_cycle_path(&existing, "ar-z", "ar-x").unwrap();
        assert_eq!(path.first().map(String::as_str), Some("ar-z"));
        assert_eq!(path.last().map(String::as_str), Some("ar-z"));
        assert!(path.contains(&"ar-x".to_string()));
        assert!(path.contains(&"ar-y".to_string()));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // d -> b, d -> c, b -> a, c -> a; adding e -> d stays acyclic
        let existing = edges(&[
            ("ar-d", "ar-b"),
            ("ar-d", "ar-c"),
            ("ar-b", "ar-a"),
            ("ar-c", "ar-a"),
        ]);
        assert_eq!(find_cycle_path(&existing, "ar-e", "ar-d"), None);
        // but a -> d would cycle through either branch
        assert!(find_cycle_path(&existing, "ar-a", "ar-d").is_some());
    }
}
