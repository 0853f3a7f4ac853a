use crate::common::{
    audit_value, build_task_filter_count, build_task_filter_query, db_error, find_cycle_path,
    is_unique_violation, now, row_to_audit_entry, row_to_spec, row_to_task, TASK_COLUMNS,
};
use airyra_core::{
    error::{DomainError, Result},
    models::{
        AuditAction, AuditEntry, Dependency, NewSpec, NewTask, Page, Spec, SpecStatus, Task,
        TaskFilter, TaskStatus, UpdateSpec, UpdateTask, MANUAL_STATUS_CANCELLED,
    },
    repository::{AuditRepository, DependencyRepository, SpecRepository, TaskRepository},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::path::Path;
use std::time::Duration;

/// Spec SELECT with the derived count columns attached.
const SPEC_SELECT: &str = "SELECT s.id, s.title, s.description, s.manual_status, s.created_at, s.updated_at, \
     (SELECT COUNT(*) FROM tasks t WHERE t.spec_id = s.id) AS task_count, \
     (SELECT COUNT(*) FROM tasks t WHERE t.spec_id = s.id AND t.status = 'done') AS done_count \
     FROM specs s";

/// Ready predicate: open, and no non-done parent behind any incoming edge.
const READY_PREDICATE: &str = "t.status = 'open' AND NOT EXISTS (\
     SELECT 1 FROM dependencies d JOIN tasks p ON p.id = d.parent_id \
     WHERE d.child_id = t.id AND p.status != 'done')";

/// SQLite-backed store for one project's task graph.
///
/// Every multi-row mutation runs inside a single transaction, including its
/// audit entry, so a mutation and its audit record are visible together or
/// not at all. Claim, release and complete use conditional updates: among N
/// concurrent claimers of one task exactly one update sticks.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    pool: SqlitePool,
}

impl ProjectStore {
    /// Open (creating if missing) the database file at `path`.
    ///
    /// The connection is configured for durability with concurrent readers:
    /// WAL journal, `synchronous = NORMAL`, a 5 second busy timeout, and
    /// foreign key enforcement.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options).await.map_err(db_error)?;

        Ok(Self { pool })
    }

    /// Apply pending schema migrations. Call once after opening.
    pub async fn migrate(&self) -> Result<()> {
        crate::migrations::run_migrations(&self.pool).await
    }

    /// Access the underlying pool. Intended for tests that need raw SQL.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Delete audit entries older than `cutoff`, returning how many rows
    /// were removed. Maintenance only: no API operation deletes audit rows.
    pub async fn prune_audit_log(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM audit_log WHERE changed_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    /// Close the pool, flushing WAL state.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn insert_audit(
    conn: &mut SqliteConnection,
    task_id: &str,
    action: AuditAction,
    field: Option<&str>,
    old_value: Option<String>,
    new_value: Option<String>,
    changed_at: DateTime<Utc>,
    agent: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO audit_log (task_id, action, field, old_value, new_value, changed_at, changed_by) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task_id)
    .bind(action.as_str())
    .bind(field)
    .bind(old_value)
    .bind(new_value)
    .bind(changed_at)
    .bind(agent)
    .execute(conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn fetch_task(conn: &mut SqliteConnection, id: &str) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(db_error)?;
    row.as_ref().map(row_to_task).transpose()
}

async fn fetch_spec(conn: &mut SqliteConnection, id: &str) -> Result<Option<Spec>> {
    let sql = format!("{SPEC_SELECT} WHERE s.id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(db_error)?;
    row.as_ref().map(row_to_spec).transpose()
}

async fn row_exists(conn: &mut SqliteConnection, table: &str, id: &str) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?)");
    sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_one(conn)
        .await
        .map_err(db_error)
}

/// Which of the two dependency graphs an edge operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Graph {
    Tasks,
    Specs,
}

impl Graph {
    fn edge_table(self) -> &'static str {
        match self {
            Graph::Tasks => "dependencies",
            Graph::Specs => "spec_dependencies",
        }
    }

    fn node_table(self) -> &'static str {
        match self {
            Graph::Tasks => "tasks",
            Graph::Specs => "specs",
        }
    }

    fn missing(self, id: &str) -> DomainError {
        match self {
            Graph::Tasks => DomainError::task_not_found(id),
            Graph::Specs => DomainError::spec_not_found(id),
        }
    }
}

impl ProjectStore {
    /// Insert an edge after verifying endpoints, duplication and acyclicity,
    /// all inside one transaction. `audit_agent` is set for the task graph
    /// only; spec edges are not task mutations.
    async fn add_edge(
        &self,
        graph: Graph,
        child_id: &str,
        parent_id: &str,
        audit_agent: Option<&str>,
    ) -> Result<Dependency> {
        if child_id == parent_id {
            return Err(DomainError::invalid(format!(
                "'{child_id}' cannot depend on itself"
            )));
        }

        let mut tx: Transaction<'_, Sqlite> = self.pool.begin().await.map_err(db_error)?;

        for id in [child_id, parent_id] {
            if !row_exists(&mut *tx, graph.node_table(), id).await? {
                return Err(graph.missing(id));
            }
        }

        let exists_sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE child_id = ? AND parent_id = ?)",
            graph.edge_table()
        );
        let duplicate: bool = sqlx::query_scalar(&exists_sql)
            .bind(child_id)
            .bind(parent_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
        if duplicate {
            return Err(DomainError::invalid(format!(
                "dependency already exists: {child_id} -> {parent_id}"
            )));
        }

        // The cycle check reads the edge set in the same transaction as the
        // insert, so two concurrent adders cannot both slip a cycle in.
        let edges_sql = format!("SELECT child_id, parent_id FROM {}", graph.edge_table());
        let edges: Vec<(String, String)> = sqlx::query_as(&edges_sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;
        if let Some(path) = find_cycle_path(&edges, child_id, parent_id) {
            return Err(DomainError::CycleDetected { path });
        }

        let insert_sql = format!(
            "INSERT INTO {} (child_id, parent_id) VALUES (?, ?)",
            graph.edge_table()
        );
        sqlx::query(&insert_sql)
            .bind(child_id)
            .bind(parent_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        if let Some(agent) = audit_agent {
            insert_audit(
                &mut *tx,
                child_id,
                AuditAction::Update,
                Some("dependency"),
                None,
                Some(parent_id.to_string()),
                now(),
                agent,
            )
            .await?;
        }

        tx.commit().await.map_err(db_error)?;

        Ok(Dependency {
            child_id: child_id.to_string(),
            parent_id: parent_id.to_string(),
        })
    }

    async fn remove_edge(
        &self,
        graph: Graph,
        child_id: &str,
        parent_id: &str,
        audit_agent: Option<&str>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let delete_sql = format!(
            "DELETE FROM {} WHERE child_id = ? AND parent_id = ?",
            graph.edge_table()
        );
        let result = sqlx::query(&delete_sql)
            .bind(child_id)
            .bind(parent_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::DependencyNotFound {
                child_id: child_id.to_string(),
                parent_id: parent_id.to_string(),
            });
        }

        if let Some(agent) = audit_agent {
            insert_audit(
                &mut *tx,
                child_id,
                AuditAction::Update,
                Some("dependency"),
                Some(parent_id.to_string()),
                None,
                now(),
                agent,
            )
            .await?;
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn list_edges_for(&self, graph: Graph, id: &str) -> Result<Vec<Dependency>> {
        let sql = format!(
            "SELECT child_id, parent_id FROM {} WHERE child_id = ? OR parent_id = ? \
             ORDER BY child_id, parent_id",
            graph.edge_table()
        );
        let edges: Vec<(String, String)> = sqlx::query_as(&sql)
            .bind(id)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(edges
            .into_iter()
            .map(|(child_id, parent_id)| Dependency {
                child_id,
                parent_id,
            })
            .collect())
    }
}

#[async_trait]
impl TaskRepository for ProjectStore {
    async fn create_task(&self, id: &str, task: NewTask, agent: &str) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        if let Some(ref parent_id) = task.parent_id {
            if !row_exists(&mut *tx, "tasks", parent_id).await? {
                return Err(DomainError::task_not_found(parent_id));
            }
        }
        if let Some(ref spec_id) = task.spec_id {
            if !row_exists(&mut *tx, "specs", spec_id).await? {
                return Err(DomainError::spec_not_found(spec_id));
            }
        }

        let created_at = now();
        let insert = sqlx::query(
            "INSERT INTO tasks (id, parent_id, spec_id, title, description, status, priority, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&task.parent_id)
        .bind(&task.spec_id)
        .bind(task.title.trim())
        .bind(&task.description)
        .bind(TaskStatus::Open.as_str())
        .bind(task.priority)
        .bind(created_at)
        .bind(created_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(DomainError::DuplicateId { id: id.to_string() });
            }
            return Err(db_error(err));
        }

        insert_audit(
            &mut *tx,
            id,
            AuditAction::Create,
            None,
            None,
            None,
            created_at,
            agent,
        )
        .await?;

        let created = fetch_task(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::internal("created task vanished inside transaction"))?;

        tx.commit().await.map_err(db_error)?;
        Ok(created)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list_tasks(&self, filter: TaskFilter, page: Page) -> Result<(Vec<Task>, u64)> {
        let total: i64 = build_task_filter_count(&filter)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        let rows = build_task_filter_query(&filter, page)
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let tasks = rows
            .iter()
            .map(row_to_task)
            .collect::<Result<Vec<Task>>>()?;

        Ok((tasks, total as u64))
    }

    async fn update_task(&self, id: &str, updates: UpdateTask, agent: &str) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let existing = fetch_task(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::task_not_found(id))?;

        if updates.is_empty() {
            return Ok(existing);
        }

        // Collect (field, old, new) diffs for the audit trail; fields whose
        // value does not change are not recorded and not rewritten.
        let mut diffs: Vec<(&str, Option<String>, Option<String>)> = Vec::new();

        let new_title = updates.title.as_ref().map(|t| t.trim().to_string());
        if let Some(ref title) = new_title {
            if *title != existing.title {
                diffs.push((
                    "title",
                    Some(existing.title.clone()),
                    Some(title.clone()),
                ));
            }
        }
        if let Some(ref description) = updates.description {
            if Some(description) != existing.description.as_ref() {
                diffs.push((
                    "description",
                    existing.description.clone(),
                    Some(description.clone()),
                ));
            }
        }
        if let Some(priority) = updates.priority {
            if priority != existing.priority {
                diffs.push((
                    "priority",
                    Some(existing.priority.to_string()),
                    Some(priority.to_string()),
                ));
            }
        }

        if diffs.is_empty() {
            return Ok(existing);
        }

        let updated_at = now();
        let mut qb: sqlx::QueryBuilder<Sqlite> = sqlx::QueryBuilder::new("UPDATE tasks SET ");
        if let Some(ref title) = new_title {
            qb.push("title = ");
            qb.push_bind(title.clone());
            qb.push(", ");
        }
        if let Some(ref description) = updates.description {
            qb.push("description = ");
            qb.push_bind(description.clone());
            qb.push(", ");
        }
        if let Some(priority) = updates.priority {
            qb.push("priority = ");
            qb.push_bind(priority);
            qb.push(", ");
        }
        qb.push("updated_at = ");
        qb.push_bind(updated_at);
        qb.push(" WHERE id = ");
        qb.push_bind(id.to_string());

        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        for (field, old_value, new_value) in diffs {
            insert_audit(
                &mut *tx,
                id,
                AuditAction::Update,
                Some(field),
                old_value,
                new_value,
                updated_at,
                agent,
            )
            .await?;
        }

        let updated = fetch_task(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::task_not_found(id))?;

        tx.commit().await.map_err(db_error)?;
        Ok(updated)
    }

    async fn delete_task(&self, id: &str, agent: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::task_not_found(id));
        }

        insert_audit(
            &mut *tx,
            id,
            AuditAction::Delete,
            None,
            None,
            None,
            now(),
            agent,
        )
        .await?;

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn claim_task(&self, id: &str, agent: &str) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let claimed_at = now();

        // Single conditional update: of N concurrent claimers exactly one
        // observes rows_affected == 1.
        let result = sqlx::query(
            "UPDATE tasks SET status = 'in_progress', claimed_by = ?, claimed_at = ?, updated_at = ? \
             WHERE id = ? AND status = 'open'",
        )
        .bind(agent)
        .bind(claimed_at)
        .bind(claimed_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            // Re-read in the same transaction to tell the caller why.
            return match fetch_task(&mut *tx, id).await? {
                None => Err(DomainError::task_not_found(id)),
                Some(task) if task.status == TaskStatus::InProgress => {
                    Err(DomainError::AlreadyClaimed {
                        claimed_by: task.claimed_by.unwrap_or_default(),
                        claimed_at: task.claimed_at.unwrap_or(claimed_at),
                    })
                }
                Some(task) => Err(DomainError::invalid_transition(
                    task.status,
                    TaskStatus::InProgress,
                )),
            };
        }

        insert_audit(
            &mut *tx,
            id,
            AuditAction::Claim,
            None,
            None,
            Some(agent.to_string()),
            claimed_at,
            agent,
        )
        .await?;

        let claimed = fetch_task(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::task_not_found(id))?;

        tx.commit().await.map_err(db_error)?;
        Ok(claimed)
    }

    async fn release_task(&self, id: &str, agent: &str, force: bool) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let released_at = now();

        let result = if force {
            sqlx::query(
                "UPDATE tasks SET status = 'open', claimed_by = NULL, claimed_at = NULL, updated_at = ? \
                 WHERE id = ? AND status = 'in_progress'",
            )
            .bind(released_at)
            .bind(id)
            .execute(&mut *tx)
            .await
        } else {
            sqlx::query(
                "UPDATE tasks SET status = 'open', claimed_by = NULL, claimed_at = NULL, updated_at = ? \
                 WHERE id = ? AND status = 'in_progress' AND claimed_by = ?",
            )
            .bind(released_at)
            .bind(id)
            .bind(agent)
            .execute(&mut *tx)
            .await
        }
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return match fetch_task(&mut *tx, id).await? {
                None => Err(DomainError::task_not_found(id)),
                Some(task) if task.status != TaskStatus::InProgress => Err(
                    DomainError::invalid_transition(task.status, TaskStatus::Open),
                ),
                Some(task) => Err(DomainError::NotOwner {
                    claimed_by: task.claimed_by.unwrap_or_default(),
                }),
            };
        }

        insert_audit(
            &mut *tx,
            id,
            AuditAction::Release,
            None,
            None,
            None,
            released_at,
            agent,
        )
        .await?;

        let released = fetch_task(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::task_not_found(id))?;

        tx.commit().await.map_err(db_error)?;
        Ok(released)
    }

    async fn complete_task(&self, id: &str, agent: &str) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let completed_at = now();

        let result = sqlx::query(
            "UPDATE tasks SET status = 'done', claimed_by = NULL, claimed_at = NULL, updated_at = ? \
             WHERE id = ? AND status = 'in_progress' AND claimed_by = ?",
        )
        .bind(completed_at)
        .bind(id)
        .bind(agent)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return match fetch_task(&mut *tx, id).await? {
                None => Err(DomainError::task_not_found(id)),
                Some(task) if task.status == TaskStatus::InProgress => {
                    Err(DomainError::NotOwner {
                        claimed_by: task.claimed_by.unwrap_or_default(),
                    })
                }
                Some(task) => Err(DomainError::invalid_transition(
                    task.status,
                    TaskStatus::Done,
                )),
            };
        }

        insert_audit(
            &mut *tx,
            id,
            AuditAction::Update,
            Some("status"),
            audit_value(Some(TaskStatus::InProgress.as_str())),
            audit_value(Some(TaskStatus::Done.as_str())),
            completed_at,
            agent,
        )
        .await?;

        let completed = fetch_task(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::task_not_found(id))?;

        tx.commit().await.map_err(db_error)?;
        Ok(completed)
    }

    async fn block_task(&self, id: &str, agent: &str) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let existing = fetch_task(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::task_not_found(id))?;

        // block is reachable from every status, done included; any claim is
        // dropped so claimed_by stays tied to in_progress
        let blocked_at = now();
        sqlx::query(
            "UPDATE tasks SET status = 'blocked', claimed_by = NULL, claimed_at = NULL, updated_at = ? \
             WHERE id = ?",
        )
        .bind(blocked_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        insert_audit(
            &mut *tx,
            id,
            AuditAction::Update,
            Some("status"),
            audit_value(Some(existing.status.as_str())),
            audit_value(Some(TaskStatus::Blocked.as_str())),
            blocked_at,
            agent,
        )
        .await?;

        let blocked = fetch_task(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::task_not_found(id))?;

        tx.commit().await.map_err(db_error)?;
        Ok(blocked)
    }

    async fn unblock_task(&self, id: &str, agent: &str) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let unblocked_at = now();

        let result = sqlx::query(
            "UPDATE tasks SET status = 'open', updated_at = ? WHERE id = ? AND status = 'blocked'",
        )
        .bind(unblocked_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return match fetch_task(&mut *tx, id).await? {
                None => Err(DomainError::task_not_found(id)),
                Some(task) => Err(DomainError::invalid_transition(
                    task.status,
                    TaskStatus::Open,
                )),
            };
        }

        insert_audit(
            &mut *tx,
            id,
            AuditAction::Update,
            Some("status"),
            audit_value(Some(TaskStatus::Blocked.as_str())),
            audit_value(Some(TaskStatus::Open.as_str())),
            unblocked_at,
            agent,
        )
        .await?;

        let unblocked = fetch_task(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::task_not_found(id))?;

        tx.commit().await.map_err(db_error)?;
        Ok(unblocked)
    }

    async fn ready_tasks(&self, page: Page) -> Result<(Vec<Task>, u64)> {
        // One transaction so the count and the page reflect one snapshot.
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let count_sql = format!("SELECT COUNT(*) FROM tasks t WHERE {READY_PREDICATE}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

        let select_sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t WHERE {READY_PREDICATE} \
             ORDER BY t.priority ASC, t.created_at ASC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&select_sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        let tasks = rows
            .iter()
            .map(row_to_task)
            .collect::<Result<Vec<Task>>>()?;

        Ok((tasks, total as u64))
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl DependencyRepository for ProjectStore {
    async fn add_dependency(
        &self,
        child_id: &str,
        parent_id: &str,
        agent: &str,
    ) -> Result<Dependency> {
        self.add_edge(Graph::Tasks, child_id, parent_id, Some(agent))
            .await
    }

    async fn remove_dependency(&self, child_id: &str, parent_id: &str, agent: &str) -> Result<()> {
        self.remove_edge(Graph::Tasks, child_id, parent_id, Some(agent))
            .await
    }

    async fn list_dependencies_for(&self, id: &str) -> Result<Vec<Dependency>> {
        self.list_edges_for(Graph::Tasks, id).await
    }

    async fn add_spec_dependency(&self, child_id: &str, parent_id: &str) -> Result<Dependency> {
        self.add_edge(Graph::Specs, child_id, parent_id, None).await
    }

    async fn remove_spec_dependency(&self, child_id: &str, parent_id: &str) -> Result<()> {
        self.remove_edge(Graph::Specs, child_id, parent_id, None)
            .await
    }

    async fn list_spec_dependencies_for(&self, id: &str) -> Result<Vec<Dependency>> {
        self.list_edges_for(Graph::Specs, id).await
    }
}

#[async_trait]
impl SpecRepository for ProjectStore {
    async fn create_spec(&self, id: &str, spec: NewSpec) -> Result<Spec> {
        let created_at = now();
        let insert = sqlx::query(
            "INSERT INTO specs (id, title, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(spec.title.trim())
        .bind(&spec.description)
        .bind(created_at)
        .bind(created_at)
        .execute(&self.pool)
        .await;

        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(DomainError::DuplicateId { id: id.to_string() });
            }
            return Err(db_error(err));
        }

        Ok(Spec {
            id: id.to_string(),
            title: spec.title.trim().to_string(),
            description: spec.description,
            manual_status: None,
            created_at,
            updated_at: created_at,
            task_count: 0,
            done_count: 0,
            status: SpecStatus::Draft,
        })
    }

    async fn get_spec(&self, id: &str) -> Result<Option<Spec>> {
        let sql = format!("{SPEC_SELECT} WHERE s.id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(row_to_spec).transpose()
    }

    async fn list_specs(&self, page: Page) -> Result<(Vec<Spec>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM specs")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        let sql = format!("{SPEC_SELECT} ORDER BY s.created_at ASC, s.id ASC LIMIT ? OFFSET ?");
        let rows = sqlx::query(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let specs = rows
            .iter()
            .map(row_to_spec)
            .collect::<Result<Vec<Spec>>>()?;

        Ok((specs, total as u64))
    }

    async fn update_spec(&self, id: &str, updates: UpdateSpec) -> Result<Spec> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let existing = fetch_spec(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::spec_not_found(id))?;

        if updates.is_empty() {
            return Ok(existing);
        }

        let updated_at = now();
        let mut qb: sqlx::QueryBuilder<Sqlite> = sqlx::QueryBuilder::new("UPDATE specs SET ");
        if let Some(ref title) = updates.title {
            qb.push("title = ");
            qb.push_bind(title.trim().to_string());
            qb.push(", ");
        }
        if let Some(ref description) = updates.description {
            qb.push("description = ");
            qb.push_bind(description.clone());
            qb.push(", ");
        }
        qb.push("updated_at = ");
        qb.push_bind(updated_at);
        qb.push(" WHERE id = ");
        qb.push_bind(id.to_string());

        qb.build().execute(&mut *tx).await.map_err(db_error)?;

        let updated = fetch_spec(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::spec_not_found(id))?;

        tx.commit().await.map_err(db_error)?;
        Ok(updated)
    }

    async fn delete_spec(&self, id: &str) -> Result<()> {
        // tasks.spec_id has ON DELETE SET NULL: member tasks survive
        let result = sqlx::query("DELETE FROM specs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::spec_not_found(id));
        }
        Ok(())
    }

    async fn cancel_spec(&self, id: &str) -> Result<Spec> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let manual_status: Option<Option<String>> =
            sqlx::query_scalar("SELECT manual_status FROM specs WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;

        match manual_status {
            None => return Err(DomainError::spec_not_found(id)),
            Some(Some(ref status)) if status == MANUAL_STATUS_CANCELLED => {
                return Err(DomainError::SpecAlreadyCancelled { id: id.to_string() })
            }
            Some(_) => {}
        }

        sqlx::query("UPDATE specs SET manual_status = ?, updated_at = ? WHERE id = ?")
            .bind(MANUAL_STATUS_CANCELLED)
            .bind(now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let cancelled = fetch_spec(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::spec_not_found(id))?;

        tx.commit().await.map_err(db_error)?;
        Ok(cancelled)
    }

    async fn reopen_spec(&self, id: &str) -> Result<Spec> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let manual_status: Option<Option<String>> =
            sqlx::query_scalar("SELECT manual_status FROM specs WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;

        match manual_status {
            None => return Err(DomainError::spec_not_found(id)),
            Some(Some(ref status)) if status == MANUAL_STATUS_CANCELLED => {}
            Some(_) => return Err(DomainError::SpecNotCancelled { id: id.to_string() }),
        }

        sqlx::query("UPDATE specs SET manual_status = NULL, updated_at = ? WHERE id = ?")
            .bind(now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let reopened = fetch_spec(&mut *tx, id)
            .await?
            .ok_or_else(|| DomainError::spec_not_found(id))?;

        tx.commit().await.map_err(db_error)?;
        Ok(reopened)
    }

    async fn ready_specs(&self) -> Result<Vec<Spec>> {
        // Specs and edges are read in one transaction so the derived
        // statuses and the parent check come from a single snapshot.
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let sql = format!("{SPEC_SELECT} ORDER BY s.created_at ASC, s.id ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;
        let specs = rows
            .iter()
            .map(row_to_spec)
            .collect::<Result<Vec<Spec>>>()?;

        let edges: Vec<(String, String)> =
            sqlx::query_as("SELECT child_id, parent_id FROM spec_dependencies")
                .fetch_all(&mut *tx)
                .await
                .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        let status_by_id: std::collections::HashMap<&str, SpecStatus> = specs
            .iter()
            .map(|spec| (spec.id.as_str(), spec.status))
            .collect();

        let ready = specs
            .iter()
            .filter(|spec| {
                if spec.status == SpecStatus::Cancelled || spec.status == SpecStatus::Done {
                    return false;
                }
                edges
                    .iter()
                    .filter(|(child, _)| child == &spec.id)
                    .all(|(_, parent)| {
                        status_by_id.get(parent.as_str()) == Some(&SpecStatus::Done)
                    })
            })
            .cloned()
            .collect();

        Ok(ready)
    }

    async fn tasks_in_spec(&self, spec_id: &str, page: Page) -> Result<(Vec<Task>, u64)> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        if !row_exists(&mut *tx, "specs", spec_id).await? {
            return Err(DomainError::spec_not_found(spec_id));
        }

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE spec_id = ?")
            .bind(spec_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE spec_id = ? \
             ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(spec_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        let tasks = rows
            .iter()
            .map(row_to_task)
            .collect::<Result<Vec<Task>>>()?;

        Ok((tasks, total as u64))
    }
}

#[async_trait]
impl AuditRepository for ProjectStore {
    async fn task_history(&self, task_id: &str) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, task_id, action, field, old_value, new_value, changed_at, changed_by \
             FROM audit_log WHERE task_id = ? ORDER BY changed_at ASC, id ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_audit_entry).collect()
    }
}
