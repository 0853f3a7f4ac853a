use airyra_core::{
    error::{DomainError, Result},
    validation::Validator,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::sqlite::ProjectStore;

/// Process-wide map from project name to its store handle.
///
/// Stores are created lazily: the first request for a project name opens
/// `<base_dir>/<name>.db`, runs migrations, and caches the handle behind a
/// reader/writer lock. This is the only long-lived mutable state in the
/// coordination layer.
pub struct StoreManager {
    base_dir: PathBuf,
    stores: RwLock<HashMap<String, Arc<ProjectStore>>>,
}

impl StoreManager {
    /// Create a manager rooted at `base_dir`, creating the directory if
    /// needed. Failure here is fatal at startup.
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir).await.map_err(|e| {
            DomainError::internal(format!(
                "failed to create base directory {}: {e}",
                base_dir.display()
            ))
        })?;

        Ok(Self {
            base_dir,
            stores: RwLock::new(HashMap::new()),
        })
    }

    /// Get (or lazily create) the store for `project`.
    pub async fn store_for(&self, project: &str) -> Result<Arc<ProjectStore>> {
        Validator::validate_project_name(project)?;

        if let Some(store) = self.stores.read().await.get(project) {
            return Ok(store.clone());
        }

        let mut stores = self.stores.write().await;
        // another request may have created it between the two locks
        if let Some(store) = stores.get(project) {
            return Ok(store.clone());
        }

        let path = self.base_dir.join(format!("{project}.db"));
        tracing::info!(project, path = %path.display(), "opening project store");
        let store = ProjectStore::open(&path).await?;
        store.migrate().await?;
        let store = Arc::new(store);
        stores.insert(project.to_string(), store.clone());
        Ok(store)
    }

    /// List project names by enumerating `*.db` files under the base
    /// directory. WAL/SHM sidecar files are skipped by the extension check.
    pub async fn list_projects(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.base_dir).await.map_err(|e| {
            DomainError::internal(format!(
                "failed to read base directory {}: {e}",
                self.base_dir.display()
            ))
        })?;

        let mut projects = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::internal(format!("failed to enumerate projects: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("db") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if !stem.is_empty() {
                    projects.push(stem.to_string());
                }
            }
        }

        projects.sort();
        Ok(projects)
    }

    /// Close every cached store. Called once on shutdown.
    pub async fn close(&self) {
        let mut stores = self.stores.write().await;
        for (project, store) in stores.drain() {
            tracing::debug!(project, "closing project store");
            store.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airyra_core::models::NewTask;
    use airyra_core::repository::TaskRepository;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: None,
            priority: 2,
            parent_id: None,
            spec_id: None,
        }
    }

    #[tokio::test]
    async fn test_lazy_creation_and_caching() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StoreManager::new(dir.path()).await.unwrap();

        let first = manager.store_for("alpha").await.unwrap();
        let second = manager.store_for("alpha").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(dir.path().join("alpha.db").exists());
    }

    #[tokio::test]
    async fn test_projects_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StoreManager::new(dir.path()).await.unwrap();

        let alpha = manager.store_for("alpha").await.unwrap();
        let beta = manager.store_for("beta").await.unwrap();

        let task = alpha
            .create_task("ar-aaaa01", new_task("only in alpha"), "agent")
            .await
            .unwrap();

        // the same id does not resolve in the other project
        assert!(beta.get_task(&task.id).await.unwrap().is_none());
        assert!(alpha.get_task(&task.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_project_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StoreManager::new(dir.path()).await.unwrap();

        for name in ["", "a/b", "a\\b", "c:d"] {
            let err = manager.store_for(name).await.unwrap_err();
            assert!(
                matches!(err, DomainError::Validation { .. }),
                "name {name:?} should be rejected, got {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_list_projects_skips_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StoreManager::new(dir.path()).await.unwrap();

        manager.store_for("alpha").await.unwrap();
        manager.store_for("beta").await.unwrap();

        // fake WAL/SHM sidecars and an unrelated file
        std::fs::write(dir.path().join("alpha.db-wal"), b"x").unwrap();
        std::fs::write(dir.path().join("alpha.db-shm"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let projects = manager.list_projects().await.unwrap();
        assert_eq!(projects, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[tokio::test]
    async fn test_close_drains_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StoreManager::new(dir.path()).await.unwrap();
        manager.store_for("alpha").await.unwrap();

        manager.close().await;
        assert!(manager.stores.read().await.is_empty());

        // reopening after close works
        let store = manager.store_for("alpha").await.unwrap();
        assert!(store.health_check().await.is_ok());
    }
}
