use airyra_store::{
    DependencyRepository, DomainError, NewSpec, NewTask, Page, ProjectStore, SpecRepository,
    SpecStatus, TaskRepository,
};
use tempfile::TempDir;

async fn create_test_store() -> (TempDir, ProjectStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ProjectStore::open(&dir.path().join("project.db"))
        .await
        .unwrap();
    store.migrate().await.unwrap();
    (dir, store)
}

const AGENT: &str = "tester@host:/work";

async fn make_task(store: &ProjectStore, id: &str, title: &str, priority: i64) {
    store
        .create_task(
            id,
            NewTask {
                title: title.to_string(),
                description: None,
                priority,
                parent_id: None,
                spec_id: None,
            },
            AGENT,
        )
        .await
        .unwrap();
}

async fn finish_task(store: &ProjectStore, id: &str) {
    store.claim_task(id, AGENT).await.unwrap();
    store.complete_task(id, AGENT).await.unwrap();
}

fn ready_ids(tasks: &[airyra_store::Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.id.as_str()).collect()
}

#[tokio::test]
async fn test_add_and_list_dependencies_both_directions() {
    let (_dir, store) = create_test_store().await;
    make_task(&store, "ar-a00001", "parent", 2).await;
    make_task(&store, "ar-a00002", "child", 2).await;

    let edge = store
        .add_dependency("ar-a00002", "ar-a00001", AGENT)
        .await
        .unwrap();
    assert_eq!(edge.child_id, "ar-a00002");
    assert_eq!(edge.parent_id, "ar-a00001");

    // both endpoints see the edge
    let from_child = store.list_dependencies_for("ar-a00002").await.unwrap();
    let from_parent = store.list_dependencies_for("ar-a00001").await.unwrap();
    assert_eq!(from_child, from_parent);
    assert_eq!(from_child.len(), 1);
}

#[tokio::test]
async fn test_dependency_endpoint_validation() {
    let (_dir, store) = create_test_store().await;
    make_task(&store, "ar-a00003", "lonely", 2).await;

    let err = store
        .add_dependency("ar-a00003", "ar-a00003", AGENT)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));

    let err = store
        .add_dependency("ar-a00003", "ar-ffffff", AGENT)
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::task_not_found("ar-ffffff"));

    let err = store
        .add_dependency("ar-ffffff", "ar-a00003", AGENT)
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::task_not_found("ar-ffffff"));
}

#[tokio::test]
async fn test_duplicate_dependency_is_rejected_distinctly() {
    let (_dir, store) = create_test_store().await;
    make_task(&store, "ar-a00004", "parent", 2).await;
    make_task(&store, "ar-a00005", "child", 2).await;

    store
        .add_dependency("ar-a00005", "ar-a00004", AGENT)
        .await
        .unwrap();
    let err = store
        .add_dependency("ar-a00005", "ar-a00004", AGENT)
        .await
        .unwrap_err();
    // duplicate is a validation error, never CYCLE_DETECTED
    assert!(matches!(err, DomainError::Validation { .. }));
}

#[tokio::test]
async fn test_cycle_rejection_preserves_existing_edges() {
    let (_dir, store) = create_test_store().await;
    make_task(&store, "ar-b0000a", "X", 2).await;
    make_task(&store, "ar-b0000b", "Y", 2).await;
    make_task(&store, "ar-b0000c", "Z", 2).await;

    // X depends on Y, Y depends on Z
    store
        .add_dependency("ar-b0000a", "ar-b0000b", AGENT)
        .await
        .unwrap();
    store
        .add_dependency("ar-b0000b", "ar-b0000c", AGENT)
        .await
        .unwrap();

    // Z depending on X would close the triangle
    let err = store
        .add_dependency("ar-b0000c", "ar-b0000a", AGENT)
        .await
        .unwrap_err();
    match err {
        DomainError::CycleDetected { path } => {
            assert_eq!(path.first().map(String::as_str), Some("ar-b0000c"));
            assert_eq!(path.last().map(String::as_str), Some("ar-b0000c"));
            assert!(path.contains(&"ar-b0000a".to_string()));
            assert!(path.contains(&"ar-b0000b".to_string()));
        }
        other => panic!("expected CycleDetected, got {other:?}"),
    }

    // the original edges remain, the rejected one was not persisted
    assert_eq!(store.list_dependencies_for("ar-b0000a").await.unwrap().len(), 1);
    assert_eq!(store.list_dependencies_for("ar-b0000c").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remove_dependency() {
    let (_dir, store) = create_test_store().await;
    make_task(&store, "ar-a00006", "parent", 2).await;
    make_task(&store, "ar-a00007", "child", 2).await;

    store
        .add_dependency("ar-a00007", "ar-a00006", AGENT)
        .await
        .unwrap();
    store
        .remove_dependency("ar-a00007", "ar-a00006", AGENT)
        .await
        .unwrap();

    let err = store
        .remove_dependency("ar-a00007", "ar-a00006", AGENT)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DomainError::DependencyNotFound {
            child_id: "ar-a00007".to_string(),
            parent_id: "ar-a00006".to_string(),
        }
    );
}

#[tokio::test]
async fn test_deleting_a_task_cascades_its_edges() {
    let (_dir, store) = create_test_store().await;
    make_task(&store, "ar-a00008", "parent", 2).await;
    make_task(&store, "ar-a00009", "child", 2).await;

    store
        .add_dependency("ar-a00009", "ar-a00008", AGENT)
        .await
        .unwrap();
    store.delete_task("ar-a00008", AGENT).await.unwrap();

    assert!(store
        .list_dependencies_for("ar-a00009")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_ready_chain_progression() {
    let (_dir, store) = create_test_store().await;
    make_task(&store, "ar-c00001", "A", 2).await;
    make_task(&store, "ar-c00002", "B", 2).await;
    make_task(&store, "ar-c00003", "C", 2).await;

    // B blocked on A, C blocked on B
    store
        .add_dependency("ar-c00002", "ar-c00001", AGENT)
        .await
        .unwrap();
    store
        .add_dependency("ar-c00003", "ar-c00002", AGENT)
        .await
        .unwrap();

    let (ready, total) = store.ready_tasks(Page::default()).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(ready_ids(&ready), vec!["ar-c00001"]);

    finish_task(&store, "ar-c00001").await;
    let (ready, _) = store.ready_tasks(Page::default()).await.unwrap();
    assert_eq!(ready_ids(&ready), vec!["ar-c00002"]);

    finish_task(&store, "ar-c00002").await;
    let (ready, _) = store.ready_tasks(Page::default()).await.unwrap();
    assert_eq!(ready_ids(&ready), vec!["ar-c00003"]);

    finish_task(&store, "ar-c00003").await;
    let (ready, total) = store.ready_tasks(Page::default()).await.unwrap();
    assert!(ready.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_ready_excludes_non_open_and_undone_parents() {
    let (_dir, store) = create_test_store().await;
    make_task(&store, "ar-c00004", "open parent", 2).await;
    make_task(&store, "ar-c00005", "gated child", 2).await;
    make_task(&store, "ar-c00006", "blocked", 2).await;
    make_task(&store, "ar-c00007", "claimed", 2).await;

    store
        .add_dependency("ar-c00005", "ar-c00004", AGENT)
        .await
        .unwrap();
    store.block_task("ar-c00006", AGENT).await.unwrap();
    store.claim_task("ar-c00007", AGENT).await.unwrap();

    let (ready, _) = store.ready_tasks(Page::default()).await.unwrap();
    // only the unblocked, unclaimed, dependency-free task qualifies
    assert_eq!(ready_ids(&ready), vec!["ar-c00004"]);

    // releasing an edge makes the child ready
    store
        .remove_dependency("ar-c00005", "ar-c00004", AGENT)
        .await
        .unwrap();
    let (ready, _) = store.ready_tasks(Page::default()).await.unwrap();
    assert_eq!(ready_ids(&ready), vec!["ar-c00004", "ar-c00005"]);
}

#[tokio::test]
async fn test_ready_ordering_by_priority_then_age() {
    let (_dir, store) = create_test_store().await;
    make_task(&store, "ar-d00001", "late urgent", 0).await;
    make_task(&store, "ar-d00002", "old normal", 2).await;
    make_task(&store, "ar-d00003", "new normal", 2).await;
    make_task(&store, "ar-d00004", "background", 4).await;

    let (ready, _) = store.ready_tasks(Page::default()).await.unwrap();
    assert_eq!(
        ready_ids(&ready),
        vec!["ar-d00001", "ar-d00002", "ar-d00003", "ar-d00004"]
    );

    // pagination clamps and windows the same ordering
    let (first, total) = store
        .ready_tasks(Page::clamped(Some(1), Some(2)))
        .await
        .unwrap();
    assert_eq!(total, 4);
    assert_eq!(ready_ids(&first), vec!["ar-d00001", "ar-d00002"]);

    let (second, _) = store
        .ready_tasks(Page::clamped(Some(2), Some(2)))
        .await
        .unwrap();
    assert_eq!(ready_ids(&second), vec!["ar-d00003", "ar-d00004"]);
}

#[tokio::test]
async fn test_spec_status_progression() {
    let (_dir, store) = create_test_store().await;

    let spec = store
        .create_spec(
            "sp-900001",
            NewSpec {
                title: "Rollout".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(spec.status, SpecStatus::Draft);
    assert_eq!(spec.task_count, 0);

    // one member task makes it active
    store
        .create_task(
            "ar-900001",
            NewTask {
                title: "member".to_string(),
                description: None,
                priority: 2,
                parent_id: None,
                spec_id: Some("sp-900001".to_string()),
            },
            AGENT,
        )
        .await
        .unwrap();
    let spec = store.get_spec("sp-900001").await.unwrap().unwrap();
    assert_eq!(spec.status, SpecStatus::Active);
    assert_eq!(spec.task_count, 1);
    assert_eq!(spec.done_count, 0);

    // completing every member makes it done
    finish_task(&store, "ar-900001").await;
    let spec = store.get_spec("sp-900001").await.unwrap().unwrap();
    assert_eq!(spec.status, SpecStatus::Done);
    assert_eq!(spec.done_count, 1);

    // cancel overrides, reopen restores the derived value
    let cancelled = store.cancel_spec("sp-900001").await.unwrap();
    assert_eq!(cancelled.status, SpecStatus::Cancelled);

    let reopened = store.reopen_spec("sp-900001").await.unwrap();
    assert_eq!(reopened.status, SpecStatus::Done);
}

#[tokio::test]
async fn test_cancel_and_reopen_guards() {
    let (_dir, store) = create_test_store().await;
    store
        .create_spec(
            "sp-900002",
            NewSpec {
                title: "Guarded".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();

    let err = store.reopen_spec("sp-900002").await.unwrap_err();
    assert_eq!(
        err,
        DomainError::SpecNotCancelled {
            id: "sp-900002".to_string()
        }
    );

    store.cancel_spec("sp-900002").await.unwrap();
    let err = store.cancel_spec("sp-900002").await.unwrap_err();
    assert_eq!(
        err,
        DomainError::SpecAlreadyCancelled {
            id: "sp-900002".to_string()
        }
    );

    assert_eq!(
        store.cancel_spec("sp-ffffff").await.unwrap_err(),
        DomainError::spec_not_found("sp-ffffff")
    );
}

#[tokio::test]
async fn test_deleting_a_spec_detaches_member_tasks() {
    let (_dir, store) = create_test_store().await;
    store
        .create_spec(
            "sp-900003",
            NewSpec {
                title: "Doomed".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    store
        .create_task(
            "ar-900002",
            NewTask {
                title: "survivor".to_string(),
                description: None,
                priority: 2,
                parent_id: None,
                spec_id: Some("sp-900003".to_string()),
            },
            AGENT,
        )
        .await
        .unwrap();

    store.delete_spec("sp-900003").await.unwrap();

    // the task survives with its spec reference cleared
    let task = store.get_task("ar-900002").await.unwrap().unwrap();
    assert!(task.spec_id.is_none());

    assert_eq!(
        store.delete_spec("sp-900003").await.unwrap_err(),
        DomainError::spec_not_found("sp-900003")
    );
}

#[tokio::test]
async fn test_spec_dependency_graph_and_ready_specs() {
    let (_dir, store) = create_test_store().await;
    for (id, title) in [
        ("sp-a00001", "foundation"),
        ("sp-a00002", "build-out"),
        ("sp-a00003", "independent"),
    ] {
        store
            .create_spec(
                id,
                NewSpec {
                    title: title.to_string(),
                    description: None,
                },
            )
            .await
            .unwrap();
    }

    store
        .add_spec_dependency("sp-a00002", "sp-a00001")
        .await
        .unwrap();

    // spec cycle check mirrors the task graph
    let err = store
        .add_spec_dependency("sp-a00001", "sp-a00002")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::CycleDetected { .. }));

    // build-out is gated on foundation, which is draft, not done
    let ready: Vec<String> = store
        .ready_specs()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ready, vec!["sp-a00001", "sp-a00003"]);

    // drive foundation to done through a member task
    store
        .create_task(
            "ar-a10001",
            NewTask {
                title: "foundation work".to_string(),
                description: None,
                priority: 2,
                parent_id: None,
                spec_id: Some("sp-a00001".to_string()),
            },
            AGENT,
        )
        .await
        .unwrap();
    finish_task(&store, "ar-a10001").await;

    let ready: Vec<String> = store
        .ready_specs()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    // foundation is done (no longer ready); build-out unblocked
    assert_eq!(ready, vec!["sp-a00002", "sp-a00003"]);

    // cancelled specs drop out
    store.cancel_spec("sp-a00003").await.unwrap();
    let ready: Vec<String> = store
        .ready_specs()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ready, vec!["sp-a00002"]);
}

#[tokio::test]
async fn test_tasks_in_spec_pagination() {
    let (_dir, store) = create_test_store().await;
    store
        .create_spec(
            "sp-b00001",
            NewSpec {
                title: "Bulk".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();

    for i in 0..3 {
        store
            .create_task(
                &format!("ar-b1000{i}"),
                NewTask {
                    title: format!("member {i}"),
                    description: None,
                    priority: 2,
                    parent_id: None,
                    spec_id: Some("sp-b00001".to_string()),
                },
                AGENT,
            )
            .await
            .unwrap();
    }
    // a task outside the spec is not included
    make_task(&store, "ar-b10009", "outsider", 2).await;

    let (members, total) = store
        .tasks_in_spec("sp-b00001", Page::default())
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(members.len(), 3);

    let (window, total) = store
        .tasks_in_spec("sp-b00001", Page::clamped(Some(2), Some(2)))
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(window.len(), 1);

    assert_eq!(
        store
            .tasks_in_spec("sp-ffffff", Page::default())
            .await
            .unwrap_err(),
        DomainError::spec_not_found("sp-ffffff")
    );
}

#[tokio::test]
async fn test_spec_dependency_validation_errors() {
    let (_dir, store) = create_test_store().await;
    store
        .create_spec(
            "sp-c00001",
            NewSpec {
                title: "solo".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();

    let err = store
        .add_spec_dependency("sp-c00001", "sp-ffffff")
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::spec_not_found("sp-ffffff"));

    let err = store
        .remove_spec_dependency("sp-c00001", "sp-ffffff")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::DependencyNotFound { .. }));
}

#[tokio::test]
async fn test_done_to_blocked_removes_readiness_of_children() {
    let (_dir, store) = create_test_store().await;
    make_task(&store, "ar-e00001", "parent", 2).await;
    make_task(&store, "ar-e00002", "child", 2).await;
    store
        .add_dependency("ar-e00002", "ar-e00001", AGENT)
        .await
        .unwrap();

    finish_task(&store, "ar-e00001").await;
    let (ready, _) = store.ready_tasks(Page::default()).await.unwrap();
    assert_eq!(ready_ids(&ready), vec!["ar-e00002"]);

    // done -> blocked flips the parent back to not-done; child leaves the list
    store.block_task("ar-e00001", AGENT).await.unwrap();
    let (ready, _) = store.ready_tasks(Page::default()).await.unwrap();
    assert!(ready.is_empty());
}
