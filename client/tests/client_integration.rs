use airyra_client::{AiryraClient, ClientError, PageOptions};
use airyra_core::models::{NewSpec, NewTask, SpecStatus, TaskStatus, UpdateTask};
use airyra_core::DomainError;
use airyra_http::AppState;
use airyra_store::StoreManager;
use std::sync::Arc;
use tempfile::TempDir;

const PROJECT: &str = "demo";

fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: None,
        priority: 2,
        parent_id: None,
        spec_id: None,
    }
}

/// Bind a real listener on an ephemeral port and serve the full stack.
async fn start_server() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let manager = StoreManager::new(dir.path()).await.unwrap();
    let state = AppState::new(Arc::new(manager));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        airyra_http::serve(listener, state, std::future::pending())
            .await
            .unwrap();
    });

    (dir, format!("http://{addr}"))
}

#[tokio::test]
async fn test_end_to_end_task_flow() {
    let (_dir, base_url) = start_server().await;
    let client = AiryraClient::new(&base_url, "alice@box:/repo");

    client.health().await.unwrap();

    let task = client.create_task(PROJECT, &new_task("Ship it")).await.unwrap();
    assert_eq!(task.status, TaskStatus::Open);
    assert!(task.id.starts_with("ar-"));

    let claimed = client.claim_task(PROJECT, &task.id).await.unwrap();
    assert_eq!(claimed.status, TaskStatus::InProgress);
    assert_eq!(claimed.claimed_by.as_deref(), Some("alice@box:/repo"));

    let updated = client
        .update_task(
            PROJECT,
            &task.id,
            &UpdateTask {
                priority: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.priority, 0);

    let done = client.complete_task(PROJECT, &task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Done);

    let history = client.task_history(PROJECT, &task.id).await.unwrap();
    let actions: Vec<String> = history
        .data
        .iter()
        .map(|entry| entry.action.to_string())
        .collect();
    assert_eq!(actions, vec!["create", "claim", "update", "update"]);
}

#[tokio::test]
async fn test_domain_errors_round_trip_the_wire() {
    let (_dir, base_url) = start_server().await;
    let alice = AiryraClient::new(&base_url, "alice@box:/repo");
    let bob = AiryraClient::new(&base_url, "bob@box:/repo");

    let task = alice
        .create_task(PROJECT, &new_task("Contended"))
        .await
        .unwrap();
    alice.claim_task(PROJECT, &task.id).await.unwrap();

    // the typed error carries the original code and context
    let err = bob.claim_task(PROJECT, &task.id).await.unwrap_err();
    match err.as_domain() {
        Some(DomainError::AlreadyClaimed { claimed_by, .. }) => {
            assert_eq!(claimed_by, "alice@box:/repo");
        }
        other => panic!("expected AlreadyClaimed, got {other:?}"),
    }

    let err = bob.release_task(PROJECT, &task.id, false).await.unwrap_err();
    assert!(matches!(
        err.as_domain(),
        Some(DomainError::NotOwner { claimed_by }) if claimed_by == "alice@box:/repo"
    ));

    // force-release works for the non-owner
    let released = bob.release_task(PROJECT, &task.id, true).await.unwrap();
    assert_eq!(released.status, TaskStatus::Open);
    assert!(released.claimed_by.is_none());

    let err = bob.get_task(PROJECT, "ar-ffffff").await.unwrap_err();
    assert!(matches!(
        err.as_domain(),
        Some(DomainError::TaskNotFound { id }) if id == "ar-ffffff"
    ));
}

#[tokio::test]
async fn test_dependency_and_ready_flow() {
    let (_dir, base_url) = start_server().await;
    let client = AiryraClient::new(&base_url, "alice@box:/repo");

    let first = client.create_task(PROJECT, &new_task("first")).await.unwrap();
    let second = client.create_task(PROJECT, &new_task("second")).await.unwrap();

    client
        .add_dependency(PROJECT, &second.id, &first.id)
        .await
        .unwrap();

    let ready = client
        .ready_tasks(PROJECT, PageOptions::default())
        .await
        .unwrap();
    let ids: Vec<&str> = ready.data.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec![first.id.as_str()]);
    assert_eq!(ready.pagination.total, 1);

    // cycles are reported with the offending path
    let err = client
        .add_dependency(PROJECT, &first.id, &second.id)
        .await
        .unwrap_err();
    match err.as_domain() {
        Some(DomainError::CycleDetected { path }) => {
            assert_eq!(path.first(), Some(&first.id));
            assert_eq!(path.last(), Some(&first.id));
        }
        other => panic!("expected CycleDetected, got {other:?}"),
    }

    client
        .remove_dependency(PROJECT, &second.id, &first.id)
        .await
        .unwrap();
    let ready = client
        .ready_tasks(PROJECT, PageOptions::default())
        .await
        .unwrap();
    assert_eq!(ready.pagination.total, 2);
}

#[tokio::test]
async fn test_spec_flow() {
    let (_dir, base_url) = start_server().await;
    let client = AiryraClient::new(&base_url, "alice@box:/repo");

    let spec = client
        .create_spec(
            PROJECT,
            &NewSpec {
                title: "Launch".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(spec.status, SpecStatus::Draft);

    let mut task = new_task("launch work");
    task.spec_id = Some(spec.id.clone());
    let task = client.create_task(PROJECT, &task).await.unwrap();

    let active = client.get_spec(PROJECT, &spec.id).await.unwrap();
    assert_eq!(active.status, SpecStatus::Active);

    let members = client
        .tasks_in_spec(PROJECT, &spec.id, PageOptions::default())
        .await
        .unwrap();
    assert_eq!(members.data.len(), 1);
    assert_eq!(members.data[0].id, task.id);

    let cancelled = client.cancel_spec(PROJECT, &spec.id).await.unwrap();
    assert_eq!(cancelled.status, SpecStatus::Cancelled);

    let err = client.cancel_spec(PROJECT, &spec.id).await.unwrap_err();
    assert!(matches!(
        err.as_domain(),
        Some(DomainError::SpecAlreadyCancelled { .. })
    ));

    let reopened = client.reopen_spec(PROJECT, &spec.id).await.unwrap();
    assert_eq!(reopened.status, SpecStatus::Active);
}

#[tokio::test]
async fn test_concurrent_claims_through_the_client() {
    let (_dir, base_url) = start_server().await;
    let setup = AiryraClient::new(&base_url, "setup@box:/repo");
    let task = setup
        .create_task(PROJECT, &new_task("Contested"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..5 {
        let client = AiryraClient::new(&base_url, format!("agent-{i}@box:/repo"));
        let id = task.id.clone();
        handles.push(tokio::spawn(
            async move { client.claim_task(PROJECT, &id).await },
        ));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for failure in results.iter().filter(|r| r.is_err()) {
        match failure.as_ref().unwrap_err().as_domain() {
            Some(DomainError::AlreadyClaimed { .. })
            | Some(DomainError::InvalidTransition { .. }) => {}
            other => panic!("unexpected failure: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_connection_refused_is_the_server_not_running_sentinel() {
    // bind then drop so the port is very likely unoccupied
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = AiryraClient::new(format!("http://{addr}"), "alice@box:/repo");
    let err = client.health().await.unwrap_err();
    assert!(
        matches!(err, ClientError::ServerNotRunning { .. }),
        "expected ServerNotRunning, got {err:?}"
    );
}
