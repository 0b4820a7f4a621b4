//! Integration tests for task CRUD and state-transition queries.

use conductor_db::models::{TaskPriority, TaskStatus};
use conductor_db::queries::tasks::{self, NewTask};

use conductor_test_utils::{create_test_db, drop_test_db};

fn sample_task(name: &str) -> NewTask {
    NewTask {
        tenant_id: "default".to_string(),
        name: name.to_string(),
        description: "test task".to_string(),
        input_data: serde_json::json!({}),
        required_capabilities: vec![],
        priority: TaskPriority::Normal,
        timeout_seconds: 300,
        max_retries: 3,
        idempotency_key: None,
    }
}

#[tokio::test]
async fn submit_and_fetch_task() {
    let (pool, db_name) = create_test_db().await;

    let inserted = tasks::submit_task(&pool, &sample_task("t1")).await.unwrap();
    assert_eq!(inserted.status, TaskStatus::Pending);

    let fetched = tasks::get_task(&pool, inserted.id)
        .await
        .unwrap()
        .expect("task should exist");
    assert_eq!(fetched.id, inserted.id);
    assert_eq!(fetched.name, "t1");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn submit_task_with_idempotency_key_returns_existing_row() {
    let (pool, db_name) = create_test_db().await;

    let mut new_task = sample_task("t-idem");
    new_task.idempotency_key = Some("order-42".to_string());

    let first = tasks::submit_task(&pool, &new_task).await.unwrap();
    let second = tasks::submit_task(&pool, &new_task).await.unwrap();

    assert_eq!(first.id, second.id, "duplicate submission must return the existing task");

    let counts = tasks::get_status_counts(&pool, Some("default")).await.unwrap();
    assert_eq!(counts.pending, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn dispatchable_tasks_ordered_by_priority_then_age() {
    let (pool, db_name) = create_test_db().await;

    let mut low = sample_task("low");
    low.priority = TaskPriority::Low;
    let mut critical = sample_task("critical");
    critical.priority = TaskPriority::Critical;

    let low = tasks::submit_task(&pool, &low).await.unwrap();
    let critical = tasks::submit_task(&pool, &critical).await.unwrap();

    let dispatchable = tasks::list_dispatchable_tasks(&pool, 10).await.unwrap();
    assert_eq!(dispatchable[0].id, critical.id);
    assert_eq!(dispatchable[1].id, low.id);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn optimistic_locking_prevents_double_claim() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::submit_task(&pool, &sample_task("claim-me")).await.unwrap();
    let rows = tasks::transition_task_status(
        &pool,
        task.id,
        TaskStatus::Pending,
        TaskStatus::Queued,
        None,
        None,
    )
    .await
    .unwrap();
    assert_eq!(rows, 1);

    // Second attempt from the same `from` status is rejected: the row is
    // already `queued`, not `pending`.
    let rows = tasks::transition_task_status(
        &pool,
        task.id,
        TaskStatus::Pending,
        TaskStatus::Queued,
        None,
        None,
    )
    .await
    .unwrap();
    assert_eq!(rows, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn retry_task_increments_retry_count_and_requeues() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::submit_task(&pool, &sample_task("retry-me")).await.unwrap();
    tasks::transition_task_status(&pool, task.id, TaskStatus::Pending, TaskStatus::Failed, None, None)
        .await
        .unwrap();

    let rows = tasks::retry_task(&pool, task.id, 0).await.unwrap();
    assert_eq!(rows, 1);

    let reloaded = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TaskStatus::Queued);
    assert_eq!(reloaded.retry_count, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}
