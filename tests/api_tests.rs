mod common;

use reqwest::StatusCode;
use serde_json::json;

use indexflow::indexing::{SubmitError, SubmitErrorKind};

fn temp_error() -> SubmitError {
    SubmitError::new(SubmitErrorKind::TemporaryError, Some(503), "backend error")
}

fn auth_error() -> SubmitError {
    SubmitError::new(SubmitErrorKind::AuthError, Some(403), "permission denied")
}

fn quota_error() -> SubmitError {
    SubmitError::new(
        SubmitErrorKind::QuotaExceeded,
        Some(429),
        "Quota exceeded for publish requests",
    )
}

// ── Health ──────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_ok() {
    let Some(app) = common::try_spawn_app().await else { return };

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");

    common::cleanup(app).await;
}

// ── Accounts ────────────────────────────────────────────────────

#[tokio::test]
async fn register_account_with_default_quota() {
    let Some(app) = common::try_spawn_app().await else { return };

    let (body, status) = app
        .post_json(
            "/api/v1/accounts",
            &json!({
                "name": "primary",
                "credentials": common::TestApp::credentials("primary@project.iam.gserviceaccount.com"),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["daily_quota"], 200);
    assert_eq!(body["health_status"], "unknown");
    // Credentials never leak through the API.
    assert!(body.get("credentials_json").is_none());

    let (list, status) = app.get_json("/api/v1/accounts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    common::cleanup(app).await;
}

#[tokio::test]
async fn register_duplicate_credentials_conflicts() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("first", 100).await;
    let (body, status) = app
        .post_json(
            "/api/v1/accounts",
            &json!({
                "name": "second",
                "credentials": common::TestApp::credentials("first@project.iam.gserviceaccount.com"),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    common::cleanup(app).await;
}

#[tokio::test]
async fn register_rejects_malformed_credentials() {
    let Some(app) = common::try_spawn_app().await else { return };

    let (body, status) = app
        .post_json(
            "/api/v1/accounts",
            &json!({ "name": "broken", "credentials": { "type": "service_account" } }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    common::cleanup(app).await;
}

// ── Enqueue & distribution ──────────────────────────────────────

#[tokio::test]
async fn enqueue_fast_fills_largest_account_first() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("big", 5).await;
    app.create_account("small", 3).await;

    let urls: Vec<String> = (0..8).map(|i| format!("https://site.test/p{i}")).collect();
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let (body, status) = app.enqueue(&url_refs, "fast").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["assigned"], 8);
    assert_eq!(body["unassigned"], 0);
    assert_eq!(body["projection"]["deliverable_today"], 8);
    assert_eq!(body["projection"]["days_needed"], 1);

    let report = app.process().await;
    assert_eq!(report["submitted"], 8, "{report}");
    assert_eq!(app.indexer.call_count(), 8);

    // Batch reaches completed once every URL settles.
    let (batches, _) = app.get_json("/api/v1/batches").await;
    assert_eq!(batches[0]["status"], "completed");
    assert_eq!(batches[0]["completed_urls"], 8);

    common::cleanup(app).await;
}

#[tokio::test]
async fn enqueue_without_accounts_keeps_urls_pending() {
    let Some(app) = common::try_spawn_app().await else { return };

    let (body, status) = app
        .enqueue(&["https://site.test/a", "https://site.test/b"], "fast")
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["assigned"], 0);
    assert_eq!(body["unassigned"], 2);

    let report = app.process().await;
    assert_eq!(report["submitted"], 0);

    let (a, _, _, _) = app.item_state("https://site.test/a").await;
    assert_eq!(a, "pending");

    common::cleanup(app).await;
}

#[tokio::test]
async fn enqueue_rejects_relative_urls() {
    let Some(app) = common::try_spawn_app().await else { return };

    let (body, status) = app.enqueue(&["/not-absolute"], "fast").await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    common::cleanup(app).await;
}

#[tokio::test]
async fn even_policy_overflow_is_resolved_at_dispatch_time() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("wide", 4).await;
    app.create_account("narrow", 1).await;

    let urls: Vec<String> = (0..4).map(|i| format!("https://site.test/e{i}")).collect();
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let (body, _) = app.enqueue(&url_refs, "even").await;
    // Planning is uncapped: both accounts get 2 despite "narrow" having 1.
    assert_eq!(body["assigned"], 4);

    let report = app.process().await;
    // Dispatch honors the per-item quota check, rerouting the overflow.
    assert_eq!(report["submitted"], 4, "{report}");

    let narrow_count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM submission_records sr
         JOIN accounts a ON a.id = sr.account_id
         WHERE a.name = 'narrow'",
    )
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(narrow_count.0, 1);

    common::cleanup(app).await;
}

// ── Retry & failure classification ──────────────────────────────

#[tokio::test]
async fn temporary_failure_schedules_backoff() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("solo", 10).await;
    let (_, status) = app
        .post_json("/api/v1/queue/url", &json!({ "url": "https://site.test/flaky" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    app.indexer.push_response(Err(temp_error()));
    let report = app.process().await;
    assert_eq!(report["retried"], 1, "{report}");

    let (item_status, attempts, has_retry_at, _) =
        app.item_state("https://site.test/flaky").await;
    assert_eq!(item_status, "pending");
    assert_eq!(attempts, 1);
    assert!(has_retry_at);

    // Backoff has not elapsed: the next cycle must not redispatch.
    app.process().await;
    assert_eq!(app.indexer.call_count(), 1);

    common::cleanup(app).await;
}

#[tokio::test]
async fn item_fails_terminally_after_three_attempts() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("solo", 5).await;
    app.post_json("/api/v1/queue/url", &json!({ "url": "https://site.test/doomed" }))
        .await;

    for round in 0..3 {
        app.indexer.push_response(Err(temp_error()));
        let report = app.process().await;
        if round < 2 {
            assert_eq!(report["retried"], 1, "round {round}: {report}");
            // Fast-forward past the backoff and simulate the scheduled
            // probe recovering the account between cycles.
            sqlx::query("UPDATE queue_items SET next_retry_at = now() - interval '1 second'")
                .execute(&app.pool)
                .await
                .unwrap();
            sqlx::query(
                "UPDATE accounts SET health_status = 'healthy',
                 consecutive_failures = 0, cooldown_until = NULL",
            )
            .execute(&app.pool)
            .await
            .unwrap();
        } else {
            assert_eq!(report["failed"], 1, "round {round}: {report}");
        }
    }

    let (item_status, attempts, has_retry_at, _) =
        app.item_state("https://site.test/doomed").await;
    assert_eq!(item_status, "failed");
    assert_eq!(attempts, 3);
    assert!(!has_retry_at);

    // Never dispatched a fourth time.
    sqlx::query(
        "UPDATE accounts SET health_status = 'healthy',
         consecutive_failures = 0, cooldown_until = NULL",
    )
    .execute(&app.pool)
    .await
    .unwrap();
    app.process().await;
    assert_eq!(app.indexer.call_count(), 3);

    common::cleanup(app).await;
}

#[tokio::test]
async fn quota_exhaustion_defers_without_consuming_attempts() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("solo", 10).await;
    app.post_json("/api/v1/queue/url", &json!({ "url": "https://site.test/deferred" }))
        .await;

    app.indexer.push_response(Err(quota_error()));
    let report = app.process().await;
    assert_eq!(report["deferred"], 1, "{report}");

    let (item_status, attempts, _, has_account) =
        app.item_state("https://site.test/deferred").await;
    assert_eq!(item_status, "pending");
    assert_eq!(attempts, 0);
    // Assignment cleared so another account can take it.
    assert!(!has_account);

    // Capacity problems never count against account health.
    let failures: (i32,) =
        sqlx::query_as("SELECT consecutive_failures FROM accounts LIMIT 1")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(failures.0, 0);

    common::cleanup(app).await;
}

#[tokio::test]
async fn auth_failures_quarantine_the_account() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("revoked", 10).await;

    let urls: Vec<String> = (0..5).map(|i| format!("https://site.test/a{i}")).collect();
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    app.enqueue(&url_refs, "fast").await;

    app.indexer.push_responses(5, || Err(auth_error()));
    let report = app.process().await;
    assert_eq!(report["failed"], 5, "{report}");

    let health: (String,) = sqlx::query_as("SELECT health_status FROM accounts LIMIT 1")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(health.0, "unhealthy");

    // An unhealthy account is excluded from the next distribution.
    let (body, _) = app.enqueue(&["https://site.test/late"], "fast").await;
    assert_eq!(body["assigned"], 0);
    assert_eq!(body["unassigned"], 1);

    common::cleanup(app).await;
}

// ── Batches ─────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_batch_stops_pending_dispatch() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("solo", 10).await;
    let (body, _) = app
        .enqueue(
            &["https://site.test/c1", "https://site.test/c2", "https://site.test/c3"],
            "even",
        )
        .await;
    let batch_id = body["batch"]["id"].as_str().unwrap().to_string();

    let (cancel_body, status) = app
        .post_json(&format!("/api/v1/batches/{batch_id}/cancel"), &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{cancel_body}");
    assert_eq!(cancel_body["cancelled_items"], 3);

    app.process().await;
    assert_eq!(app.indexer.call_count(), 0);

    let (item_status, _, _, _) = app.item_state("https://site.test/c1").await;
    assert_eq!(item_status, "cancelled");

    // Cancelling twice is a conflict.
    let (_, status) = app
        .post_json(&format!("/api/v1/batches/{batch_id}/cancel"), &json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    common::cleanup(app).await;
}

#[tokio::test]
async fn clear_pending_empties_the_queue() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("solo", 10).await;
    app.enqueue(&["https://site.test/x1", "https://site.test/x2"], "fast")
        .await;

    let (body, status) = app.delete_json("/api/v1/queue/pending").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["cleared"], 2);

    let (items, _) = app.get_json("/api/v1/queue").await;
    assert!(items.as_array().unwrap().is_empty());

    common::cleanup(app).await;
}

// ── Rebalancing ─────────────────────────────────────────────────

#[tokio::test]
async fn rebalance_preview_is_idempotent() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("a", 4).await;
    app.create_account("b", 4).await;

    let urls: Vec<String> = (0..6).map(|i| format!("https://site.test/r{i}")).collect();
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    app.enqueue(&url_refs, "fast").await;

    let (first, status) = app.get_json("/api/v1/rebalance/preview").await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["total_pending"], 6);

    let (second, _) = app.get_json("/api/v1/rebalance/preview").await;
    assert_eq!(first["items"], second["items"]);

    common::cleanup(app).await;
}

#[tokio::test]
async fn rebalance_commit_requires_confirmation() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("a", 4).await;
    app.enqueue(&["https://site.test/rc"], "fast").await;

    let (body, status) = app
        .post_json("/api/v1/rebalance/commit", &json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    common::cleanup(app).await;
}

#[tokio::test]
async fn rebalance_commit_redistributes_evenly() {
    let Some(app) = common::try_spawn_app().await else { return };

    app.create_account("a", 4).await;
    app.create_account("b", 4).await;

    // Fast policy piles URLs onto one account; the rebalance evens it out.
    let urls: Vec<String> = (0..6).map(|i| format!("https://site.test/m{i}")).collect();
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    app.enqueue(&url_refs, "fast").await;

    let (body, status) = app
        .post_json("/api/v1/rebalance/commit", &json!({ "confirm": true }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["reassigned"], 6);

    let per_account: Vec<(i64,)> = sqlx::query_as(
        "SELECT COUNT(*) FROM queue_items GROUP BY account_id ORDER BY COUNT(*)",
    )
    .fetch_all(&app.pool)
    .await
    .unwrap();
    assert_eq!(per_account, vec![(3,), (3,)]);

    // Items left their batch; the batch closes with a shrunk total.
    let detached: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM queue_items WHERE batch_id IS NULL")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(detached.0, 6);

    let (batches, _) = app.get_json("/api/v1/batches").await;
    assert_eq!(batches[0]["status"], "completed");

    common::cleanup(app).await;
}

// ── Quota & health endpoints ────────────────────────────────────

#[tokio::test]
async fn quota_endpoint_reflects_submission_history() {
    let Some(app) = common::try_spawn_app().await else { return };

    let account = app.create_account("tracked", 5).await;
    let account_id = account["id"].as_str().unwrap().to_string();

    app.enqueue(&["https://site.test/q1", "https://site.test/q2"], "fast")
        .await;
    app.process().await;

    let (body, status) = app
        .get_json(&format!("/api/v1/accounts/{account_id}/quota"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["used_today"], 2);
    assert_eq!(body["remaining"], 3);
    assert_eq!(body["health_status"], "healthy");

    common::cleanup(app).await;
}

#[tokio::test]
async fn probe_respects_cooldown() {
    let Some(app) = common::try_spawn_app().await else { return };

    let account = app.create_account("cooling", 5).await;
    let account_id = account["id"].as_str().unwrap().to_string();

    sqlx::query(
        "UPDATE accounts SET health_status = 'unhealthy',
         cooldown_until = now() + interval '10 minutes'",
    )
    .execute(&app.pool)
    .await
    .unwrap();

    let (body, status) = app
        .post_json(&format!("/api/v1/accounts/{account_id}/probe"), &json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    // Past the cooldown a successful probe restores the account.
    sqlx::query("UPDATE accounts SET cooldown_until = now() - interval '1 second'")
        .execute(&app.pool)
        .await
        .unwrap();

    let (body, status) = app
        .post_json(&format!("/api/v1/accounts/{account_id}/probe"), &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let health: (String,) = sqlx::query_as("SELECT health_status FROM accounts LIMIT 1")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(health.0, "healthy");

    common::cleanup(app).await;
}

// ── API key ─────────────────────────────────────────────────────

#[tokio::test]
async fn api_key_guards_management_routes() {
    let Some(app) = common::try_spawn_app_with_api_key("sekrit").await else { return };

    let (_, status) = app.get_json("/api/v1/accounts").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let resp = app
        .client
        .get(app.url("/api/v1/accounts"))
        .header("x-api-key", "sekrit")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // The health endpoint stays open.
    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    common::cleanup(app).await;
}
