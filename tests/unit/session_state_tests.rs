//! Unit tests for shared session state and the metadata subscriber logic.

use serde_json::{json, Value};

use kiro_bridge::acp::router::AgentNotification;
use kiro_bridge::models::catalog::{ModelCatalog, ModelInfo};
use kiro_bridge::session::{apply_metadata, SessionShared, SessionState};

fn note(method: &str, params: Value) -> AgentNotification {
    AgentNotification {
        method: method.to_owned(),
        params,
    }
}

fn established() -> SessionShared {
    let shared = SessionShared::default();
    shared.put_session(SessionState {
        id: "sess-1".to_owned(),
        models: ModelCatalog {
            current: Some("m1".to_owned()),
            available: vec![ModelInfo {
                id: "m1".to_owned(),
                name: "Model One".to_owned(),
                description: None,
            }],
        },
        modes: kiro_bridge::models::catalog::ModeCatalog::default(),
        commands: None,
    });
    shared
}

/// Context usage starts at zero and takes the last written value.
#[test]
fn usage_defaults_and_updates() {
    let shared = SessionShared::default();
    assert!((shared.context_usage().percentage - 0.0).abs() < f64::EPSILON);

    shared.set_context_usage(12.5);
    shared.set_context_usage(80.0);
    assert!((shared.context_usage().percentage - 80.0).abs() < f64::EPSILON);
}

/// Reset drops the session, the usage record, and the compaction flag.
#[test]
fn reset_clears_everything() {
    let shared = established();
    shared.set_context_usage(55.0);
    shared.set_compacting(true);

    shared.reset();

    assert_eq!(shared.current_session_id(), None);
    assert!(shared.models().available.is_empty());
    assert!((shared.context_usage().percentage - 0.0).abs() < f64::EPSILON);
    assert!(!shared.is_compacting());
}

/// `set_current_model` updates only the cached current identifier.
#[test]
fn set_current_model_updates_catalog() {
    let shared = established();
    shared.set_current_model("m2");

    let models = shared.models();
    assert_eq!(models.current.as_deref(), Some("m2"));
    assert_eq!(models.available.len(), 1, "available list is untouched");
}

// ── Metadata subscriber ──────────────────────────────────────────────────────

/// A metadata notification with a percentage updates the cache; one
/// without it changes nothing.
#[test]
fn metadata_notification_updates_usage() {
    let shared = SessionShared::default();

    apply_metadata(
        &shared,
        &note("kiro.dev/metadata", json!({ "contextUsagePercentage": 42.5 })),
    );
    assert!((shared.context_usage().percentage - 42.5).abs() < f64::EPSILON);

    apply_metadata(&shared, &note("kiro.dev/metadata", json!({ "other": 1 })));
    assert!(
        (shared.context_usage().percentage - 42.5).abs() < f64::EPSILON,
        "a metadata notification without the field must not change the cache"
    );
}

/// Compaction status toggles the flag on `in_progress` and off otherwise.
#[test]
fn compaction_status_toggles_flag() {
    let shared = SessionShared::default();

    apply_metadata(
        &shared,
        &note("_kiro.dev/compaction/status", json!({ "status": "in_progress" })),
    );
    assert!(shared.is_compacting());

    apply_metadata(
        &shared,
        &note("_kiro.dev/compaction/status", json!({ "status": "completed" })),
    );
    assert!(!shared.is_compacting());
}

/// `turn_end` context usage updates the cache silently.
#[test]
fn turn_end_usage_updates_cache() {
    let shared = SessionShared::default();

    apply_metadata(
        &shared,
        &note(
            "session/update",
            json!({ "update": { "sessionUpdate": "turn_end", "contextUsage": { "percentage": 61.0 } } }),
        ),
    );
    assert!((shared.context_usage().percentage - 61.0).abs() < f64::EPSILON);
}

/// Unrelated notifications leave the state untouched.
#[test]
fn unrelated_notifications_are_ignored() {
    let shared = SessionShared::default();
    apply_metadata(&shared, &note("session/update", json!({ "update": { "sessionUpdate": "agent_message_chunk" } })));
    apply_metadata(&shared, &note("kiro.dev/other", json!({})));

    assert!((shared.context_usage().percentage - 0.0).abs() < f64::EPSILON);
    assert!(!shared.is_compacting());
}
