//! Process-level tests against real (trivial) child binaries.
//!
//! These use `cat` and `true` as stand-ins for the agent: `cat` echoes
//! frames back, `true` exits immediately. Unix only.

#![cfg(unix)]

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use kiro_bridge::acp::router::Router;
use kiro_bridge::acp::spawner::{
    find_in_path, monitor_exit, resolve_search_path, spawn_agent, SpawnConfig,
};
use kiro_bridge::permission::PermissionPolicy;
use kiro_bridge::AppError;

fn spawn_config(command: &str) -> SpawnConfig {
    SpawnConfig {
        command: command.to_owned(),
        args: Vec::new(),
        cwd: std::env::temp_dir(),
        debug_log_file: None,
    }
}

fn test_policy() -> PermissionPolicy {
    PermissionPolicy::new(Arc::new(AtomicBool::new(false)))
}

/// The search path keeps the current `PATH` entries, adds the fixed
/// system directories, and contains no empty segments.
#[tokio::test]
async fn search_path_is_extended_and_clean() {
    let path = resolve_search_path().await;

    assert!(path.contains("/usr/local/bin"), "got: {path}");
    assert!(path.split(':').all(|dir| !dir.is_empty()));

    if let Some(first) = std::env::split_paths(&std::env::var("PATH").unwrap_or_default()).next() {
        assert!(
            path.contains(&first.display().to_string()),
            "current PATH entries must be preserved"
        );
    }
}

/// `find_in_path` resolves standard binaries and misses empty dirs.
#[test]
fn find_in_path_resolves_sh() {
    let found = find_in_path("sh", "/bin:/usr/bin").expect("sh must exist on /bin:/usr/bin");
    assert!(found.ends_with("sh"), "got: {}", found.display());

    assert_eq!(find_in_path("sh", "/definitely-not-a-dir"), None);
}

/// A command that resolves nowhere aborts before spawning.
#[tokio::test]
async fn missing_binary_fails_resolution() {
    let err = spawn_agent(&spawn_config("kiro-bridge-no-such-binary"))
        .await
        .expect_err("resolution must fail");

    match err {
        AppError::BinaryNotFound(message) => {
            assert!(message.contains("cannot find command"), "got: {message}");
        }
        other => panic!("expected AppError::BinaryNotFound, got: {other:?}"),
    }
}

/// End-to-end through a real child: `cat` echoes our request frame, and
/// per the classification rules an echoed identifier matching the live
/// pending entry completes the request (with no result payload).
#[tokio::test]
async fn spawn_and_route_through_real_child() {
    let process = spawn_agent(&spawn_config("cat")).await.expect("cat must spawn");
    let _child = process.child;

    let cancel = CancellationToken::new();
    let router = Router::connect(
        process.stdout,
        process.stdin,
        test_policy(),
        Duration::from_secs(5),
        &cancel,
        None,
    );

    let result = router
        .request("initialize", json!({ "protocolVersion": "1.0" }))
        .await
        .expect("echoed frame must complete the request");
    assert_eq!(result, Value::Null);

    cancel.cancel();
}

/// The exit monitor reports the child's exit status to the cleanup hook.
#[tokio::test]
async fn exit_monitor_reports_exit() {
    let process = spawn_agent(&spawn_config("true")).await.expect("true must spawn");

    let (tx, rx) = tokio::sync::oneshot::channel();
    let _monitor = monitor_exit(process.child, CancellationToken::new(), move |reason| {
        let _ = tx.send(reason.to_owned());
    });

    let reason = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("exit must be observed")
        .expect("reason must be delivered");
    assert!(reason.contains("exited with code 0"), "got: {reason}");
}
