//! Auto-decision policy for `session/request_permission`.
//!
//! When the agent asks for permission to run a tool, the policy inspects
//! the client's edits-allowed flag and picks from the option list the
//! agent offered: the `allow_once` option, else the first option whose
//! kind begins with `allow`, else the literal `"allow_once"` — and the
//! `reject` mirror of the same ladder when edits are disallowed.
//!
//! The policy never blocks and never errors; the flag is a single atomic
//! read, and a response that can no longer be delivered (the process died
//! mid-selection) is simply dropped by the router.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// One permission option offered by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PermissionOption {
    pub kind: String,
    #[serde(rename = "optionId")]
    pub option_id: String,
}

/// Permission policy bound to the client's edits-allowed flag.
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    edits_allowed: Arc<AtomicBool>,
}

impl PermissionPolicy {
    /// Create a policy reading the shared edits-allowed flag.
    #[must_use]
    pub fn new(edits_allowed: Arc<AtomicBool>) -> Self {
        Self { edits_allowed }
    }

    /// Decide a `session/request_permission` request, returning the result
    /// object for the JSON-RPC reply.
    ///
    /// Missing or malformed `options` fall through to the literal default
    /// for the active side.
    #[must_use]
    pub fn decide(&self, params: &Value) -> Value {
        let options: Vec<PermissionOption> = params
            .get("options")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let edits_allowed = self.edits_allowed.load(Ordering::Relaxed);
        let option_id = select_option(edits_allowed, &options);

        debug!(edits_allowed, option_id = %option_id, "auto-deciding permission request");

        json!({
            "outcome": {
                "outcome": "selected",
                "optionId": option_id,
            }
        })
    }
}

/// Pick the option identifier for the given side of the policy.
#[must_use]
pub fn select_option(edits_allowed: bool, options: &[PermissionOption]) -> String {
    let (exact, prefix) = if edits_allowed {
        ("allow_once", "allow")
    } else {
        ("reject_once", "reject")
    };

    options
        .iter()
        .find(|o| o.kind == exact)
        .or_else(|| options.iter().find(|o| o.kind.starts_with(prefix)))
        .map_or_else(|| exact.to_owned(), |o| o.option_id.clone())
}
