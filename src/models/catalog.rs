//! Catalogs advertised by the agent and cached per session.
//!
//! Models and modes arrive in the reply to `session/new` / `session/load`;
//! the slash-command catalog is fetched lazily over
//! `_kiro.dev/commands/available`. All wire fields are camelCase.

use serde::{Deserialize, Serialize};

/// One model the agent can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Opaque model identifier used with `session/set_model`.
    #[serde(rename = "modelId")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional human description.
    #[serde(default)]
    pub description: Option<String>,
}

/// One agent mode (e.g. a planning or coding profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeInfo {
    /// Opaque mode identifier used with `session/set_mode`.
    #[serde(rename = "modeId")]
    pub id: String,
    /// Display name.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One slash command advertised by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlashCommand {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Cached model catalog: the current identifier plus the ordered list the
/// agent advertised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelCatalog {
    pub current: Option<String>,
    pub available: Vec<ModelInfo>,
}

/// Cached mode catalog, same shape as [`ModelCatalog`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModeCatalog {
    pub current: Option<String>,
    pub available: Vec<ModeInfo>,
}

/// Context-usage record. Currently a single percentage of the agent's
/// context window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextUsage {
    pub percentage: f64,
}

// ── Wire reply shapes ────────────────────────────────────────────────────────

/// `models` object in the `session/new` / `session/load` reply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsReply {
    #[serde(default)]
    pub current_model_id: Option<String>,
    #[serde(default)]
    pub available_models: Vec<ModelInfo>,
}

/// `modes` object in the `session/new` / `session/load` reply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModesReply {
    #[serde(default)]
    pub current_mode_id: Option<String>,
    #[serde(default)]
    pub available_modes: Vec<ModeInfo>,
}

/// Full `session/new` / `session/load` reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReply {
    pub session_id: String,
    #[serde(default)]
    pub models: Option<ModelsReply>,
    #[serde(default)]
    pub modes: Option<ModesReply>,
}

/// `_kiro.dev/commands/available` reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandsReply {
    #[serde(default)]
    pub commands: Vec<SlashCommand>,
}

impl From<ModelsReply> for ModelCatalog {
    fn from(reply: ModelsReply) -> Self {
        Self {
            current: reply.current_model_id,
            available: reply.available_models,
        }
    }
}

impl From<ModesReply> for ModeCatalog {
    fn from(reply: ModesReply) -> Self {
        Self {
            current: reply.current_mode_id,
            available: reply.available_modes,
        }
    }
}
