//! Hook boundary for agent-host integration.
//!
//! Hook invocations read one JSON object from stdin and write a prompt
//! fragment to stdout. Two rules govern everything here:
//!
//! - **Hooks never block an agent session.** Missing `.floop`
//!   directories, malformed stdin, storage failures — every problem
//!   degrades to empty output after a debug log.
//! - **Hook paths always exit 0.** Non-zero exit codes are reserved for
//!   developer-invoked commands; the transport that wraps
//!   [`handle_hook`] should exit 0 unconditionally.

use crate::assembly::compile::OutputFormat;
use crate::engine::{ActivateRequest, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Which agent lifecycle event fired the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookTrigger {
    /// A new agent session started.
    SessionStart,
    /// The user submitted a prompt.
    UserPromptSubmit,
    /// A tool finished executing.
    PostToolUse,
}

impl fmt::Display for HookTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionStart => write!(f, "session_start"),
            Self::UserPromptSubmit => write!(f, "user_prompt_submit"),
            Self::PostToolUse => write!(f, "post_tool_use"),
        }
    }
}

/// The JSON object a hook reads from stdin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl HookInput {
    /// Parse hook input from raw stdin bytes. Malformed input is a
    /// non-error: it becomes the empty input.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(input) => input,
            Err(e) => {
                debug!(error = %e, "hook stdin unreadable, using empty input");
                Self::default()
            }
        }
    }

    /// Pull a file path out of the tool input, if the tool carried one.
    fn file_from_tool_input(&self) -> Option<String> {
        let tool_input = self.tool_input.as_ref()?;
        for key in ["file_path", "path", "file"] {
            if let Some(path) = tool_input.get(key).and_then(Value::as_str) {
                if !path.is_empty() {
                    return Some(path.to_string());
                }
            }
        }
        None
    }
}

/// Handle one hook invocation.
///
/// Returns the prompt fragment to print, or an empty string. This
/// function never fails; see the module docs for the policy.
pub fn handle_hook(engine: &Engine, trigger: HookTrigger, input: &HookInput) -> String {
    let request = ActivateRequest {
        file: input.file_from_tool_input(),
        task: input.prompt.clone(),
        environment: None,
        token_budget: None,
        session_id: input
            .session_id
            .clone()
            .unwrap_or_else(|| "default".to_string()),
        format: OutputFormat::Markdown,
    };

    match engine.activate(request) {
        Ok(result) => {
            debug!(
                %trigger,
                emitted = result.emitted.len(),
                suppressed = result.suppressed.len(),
                "hook activation"
            );
            result.fragment
        }
        Err(e) => {
            debug!(%trigger, error = %e, "hook activation failed, staying quiet");
            String::new()
        }
    }
}
