//! Worker agent protocol.
//!
//! The streaming agent on each worker listens on a localhost-only port. The
//! controller reaches it by running `curl` through the remote shell, so the
//! functions here build those shell commands and interpret what `curl`
//! prints.

use serde_json::{Map, Value};

use crate::types::DbId;

/// Default port of the worker-local streaming agent.
pub const DEFAULT_AGENT_PORT: u16 = 9999;

/// Failure modes when interpreting the agent's stdout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// Output was empty, not JSON, or not a JSON object.
    #[error("Invalid response from VPS")]
    InvalidResponse,

    /// The agent answered with an `error` field.
    #[error("{0}")]
    Reported(String),
}

/// Quote a value for a POSIX shell using single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Remote path of the uploaded job spec for a stream.
pub fn remote_config_path(config_dir: &str, stream_id: DbId) -> String {
    format!(
        "{}/stream_config_{stream_id}.json",
        config_dir.trim_end_matches('/')
    )
}

/// Command asking the agent to start a stream from an uploaded spec file.
///
/// The spec file is removed whatever `curl` returns, and the command exits
/// with `curl`'s status.
pub fn start_command(agent_port: u16, remote_path: &str) -> String {
    let path = shell_quote(remote_path);
    format!(
        "curl -sS -X POST http://localhost:{agent_port}/start_stream \
         -H 'Content-Type: application/json' --data-binary @{path}; \
         rc=$?; rm -f {path}; exit $rc"
    )
}

/// Command asking the agent to stop a stream.
pub fn stop_command(agent_port: u16, stream_id: DbId) -> String {
    let body = shell_quote(&format!("{{\"stream_id\": {stream_id}}}"));
    format!(
        "curl -sS -X POST http://localhost:{agent_port}/stop_stream \
         -H 'Content-Type: application/json' -d {body}"
    )
}

/// Interpret the agent's stdout.
///
/// A JSON object without an `error` key (or with `error: null`) is success.
pub fn parse_response(stdout: &str) -> Result<Map<String, Value>, AgentError> {
    let value: Value =
        serde_json::from_str(stdout.trim()).map_err(|_| AgentError::InvalidResponse)?;
    let Value::Object(map) = value else {
        return Err(AgentError::InvalidResponse);
    };
    match map.get("error") {
        None | Some(Value::Null) => Ok(map),
        Some(Value::String(message)) => Err(AgentError::Reported(message.clone())),
        Some(other) => Err(AgentError::Reported(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
