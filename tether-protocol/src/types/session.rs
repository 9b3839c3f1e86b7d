use serde::{Deserialize, Serialize};

/// Identity of a remote PTY session
///
/// A session is addressed by its name (usually `repo/branch`) plus the agent
/// running inside it; the host keys its PTYs on that pair. Any change to
/// these fields means a different PTY, so clients rebuild their whole
/// session state rather than mutating a live one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    /// Session name as known to the host
    pub name: String,
    /// Agent type running in the PTY (e.g. "claude"); empty for a plain shell
    #[serde(default)]
    pub agent_type: String,
    /// Working directory of the session on the host, for display only
    #[serde(default)]
    pub path: Option<String>,
}

impl Session {
    pub fn new(name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_type: agent_type.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Whether this session runs an agent rather than a plain shell
    pub fn has_agent(&self) -> bool {
        !self.agent_type.is_empty()
    }

    /// Human-readable label, `name` or `name:agent`
    pub fn label(&self) -> String {
        if self.has_agent() {
            format!("{}:{}", self.name, self.agent_type)
        } else {
            self.name.clone()
        }
    }
}
