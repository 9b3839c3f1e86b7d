//! PTY endpoint addressing

use url::Url;

use crate::types::Session;

/// Path of the PTY WebSocket endpoint on the host
pub const PTY_PATH: &str = "/v1/pty";

/// Failure to build an endpoint URL
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Unsupported scheme '{scheme}' in host '{host}'")]
    UnsupportedScheme { host: String, scheme: String },

    #[error("Invalid host '{host}': {source}")]
    InvalidHost {
        host: String,
        source: url::ParseError,
    },
}

/// Build the WebSocket URL for a session
///
/// `host` may be a bare `host[:port]` (plain `ws`), or carry a `ws`, `wss`,
/// `http` or `https` scheme; HTTP schemes map to their WebSocket
/// counterparts. Any path on `host` is replaced by [`PTY_PATH`]. The session
/// name is form-encoded, so `repo/branch` becomes `repo%2Fbranch` and a
/// space becomes `+`, which the host's query parser decodes back to a space.
pub fn pty_url(host: &str, session: &Session, reset: bool) -> Result<Url, EndpointError> {
    let host = host.trim();
    let normalized = match host.split_once("://") {
        None => format!("ws://{}", host),
        Some((scheme, rest)) => {
            let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
                "ws" | "http" => "ws",
                "wss" | "https" => "wss",
                _ => {
                    return Err(EndpointError::UnsupportedScheme {
                        host: host.to_string(),
                        scheme: scheme.to_string(),
                    })
                }
            };
            format!("{}://{}", ws_scheme, rest)
        }
    };

    let mut url = Url::parse(&normalized).map_err(|source| EndpointError::InvalidHost {
        host: host.to_string(),
        source,
    })?;

    url.set_path(PTY_PATH);
    url.set_fragment(None);
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("session", &session.name);
        if session.has_agent() {
            query.append_pair("agent", &session.agent_type);
        }
        if reset {
            query.append_pair("reset", "true");
        }
    }

    Ok(url)
}
