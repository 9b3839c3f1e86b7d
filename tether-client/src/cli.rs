//! Command-line argument parsing for the tether client
//!
//! Uses clap for argument parsing with derive macros. Flags override the
//! config file.

use clap::Parser;

/// tether - attach to a remote PTY session
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// PTY host
    ///
    /// `host:port`, a ws://, wss://, http:// or https:// URL, or an alias
    /// from the `[hosts]` table of the config file.
    #[arg(long, short = 'H', env = "TETHER_HOST")]
    pub host: Option<String>,

    /// Session to attach to, usually `repo/branch`
    #[arg(long, short = 's', default_value = "default")]
    pub session: String,

    /// Agent running in the session (e.g. "claude"); empty for a shell
    #[arg(long, short = 'a', env = "TETHER_AGENT")]
    pub agent: Option<String>,

    /// Working directory of the session, shown in the title
    #[arg(long)]
    pub path: Option<String>,

    /// Prompt typed into the agent once the session is ready
    #[arg(long)]
    pub prompt: Option<String>,

    /// Delay before typing the prompt, in milliseconds
    #[arg(long)]
    pub prompt_delay_ms: Option<u64>,

    /// Ask the host to recreate the PTY on connect
    #[arg(long, default_value_t = false)]
    pub reset: bool,
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["tether"]);
        assert_eq!(args.session, "default");
        assert!(args.path.is_none());
        assert!(args.prompt.is_none());
        assert!(args.prompt_delay_ms.is_none());
        assert!(!args.reset);
    }

    #[test]
    fn test_session_flags() {
        let args = Args::parse_from([
            "tether",
            "--host",
            "https://pty.example.com",
            "-s",
            "repo/branch",
            "--agent",
            "claude",
            "--path",
            "/work/repo",
        ]);
        assert_eq!(args.host.as_deref(), Some("https://pty.example.com"));
        assert_eq!(args.session, "repo/branch");
        assert_eq!(args.agent.as_deref(), Some("claude"));
        assert_eq!(args.path.as_deref(), Some("/work/repo"));
    }

    #[test]
    fn test_prompt_flags() {
        let args = Args::parse_from([
            "tether",
            "--prompt",
            "fix the tests",
            "--prompt-delay-ms",
            "1500",
            "--reset",
        ]);
        assert_eq!(args.prompt.as_deref(), Some("fix the tests"));
        assert_eq!(args.prompt_delay_ms, Some(1500));
        assert!(args.reset);
    }

    #[test]
    fn test_invalid_delay_rejected() {
        let result = Args::try_parse_from(["tether", "--prompt-delay-ms", "soon"]);
        assert!(result.is_err());
    }
}
