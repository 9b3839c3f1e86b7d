//! Interactive attach loop
//!
//! Wires the terminal, the input thread and a [`SessionRunner`] together,
//! and owns the retry policy: after a disconnect or a server error the
//! user decides whether to reconnect.

use std::io::Stdout;
use std::time::Duration;

use crossterm::event;
use tokio::sync::mpsc;

use tether_client::{
    load_config, AccessMode, AnsiRenderer, ConnectionState, Connection, Engine, LocalEvent,
    Renderer, ServerFault, SessionEnd, SessionObserver, SessionRunner,
};
use tether_protocol::Session;
use tether_utils::Result;

use crate::cli::Args;
use crate::input::{container_size, InputMapper};
use crate::terminal::{self, TerminalGuard};

/// How often the input thread checks whether the app has gone away
const INPUT_POLL: Duration = Duration::from_millis(250);

const LOCAL_CHANNEL_CAPACITY: usize = 256;

/// Observer that reflects session state in the local terminal
struct TerminalObserver {
    label: String,
    read_only: bool,
    connected: bool,
}

impl TerminalObserver {
    fn new(session: &Session) -> Self {
        let label = match &session.path {
            Some(path) => format!("{} ({})", session.label(), path),
            None => session.label(),
        };
        Self {
            label,
            read_only: false,
            connected: false,
        }
    }

    fn update_title(&self) {
        let mut title = format!("tether: {}", self.label);
        if !self.connected {
            title.push_str(" [disconnected]");
        } else if self.read_only {
            title.push_str(" [read-only]");
        }
        terminal::set_title(&title);
    }
}

impl SessionObserver for TerminalObserver {
    fn on_connected(&mut self, connected: bool) {
        self.connected = connected;
        self.update_title();
    }

    fn on_state_changed(&mut self, state: ConnectionState) {
        tracing::debug!(?state, "Session state");
    }

    fn on_access_mode_changed(&mut self, mode: AccessMode) {
        self.read_only = mode == AccessMode::ReadOnly;
        self.update_title();
    }

    fn on_input_rejected(&mut self) {
        terminal::bell();
    }

    fn on_server_error(&mut self, fault: &ServerFault) {
        tracing::error!("Session refused by host: {}", fault);
    }
}

/// What the user chose at the retry prompt
enum RetryChoice {
    Retry,
    Quit,
}

pub async fn run(args: Args) -> Result<()> {
    let config = load_config();

    let host = config
        .resolve_host(args.host.as_deref().unwrap_or(&config.host))
        .to_string();
    let agent = args.agent.clone().unwrap_or_else(|| config.agent.clone());
    let mut session = Session::new(args.session.clone(), agent);
    if let Some(path) = &args.path {
        session = session.with_path(path.clone());
    }

    let mut options = config.engine_options(args.prompt.clone());
    if let Some(ms) = args.prompt_delay_ms {
        options.prompt_delay = Duration::from_millis(ms);
    }
    tracing::info!(%host, session = %session.label(), "Attaching");

    let _guard = TerminalGuard::new()?;

    let observer = TerminalObserver::new(&session);
    let mut engine = Engine::new(session, options, AnsiRenderer::stdout(), observer);
    engine.mount()?;

    let connection = Connection::with_reconnect_interval(host, config.reconnect_interval());
    let mut runner = SessionRunner::new(engine, connection);

    let (tx, mut rx) = mpsc::channel(LOCAL_CHANNEL_CAPACITY);
    if let Some(size) = container_size() {
        let _ = tx.send(LocalEvent::Container(size)).await;
    }
    spawn_input_thread(tx);

    let mut reset = args.reset;
    loop {
        let end = runner.run(&mut rx, reset).await;
        reset = false;
        tracing::info!(?end, "Session run ended");

        let status = match &end {
            SessionEnd::Detached | SessionEnd::Cancelled => return Ok(()),
            SessionEnd::Throttled => {
                tokio::time::sleep(config.reconnect_interval()).await;
                continue;
            }
            SessionEnd::ServerError(fault) => format!("Error: {}", fault),
            SessionEnd::Disconnected { reason: Some(reason) } => {
                format!("Disconnected: {}", reason)
            }
            SessionEnd::Disconnected { reason: None } => "Disconnected".to_string(),
        };
        show_status(runner.engine_mut().renderer_mut(), &status);

        match wait_for_retry(&mut rx).await {
            RetryChoice::Retry => continue,
            RetryChoice::Quit => return Ok(()),
        }
    }
}

fn show_status(renderer: &mut AnsiRenderer<Stdout>, status: &str) {
    let line = format!(
        "\r\n\x1b[7m {} - press r to retry, q to quit \x1b[0m\r\n",
        status
    );
    renderer.write(line.as_bytes());
}

/// Wait for `r` or `q`; other input is ignored
async fn wait_for_retry(rx: &mut mpsc::Receiver<LocalEvent>) -> RetryChoice {
    while let Some(event) = rx.recv().await {
        match event {
            LocalEvent::Input(data) => match &data[..] {
                b"r" | b"R" => return RetryChoice::Retry,
                b"q" | b"Q" | &[0x03] => return RetryChoice::Quit,
                _ => {}
            },
            LocalEvent::Detach => return RetryChoice::Quit,
            _ => {}
        }
    }
    RetryChoice::Quit
}

/// Read terminal events on a blocking thread and forward them
fn spawn_input_thread(tx: mpsc::Sender<LocalEvent>) {
    std::thread::spawn(move || {
        let mut mapper = InputMapper::new();
        while !tx.is_closed() {
            match event::poll(INPUT_POLL) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    tracing::error!("Error polling terminal events: {}", e);
                    break;
                }
            }

            let ev = match event::read() {
                Ok(ev) => ev,
                Err(e) => {
                    tracing::error!("Error reading terminal event: {}", e);
                    break;
                }
            };

            let container = matches!(ev, event::Event::Resize(..))
                .then(container_size)
                .flatten();
            if let Some(local) = mapper.map_event(ev) {
                if tx.blocking_send(local).is_err() {
                    break;
                }
            }
            if let Some(size) = container {
                if tx.blocking_send(LocalEvent::Container(size)).is_err() {
                    break;
                }
            }
        }
        tracing::debug!("Input thread exiting");
    });
}

