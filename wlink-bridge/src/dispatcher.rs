//! Command Dispatcher - maps commands to handlers and builds the result

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use wlink_net::{ConnectError, NetworkOps};
use wlink_proto::{Command, CommandResult, commands, parse_line};

use crate::scan_state::{ScanState, SharedScanState};

const LIST_HEADER: &str = "SSID (BSSID) SECURITY SIGNAL (CHANNEL)";

/// Name and one-line description, in `help` order
const HELP: [(&str, &str); 4] = [
    ("help", "show this help"),
    ("scan", "start background wifi scan"),
    ("list", "list available networks"),
    ("conn <ssid> [<password>]", "connect to a network"),
];

pub struct Dispatcher {
    network: Arc<dyn NetworkOps>,
    scan_state: SharedScanState,
}

impl Dispatcher {
    pub fn new(network: Arc<dyn NetworkOps>) -> Self {
        Self::with_scan_state(network, SharedScanState::new())
    }

    pub fn with_scan_state(network: Arc<dyn NetworkOps>, scan_state: SharedScanState) -> Self {
        Self {
            network,
            scan_state,
        }
    }

    pub fn scan_state(&self) -> &SharedScanState {
        &self.scan_state
    }

    /// Parse raw line bytes and execute. Parse failures become `BAD_REQUEST`.
    pub async fn handle_bytes(&self, raw: &[u8]) -> CommandResult {
        match std::str::from_utf8(raw) {
            Ok(line) => self.handle_line(line).await,
            Err(_) => CommandResult::bad_request(
                wlink_proto::ParseError::InvalidUtf8.client_message(),
            ),
        }
    }

    pub async fn handle_line(&self, line: &str) -> CommandResult {
        match parse_line(line) {
            Ok(cmd) => self.execute(&cmd).await,
            Err(e) => {
                debug!("rejecting command line: {e}");
                CommandResult::bad_request(e.client_message())
            }
        }
    }

    /// Run one command to completion. Never fails: every outcome is a result.
    pub async fn execute(&self, cmd: &Command) -> CommandResult {
        info!("executing {cmd}");

        let result = if cmd.is(commands::HELP) {
            self.help(cmd)
        } else if cmd.is(commands::SCAN) {
            self.scan(cmd).await
        } else if cmd.is(commands::LIST) {
            self.list(cmd).await
        } else if cmd.is(commands::CONN) {
            self.conn(cmd).await
        } else {
            CommandResult::unknown_command()
        };

        debug!("{} -> status {}", cmd.name, result.status_code);
        result
    }

    fn help(&self, cmd: &Command) -> CommandResult {
        if !cmd.args.is_empty() {
            return usage("help");
        }
        let text = HELP
            .iter()
            .map(|(name, about)| format!("{name}: {about}"))
            .collect::<Vec<_>>()
            .join("\n");
        CommandResult::ok(text)
    }

    async fn scan(&self, cmd: &Command) -> CommandResult {
        if !cmd.args.is_empty() {
            return usage("scan");
        }
        if !self.scan_state.try_begin() {
            return CommandResult::ok("scan already in progress");
        }

        let handle = match self.network.start_scan().await {
            Ok(handle) => handle,
            Err(e) => {
                self.scan_state.abort();
                warn!("scan could not start: {e}");
                return CommandResult::unavailable(e.to_string());
            }
        };

        let scan_state = self.scan_state.clone();
        tokio::spawn(async move {
            match handle.wait().await {
                Ok(()) => scan_state.complete(),
                Err(e) => {
                    warn!("background scan failed: {e}");
                    scan_state.abort();
                }
            }
        });

        CommandResult::ok("scan started")
    }

    async fn list(&self, cmd: &Command) -> CommandResult {
        if !cmd.args.is_empty() {
            return usage("list");
        }

        let state = self.scan_state.current();
        if state == ScanState::Running {
            return CommandResult::not_ready("scan in progress, try again shortly");
        }

        let networks = match self.network.list_networks().await {
            Ok(networks) => networks,
            Err(e) => return CommandResult::unavailable(e.to_string()),
        };

        if networks.is_empty() {
            return match state {
                ScanState::Completed(_) => CommandResult::ok("no networks found"),
                _ => CommandResult::ok("no networks found; run scan first"),
            };
        }

        let mut lines = vec![LIST_HEADER.to_string()];
        lines.extend(networks.iter().map(|n| n.to_string()));
        CommandResult::ok(lines.join("\n"))
    }

    async fn conn(&self, cmd: &Command) -> CommandResult {
        let (ssid, password) = match cmd.args.as_slice() {
            [ssid] => (ssid, None),
            [ssid, password] => (ssid, Some(password.as_str())),
            _ => return usage("conn <ssid> [<password>]"),
        };

        match self.network.connect(ssid, password).await {
            Ok(outcome) => {
                info!("connected to {:?}: {}", outcome.ssid, outcome.detail);
                CommandResult::ok(format!("connected to {ssid}"))
            }
            Err(ConnectError::Adapter(e)) => CommandResult::unavailable(e.to_string()),
            Err(e) => {
                warn!("connecting to {ssid:?} failed: {e}");
                CommandResult::failure(format!("failed to connect to {ssid}: {}", e.reason()))
            }
        }
    }
}

fn usage(synopsis: &str) -> CommandResult {
    CommandResult::bad_request(format!("usage: {synopsis}"))
}

/// Per-connection execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Executing,
}

/// One connection's `Idle -> Executing -> Idle` state machine.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    executing: Arc<AtomicBool>,
}

/// Held for as long as a command executes; dropping it returns the session
/// to `Idle`.
#[derive(Debug)]
pub struct ExecutionGuard {
    executing: Arc<AtomicBool>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        if self.executing.load(Ordering::Acquire) {
            SessionState::Executing
        } else {
            SessionState::Idle
        }
    }

    /// `None` while another command is executing
    pub fn try_begin(&self) -> Option<ExecutionGuard> {
        self.executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExecutionGuard {
                executing: self.executing.clone(),
            })
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.executing.store(false, Ordering::Release);
    }
}
