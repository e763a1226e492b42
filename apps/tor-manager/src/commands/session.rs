//! Interactive control session.
//!
//! Lines typed at the prompt are sent to the daemon verbatim and the raw
//! reply is printed. Lines starting with `/` are session commands.

use crate::commands::{Context, manager_with_printer};
use crate::error::TorManagerError;

use control_core::ControlManager;

use common::ErrorLocation;

use std::panic::Location;

use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, stdin, stdout};
use tokio::signal::ctrl_c;

const PROMPT: &str = "tor> ";
const FORCE_EXIT_PROMPT: &str = "Stopping Tor failed. Exit anyway? [y/N] ";

const HELP: &str = "\
Session commands:
  /start       launch Tor if it is not running
  /stop        stop the Tor process started by this session
  /discover    re-read the running process's port and cookie
  /connect     reconnect and authenticate
  /disconnect  close the control connection
  /status      show connection state
  /help        show this help
  /quit        stop Tor (if started here) and exit
Anything else is sent to Tor as a control command.";

/// What the prompt loop should do with one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Empty,
    Start,
    Stop,
    Discover,
    Connect,
    Disconnect,
    Status,
    Help,
    Quit,
    Unknown(String),
    Command(String),
}

impl SessionInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        let Some(session_command) = line.strip_prefix('/') else {
            return if line.is_empty() {
                SessionInput::Empty
            } else {
                SessionInput::Command(line.to_string())
            };
        };

        match session_command.to_ascii_lowercase().as_str() {
            "start" => SessionInput::Start,
            "stop" => SessionInput::Stop,
            "discover" => SessionInput::Discover,
            "connect" => SessionInput::Connect,
            "disconnect" => SessionInput::Disconnect,
            "status" => SessionInput::Status,
            "help" | "?" => SessionInput::Help,
            "quit" | "exit" => SessionInput::Quit,
            other => SessionInput::Unknown(other.to_string()),
        }
    }
}

/// `y`/`yes` (any case) confirms; everything else, including no input, declines.
pub fn is_confirmation(answer: Option<&str>) -> bool {
    matches!(
        answer.map(|a| a.trim().to_ascii_lowercase()).as_deref(),
        Some("y" | "yes")
    )
}

type InputLines = Lines<BufReader<Stdin>>;

/// Start or find the daemon, connect, then serve the prompt until `/quit`,
/// Ctrl-C or end of input.
pub async fn run(context: &Context) -> Result<(), TorManagerError> {
    let (manager, printer) = manager_with_printer(context);
    let mut input = BufReader::new(stdin()).lines();

    let result = serve(&manager, &mut input).await;

    drop(manager);
    printer.finish().await;
    result
}

async fn serve(manager: &ControlManager, input: &mut InputLines) -> Result<(), TorManagerError> {
    bring_up(manager).await;

    loop {
        let line = tokio::select! {
            line = read_line(input, PROMPT) => line?,
            _ = ctrl_c() => {
                debug!("Ctrl-C received at prompt");
                None
            }
        };

        let Some(line) = line else {
            // No more input to ask a force-exit question with
            shut_down(manager).await;
            return Ok(());
        };

        match SessionInput::parse(&line) {
            SessionInput::Empty => {}
            SessionInput::Start => start_and_connect(manager).await,
            SessionInput::Stop => {
                manager.disconnect().await;
                let _ = manager.stop_daemon().await;
            }
            SessionInput::Discover => {
                let _ = manager.gather_process_info().await;
            }
            SessionInput::Connect => {
                let _ = manager.connect().await;
            }
            SessionInput::Disconnect => manager.disconnect().await,
            SessionInput::Status => print_status(manager).await,
            SessionInput::Help => println!("{HELP}"),
            SessionInput::Unknown(other) => println!("Unknown session command /{other}; try /help"),
            SessionInput::Quit => {
                if confirm_shutdown(manager, input).await? {
                    return Ok(());
                }
            }
            SessionInput::Command(command) => {
                // Failures are already on the notification stream
                if let Ok(reply) = manager.send_command(&command).await {
                    print!("{reply}");
                }
            }
        }
    }
}

/// Launch the daemon unless one is already running, otherwise adopt the
/// running one's port and cookie. Then connect. Failures are reported on the
/// notification stream and leave the prompt usable.
async fn bring_up(manager: &ControlManager) {
    match manager.is_running().await {
        Ok(true) => {
            let _ = manager.gather_process_info().await;
            let _ = manager.connect().await;
        }
        Ok(false) => start_and_connect(manager).await,
        Err(_) => {}
    }
}

async fn start_and_connect(manager: &ControlManager) {
    if manager.start_daemon().await.is_err() || manager.wait_until_listening().await.is_err() {
        return;
    }
    let _ = manager.connect().await;
}

async fn print_status(manager: &ControlManager) {
    let config = manager.effective_config().await;
    println!("Connection:   {}", manager.state());
    println!("Control port: {}", config.control_port);
    println!("Auth method:  {}", config.auth_method());
    println!(
        "Tor process:  {}",
        if manager.is_daemon_alive().await {
            "started by this session"
        } else {
            "not started by this session"
        }
    );
}

/// Disconnect and stop the daemon. When stopping fails, ask whether to exit
/// anyway; `Ok(false)` means the user chose to stay.
async fn confirm_shutdown(
    manager: &ControlManager,
    input: &mut InputLines,
) -> Result<bool, TorManagerError> {
    manager.disconnect().await;

    if manager.stop_daemon().await.is_ok() {
        return Ok(true);
    }

    let answer = read_line(input, FORCE_EXIT_PROMPT).await?;
    Ok(is_confirmation(answer.as_deref()))
}

async fn shut_down(manager: &ControlManager) {
    manager.disconnect().await;
    if manager.stop_daemon().await.is_err() {
        warn!("Exiting although Tor could not be stopped");
    }
}

async fn read_line(input: &mut InputLines, prompt: &str) -> Result<Option<String>, TorManagerError> {
    let mut out = stdout();
    out.write_all(prompt.as_bytes())
        .await
        .map_err(|e| terminal_error("Failed to write prompt", e))?;
    out.flush()
        .await
        .map_err(|e| terminal_error("Failed to write prompt", e))?;

    input
        .next_line()
        .await
        .map_err(|e| terminal_error("Failed to read input", e))
}

#[track_caller]
fn terminal_error(message: &str, source: std::io::Error) -> TorManagerError {
    TorManagerError::Terminal {
        message: message.to_string(),
        location: ErrorLocation::from(Location::caller()),
        source,
    }
}
