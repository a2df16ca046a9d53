//! cafctl - command line client for the cafctl daemon
//!
//! Starts bounded keep-awake sessions, toggles caffeinate options, and
//! manages the privileged lid-sleep override by talking to cafctld over
//! its Unix socket. The daemon is started automatically if it is not
//! already running.
//!
//! # Usage
//!
//! ```bash
//! # Keep the machine awake for an hour (the default)
//! cafctl start
//!
//! # Keep it awake for 45 minutes
//! cafctl start 45m
//!
//! # Show the current session and options
//! cafctl status
//!
//! # Stream countdown events until interrupted
//! cafctl watch
//!
//! # Toggle a caffeinate assertion
//! cafctl set display on
//!
//! # Prevent sleep on lid close (prompts for confirmation)
//! cafctl lid on
//!
//! # Make the expiry alarm audible
//! cafctl alarm on
//! ```

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use cafctl_cli::client::socket_path_from_env;
use cafctl_cli::daemon::ensure_daemon_running;
use cafctl_cli::output;
use cafctl_cli::DaemonClient;
use cafctl_core::session::SessionDuration;
use cafctl_protocol::{ClientMessage, DaemonMessage};

/// cafctl - keep your Mac awake for a bounded stretch of time
#[derive(Parser, Debug)]
#[command(name = "cafctl", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output machine-readable JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a keep-awake session
    Start {
        /// How long to stay awake, e.g. "45m", "2h", "90s", or plain seconds.
        /// Defaults to the duration of the previous session.
        duration: Option<String>,
    },
    /// Stop the current session
    Stop,
    /// Show the current session, options, and lid-sleep state
    Status,
    /// Stream session events until interrupted
    Watch,
    /// Toggle a caffeinate assertion (display, idle, disk, system, user-active)
    Set {
        /// Option name
        option: String,
        /// New state
        state: Switch,
    },
    /// Control whether the machine sleeps when the lid is closed
    Lid {
        /// New state (on = sleep is prevented on lid close)
        state: Switch,
    },
    /// Control whether the countdown alarm is audible
    Alarm {
        /// New state
        state: Switch,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn enabled(self) -> bool {
        matches!(self, Switch::On)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    ensure_daemon_running().map_err(|e| anyhow!(e))?;

    let socket_path = socket_path_from_env();
    let mut client = DaemonClient::connect(&socket_path)
        .await
        .with_context(|| format!("Failed to connect to daemon at {}", socket_path.display()))?;

    match args.command {
        Command::Start { duration } => {
            let duration_secs = match duration {
                Some(spec) => Some(parse_duration(&spec)?),
                None => None,
            };
            let reply = client.request(ClientMessage::start(duration_secs)).await?;
            match reply {
                DaemonMessage::Started { report } => output::print_started(&report, args.json)?,
                other => return Err(unexpected(other)),
            }
        }
        Command::Stop => {
            let reply = client.request(ClientMessage::stop()).await?;
            match reply {
                DaemonMessage::Stopped { reason } => output::print_stopped(reason, args.json)?,
                other => return Err(unexpected(other)),
            }
        }
        Command::Status => {
            let reply = client.request(ClientMessage::get_status()).await?;
            match reply {
                DaemonMessage::Status { report } => output::print_status(&report, args.json)?,
                other => return Err(unexpected(other)),
            }
        }
        Command::Watch => {
            watch(&mut client, args.json).await?;
        }
        Command::Set { option, state } => {
            let reply = client
                .request(ClientMessage::set_option(&option, state.enabled()))
                .await?;
            match reply {
                DaemonMessage::Status { report } => output::print_status(&report, args.json)?,
                other => return Err(unexpected(other)),
            }
        }
        Command::Lid { state } => {
            set_lid_sleep(&mut client, state.enabled(), args.json).await?;
        }
        Command::Alarm { state } => {
            let reply = client
                .request(ClientMessage::set_alarm(state.enabled()))
                .await?;
            match reply {
                DaemonMessage::Status { report } => output::print_status(&report, args.json)?,
                other => return Err(unexpected(other)),
            }
        }
    }

    Ok(())
}

/// Parses a duration spec into whole seconds.
fn parse_duration(spec: &str) -> Result<u64> {
    let duration: SessionDuration = spec
        .parse()
        .map_err(|e| anyhow!("Invalid duration '{}': {}", spec, e))?;
    Ok(duration.as_secs())
}

/// Sends a lid-sleep change, prompting for confirmation when the daemon
/// requires it.
async fn set_lid_sleep(client: &mut DaemonClient, enabled: bool, json: bool) -> Result<()> {
    let reply = client
        .request(ClientMessage::set_lid_sleep(enabled, false))
        .await?;

    let reply = match reply {
        DaemonMessage::LidConfirmationRequired { warning } => {
            eprintln!("{}", warning);
            if !confirm("Proceed?")? {
                println!("Cancelled.");
                return Ok(());
            }
            client
                .request(ClientMessage::set_lid_sleep(enabled, true))
                .await?
        }
        other => other,
    };

    match reply {
        DaemonMessage::Status { report } => output::print_status(&report, json)?,
        other => return Err(unexpected(other)),
    }

    Ok(())
}

/// Asks a yes/no question on the terminal. Defaults to no.
fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read from stdin")?;

    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
}

/// Subscribes to the event stream and prints events until Ctrl-C.
async fn watch(client: &mut DaemonClient, json: bool) -> Result<()> {
    let reply = client.request(ClientMessage::subscribe()).await?;
    match reply {
        DaemonMessage::Status { report } => {
            if !json {
                output::print_status(&report, false)?;
                println!("Watching for events (Ctrl-C to stop)...");
            }
        }
        other => return Err(unexpected(other)),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
            message = client.next_message() => {
                match message? {
                    DaemonMessage::Event { event } => {
                        if json {
                            println!("{}", serde_json::to_string(&event)?);
                        } else {
                            println!("{}", output::render_event(&event));
                        }
                    }
                    // Unsolicited replies are not expected on a watch
                    // connection; ignore anything that is not an event.
                    _ => {}
                }
            }
        }
    }
}

/// Maps an unexpected daemon reply to an error. Error replies are already
/// surfaced by `DaemonClient::request`, so anything landing here is a
/// protocol mismatch.
fn unexpected(message: DaemonMessage) -> anyhow::Error {
    anyhow!("Unexpected reply from daemon: {:?}", message)
}
