#![forbid(unsafe_code)]

//! `bot-supervisor-ctl`: local CLI companion for `bot-supervisor`.
//!
//! Connects to the IPC socket and sends one JSON command to the server.
//! The bot itself can use `connected` / `disconnected` as its signal
//! channel instead of the HTTP callbacks.

use std::io::{BufRead, BufReader, Write};

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

/// Environment variable holding the optional IPC shared secret.
const IPC_TOKEN_ENV: &str = "BOT_SUPERVISOR_IPC_TOKEN";

#[derive(Debug, Parser)]
#[command(
    name = "bot-supervisor-ctl",
    about = "Local CLI for bot-supervisor",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the server's `ipc_name` config).
    #[arg(long, env = "BOT_SUPERVISOR_IPC_NAME", default_value = "bot-supervisor")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the current bot status.
    Status,
    /// Start the bot.
    Start,
    /// Stop the bot.
    Stop,
    /// Stop the bot, wipe its session, and restart it for a fresh pairing.
    Reset,
    /// Report that the bot is connected.
    Connected,
    /// Report that the bot disconnected.
    Disconnected {
        /// Raw disconnect reason.
        #[arg(long)]
        reason: Option<String>,
    },
}

fn main() {
    let args = Cli::parse();

    let mut request_json = match &args.command {
        Command::Status => serde_json::json!({ "command": "status" }),
        Command::Start => serde_json::json!({ "command": "start" }),
        Command::Stop => serde_json::json!({ "command": "stop" }),
        Command::Reset => serde_json::json!({ "command": "reset" }),
        Command::Connected => serde_json::json!({ "command": "connected" }),
        Command::Disconnected { reason } => {
            let mut req = serde_json::json!({ "command": "disconnected" });
            if let Some(r) = reason {
                req["reason"] = serde_json::Value::String(r.clone());
            }
            req
        }
    };
    if let Ok(token) = std::env::var(IPC_TOKEN_ENV) {
        if !token.is_empty() {
            request_json["auth_token"] = serde_json::Value::String(token);
        }
    }

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to server: {err}");
            eprintln!("Is bot-supervisor running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
