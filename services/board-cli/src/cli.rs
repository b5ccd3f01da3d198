//! Command-line interface definition

use clap::{Parser, Subcommand};
use reqwest::Method;
use std::path::PathBuf;

/// Command-line client for the board backend
#[derive(Parser, Debug)]
#[command(name = "board-cli")]
#[command(version, long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults to board-cli.toml when present)
    #[arg(long, global = true, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Sign in and keep the session
    Login { username: String, password: String },

    /// Register a local account
    Signup {
        username: String,
        password: String,
        email: String,
        nickname: String,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in user's profile
    Me,

    /// Report whether a session is stored
    Status,

    /// Send an authenticated request and print the response body
    Request {
        /// HTTP method, case-insensitive
        #[arg(value_parser = parse_method)]
        method: Method,

        /// Path relative to the API base, e.g. /api/v1/boards
        path: String,

        /// JSON request body
        #[arg(value_parser = parse_json)]
        body: Option<serde_json::Value>,
    },
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method {raw:?}"))
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("request body must be valid JSON: {e}"))
}
