// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sends chat queries to the analysis backend, authenticating as a service
//! account.

const DESCRIPTION: &str = concat!(
    "Sends a chat query to the analysis backend and prints the JSON reply.",
    " The service account key and the endpoints are read from the",
    " CHAT_AUTH_* environment variables. Set RUST_LOG=chat_auth=debug to",
    " trace each stage of the call."
);

use chat_auth::chat;
use chat_auth::client::Client;
use chat_auth::config::Config;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    enable_tracing();

    let args = Args::parse();
    match args.command {
        Command::Ask { query, memory } => ask(query, memory).await,
    }
}

async fn ask(query: String, memory: Option<Value>) -> anyhow::Result<()> {
    let config = Config::from_env().await?;
    tracing::debug!(?config, "loaded configuration");
    let client = Client::from_config(config)?;

    let mut body = json!({ "query": query });
    if let Some(memory) = memory {
        body["conversationMemory"] = memory;
    }
    let (status, reply) = chat::handle(&client, body.to_string().as_bytes()).await;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    if !status.is_success() {
        anyhow::bail!("chat call failed with status {status}");
    }
    Ok(())
}

fn enable_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn parse_json_arg(value: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(value)
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = DESCRIPTION)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Sends one query and prints the reply.
    Ask {
        /// The question for the analysis backend.
        #[arg(long)]
        query: String,

        /// The conversation state, as JSON. Forwarded unchanged.
        #[arg(long, value_parser = parse_json_arg)]
        memory: Option<Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_args() {
        Args::command().debug_assert();
    }

    #[test]
    fn parse_ask() {
        let args = Args::try_parse_from([
            "chat-auth-cli",
            "ask",
            "--query",
            "ping",
            "--memory",
            r#"{"turns":[]}"#,
        ])
        .unwrap();
        let Command::Ask { query, memory } = args.command;
        assert_eq!(query, "ping");
        assert_eq!(memory, Some(json!({"turns": []})));
    }

    #[test]
    fn parse_ask_bad_memory() {
        let err = Args::try_parse_from(["chat-auth-cli", "ask", "--query", "q", "--memory", "{"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parse_ask_requires_query() {
        let err = Args::try_parse_from(["chat-auth-cli", "ask"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
