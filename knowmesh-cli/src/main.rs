//! knowmesh: terminal frontend for a running `knowmeshd`.
//!
//! Speaks the daemon's IPC protocol (length-prefixed MessagePack over a Unix
//! socket). One invocation is one connection, so one conversation.
//!
//! # Subcommands
//! - `chat`                                   - interactive conversation
//! - `list [--filter <text>] [--json]`        - show the knowledge table
//! - `teach <pattern> <response> [--kind k]`  - add a fact directly
//! - `edit <id> <pattern> <response>`         - rewrite a fact
//! - `reset --yes`                            - restore the seed table
//! - `eval <expression>`                      - run the calculator only
//! - `status`                                 - mesh link and table size

use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures::{SinkExt, StreamExt};
use knowmesh_core::ipc::{KnowMeshRequest, KnowMeshResponse};
use knowmesh_core::{KnowledgeKind, KnowledgeRecord};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

const DEFAULT_SOCKET: &str = "/tmp/knowmesh.sock";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "knowmesh", version, about = "Chat with and curate a KnowMesh node")]
struct Cli {
    /// IPC socket of the daemon (overrides KNOWMESH_SOCKET env var)
    #[arg(long, env = "KNOWMESH_SOCKET", default_value = DEFAULT_SOCKET)]
    socket: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start an interactive conversation
    Chat,

    /// List known facts, newest first
    List {
        /// Only facts whose pattern or response contains this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Print raw JSON records
        #[arg(long)]
        json: bool,
    },

    /// Teach a fact without going through the conversation
    Teach {
        pattern: String,
        response: String,

        /// general, math or chat
        #[arg(short, long, default_value = "general", value_parser = parse_kind)]
        kind: KnowledgeKind,
    },

    /// Replace the pattern and response of an existing fact
    Edit {
        id: i64,
        pattern: String,
        response: String,
    },

    /// Discard everything learned and restore the seed table
    Reset {
        /// Required; reset cannot be undone
        #[arg(long)]
        yes: bool,
    },

    /// Evaluate a two-operand arithmetic expression
    Eval { expression: String },

    /// Show mesh link state and table size
    Status,
}

fn parse_kind(s: &str) -> Result<KnowledgeKind, String> {
    KnowledgeKind::from_str_loose(s).ok_or_else(|| format!("unknown kind '{}'", s))
}

// ============================================================================
// IPC Client
// ============================================================================

struct Client {
    framed: Framed<UnixStream, LengthDelimitedCodec>,
}

impl Client {
    async fn connect(path: &str) -> anyhow::Result<Self> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| anyhow::anyhow!("cannot reach knowmeshd at {}: {}", path, e))?;
        let codec = LengthDelimitedCodec::builder().little_endian().new_codec();
        Ok(Self {
            framed: Framed::new(stream, codec),
        })
    }

    /// Send one request; a daemon-side error becomes `Err`.
    async fn call(&mut self, request: &KnowMeshRequest) -> anyhow::Result<serde_json::Value> {
        let bytes = rmp_serde::to_vec_named(request)?;
        self.framed.send(Bytes::from(bytes)).await?;

        let frame = self
            .framed
            .next()
            .await
            .ok_or_else(|| anyhow::anyhow!("connection closed by knowmeshd"))??;
        let response: KnowMeshResponse = rmp_serde::from_slice(&frame)?;

        if !response.is_ok() {
            anyhow::bail!(response.error.unwrap_or_else(|| "unknown error".to_string()));
        }
        Ok(response.data.unwrap_or(serde_json::Value::Null))
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// One table row: `#id [kind] pattern → response`.
fn format_record_line(record: &KnowledgeRecord) -> String {
    format!(
        "#{:<14} [{:<7}] {} → {}",
        record.id,
        record.kind.as_str(),
        record.pattern,
        record.response
    )
}

/// Prompt for the next chat line; shows the pending question while learning.
fn chat_prompt(data: &serde_json::Value) -> String {
    match data["session"]["pending_pattern"].as_str() {
        Some(pending) => format!("öğret ({})> ", pending),
        None => "> ".to_string(),
    }
}

fn records_from(data: &serde_json::Value) -> anyhow::Result<Vec<KnowledgeRecord>> {
    Ok(serde_json::from_value(data["records"].clone())?)
}

// ============================================================================
// Commands
// ============================================================================

async fn do_chat(client: &mut Client) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut prompt = "> ".to_string();

    println!("KnowMesh sohbet. Çıkmak için /quit yazın.");
    loop {
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim() == "/quit" {
            break;
        }

        let data = client.call(&KnowMeshRequest::Chat { text: line }).await?;
        if let Some(text) = data["text"].as_str() {
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        prompt = chat_prompt(&data);
    }
    Ok(())
}

async fn do_list(client: &mut Client, filter: Option<String>, json: bool) -> anyhow::Result<()> {
    let data = client.call(&KnowMeshRequest::List { filter }).await?;
    let records = records_from(&data)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        eprintln!("No matching facts.");
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record_line(record));
    }
    println!("\n{} fact(s)", records.len());
    Ok(())
}

async fn do_teach(
    client: &mut Client,
    pattern: String,
    response: String,
    kind: KnowledgeKind,
) -> anyhow::Result<()> {
    let data = client
        .call(&KnowMeshRequest::Insert {
            pattern,
            response,
            kind,
        })
        .await?;
    let record: KnowledgeRecord = serde_json::from_value(data["record"].clone())?;
    println!("Learned {}", format_record_line(&record));
    Ok(())
}

async fn do_edit(
    client: &mut Client,
    id: i64,
    pattern: String,
    response: String,
) -> anyhow::Result<()> {
    let data = client
        .call(&KnowMeshRequest::Update {
            id,
            pattern,
            response,
        })
        .await?;
    if data["updated"].as_bool().unwrap_or(false) {
        println!("Updated #{}", id);
    } else {
        eprintln!("No fact with id {}", id);
        std::process::exit(1);
    }
    Ok(())
}

async fn do_reset(client: &mut Client, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("reset discards every learned fact; pass --yes to confirm");
    }
    let data = client.call(&KnowMeshRequest::Reset { confirm: true }).await?;
    println!("Table reset to {} seed fact(s)", data["count"]);
    Ok(())
}

async fn do_eval(client: &mut Client, expression: String) -> anyhow::Result<()> {
    let data = client.call(&KnowMeshRequest::Evaluate { expression }).await?;
    match data["result"].as_str() {
        Some(result) => println!("{}", result),
        None => {
            eprintln!("Not an arithmetic expression (expected: <int> <+|-|*|/> <int>)");
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn do_status(client: &mut Client, socket: &str) -> anyhow::Result<()> {
    let data = client.call(&KnowMeshRequest::Status).await?;
    let mesh = &data["mesh"];

    println!("Socket:     {}", socket);
    println!("Facts:      {}", data["records"]);
    if mesh.is_null() {
        println!("Mesh:       disabled");
    } else {
        let link = if mesh["connected"].as_bool().unwrap_or(false) {
            "connected"
        } else {
            "connecting"
        };
        println!("Mesh:       {}", link);
        println!("Transport:  {}", mesh["transport"].as_str().unwrap_or("?"));
        println!("Channel:    {}", mesh["channel"].as_str().unwrap_or("?"));
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut client = Client::connect(&cli.socket).await?;
    match cli.command {
        Commands::Chat => do_chat(&mut client).await,
        Commands::List { filter, json } => do_list(&mut client, filter, json).await,
        Commands::Teach {
            pattern,
            response,
            kind,
        } => do_teach(&mut client, pattern, response, kind).await,
        Commands::Edit {
            id,
            pattern,
            response,
        } => do_edit(&mut client, id, pattern, response).await,
        Commands::Reset { yes } => do_reset(&mut client, yes).await,
        Commands::Eval { expression } => do_eval(&mut client, expression).await,
        Commands::Status => do_status(&mut client, &cli.socket).await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("knowmesh: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_record(id: i64, pattern: &str, response: &str) -> KnowledgeRecord {
        let json = serde_json::json!({
            "id": id,
            "pattern": pattern,
            "response": response,
            "type": "math",
            "created_at": "2024-01-01T00:00:00Z",
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_record_line_shows_id_kind_and_both_sides() {
        let line = format_record_line(&mock_record(10, "pi sayısı", "yaklaşık 3.14159"));
        assert!(line.starts_with("#10"));
        assert!(line.contains("[math"));
        assert!(line.ends_with("pi sayısı → yaklaşık 3.14159"));
    }

    #[test]
    fn test_chat_prompt_reflects_learning_state() {
        let idle = serde_json::json!({"session": {"state": "idle"}});
        assert_eq!(chat_prompt(&idle), "> ");

        let learning = serde_json::json!({
            "session": {"state": "learning", "pending_pattern": "ay nedir"}
        });
        assert_eq!(chat_prompt(&learning), "öğret (ay nedir)> ");
    }

    #[test]
    fn test_records_from_list_payload() {
        let payload = serde_json::json!({
            "count": 1,
            "records": [serde_json::to_value(mock_record(1, "a", "b")).unwrap()],
        });
        let records = records_from(&payload).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pattern, "a");
    }

    #[test]
    fn test_parse_kind_accepts_any_case() {
        assert_eq!(parse_kind("Chat").unwrap(), KnowledgeKind::Chat);
        assert!(parse_kind("poetry").is_err());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["knowmesh"]).is_err());
        let cli = Cli::try_parse_from(["knowmesh", "--socket", "/tmp/x.sock", "list", "-f", "su"])
            .unwrap();
        assert_eq!(cli.socket, "/tmp/x.sock");
        assert!(matches!(cli.command, Commands::List { filter: Some(ref f), json: false } if f == "su"));
    }
}
