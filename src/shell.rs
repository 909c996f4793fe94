//! Line-oriented shell over the cached reference client.

use color_eyre::{eyre::eyre, Result};
use serde_json::json;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::commands::{self, ShellCommand, COMMANDS};
use crate::reference::client::ReferenceClient;
use crate::reference::types::TABLES;

const PROMPT: &str = "joysense> ";

/// What the shell should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  Print(String),
  Quit,
}

/// Execute a single parsed command against the client.
pub async fn execute(client: &ReferenceClient, command: ShellCommand) -> Result<Outcome> {
  let output = match command {
    ShellCommand::Query(key) => {
      let result = client.rows(&key).await?;
      json!({
        "query": key.description(),
        "source": result.source,
        "count": result.rows.len(),
        "rows": result.rows,
      })
      .to_string()
    }
    ShellCommand::Insert { table, row } => {
      let id = client.insert(&table, &row).await?;
      json!({ "table": table, "inserted": id }).to_string()
    }
    ShellCommand::Invalidate(table) => {
      let removed = client.invalidate(&table);
      json!({ "table": table, "invalidated": removed }).to_string()
    }
    ShellCommand::Clear => {
      client.logout();
      "cache cleared".to_string()
    }
    ShellCommand::Stats => serde_json::to_string(&client.stats())?,
    ShellCommand::Tables => TABLES.join("\n"),
    ShellCommand::Help => help_text(),
    ShellCommand::Quit => return Ok(Outcome::Quit),
  };

  Ok(Outcome::Print(output))
}

fn help_text() -> String {
  let width = COMMANDS.iter().map(|c| c.usage.len()).max().unwrap_or(0);
  COMMANDS
    .iter()
    .map(|c| {
      format!(
        "{:width$}  {} (aliases: {})",
        c.usage,
        c.description,
        c.aliases.join(", "),
        width = width
      )
    })
    .collect::<Vec<_>>()
    .join("\n")
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run(client: ReferenceClient) -> Result<()> {
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  info!("shell started");

  loop {
    print!("{}", PROMPT);
    std::io::stdout()
      .flush()
      .map_err(|e| eyre!("Failed to flush stdout: {}", e))?;

    let line = match lines
      .next_line()
      .await
      .map_err(|e| eyre!("Failed to read input: {}", e))?
    {
      Some(line) => line,
      None => break,
    };

    let outcome = match commands::parse_line(&line) {
      Ok(Some(command)) => execute(&client, command).await,
      Ok(None) => continue,
      Err(e) => Err(e),
    };

    match outcome {
      Ok(Outcome::Print(text)) => println!("{}", text),
      Ok(Outcome::Quit) => break,
      Err(e) => {
        warn!(input = %line, error = %e, "command failed");
        eprintln!("error: {}", e);
      }
    }
  }

  info!("shell exited");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheConfig;
  use crate::reference::source::SqliteSource;
  use serde_json::Value;

  fn client() -> ReferenceClient {
    let source = SqliteSource::open_in_memory().unwrap();
    source.seed().unwrap();
    ReferenceClient::new(source, CacheConfig::default())
  }

  async fn run_line(client: &ReferenceClient, line: &str) -> Outcome {
    let command = commands::parse_line(line).unwrap().unwrap();
    execute(client, command).await.unwrap()
  }

  fn printed_json(outcome: Outcome) -> Value {
    match outcome {
      Outcome::Print(text) => serde_json::from_str(&text).unwrap(),
      Outcome::Quit => panic!("expected output"),
    }
  }

  #[tokio::test]
  async fn test_query_then_cached_query() {
    let client = client();

    let first = printed_json(run_line(&client, "query pais").await);
    assert_eq!(first["source"], "network");
    assert_eq!(first["count"], 2);

    let second = printed_json(run_line(&client, "select pais").await);
    assert_eq!(second["source"], "cache");
    assert_eq!(second["rows"], first["rows"]);
  }

  #[tokio::test]
  async fn test_insert_then_query_refetches() {
    let client = client();
    run_line(&client, "query metrica").await;

    let inserted = printed_json(run_line(&client, "insert metrica metrica=pH unidad=pH").await);
    assert_eq!(inserted["inserted"], 4);

    let after = printed_json(run_line(&client, "query metrica").await);
    assert_eq!(after["source"], "network");
    assert_eq!(after["count"], 4);
  }

  #[tokio::test]
  async fn test_stats_and_clear() {
    let client = client();
    run_line(&client, "query pais").await;
    run_line(&client, "query empresa paisid=1").await;

    let stats = printed_json(run_line(&client, "stats").await);
    assert_eq!(stats["size"], 2);
    assert_eq!(stats["entries"].as_array().unwrap().len(), 2);

    run_line(&client, "logout").await;
    let stats = printed_json(run_line(&client, "stats").await);
    assert_eq!(stats["size"], 0);
  }

  #[tokio::test]
  async fn test_invalidate_reports_removed_count() {
    let client = client();
    run_line(&client, "query fundo").await;
    run_line(&client, "query fundo limit=1").await;

    let result = printed_json(run_line(&client, "inv fundo").await);
    assert_eq!(result["invalidated"], 2);
  }

  #[tokio::test]
  async fn test_quit() {
    let client = client();
    assert_eq!(run_line(&client, "exit").await, Outcome::Quit);
  }

  #[test]
  fn test_help_lists_every_command() {
    let help = help_text();
    for command in COMMANDS {
      assert!(help.contains(command.usage));
    }
  }
}
