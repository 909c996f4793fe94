//! Shell commands, autocomplete logic and argument parsing
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;

use crate::cache::{Filters, QueryKey};
use crate::reference::types::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
  Query,
  Insert,
  Invalidate,
  Clear,
  Stats,
  Tables,
  Help,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub kind: CommandKind,
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    kind: CommandKind::Query,
    name: "query",
    aliases: &["select", "get"],
    usage: "query <table> [limit=N] [column=value ...]",
    description: "Read rows through the cache",
  },
  Command {
    kind: CommandKind::Insert,
    name: "insert",
    aliases: &["add"],
    usage: "insert <table> column=value ...",
    description: "Insert a row and invalidate the table",
  },
  Command {
    kind: CommandKind::Invalidate,
    name: "invalidate",
    aliases: &["inv"],
    usage: "invalidate <table>",
    description: "Drop cached reads of a table",
  },
  Command {
    kind: CommandKind::Clear,
    name: "clear",
    aliases: &["logout"],
    usage: "clear",
    description: "Drop every cached read",
  },
  Command {
    kind: CommandKind::Stats,
    name: "stats",
    aliases: &["st"],
    usage: "stats",
    description: "Show cache occupancy",
  },
  Command {
    kind: CommandKind::Tables,
    name: "tables",
    aliases: &["ls"],
    usage: "tables",
    description: "List reference tables",
  },
  Command {
    kind: CommandKind::Help,
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "Show this help",
  },
  Command {
    kind: CommandKind::Quit,
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit joysense",
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_rank(cmd, &input_lower).map(|rank| (cmd, rank)))
    .collect();

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Lower is better: exact name, alias, name prefix, alias prefix, then substring.
fn match_rank(cmd: &Command, input: &str) -> Option<u32> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Resolve a typed command word: exact name, exact alias, or a name prefix
/// shared by no other command. Fuzzy matches are only offered as suggestions.
pub fn resolve(input: &str) -> Result<&'static Command> {
  let input_lower = input.to_lowercase();

  let exact = COMMANDS
    .iter()
    .find(|cmd| cmd.name == input_lower || cmd.aliases.contains(&input_lower.as_str()));
  if let Some(cmd) = exact {
    return Ok(cmd);
  }

  let mut prefixed = COMMANDS
    .iter()
    .filter(|cmd| cmd.name.starts_with(&input_lower));
  if let (Some(cmd), None) = (prefixed.next(), prefixed.next()) {
    return Ok(cmd);
  }

  let suggestions = get_suggestions(&input_lower)
    .into_iter()
    .map(|cmd| cmd.name)
    .collect::<Vec<_>>();
  if suggestions.is_empty() {
    Err(eyre!("Unknown command '{}'. Try 'help'.", input))
  } else {
    Err(eyre!(
      "Unknown command '{}'. Did you mean: {}?",
      input,
      suggestions.join(", ")
    ))
  }
}

/// A parsed shell line
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
  Query(QueryKey),
  Insert { table: String, row: Row },
  Invalidate(String),
  Clear,
  Stats,
  Tables,
  Help,
  Quit,
}

/// Parse one shell line. Returns `None` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<ShellCommand>> {
  let mut words = line.split_whitespace();
  let head = match words.next() {
    Some(word) => word,
    None => return Ok(None),
  };
  let args: Vec<&str> = words.collect();

  let command = resolve(head)?;

  let parsed = match command.kind {
    CommandKind::Query => {
      let (table, rest) = split_table(&args, command)?;
      ShellCommand::Query(parse_query(table, rest)?)
    }
    CommandKind::Insert => {
      let (table, rest) = split_table(&args, command)?;
      if rest.is_empty() {
        return Err(eyre!("usage: {}", command.usage));
      }
      let mut row = Row::new();
      for arg in rest {
        let (column, value) = parse_assignment(arg)?;
        row.insert(column.to_string(), value);
      }
      ShellCommand::Insert {
        table: table.to_string(),
        row,
      }
    }
    CommandKind::Invalidate => {
      let (table, _) = split_table(&args, command)?;
      ShellCommand::Invalidate(table.to_string())
    }
    CommandKind::Clear => ShellCommand::Clear,
    CommandKind::Stats => ShellCommand::Stats,
    CommandKind::Tables => ShellCommand::Tables,
    CommandKind::Help => ShellCommand::Help,
    CommandKind::Quit => ShellCommand::Quit,
  };

  Ok(Some(parsed))
}

fn split_table<'a>(args: &'a [&'a str], command: &Command) -> Result<(&'a str, &'a [&'a str])> {
  args
    .split_first()
    .map(|(table, rest)| (*table, rest))
    .ok_or_else(|| eyre!("usage: {}", command.usage))
}

/// Build a query key from a table and `limit=N` / `column=value` arguments
pub fn parse_query<S: AsRef<str>>(table: &str, args: &[S]) -> Result<QueryKey> {
  let mut key = QueryKey::table(table);
  let mut filters = Filters::new();

  for arg in args {
    let (column, value) = parse_assignment(arg.as_ref())?;
    if column == "limit" {
      let limit = value
        .as_u64()
        .ok_or_else(|| eyre!("limit must be a non-negative integer, got {}", value))?;
      key = key.with_limit(limit);
    } else {
      filters.insert(column.to_string(), value);
    }
  }

  Ok(key.with_filters(filters))
}

/// Split `column=value`, parsing the value as JSON when possible
pub fn parse_assignment(arg: &str) -> Result<(&str, Value)> {
  let (column, raw) = arg
    .split_once('=')
    .ok_or_else(|| eyre!("Expected column=value, got '{}'", arg))?;
  if column.is_empty() {
    return Err(eyre!("Missing column name in '{}'", arg));
  }
  Ok((column, parse_value(raw)))
}

/// `1`, `2.5`, `true` and `null` keep their JSON types; anything else is a string
pub fn parse_value(raw: &str) -> Value {
  match serde_json::from_str::<Value>(raw) {
    Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null | Value::String(_))) => value,
    _ => Value::String(raw.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("query");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "query");
  }

  #[test]
  fn test_alias_match() {
    let suggestions = get_suggestions("q");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "quit");
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("inv");
    assert_eq!(suggestions[0].name, "invalidate");

    let suggestions = get_suggestions("que");
    assert_eq!(suggestions[0].name, "query");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("ser");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "insert");
  }

  #[test]
  fn test_resolve_exact_and_unique_prefix() {
    assert_eq!(resolve("query").unwrap().kind, CommandKind::Query);
    assert_eq!(resolve("LOGOUT").unwrap().kind, CommandKind::Clear);
    assert_eq!(resolve("q").unwrap().kind, CommandKind::Quit);
    assert_eq!(resolve("que").unwrap().kind, CommandKind::Query);
    assert_eq!(resolve("st").unwrap().kind, CommandKind::Stats);
  }

  #[test]
  fn test_fuzzy_input_does_not_run_commands() {
    for input in ["le", "l", "ar", "e", "it", "ex"] {
      assert!(parse_line(input).is_err(), "{} should not resolve", input);
    }

    let err = resolve("le").unwrap_err().to_string();
    assert!(err.contains("clear"), "{}", err);
  }

  #[test]
  fn test_parse_query_line() {
    let parsed = parse_line("query empresa limit=5 paisid=1 empresabrev=AA")
      .unwrap()
      .unwrap();

    let expected = QueryKey::table("empresa")
      .with_limit(5)
      .with_filter("paisid", 1)
      .with_filter("empresabrev", "AA");
    assert_eq!(parsed, ShellCommand::Query(expected));
  }

  #[test]
  fn test_parse_insert_line() {
    let parsed = parse_line("add pais pais=Bolivia statusid=1").unwrap().unwrap();
    match parsed {
      ShellCommand::Insert { table, row } => {
        assert_eq!(table, "pais");
        assert_eq!(row["pais"], json!("Bolivia"));
        assert_eq!(row["statusid"], json!(1));
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_parse_errors() {
    assert!(parse_line("query").is_err());
    assert!(parse_line("insert pais").is_err());
    assert!(parse_line("query pais limit=-1").is_err());
    assert!(parse_line("query pais statusid").is_err());
    assert!(parse_line("frobnicate").is_err());
  }

  #[test]
  fn test_blank_line() {
    assert_eq!(parse_line("   ").unwrap(), None);
  }

  #[test]
  fn test_parse_value_types() {
    assert_eq!(parse_value("1"), json!(1));
    assert_eq!(parse_value("2.5"), json!(2.5));
    assert_eq!(parse_value("true"), json!(true));
    assert_eq!(parse_value("null"), json!(null));
    assert_eq!(parse_value("Peru"), json!("Peru"));
    assert_eq!(parse_value("[1,2]"), json!("[1,2]"));
  }
}
