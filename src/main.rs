use std::collections::HashMap;
use std::env;

use anyhow::{anyhow, Context, Result};
use log::{debug, LevelFilter};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use storage_predicate::{
    has_single_measurement_no_or, node_to_expr, parse_expr, reduce,
    rewrite_remove_field_key_and_value, ConfigError, Expr, Node, PredicateConfig, TagRemap,
};

const DEFAULT_CONFIG: &str = "predicate.json";

const HELP: &str = "\
Enter a Filter Tree as JSON (a line starting with '{') or an expression, e.g.
  _name = 'cpu' AND host::tag = 'a' AND \"$\" > 0.5

Commands:
  :bind <key>=<value>   bind a tag value used when reducing
  :unbind <key>         remove a binding
  :bindings             list bindings
  :clear                remove all bindings
  :help                 show this help
  :quit                 exit";

/// Falls back to the default config only when no path was given and the
/// default file does not exist.
fn load_config(path: Option<String>) -> Result<PredicateConfig> {
    let explicit = path.is_some();
    let path = path.unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    match PredicateConfig::from_json_file(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound { .. }) if !explicit => Ok(PredicateConfig::default()),
        Err(e) => Err(e).with_context(|| format!("failed to load {path}")),
    }
}

fn init_logging(config: &PredicateConfig) -> Result<()> {
    let level = match config.log_level.as_deref() {
        Some(level) => level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow!("invalid log_level {level:?}"))?,
        None => LevelFilter::Warn,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
    Ok(())
}

struct Session {
    remap: TagRemap,
    bindings: HashMap<String, String>,
}

impl Session {
    fn new(config: &PredicateConfig) -> Self {
        Self {
            remap: config.tag_remap(),
            bindings: HashMap::new(),
        }
    }

    fn expression(&self, line: &str) -> Result<Expr> {
        if line.starts_with('{') {
            let node: Node = serde_json::from_str(line).context("invalid filter tree")?;
            return Ok(node_to_expr(&node, Some(&self.remap))?);
        }
        parse_expr(line).map_err(|e| match e.span {
            Some(span) => anyhow!("{e} (at {}-{})", span.start, span.end),
            None => anyhow!(e),
        })
    }

    fn evaluate(&self, line: &str) -> Result<()> {
        let expr = self.expression(line)?;
        println!("expr:        {expr}");
        match has_single_measurement_no_or(&expr) {
            Some(measurement) => println!("measurement: {measurement}"),
            None => println!("measurement: <none>"),
        }
        let neutralized = rewrite_remove_field_key_and_value(&expr);
        println!("tag filter:  {neutralized}");
        println!("reduced:     {}", reduce(&neutralized, Some(&self.bindings)));
        Ok(())
    }

    /// Returns `false` when the session should end.
    fn command(&mut self, command: &str) -> Result<bool> {
        let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
        let arg = arg.trim();
        match name {
            ":quit" | ":q" => return Ok(false),
            ":help" => println!("{HELP}"),
            ":bind" => {
                let (key, value) = arg
                    .split_once('=')
                    .ok_or_else(|| anyhow!("usage: :bind <key>=<value>"))?;
                self.bindings
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
            ":unbind" => {
                if self.bindings.remove(arg).is_none() {
                    println!("{arg} is not bound");
                }
            }
            ":bindings" => {
                let mut bindings: Vec<_> = self.bindings.iter().collect();
                bindings.sort();
                for (key, value) in bindings {
                    println!("  {key} = {value}");
                }
            }
            ":clear" => self.bindings.clear(),
            other => return Err(anyhow!("unknown command {other}, try :help")),
        }
        Ok(true)
    }
}

/// History is best effort: a failure is logged and the session goes on.
fn record_history(result: rustyline::Result<bool>) -> bool {
    match result {
        Ok(added) => added,
        Err(e) => {
            debug!(target: "predicate", "event=history_failed error={e}");
            false
        }
    }
}

fn main() -> Result<()> {
    let config = load_config(env::args().nth(1))?;
    init_logging(&config)?;

    println!("--- storage predicate REPL (:help for commands) ---");
    let mut session = Session::new(&config);
    let mut editor = DefaultEditor::new().context("failed to start line editor")?;

    loop {
        let line = match editor.readline(">> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        record_history(editor.add_history_entry(line));

        let outcome = if line.starts_with(':') {
            session.command(line)
        } else {
            session.evaluate(line).map(|()| true)
        };
        match outcome {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("error: {e:#}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_history_failure_is_not_fatal() {
        assert!(record_history(Ok(true)));
        assert!(!record_history(Ok(false)));
        assert!(!record_history(Err(ReadlineError::Io(io::Error::other("history full")))));
    }

    #[test]
    fn test_bindings_commands() {
        let mut session = Session::new(&PredicateConfig::default());
        assert!(session.command(":bind host = a").unwrap());
        assert_eq!(session.bindings.get("host").map(String::as_str), Some("a"));
        assert!(session.command(":bind host").is_err());
        assert!(session.command(":unbind host").unwrap());
        assert!(session.bindings.is_empty());
        assert!(session.command(":nope").is_err());
        assert!(!session.command(":quit").unwrap());
    }

    #[test]
    fn test_expression_from_json_or_text() {
        let session = Session::new(&PredicateConfig::default());
        let json = r#"{ "node_type": 1, "value": { "comparison": 0 }, "children": [
            { "node_type": 3, "value": { "tag_ref_value": "_measurement" } },
            { "node_type": 4, "value": { "string_value": "cpu" } }
        ] }"#;
        assert_eq!(session.expression(json).unwrap().to_string(), "_name::tag = 'cpu'");
        assert_eq!(session.expression("host = 'a'").unwrap().to_string(), "host = 'a'");
        assert!(session.expression("host = ").is_err());
        assert!(session.expression("{ not json").is_err());
    }
}
