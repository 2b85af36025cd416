//! Command line interface
//!
//! - `serve`: HTTP API server
//! - `validate <file>`: check a workflow definition
//! - `run <file>`: execute a workflow definition once with the builtin tools

pub mod run;
pub mod serve;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::config::AppConfig;

/// Toolflow - resilient workflow execution engine
#[derive(Parser)]
#[command(name = "toolflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Extra configuration file layered over config/default and config/local
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve,

    /// Validate a workflow definition file (JSON, or TOML by extension)
    Validate { file: PathBuf },

    /// Execute a workflow definition file and print the result
    Run {
        file: PathBuf,

        /// Variable override, repeatable; values are parsed as JSON when possible
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },
}

/// Load configuration, honouring `.env` and an optional extra file
pub fn load_config(path: Option<&str>) -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = match path {
        Some(path) => AppConfig::load_with_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };

    Ok(config)
}

/// Read a definition file as an untyped value
pub fn load_definition(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_definition(&text, is_toml(path))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn parse_definition(text: &str, toml: bool) -> anyhow::Result<Value> {
    if toml {
        let value: toml::Value = toml::from_str(text)?;
        Ok(serde_json::to_value(value)?)
    } else {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_definition() {
        let value = parse_definition(r#"{"id": "wf", "steps": []}"#, false).unwrap();
        assert_eq!(value["id"], "wf");
    }

    #[test]
    fn test_parse_toml_definition() {
        let value = parse_definition(
            r#"
            id = "wf"
            name = "From TOML"
            startStep = "a"

            [[steps]]
            id = "a"
            tool = "echo"
            parameters = { greeting = "hi" }
            "#,
            true,
        )
        .unwrap();

        assert_eq!(value["startStep"], "a");
        assert_eq!(value["steps"][0]["parameters"]["greeting"], "hi");
    }

    #[test]
    fn test_extension_selects_format() {
        assert!(is_toml(Path::new("flows/deploy.TOML")));
        assert!(!is_toml(Path::new("flows/deploy.json")));
        assert!(!is_toml(Path::new("flows/deploy")));
    }

    #[test]
    fn test_cli_parses_run_vars() {
        let cli = Cli::parse_from([
            "toolflow", "run", "wf.json", "--var", "name=Ada", "--var", "count=3",
        ]);

        match cli.command {
            Command::Run { file, vars } => {
                assert_eq!(file, PathBuf::from("wf.json"));
                assert_eq!(vars, vec!["name=Ada", "count=3"]);
            }
            _ => panic!("expected run command"),
        }
    }
}
