//! `validate` and `run` commands

use std::path::Path;

use anyhow::{anyhow, bail};
use serde_json::{Map, Value};
use tracing::info;

use super::load_definition;
use crate::config::AppConfig;
use crate::domain::workflow::validate_value;

/// Validate a definition file; fails when the definition is invalid
pub fn validate(file: &Path) -> anyhow::Result<()> {
    let value = load_definition(file)?;
    let (_, report) = validate_value(&value);

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.valid {
        bail!("{} is not a valid workflow", file.display());
    }
    Ok(())
}

/// Execute a definition file once and print the execution result
pub async fn run(config: &AppConfig, file: &Path, vars: &[String]) -> anyhow::Result<()> {
    let value = load_definition(file)?;
    let (definition, report) = validate_value(&value);

    let Some(definition) = definition.filter(|_| report.valid) else {
        bail!("Invalid workflow: {}", report.errors.join("; "));
    };

    let variables = parse_vars(vars)?;
    let engine = crate::create_engine_with_config(config)?;

    info!(workflow_id = %definition.id(), "Running workflow from {}", file.display());
    let result = engine.execute(&definition, variables).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        bail!(
            "Workflow {} {}: {}",
            definition.id(),
            result.status(),
            result.error.unwrap_or_default()
        );
    }
    Ok(())
}

/// Parse `KEY=VALUE` pairs; values are JSON when they parse, strings otherwise
fn parse_vars(vars: &[String]) -> anyhow::Result<Map<String, Value>> {
    vars.iter()
        .map(|pair| {
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("Invalid --var '{}', expected KEY=VALUE", pair))?;

            if key.is_empty() {
                bail!("Invalid --var '{}', empty key", pair);
            }

            let value =
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}
