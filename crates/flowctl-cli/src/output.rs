//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use flowctl_auth::CachedToken;
use serde::Serialize;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};
use crate::workflow::diff::FieldChange;

const DIFF_VALUE_WIDTH: usize = 120;

/// Print any serializable value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

pub(crate) fn render_flow_list(flows: &[Value], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(flows)?,
        OutputFormat::Table => {
            println!("{:<36} {:<8} {:<20} DISPLAY NAME", "ID", "STATE", "MODIFIED");
            for flow in flows {
                println!(
                    "{:<36} {:<8} {:<20} {}",
                    text_at(flow, "/name"),
                    text_at(flow, "/properties/state"),
                    timestamp_at(flow, "/properties/lastModifiedTime"),
                    text_at(flow, "/properties/displayName")
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn render_flow_detail(flow: &Value, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(flow)?,
        OutputFormat::Table => {
            println!("id: {}", text_at(flow, "/name"));
            println!("name: {}", text_at(flow, "/properties/displayName"));
            println!("state: {}", text_at(flow, "/properties/state"));
            if let Some(description) = str_at(flow, "/properties/description") {
                println!("description: {description}");
            }
            println!("created: {}", timestamp_at(flow, "/properties/createdTime"));
            println!(
                "modified: {}",
                timestamp_at(flow, "/properties/lastModifiedTime")
            );
            let triggers = keys_at(flow, "/properties/definition/triggers");
            if !triggers.is_empty() {
                println!("triggers: {}", triggers.join(", "));
            }
            let actions = keys_at(flow, "/properties/definition/actions");
            println!("actions: {}", actions.len());
        }
    }
    Ok(())
}

pub(crate) fn render_run_list(runs: &[Value], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(runs)?,
        OutputFormat::Table => {
            println!(
                "{:<30} {:<10} {:<20} {:<20} TRIGGER",
                "RUN", "STATUS", "START", "END"
            );
            for run in runs {
                println!(
                    "{:<30} {:<10} {:<20} {:<20} {}",
                    text_at(run, "/name"),
                    text_at(run, "/properties/status"),
                    timestamp_at(run, "/properties/startTime"),
                    timestamp_at(run, "/properties/endTime"),
                    text_at(run, "/properties/trigger/name")
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn render_run_detail(run: &Value, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(run)?,
        OutputFormat::Table => {
            println!("run: {}", text_at(run, "/name"));
            println!("status: {}", text_at(run, "/properties/status"));
            println!("start: {}", timestamp_at(run, "/properties/startTime"));
            println!("end: {}", timestamp_at(run, "/properties/endTime"));
            println!("trigger: {}", text_at(run, "/properties/trigger/name"));
            if let Some(code) = str_at(run, "/properties/code") {
                println!("code: {code}");
            }
            if let Some(message) = str_at(run, "/properties/error/message") {
                println!("error: {message}");
            }
        }
    }
    Ok(())
}

pub(crate) fn render_connector_list(connectors: &[Value], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(connectors)?,
        OutputFormat::Table => {
            println!(
                "{:<40} {:<8} {:<24} DISPLAY NAME",
                "ID", "TYPE", "PUBLISHER"
            );
            for connector in connectors {
                println!(
                    "{:<40} {:<8} {:<24} {}",
                    text_at(connector, "/name"),
                    connector_type(connector),
                    text_at(connector, "/properties/publisher"),
                    text_at(connector, "/properties/displayName")
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn render_connector_detail(connector: &Value, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(connector)?,
        OutputFormat::Table => {
            println!("id: {}", text_at(connector, "/name"));
            println!("name: {}", text_at(connector, "/properties/displayName"));
            println!("type: {}", connector_type(connector));
            println!("publisher: {}", text_at(connector, "/properties/publisher"));
            if let Some(tier) = str_at(connector, "/properties/tier") {
                println!("tier: {tier}");
            }
            if let Some(description) = str_at(connector, "/properties/description") {
                println!("description: {description}");
            }
            let parameters = keys_at(connector, "/properties/connectionParameters");
            if !parameters.is_empty() {
                println!("connection parameters: {}", parameters.join(", "));
            }
        }
    }
    Ok(())
}

pub(crate) fn render_connection_list(connections: &[Value], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(connections)?,
        OutputFormat::Table => {
            println!(
                "{:<36} {:<30} {:<12} DISPLAY NAME",
                "ID", "CONNECTOR", "STATUS"
            );
            for connection in connections {
                println!(
                    "{:<36} {:<30} {:<12} {}",
                    text_at(connection, "/name"),
                    connector_of(connection),
                    connection_status(connection),
                    text_at(connection, "/properties/displayName")
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn render_connection_detail(connection: &Value, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(connection)?,
        OutputFormat::Table => {
            println!("id: {}", text_at(connection, "/name"));
            println!("name: {}", text_at(connection, "/properties/displayName"));
            println!("connector: {}", connector_of(connection));
            println!("status: {}", connection_status(connection));
            println!(
                "created: {}",
                timestamp_at(connection, "/properties/createdTime")
            );
            if let Some(error) = str_at(connection, "/properties/statuses/0/error/message") {
                println!("error: {error}");
            }
        }
    }
    Ok(())
}

pub(crate) fn render_solution_list(solutions: &[Value], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(solutions)?,
        OutputFormat::Table => {
            println!(
                "{:<36} {:<30} {:<12} {:<20} DISPLAY NAME",
                "ID", "UNIQUE NAME", "VERSION", "PUBLISHER"
            );
            for solution in solutions {
                println!(
                    "{:<36} {:<30} {:<12} {:<20} {}",
                    text_at(solution, "/name"),
                    text_at(solution, "/properties/uniqueName"),
                    text_at(solution, "/properties/version"),
                    text_at(solution, "/properties/publisherName"),
                    text_at(solution, "/properties/displayName")
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn render_solution_detail(solution: &Value, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(solution)?,
        OutputFormat::Table => {
            println!("id: {}", text_at(solution, "/name"));
            println!("name: {}", text_at(solution, "/properties/displayName"));
            println!("unique name: {}", text_at(solution, "/properties/uniqueName"));
            println!("version: {}", text_at(solution, "/properties/version"));
            println!("publisher: {}", text_at(solution, "/properties/publisherName"));
            if let Some(description) = str_at(solution, "/properties/description") {
                println!("description: {description}");
            }
        }
    }
    Ok(())
}

pub(crate) fn render_component_list(components: &[Value], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(components)?,
        OutputFormat::Table => {
            println!("{:<36} {:<20} {:<20} DISPLAY NAME", "ID", "TYPE", "CREATED");
            for component in components {
                println!(
                    "{:<36} {:<20} {:<20} {}",
                    text_at(component, "/name"),
                    text_at(component, "/type"),
                    timestamp_at(component, "/properties/createdTime"),
                    text_at(component, "/properties/displayName")
                );
            }
        }
    }
    Ok(())
}

/// Solution flows: workflow components with their state.
pub(crate) fn render_solution_flow_list(flows: &[Value], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(flows)?,
        OutputFormat::Table => {
            println!("{:<36} {:<8} {:<20} DISPLAY NAME", "ID", "STATE", "CREATED");
            for flow in flows {
                println!(
                    "{:<36} {:<8} {:<20} {}",
                    text_at(flow, "/name"),
                    text_at(flow, "/properties/state"),
                    timestamp_at(flow, "/properties/createdTime"),
                    text_at(flow, "/properties/displayName")
                );
            }
        }
    }
    Ok(())
}

/// One cached credential as shown by `auth status`.
#[derive(Debug, Serialize)]
pub(crate) struct TokenStatusRow<'a> {
    pub(crate) client_id: &'a str,
    pub(crate) tenant: &'a str,
    pub(crate) scope: &'a str,
    pub(crate) expires_at: DateTime<Utc>,
    pub(crate) valid: bool,
    pub(crate) renewable: bool,
}

impl<'a> TokenStatusRow<'a> {
    pub(crate) fn new(token: &'a CachedToken, now: DateTime<Utc>) -> Self {
        Self {
            client_id: &token.client_id,
            tenant: &token.tenant,
            scope: &token.scope,
            expires_at: token.expires_at,
            valid: token.is_fresh_at(now),
            renewable: token.refresh_token.is_some(),
        }
    }
}

pub(crate) fn render_token_status(rows: &[TokenStatusRow<'_>], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(rows)?,
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("no cached credentials");
                return Ok(());
            }
            println!(
                "{:<36} {:<36} {:<20} {:<8} SCOPE",
                "CLIENT", "TENANT", "EXPIRES", "STATE"
            );
            for row in rows {
                let state = match (row.valid, row.renewable) {
                    (true, _) => "valid",
                    (false, true) => "renew",
                    (false, false) => "expired",
                };
                println!(
                    "{:<36} {:<36} {:<20} {:<8} {}",
                    row.client_id,
                    row.tenant,
                    row.expires_at.format("%Y-%m-%d %H:%M:%S"),
                    state,
                    row.scope
                );
            }
        }
    }
    Ok(())
}

/// Show a pending diff on stderr so stdout stays machine readable.
pub(crate) fn render_changes(changes: &[FieldChange]) {
    for change in changes {
        eprintln!("{}", describe_change(change));
    }
}

pub(crate) fn describe_change(change: &FieldChange) -> String {
    match change {
        FieldChange::Added { path, value } => format!("  + {path}: {}", compact(value)),
        FieldChange::Removed { path, value } => format!("  - {path}: {}", compact(value)),
        FieldChange::Changed {
            path,
            before,
            after,
        } => format!("  ~ {path}: {} -> {}", compact(before), compact(after)),
    }
}

fn compact(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= DIFF_VALUE_WIDTH {
        return text;
    }
    let mut shortened: String = text.chars().take(DIFF_VALUE_WIDTH).collect();
    shortened.push_str("...");
    shortened
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn text_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    str_at(value, pointer).unwrap_or("-")
}

/// Service timestamps trimmed to seconds; unparsable values are shown as-is.
fn timestamp_at(value: &Value, pointer: &str) -> String {
    let Some(raw) = str_at(value, pointer) else {
        return "-".to_string();
    };
    DateTime::parse_from_rfc3339(raw).map_or_else(
        |_| raw.to_string(),
        |parsed| {
            parsed
                .with_timezone(&Utc)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        },
    )
}

fn keys_at(value: &Value, pointer: &str) -> Vec<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_object)
        .map(|object| object.keys().cloned().collect())
        .unwrap_or_default()
}

#[must_use]
pub(crate) fn connector_type(connector: &Value) -> &'static str {
    if connector
        .pointer("/properties/isCustomApi")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        "custom"
    } else {
        "managed"
    }
}

fn connector_of(connection: &Value) -> &str {
    str_at(connection, "/properties/apiId")
        .and_then(|api| api.rsplit('/').next())
        .unwrap_or("-")
}

pub(crate) fn connection_status(connection: &Value) -> &str {
    str_at(connection, "/properties/statuses/0/status").unwrap_or("Unknown")
}
