//! Command handlers grouped by resource.

pub(crate) mod auth;
pub(crate) mod connections;
pub(crate) mod connectors;
pub(crate) mod flows;
pub(crate) mod solutions;

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use reqwest::Url;
use serde_json::Value;

use crate::cli::{OutputFormat, SafetyArgs};
use crate::client::{AppContext, CliError, CliResult, ListPage, ResourceKind};
use crate::output::{
    render_connection_detail, render_connector_detail, render_flow_detail, render_solution_detail,
};
use crate::workflow::interrupt::Interrupt;
use crate::workflow::operator::Operator;
use crate::workflow::{MutationOutcome, SafetyOptions, Workflow};

/// Interactive pieces shared by mutating commands.
pub(crate) struct Session<'a> {
    pub(crate) operator: &'a dyn Operator,
    pub(crate) interrupt: &'a Interrupt,
    /// Backup directory used when `--backup-dir` is not given.
    pub(crate) backup_dir: PathBuf,
}

impl Session<'_> {
    pub(crate) fn workflow<'c>(&'c self, ctx: &'c AppContext) -> Workflow<'c> {
        Workflow::new(ctx, self.operator, self.interrupt)
    }

    pub(crate) fn safety(&self, args: &SafetyArgs) -> SafetyOptions {
        let backup_dir = if args.no_backup {
            None
        } else {
            Some(
                args.backup_dir
                    .clone()
                    .unwrap_or_else(|| self.backup_dir.clone()),
            )
        };
        SafetyOptions {
            confirm: !args.confirm.yes,
            backup_dir,
        }
    }
}

/// Print what a workflow run did. Benign early exits go to stderr and still
/// count as success.
pub(crate) fn report_outcome(
    kind: ResourceKind,
    id: &str,
    outcome: MutationOutcome,
    format: OutputFormat,
) -> CliResult<()> {
    match outcome {
        MutationOutcome::Applied(document) => {
            eprintln!("Updated {kind} '{id}'");
            render_document(kind, document.as_value(), format)
        }
        MutationOutcome::Created(document) => {
            let label = document.name().unwrap_or(id).to_string();
            eprintln!("Created {kind} '{label}'");
            render_document(kind, document.as_value(), format)
        }
        MutationOutcome::Deleted => {
            println!("Deleted {kind} '{id}'");
            Ok(())
        }
        MutationOutcome::NoChanges => {
            eprintln!("No changes to {kind} '{id}'; nothing was submitted");
            Ok(())
        }
        MutationOutcome::Cancelled => {
            eprintln!("Cancelled; {kind} '{id}' was not changed");
            Ok(())
        }
    }
}

fn render_document(kind: ResourceKind, value: &Value, format: OutputFormat) -> CliResult<()> {
    match kind {
        ResourceKind::Flow => render_flow_detail(value, format),
        ResourceKind::Connector => render_connector_detail(value, format),
        ResourceKind::Connection => render_connection_detail(value, format),
        ResourceKind::Solution => render_solution_detail(value, format),
    }
}

/// Append OData-style query parameters to a collection URL.
pub(crate) fn with_query(mut url: Url, params: &[(&str, Option<String>)]) -> Url {
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            if let Some(value) = value {
                query.append_pair(key, value);
            }
        }
    }
    url
}

/// Tell the operator that the listing stopped at the first page.
pub(crate) fn notice_more_results(page: &ListPage, noun: &str) {
    if page.next_link.is_some() {
        eprintln!(
            "More results available; showing the first {} {noun}.",
            page.value.len()
        );
    }
}

/// Write a pretty-printed JSON export.
pub(crate) fn write_export(path: &Path, value: &Value) -> CliResult<()> {
    let mut text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    text.push('\n');
    std::fs::write(path, text).map_err(|err| {
        CliError::failure(anyhow!("failed to write '{}': {err}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ConfirmArgs;
    use crate::workflow::operator::scripted::ScriptedOperator;

    #[test]
    fn safety_flags_resolve_backup_directory() {
        let operator = ScriptedOperator::default();
        let interrupt = Interrupt::new();
        let session = Session {
            operator: &operator,
            interrupt: &interrupt,
            backup_dir: PathBuf::from("/var/backups"),
        };

        let defaults = session.safety(&SafetyArgs::default());
        assert!(defaults.confirm);
        assert_eq!(defaults.backup_dir, Some(PathBuf::from("/var/backups")));

        let skipped = session.safety(&SafetyArgs {
            confirm: ConfirmArgs { yes: true },
            no_backup: true,
            backup_dir: None,
        });
        assert!(!skipped.confirm);
        assert_eq!(skipped.backup_dir, None);

        let redirected = session.safety(&SafetyArgs {
            backup_dir: Some(PathBuf::from("snapshots")),
            ..SafetyArgs::default()
        });
        assert_eq!(redirected.backup_dir, Some(PathBuf::from("snapshots")));
    }

    #[test]
    fn query_skips_absent_parameters() {
        let url: Url = "https://api.example/flows?api-version=1".parse().expect("url");
        let url = with_query(url, &[("$top", Some("5".into())), ("$filter", None)]);
        assert_eq!(url.query(), Some("api-version=1&%24top=5"));
    }

    #[test]
    fn export_is_pretty_json_with_newline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("flow.json");
        write_export(&path, &serde_json::json!({"a": 1})).expect("export");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "{\n  \"a\": 1\n}\n");
    }
}
