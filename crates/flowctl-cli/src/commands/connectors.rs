use serde_json::Value;

use crate::cli::{
    ConnectorCreateArgs, ConnectorExportArgs, ConnectorListArgs, ConnectorUpdateArgs, DeleteArgs,
    OutputFormat, ResourceIdArgs,
};
use crate::client::{AppContext, CliError, CliResult, ResourceKind};
use crate::commands::{Session, notice_more_results, report_outcome, write_export};
use crate::output::{connector_type, render_connector_detail, render_connector_list};
use crate::workflow::document::ResourceDocument;
use crate::workflow::{MutationOutcome, ReplacementSource, SubmitStyle, UpdatePlan};

const SEARCHABLE_FIELDS: [&str; 3] = ["/name", "/properties/displayName", "/properties/publisher"];

pub(crate) async fn handle_connector_list(
    ctx: &AppContext,
    args: &ConnectorListArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let url = ctx.resource_url(ResourceKind::Connector, &[])?;
    let page = ctx.list(url, None).await?;
    let matching: Vec<Value> = page
        .value
        .iter()
        .filter(|connector| connector_matches(connector, args))
        .cloned()
        .collect();
    if matching.is_empty() {
        eprintln!("No connectors found");
    }
    render_connector_list(&matching, format)?;
    notice_more_results(&page, "connectors before filtering");
    Ok(())
}

pub(crate) async fn handle_connector_get(
    ctx: &AppContext,
    args: &ResourceIdArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let connector = ctx.fetch(ResourceKind::Connector, &args.id).await?;
    render_connector_detail(&connector, format)
}

pub(crate) async fn handle_connector_create(
    ctx: &AppContext,
    session: &Session<'_>,
    args: &ConnectorCreateArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let path = &args.definition_file;
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| CliError::validation(format!("cannot read '{}': {err}", path.display())))?;
    let origin = path.display().to_string();
    let document = ResourceDocument::parse_replacement(&text, &origin)?;
    let Some(name) = document.name().map(str::to_string) else {
        return Err(CliError::parse(format!(
            "{origin}: missing required \"name\" field"
        )));
    };

    let outcome = session
        .workflow(ctx)
        .create(ResourceKind::Connector, document, !args.confirm.yes)
        .await?;
    report_outcome(ResourceKind::Connector, &name, outcome, format)
}

pub(crate) async fn handle_connector_update(
    ctx: &AppContext,
    session: &Session<'_>,
    args: ConnectorUpdateArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let source = match (args.definition_file, args.edit) {
        (Some(path), _) => ReplacementSource::File(path),
        (None, true) => ReplacementSource::Editor,
        (None, false) => {
            return Err(CliError::validation(
                "nothing to update; pass --definition-file or --edit",
            ));
        }
    };

    let plan = UpdatePlan {
        kind: ResourceKind::Connector,
        id: args.id,
        source,
        submit: SubmitStyle::Replace,
        oauth_secret: args.oauth_secret,
    };
    let outcome = session
        .workflow(ctx)
        .update(&plan, &session.safety(&args.safety))
        .await?;
    let notice = recreate_notice(&plan.id, &outcome);
    report_outcome(ResourceKind::Connector, &plan.id, outcome, format)?;
    if let Some(notice) = notice {
        eprintln!("{notice}");
    }
    Ok(())
}

/// Existing connections keep the connector schema they were created with.
fn recreate_notice(id: &str, outcome: &MutationOutcome) -> Option<String> {
    matches!(outcome, MutationOutcome::Applied(_)).then(|| {
        format!(
            "note: existing connections of connector '{id}' must be recreated \
             (flowctl connection recreate <id>) to pick up the changes"
        )
    })
}

pub(crate) async fn handle_connector_delete(
    ctx: &AppContext,
    session: &Session<'_>,
    args: &DeleteArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let outcome = session
        .workflow(ctx)
        .delete(ResourceKind::Connector, &args.id, &session.safety(&args.safety))
        .await?;
    report_outcome(ResourceKind::Connector, &args.id, outcome, format)
}

pub(crate) async fn handle_connector_export(
    ctx: &AppContext,
    args: &ConnectorExportArgs,
) -> CliResult<()> {
    let connector = ctx.fetch(ResourceKind::Connector, &args.id).await?;
    let exported = if args.openapi {
        match connector.pointer("/properties/apiDefinitions") {
            Some(Value::Object(definitions)) if !definitions.is_empty() => {
                Value::Object(definitions.clone())
            }
            _ => {
                return Err(CliError::validation(format!(
                    "connector '{}' has no OpenAPI definition",
                    args.id
                )));
            }
        }
    } else {
        connector
    };
    write_export(&args.output, &exported)?;
    println!("Connector '{}' exported to {}", args.id, args.output.display());
    Ok(())
}

fn connector_matches(connector: &Value, args: &ConnectorListArgs) -> bool {
    let custom = connector_type(connector) == "custom";
    if (args.custom && !custom) || (args.managed && custom) {
        return false;
    }
    let Some(text) = args.filter.as_deref() else {
        return true;
    };
    let needle = text.to_lowercase();
    SEARCHABLE_FIELDS
        .iter()
        .filter_map(|pointer| connector.pointer(pointer).and_then(Value::as_str))
        .any(|field| field.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ConfirmArgs, SafetyArgs};
    use crate::client::tests::context_with;
    use crate::workflow::interrupt::Interrupt;
    use crate::workflow::operator::scripted::ScriptedOperator;
    use httpmock::Method::PUT;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::path::PathBuf;

    const APIS_PATH: &str = "/providers/Microsoft.PowerApps/apis";

    fn session<'a>(operator: &'a ScriptedOperator, interrupt: &'a Interrupt) -> Session<'a> {
        Session {
            operator,
            interrupt,
            backup_dir: PathBuf::from("unused-backups"),
        }
    }

    fn catalog() -> Vec<Value> {
        vec![
            json!({"name": "shared_sharepointonline", "properties": {"displayName": "SharePoint", "publisher": "Microsoft"}}),
            json!({"name": "shared_contoso-5f", "properties": {"displayName": "Ticketing", "publisher": "Contoso", "isCustomApi": true}}),
            json!({"name": "shared_podio", "properties": {"displayName": "Podio", "publisher": "Citrix"}}),
        ]
    }

    fn names(args: &ConnectorListArgs) -> Vec<String> {
        catalog()
            .iter()
            .filter(|connector| connector_matches(connector, args))
            .filter_map(|connector| connector["name"].as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn list_filters_by_kind_and_text() {
        assert_eq!(
            names(&ConnectorListArgs {
                custom: true,
                ..ConnectorListArgs::default()
            }),
            vec!["shared_contoso-5f"]
        );
        assert_eq!(
            names(&ConnectorListArgs {
                managed: true,
                filter: Some("MICROSOFT".into()),
                ..ConnectorListArgs::default()
            }),
            vec!["shared_sharepointonline"]
        );
        assert_eq!(
            names(&ConnectorListArgs {
                filter: Some("podio".into()),
                ..ConnectorListArgs::default()
            }),
            vec!["shared_podio"]
        );
        assert_eq!(names(&ConnectorListArgs::default()).len(), 3);
    }

    #[tokio::test]
    async fn list_queries_environment_scoped_catalog() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path(APIS_PATH)
                .query_param("$filter", "environment eq 'Default-env'");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"value": catalog()}));
        });

        handle_connector_list(
            &context_with(&server),
            &ConnectorListArgs::default(),
            OutputFormat::Table,
        )
        .await
        .expect("list");
        mock.assert();
    }

    #[tokio::test]
    async fn create_requires_name_before_any_request() {
        let server = MockServer::start_async().await;
        let any = server.mock(|when, then| {
            when.any_request();
            then.status(500);
        });

        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("connector.json");
        std::fs::write(&file, r#"{"properties": {"displayName": "Ticketing"}}"#).expect("write");

        let operator = ScriptedOperator::default();
        let interrupt = Interrupt::new();
        let err = handle_connector_create(
            &context_with(&server),
            &session(&operator, &interrupt),
            &ConnectorCreateArgs {
                definition_file: file,
                confirm: ConfirmArgs { yes: true },
            },
            OutputFormat::Table,
        )
        .await
        .expect_err("name required");
        assert!(matches!(err, CliError::Parse(_)));
        any.assert_calls(0);
    }

    #[tokio::test]
    async fn create_posts_document_after_confirmation() {
        let server = MockServer::start_async().await;
        let body = json!({"name": "shared_contoso-5f", "properties": {"displayName": "Ticketing"}});
        let expected = body.clone();
        let mock = server.mock(move |when, then| {
            when.method(POST).path(APIS_PATH).json_body(expected);
            then.status(201)
                .header("content-type", "application/json")
                .json_body(json!({"name": "shared_contoso-5f", "properties": {"displayName": "Ticketing", "isCustomApi": true}}));
        });

        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("connector.json");
        std::fs::write(&file, body.to_string()).expect("write");

        let operator = ScriptedOperator::answering(&[true]);
        let interrupt = Interrupt::new();
        handle_connector_create(
            &context_with(&server),
            &session(&operator, &interrupt),
            &ConnectorCreateArgs {
                definition_file: file,
                confirm: ConfirmArgs::default(),
            },
            OutputFormat::Json,
        )
        .await
        .expect("create");
        mock.assert();
        assert_eq!(
            operator.prompts(),
            vec!["Create connector 'Ticketing'?"]
        );
    }

    #[tokio::test]
    async fn update_from_file_puts_full_document() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(format!("{APIS_PATH}/C1"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"name": "C1", "properties": {"displayName": "Old", "isCustomApi": true}}));
        });
        let replacement = json!({"name": "C1", "properties": {"displayName": "New", "isCustomApi": true}});
        let expected = replacement.clone();
        let echoed = replacement.clone();
        let put = server.mock(move |when, then| {
            when.method(PUT).path(format!("{APIS_PATH}/C1")).json_body(expected);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(echoed);
        });

        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("c1.json");
        std::fs::write(&file, replacement.to_string()).expect("write");

        let operator = ScriptedOperator::default();
        let interrupt = Interrupt::new();
        handle_connector_update(
            &context_with(&server),
            &session(&operator, &interrupt),
            ConnectorUpdateArgs {
                id: "C1".into(),
                definition_file: Some(file),
                edit: false,
                oauth_secret: None,
                safety: SafetyArgs {
                    confirm: ConfirmArgs { yes: true },
                    no_backup: true,
                    backup_dir: None,
                },
            },
            OutputFormat::Table,
        )
        .await
        .expect("update");
        put.assert();
    }

    #[tokio::test]
    async fn delete_with_yes_issues_single_delete() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(format!("{APIS_PATH}/C1"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"name": "C1", "properties": {"isCustomApi": true}}));
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path(format!("{APIS_PATH}/C1"));
            then.status(200);
        });

        let operator = ScriptedOperator::default();
        let interrupt = Interrupt::new();
        handle_connector_delete(
            &context_with(&server),
            &session(&operator, &interrupt),
            &DeleteArgs {
                id: "C1".into(),
                safety: SafetyArgs {
                    confirm: ConfirmArgs { yes: true },
                    no_backup: true,
                    backup_dir: None,
                },
            },
            OutputFormat::Table,
        )
        .await
        .expect("delete");
        delete.assert_calls(1);
        assert!(operator.prompts().is_empty());
    }

    #[tokio::test]
    async fn openapi_export_requires_definition() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(format!("{APIS_PATH}/shared_podio"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"name": "shared_podio", "properties": {"displayName": "Podio"}}));
        });

        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("swagger.json");
        let err = handle_connector_export(
            &context_with(&server),
            &ConnectorExportArgs {
                id: "shared_podio".into(),
                output: output.clone(),
                openapi: true,
            },
        )
        .await
        .expect_err("no definition");
        assert!(matches!(err, CliError::Validation(_)));
        assert!(!output.exists());
    }

    #[test]
    fn only_applied_updates_ask_for_connection_recreation() {
        let applied = MutationOutcome::Applied(ResourceDocument::fetched(json!({"name": "C1"})));
        let notice = recreate_notice("C1", &applied).expect("notice after update");
        assert!(notice.contains("connector 'C1'"));
        assert!(notice.contains("recreated"));
        assert_eq!(recreate_notice("C1", &MutationOutcome::NoChanges), None);
        assert_eq!(recreate_notice("C1", &MutationOutcome::Cancelled), None);
    }
}
