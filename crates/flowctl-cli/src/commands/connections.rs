use anyhow::anyhow;
use serde_json::{Value, json};

use crate::cli::{
    ConnectionActionArgs, ConnectionCreateArgs, ConnectionListArgs, ConnectionRecreateArgs,
    ConnectionUpdateArgs, DeleteArgs, OutputFormat, ResourceIdArgs,
};
use crate::client::{AppContext, CliError, CliResult, ResourceKind};
use crate::commands::{Session, notice_more_results, report_outcome, with_query};
use crate::output::{connection_status, render_connection_detail, render_connection_list};
use crate::workflow::document::{PropertyOverrides, ResourceDocument};
use crate::workflow::{MutationOutcome, ReplacementSource, SubmitStyle, UpdatePlan};

const CONNECTED: &str = "Connected";

pub(crate) async fn handle_connection_list(
    ctx: &AppContext,
    args: &ConnectionListArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let filter = args
        .connector
        .as_deref()
        .map(|connector| format!("apiId eq '{}'", connector_api_id(connector)));
    let url = with_query(
        ctx.resource_url(ResourceKind::Connection, &[])?,
        &[("$filter", filter)],
    );
    let page = ctx.list(url, None).await?;
    if page.value.is_empty() {
        eprintln!("No connections found");
    }
    render_connection_list(&page.value, format)?;
    notice_more_results(&page, "connections");
    Ok(())
}

pub(crate) async fn handle_connection_get(
    ctx: &AppContext,
    args: &ResourceIdArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let connection = ctx.fetch(ResourceKind::Connection, &args.id).await?;
    render_connection_detail(&connection, format)
}

pub(crate) async fn handle_connection_create(
    ctx: &AppContext,
    session: &Session<'_>,
    args: &ConnectionCreateArgs,
    format: OutputFormat,
) -> CliResult<()> {
    if args.name.trim().is_empty() {
        return Err(CliError::validation("connection name must not be empty"));
    }
    let document = new_connection_document(&args.connector, &args.name)?;
    let outcome = session
        .workflow(ctx)
        .create(ResourceKind::Connection, document, !args.confirm.yes)
        .await?;
    notice_sign_in(&args.name, &outcome);
    report_outcome(ResourceKind::Connection, &args.name, outcome, format)
}

pub(crate) async fn handle_connection_update(
    ctx: &AppContext,
    session: &Session<'_>,
    args: &ConnectionUpdateArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let Some(auto_refresh) = args.auto_refresh() else {
        return Err(CliError::validation(
            "nothing to update; pass --auto-refresh or --no-auto-refresh",
        ));
    };
    let plan = UpdatePlan {
        kind: ResourceKind::Connection,
        id: args.id.clone(),
        source: ReplacementSource::Overrides(PropertyOverrides {
            auto_refresh: Some(auto_refresh),
            ..PropertyOverrides::default()
        }),
        submit: SubmitStyle::MergePatch,
        oauth_secret: None,
    };
    let outcome = session
        .workflow(ctx)
        .update(&plan, &session.safety(&args.safety))
        .await?;
    report_outcome(ResourceKind::Connection, &plan.id, outcome, format)
}

pub(crate) async fn handle_connection_refresh(
    ctx: &AppContext,
    session: &Session<'_>,
    args: &ConnectionActionArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let outcome = session
        .workflow(ctx)
        .perform(
            ResourceKind::Connection,
            &args.id,
            "refresh",
            "Refresh",
            !args.confirm.yes,
        )
        .await?;
    report_outcome(ResourceKind::Connection, &args.id, outcome, format)
}

/// Render the connection and fail unless its first status is `Connected`.
pub(crate) async fn handle_connection_test(
    ctx: &AppContext,
    args: &ResourceIdArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let connection = ctx.fetch(ResourceKind::Connection, &args.id).await?;
    render_connection_detail(&connection, format)?;
    let status = connection_status(&connection);
    if status == CONNECTED {
        eprintln!("Connection '{}' is working", args.id);
        return Ok(());
    }
    let reason = connection
        .pointer("/properties/statuses/0/error/message")
        .and_then(Value::as_str)
        .unwrap_or(status);
    Err(CliError::failure(anyhow!(
        "connection '{}' is not connected: {reason}",
        args.id
    )))
}

/// Delete the connection, then create a new one for the same connector
/// under the same display name. The new connection starts unauthenticated.
pub(crate) async fn handle_connection_recreate(
    ctx: &AppContext,
    session: &Session<'_>,
    args: &ConnectionRecreateArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let existing = ctx.fetch(ResourceKind::Connection, &args.id).await?;
    let Some(connector) = existing
        .pointer("/properties/apiId")
        .and_then(Value::as_str)
        .and_then(|api| api.rsplit('/').next())
        .filter(|connector| !connector.is_empty())
    else {
        return Err(CliError::validation(format!(
            "cannot determine the connector of connection '{}'",
            args.id
        )));
    };
    let display_name = existing
        .pointer("/properties/displayName")
        .and_then(Value::as_str)
        .unwrap_or(&args.id);
    let replacement = new_connection_document(connector, display_name)?;

    eprintln!(
        "warning: flows using connection '{}' stop working until they are pointed at the new connection",
        args.id
    );
    let workflow = session.workflow(ctx);
    let removed = workflow
        .delete(ResourceKind::Connection, &args.id, &session.safety(&args.safety))
        .await?;
    if !matches!(removed, MutationOutcome::Deleted) {
        return report_outcome(ResourceKind::Connection, &args.id, removed, format);
    }
    eprintln!("Deleted connection '{}'", args.id);

    let outcome = workflow
        .create(ResourceKind::Connection, replacement, false)
        .await?;
    notice_sign_in(display_name, &outcome);
    report_outcome(ResourceKind::Connection, display_name, outcome, format)
}

pub(crate) async fn handle_connection_delete(
    ctx: &AppContext,
    session: &Session<'_>,
    args: &DeleteArgs,
    format: OutputFormat,
) -> CliResult<()> {
    eprintln!("warning: deleting a connection breaks every flow that uses it");
    let outcome = session
        .workflow(ctx)
        .delete(ResourceKind::Connection, &args.id, &session.safety(&args.safety))
        .await?;
    report_outcome(ResourceKind::Connection, &args.id, outcome, format)
}

fn connector_api_id(connector: &str) -> String {
    format!("/providers/Microsoft.PowerApps/apis/{connector}")
}

fn new_connection_document(connector: &str, display_name: &str) -> CliResult<ResourceDocument> {
    ResourceDocument::replacement(
        json!({
            "properties": {
                "displayName": display_name,
                "apiId": connector_api_id(connector),
            }
        }),
        "new connection",
    )
}

/// New OAuth connections need an interactive sign-in in the portal.
fn notice_sign_in(name: &str, outcome: &MutationOutcome) {
    if let MutationOutcome::Created(created) = outcome
        && connection_status(created.as_value()) != CONNECTED
    {
        eprintln!(
            "Connection '{name}' is not signed in yet; open Data > Connections in the \
             Power Automate portal and choose 'Fix connection' to authenticate it"
        );
    }
}
