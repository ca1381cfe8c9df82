use anyhow::anyhow;
use reqwest::Method;
use serde_json::{Value, json};

use crate::cli::{
    DeleteArgs, FlowCreateArgs, FlowExportArgs, FlowListArgs, FlowRunArgs, FlowRunsArgs,
    FlowStateArgs, FlowUpdateArgs, OutputFormat, ResourceIdArgs, TriggerKind,
};
use crate::client::{AppContext, CliError, CliResult, ResourceKind};
use crate::commands::{Session, notice_more_results, report_outcome, with_query, write_export};
use crate::output::{render_flow_detail, render_flow_list, render_run_detail, render_run_list};
use crate::workflow::document::{FlowState, PropertyOverrides, ResourceDocument};
use crate::workflow::{ReplacementSource, SubmitStyle, UpdatePlan};

const WORKFLOW_DEFINITION_SCHEMA: &str = "https://schema.management.azure.com/providers/Microsoft.Logic/schemas/2016-06-01/workflowdefinition.json#";

pub(crate) async fn handle_flow_list(
    ctx: &AppContext,
    args: &FlowListArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let url = with_query(
        ctx.resource_url(ResourceKind::Flow, &[])?,
        &[("$top", args.top.map(|top| top.to_string()))],
    );
    let page = ctx.list(url, None).await?;
    render_flow_list(&page.value, format)?;
    notice_more_results(&page, "flows");
    Ok(())
}

pub(crate) async fn handle_flow_get(
    ctx: &AppContext,
    args: &ResourceIdArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let flow = ctx.fetch(ResourceKind::Flow, &args.id).await?;
    render_flow_detail(&flow, format)
}

pub(crate) async fn handle_flow_create(
    ctx: &AppContext,
    session: &Session<'_>,
    args: FlowCreateArgs,
    format: OutputFormat,
) -> CliResult<()> {
    if args.name.trim().is_empty() {
        return Err(CliError::validation("flow name must not be empty"));
    }
    let document = ResourceDocument::replacement(new_flow_document(&args), "new flow")?;
    let outcome = session
        .workflow(ctx)
        .create(ResourceKind::Flow, document, !args.confirm.yes)
        .await?;
    report_outcome(ResourceKind::Flow, &args.name, outcome, format)
}

pub(crate) async fn handle_flow_update(
    ctx: &AppContext,
    session: &Session<'_>,
    args: FlowUpdateArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let overrides = PropertyOverrides {
        display_name: args.name,
        description: args.description,
        state: args.state.map(FlowState::from),
        auto_refresh: None,
    };
    let source = match (args.definition_file, args.edit) {
        (Some(path), _) => ReplacementSource::File(path),
        (None, true) => ReplacementSource::Editor,
        (None, false) if !overrides.is_empty() => ReplacementSource::Overrides(overrides),
        (None, false) => {
            return Err(CliError::validation(
                "nothing to update; pass --definition-file, --edit, --name, --description or --state",
            ));
        }
    };

    let plan = UpdatePlan {
        kind: ResourceKind::Flow,
        id: args.id,
        source,
        submit: SubmitStyle::MergePatch,
        oauth_secret: None,
    };
    let outcome = session
        .workflow(ctx)
        .update(&plan, &session.safety(&args.safety))
        .await?;
    report_outcome(ResourceKind::Flow, &plan.id, outcome, format)
}

/// `flow start` / `flow stop`: a state-only update.
pub(crate) async fn handle_flow_set_state(
    ctx: &AppContext,
    session: &Session<'_>,
    args: FlowStateArgs,
    state: FlowState,
    format: OutputFormat,
) -> CliResult<()> {
    let plan = UpdatePlan {
        kind: ResourceKind::Flow,
        id: args.id,
        source: ReplacementSource::Overrides(PropertyOverrides {
            state: Some(state),
            ..PropertyOverrides::default()
        }),
        submit: SubmitStyle::MergePatch,
        oauth_secret: None,
    };
    let outcome = session
        .workflow(ctx)
        .update(&plan, &session.safety(&args.safety))
        .await?;
    report_outcome(ResourceKind::Flow, &plan.id, outcome, format)
}

pub(crate) async fn handle_flow_delete(
    ctx: &AppContext,
    session: &Session<'_>,
    args: &DeleteArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let outcome = session
        .workflow(ctx)
        .delete(ResourceKind::Flow, &args.id, &session.safety(&args.safety))
        .await?;
    report_outcome(ResourceKind::Flow, &args.id, outcome, format)
}

pub(crate) async fn handle_flow_runs(
    ctx: &AppContext,
    args: &FlowRunsArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let url = with_query(
        ctx.resource_url(ResourceKind::Flow, &[args.id.as_str(), "runs"])?,
        &[
            ("$top", Some(args.top.to_string())),
            ("$filter", run_filter(args)),
        ],
    );
    let page = ctx.list(url, Some((ResourceKind::Flow, &args.id))).await?;
    if page.value.is_empty() {
        eprintln!("No runs found for flow '{}'", args.id);
    }
    render_run_list(&page.value, format)?;
    notice_more_results(&page, "runs");
    Ok(())
}

pub(crate) async fn handle_flow_run(
    ctx: &AppContext,
    args: &FlowRunArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let url = ctx.resource_url(
        ResourceKind::Flow,
        &[args.id.as_str(), "runs", args.run_id.as_str()],
    )?;
    let label = format!("{}/runs/{}", args.id, args.run_id);
    let run = ctx
        .send(Method::GET, url, None, Some((ResourceKind::Flow, &label)))
        .await?
        .ok_or_else(|| CliError::failure(anyhow!("run '{label}' response had no body")))?;
    render_run_detail(&run, format)
}

pub(crate) async fn handle_flow_export(ctx: &AppContext, args: &FlowExportArgs) -> CliResult<()> {
    let flow = ctx.fetch(ResourceKind::Flow, &args.id).await?;
    let exported = if args.definition_only {
        flow.pointer("/properties/definition")
            .cloned()
            .ok_or_else(|| {
                CliError::validation(format!("flow '{}' has no definition to export", args.id))
            })?
    } else {
        flow
    };
    write_export(&args.output, &exported)?;
    println!("Flow '{}' exported to {}", args.id, args.output.display());
    Ok(())
}

fn run_filter(args: &FlowRunsArgs) -> Option<String> {
    let status = if args.failed {
        "Failed"
    } else if args.succeeded {
        "Succeeded"
    } else if args.running {
        "Running"
    } else {
        return args.filter.clone();
    };
    Some(format!("status eq '{status}'"))
}

/// Stopped flow with a single request trigger and no actions.
fn new_flow_document(args: &FlowCreateArgs) -> Value {
    let trigger_kind = match args.trigger {
        TriggerKind::Http => "Http",
        TriggerKind::Manual => "Button",
    };
    let mut properties = json!({
        "displayName": args.name.trim(),
        "definition": {
            "$schema": WORKFLOW_DEFINITION_SCHEMA,
            "contentVersion": "1.0.0.0",
            "parameters": {
                "$connections": {"defaultValue": {}, "type": "Object"},
                "$authentication": {"defaultValue": {}, "type": "SecureObject"}
            },
            "triggers": {
                "manual": {
                    "type": "Request",
                    "kind": trigger_kind,
                    "inputs": {"schema": {"type": "object", "properties": {}}}
                }
            },
            "actions": {},
            "outputs": {}
        },
        "connectionReferences": {},
        "state": FlowState::Stopped.as_str()
    });
    if let Some(description) = &args.description {
        properties["description"] = json!(description);
    }
    if let Some(solution) = &args.solution {
        properties["solutionId"] = json!(solution);
    }
    json!({ "properties": properties })
}
