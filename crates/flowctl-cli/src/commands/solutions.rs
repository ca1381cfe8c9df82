//! Read-only solution browsing.

use serde_json::Value;

use crate::cli::{OutputFormat, SolutionComponentsArgs, SolutionListArgs, SolutionRefArgs};
use crate::client::{AppContext, CliError, CliResult, ResourceKind};
use crate::commands::{notice_more_results, with_query};
use crate::output::{
    render_component_list, render_solution_detail, render_solution_flow_list,
    render_solution_list,
};

const WORKFLOW_COMPONENT: &str = "Workflow";

pub(crate) async fn handle_solution_list(
    ctx: &AppContext,
    args: &SolutionListArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let page = ctx
        .list(ctx.resource_url(ResourceKind::Solution, &[])?, None)
        .await?;
    let needle = args.filter.as_deref().map(str::to_lowercase);
    let solutions: Vec<Value> = page
        .value
        .iter()
        .filter(|solution| needle.as_deref().is_none_or(|needle| matches_filter(solution, needle)))
        .cloned()
        .collect();
    if solutions.is_empty() {
        eprintln!("No solutions found");
    }
    render_solution_list(&solutions, format)?;
    notice_more_results(&page, "solutions");
    Ok(())
}

pub(crate) async fn handle_solution_get(
    ctx: &AppContext,
    args: &SolutionRefArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let id = resolve_solution(ctx, args).await?;
    let solution = ctx.fetch(ResourceKind::Solution, &id).await?;
    render_solution_detail(&solution, format)
}

pub(crate) async fn handle_solution_components(
    ctx: &AppContext,
    args: &SolutionComponentsArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let id = resolve_solution(ctx, &args.solution).await?;
    let components = list_components(ctx, &id, args.component_type.as_deref()).await?;
    if components.is_empty() {
        eprintln!("No components found");
    }
    render_component_list(&components, format)
}

pub(crate) async fn handle_solution_flows(
    ctx: &AppContext,
    args: &SolutionRefArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let id = resolve_solution(ctx, args).await?;
    let flows = list_components(ctx, &id, Some(WORKFLOW_COMPONENT)).await?;
    if flows.is_empty() {
        eprintln!("No flows found in solution '{id}'");
    }
    render_solution_flow_list(&flows, format)
}

/// Solution id from the argument, looking up the unique name when `--name`
/// was given. Unique names match case-insensitively.
async fn resolve_solution(ctx: &AppContext, args: &SolutionRefArgs) -> CliResult<String> {
    if !args.name {
        return Ok(args.solution.clone());
    }
    let page = ctx
        .list(ctx.resource_url(ResourceKind::Solution, &[])?, None)
        .await?;
    page.value
        .iter()
        .find(|solution| {
            solution
                .pointer("/properties/uniqueName")
                .and_then(Value::as_str)
                .is_some_and(|unique| unique.eq_ignore_ascii_case(&args.solution))
        })
        .and_then(|solution| solution.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| CliError::NotFound {
            kind: ResourceKind::Solution,
            id: args.solution.clone(),
        })
}

async fn list_components(
    ctx: &AppContext,
    id: &str,
    component_type: Option<&str>,
) -> CliResult<Vec<Value>> {
    let filter = component_type.map(|kind| format!("componentType eq '{kind}'"));
    let url = with_query(
        ctx.resource_url(ResourceKind::Solution, &[id, "components"])?,
        &[("$filter", filter)],
    );
    let page = ctx.list(url, Some((ResourceKind::Solution, id))).await?;
    notice_more_results(&page, "components");
    Ok(page.value)
}

fn matches_filter(solution: &Value, needle: &str) -> bool {
    ["/properties/displayName", "/properties/uniqueName"]
        .iter()
        .filter_map(|pointer| solution.pointer(pointer).and_then(Value::as_str))
        .any(|text| text.to_lowercase().contains(needle))
}
