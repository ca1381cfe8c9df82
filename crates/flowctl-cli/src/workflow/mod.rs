//! Safe mutation of management API resources.
//!
//! Every command that changes server-side state runs through [`Workflow`]:
//! fetch, snapshot, obtain the replacement, validate, diff, confirm, submit,
//! report. The steps run strictly in that order; a document is only sent
//! after it validated and the operator confirmed (or `--yes` was given).

pub(crate) mod backup;
pub(crate) mod diff;
pub(crate) mod document;
pub(crate) mod interrupt;
pub(crate) mod operator;

use std::future::Future;
use std::path::PathBuf;

use chrono::Utc;
use reqwest::{Method, Url};
use serde_json::Value;

use crate::client::{AppContext, CliError, CliResult, ResourceKind};
use crate::output::render_changes;
use backup::write_backup;
use diff::PendingChange;
use document::{PropertyOverrides, ResourceDocument};
use interrupt::Interrupt;
use operator::Operator;

/// Where the replacement document comes from.
#[derive(Debug, Clone)]
pub(crate) enum ReplacementSource {
    File(PathBuf),
    Editor,
    Overrides(PropertyOverrides),
}

/// How an accepted replacement is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitStyle {
    /// `PATCH` with only the changed top-level properties.
    MergePatch,
    /// `PUT` with the whole document.
    Replace,
}

/// One update request against an existing resource.
#[derive(Debug, Clone)]
pub(crate) struct UpdatePlan {
    pub(crate) kind: ResourceKind,
    pub(crate) id: String,
    pub(crate) source: ReplacementSource,
    pub(crate) submit: SubmitStyle,
    /// Connector OAuth client secret, injected at submit time only.
    pub(crate) oauth_secret: Option<String>,
}

/// Operator-facing safety switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SafetyOptions {
    pub(crate) confirm: bool,
    /// `None` disables the pre-mutation snapshot.
    pub(crate) backup_dir: Option<PathBuf>,
}

/// Result of a workflow run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MutationOutcome {
    Applied(ResourceDocument),
    Created(ResourceDocument),
    Deleted,
    NoChanges,
    Cancelled,
}

pub(crate) struct Workflow<'a> {
    ctx: &'a AppContext,
    operator: &'a dyn Operator,
    interrupt: &'a Interrupt,
}

impl<'a> Workflow<'a> {
    pub(crate) const fn new(
        ctx: &'a AppContext,
        operator: &'a dyn Operator,
        interrupt: &'a Interrupt,
    ) -> Self {
        Self {
            ctx,
            operator,
            interrupt,
        }
    }

    /// Replace or patch an existing resource.
    pub(crate) async fn update(
        &self,
        plan: &UpdatePlan,
        safety: &SafetyOptions,
    ) -> CliResult<MutationOutcome> {
        let (kind, id) = (plan.kind, plan.id.as_str());
        let original = self.fetch_mutable(kind, id).await?;
        snapshot(kind, id, &original, safety)?;

        let replacement = self.obtain_replacement(&plan.source, &original).await?;
        let pending = PendingChange::new(original, replacement);
        if pending.is_empty() {
            return Ok(MutationOutcome::NoChanges);
        }

        eprintln!("Changes to {kind} '{id}':");
        render_changes(&pending.changes);
        if kind == ResourceKind::Connector
            && plan.oauth_secret.is_none()
            && pending.replacement.has_oauth_settings()
        {
            eprintln!(
                "warning: connector '{id}' uses OAuth but no --oauth-secret was given; \
                 the stored client secret may be cleared"
            );
        }

        if safety.confirm {
            let prompt = format!(
                "Apply {} change(s) to {kind} '{id}'?",
                pending.changes.len()
            );
            if !self.confirm(&prompt).await? {
                return Ok(MutationOutcome::Cancelled);
            }
        }

        let (method, body) = match plan.submit {
            SubmitStyle::MergePatch => (
                Method::PATCH,
                pending.replacement.merge_patch_from(&pending.original),
            ),
            SubmitStyle::Replace => {
                let document = match &plan.oauth_secret {
                    Some(secret) => pending.replacement.with_oauth_secret(secret),
                    None => pending.replacement.clone(),
                };
                (Method::PUT, document.into_value())
            }
        };

        let url = self.ctx.resource_url(kind, &[id])?;
        let response = self.submit(kind, Some(id), method, url, Some(&body)).await?;
        self.settle(kind, id, response).await
    }

    /// Delete an existing resource after snapshot and confirmation.
    pub(crate) async fn delete(
        &self,
        kind: ResourceKind,
        id: &str,
        safety: &SafetyOptions,
    ) -> CliResult<MutationOutcome> {
        let original = self.fetch_mutable(kind, id).await?;
        snapshot(kind, id, &original, safety)?;

        if safety.confirm {
            let prompt = labelled_prompt("Delete", kind, id, &original);
            if !self.confirm(&prompt).await? {
                return Ok(MutationOutcome::Cancelled);
            }
        }

        let url = self.ctx.resource_url(kind, &[id])?;
        self.submit(kind, Some(id), Method::DELETE, url, None).await?;
        Ok(MutationOutcome::Deleted)
    }

    /// Invoke a server-side action (`POST {id}/{action}`) on an existing
    /// resource after confirmation. `verb` heads the prompt.
    pub(crate) async fn perform(
        &self,
        kind: ResourceKind,
        id: &str,
        action: &str,
        verb: &str,
        confirm: bool,
    ) -> CliResult<MutationOutcome> {
        let original = self.fetch_mutable(kind, id).await?;
        if confirm {
            let prompt = labelled_prompt(verb, kind, id, &original);
            if !self.confirm(&prompt).await? {
                return Ok(MutationOutcome::Cancelled);
            }
        }

        let url = self.ctx.resource_url(kind, &[id, action])?;
        let response = self.submit(kind, Some(id), Method::POST, url, None).await?;
        self.settle(kind, id, response).await
    }

    /// Create a resource from a validated document.
    pub(crate) async fn create(
        &self,
        kind: ResourceKind,
        document: ResourceDocument,
        confirm: bool,
    ) -> CliResult<MutationOutcome> {
        self.interrupt.check()?;
        let label = document
            .display_name()
            .or_else(|| document.name())
            .unwrap_or("<unnamed>")
            .to_string();
        let pending = PendingChange::new(ResourceDocument::empty(), document);

        eprintln!("New {kind} '{label}':");
        render_changes(&pending.changes);
        if confirm && !self.confirm(&format!("Create {kind} '{label}'?")).await? {
            return Ok(MutationOutcome::Cancelled);
        }

        let known_id = pending.replacement.name().map(str::to_string);
        let url = self.ctx.resource_url(kind, &[])?;
        let response = self
            .submit(
                kind,
                known_id.as_deref(),
                Method::POST,
                url,
                Some(pending.replacement.as_value()),
            )
            .await?;
        Ok(MutationOutcome::Created(
            response.map_or(pending.replacement, ResourceDocument::fetched),
        ))
    }

    /// State after a successful submit: the response body, or a re-fetch when
    /// the service answered without one.
    async fn settle(
        &self,
        kind: ResourceKind,
        id: &str,
        response: Option<Value>,
    ) -> CliResult<MutationOutcome> {
        let current = match response {
            Some(value) => value,
            None => self.guarded(self.ctx.fetch(kind, id)).await?,
        };
        Ok(MutationOutcome::Applied(ResourceDocument::fetched(current)))
    }

    async fn fetch_mutable(&self, kind: ResourceKind, id: &str) -> CliResult<ResourceDocument> {
        self.interrupt.check()?;
        let original = ResourceDocument::fetched(self.guarded(self.ctx.fetch(kind, id)).await?);
        if kind == ResourceKind::Connector && !original.is_custom_connector() {
            return Err(CliError::validation(format!(
                "connector '{id}' is not a custom connector; only custom connectors can be modified"
            )));
        }
        Ok(original)
    }

    async fn obtain_replacement(
        &self,
        source: &ReplacementSource,
        original: &ResourceDocument,
    ) -> CliResult<ResourceDocument> {
        self.interrupt.check()?;
        match source {
            ReplacementSource::File(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|err| {
                    CliError::validation(format!("cannot read '{}': {err}", path.display()))
                })?;
                ResourceDocument::parse_replacement(&text, &path.display().to_string())
            }
            ReplacementSource::Editor => {
                let initial = original.to_pretty_string()?;
                let edited = self.guarded(self.operator.edit(&initial)).await?;
                ResourceDocument::parse_replacement(&edited, "edited document")
            }
            ReplacementSource::Overrides(overrides) => Ok(original.with_overrides(overrides)),
        }
    }

    async fn confirm(&self, prompt: &str) -> CliResult<bool> {
        self.guarded(self.operator.confirm(prompt)).await
    }

    /// Send the one mutating request. An interrupt abandons the request,
    /// reports the resource's actual state and fails with an unknown outcome.
    async fn submit(
        &self,
        kind: ResourceKind,
        id: Option<&str>,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> CliResult<Option<Value>> {
        self.interrupt.check()?;
        let target = id.map(|id| (kind, id));

        tokio::select! {
            result = self.ctx.send(method, url, body, target) => result,
            () = self.interrupt.wait() => {
                eprintln!("warning: interrupted while submitting; the outcome of this {kind} change is unknown");
                if let Some(id) = id {
                    self.report_actual_state(kind, id).await;
                }
                Err(CliError::Interrupted { outcome_unknown: true })
            }
        }
    }

    async fn report_actual_state(&self, kind: ResourceKind, id: &str) {
        match self.ctx.fetch(kind, id).await {
            Ok(value) => {
                let document = ResourceDocument::fetched(value);
                match document.to_pretty_string() {
                    Ok(text) => eprintln!("Current {kind} '{id}':\n{text}"),
                    Err(err) => eprintln!("{}", err.display_message()),
                }
            }
            Err(CliError::NotFound { .. }) => eprintln!("{kind} '{id}' does not exist"),
            Err(err) => eprintln!(
                "could not re-fetch {kind} '{id}': {}",
                err.display_message()
            ),
        }
    }

    async fn guarded<T>(&self, step: impl Future<Output = CliResult<T>>) -> CliResult<T> {
        tokio::select! {
            result = step => result,
            () = self.interrupt.wait() => Err(CliError::Interrupted { outcome_unknown: false }),
        }
    }
}

fn snapshot(
    kind: ResourceKind,
    id: &str,
    original: &ResourceDocument,
    safety: &SafetyOptions,
) -> CliResult<()> {
    if let Some(dir) = &safety.backup_dir {
        let path = write_backup(dir, kind, id, original, Utc::now())?;
        eprintln!("Backup saved to {}", path.display());
    }
    Ok(())
}

fn labelled_prompt(verb: &str, kind: ResourceKind, id: &str, document: &ResourceDocument) -> String {
    let label = document
        .display_name()
        .map(|name| format!(" ({name})"))
        .unwrap_or_default();
    format!("{verb} {kind} '{id}'{label}?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{context_with, flow_path};
    use document::FlowState;
    use httpmock::Method::{PATCH, PUT};
    use httpmock::prelude::*;
    use operator::scripted::ScriptedOperator;
    use serde_json::json;
    use std::fs;
    use std::time::Duration;

    const CONNECTOR_PATH: &str = "/providers/Microsoft.PowerApps/apis/C1";

    fn stopped_flow() -> Value {
        json!({
            "name": "F1",
            "id": "/providers/Microsoft.ProcessSimple/environments/Default-env/flows/F1",
            "properties": {
                "displayName": "Nightly sync",
                "state": "Stopped",
                "definition": {"triggers": {}, "actions": {}}
            }
        })
    }

    fn started_flow() -> Value {
        let mut flow = stopped_flow();
        flow["properties"]["state"] = json!("Started");
        flow
    }

    fn custom_connector() -> Value {
        json!({
            "name": "C1",
            "properties": {
                "displayName": "Ticketing",
                "isCustomApi": true,
                "connectionParameters": {}
            }
        })
    }

    fn prompted() -> SafetyOptions {
        SafetyOptions {
            confirm: true,
            backup_dir: None,
        }
    }

    fn unattended() -> SafetyOptions {
        SafetyOptions {
            confirm: false,
            backup_dir: None,
        }
    }

    fn start_plan() -> UpdatePlan {
        UpdatePlan {
            kind: ResourceKind::Flow,
            id: "F1".into(),
            source: ReplacementSource::Overrides(PropertyOverrides {
                state: Some(FlowState::Started),
                ..PropertyOverrides::default()
            }),
            submit: SubmitStyle::MergePatch,
            oauth_secret: None,
        }
    }

    #[tokio::test]
    async fn confirmed_start_fetches_snapshots_and_patches_once() {
        let server = MockServer::start_async().await;
        let get = server.mock(|when, then| {
            when.method(GET).path(flow_path("/F1"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(stopped_flow());
        });
        let patch = server.mock(|when, then| {
            when.method(PATCH)
                .path(flow_path("/F1"))
                .query_param("api-version", "2016-11-01")
                .json_body(json!({"properties": {"state": "Started"}}));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(started_flow());
        });

        let backups = tempfile::tempdir().expect("tempdir");
        let ctx = context_with(&server);
        let operator = ScriptedOperator::answering(&[true]);
        let interrupt = Interrupt::new();
        let workflow = Workflow::new(&ctx, &operator, &interrupt);
        let safety = SafetyOptions {
            confirm: true,
            backup_dir: Some(backups.path().to_path_buf()),
        };

        let outcome = workflow.update(&start_plan(), &safety).await.expect("update");

        get.assert_calls(1);
        patch.assert_calls(1);
        assert_eq!(operator.prompts(), vec!["Apply 1 change(s) to flow 'F1'?"]);
        let MutationOutcome::Applied(current) = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(current.state(), Some("Started"));

        let snapshots: Vec<_> = fs::read_dir(backups.path())
            .expect("backup dir")
            .map(|entry| entry.expect("entry").path())
            .collect();
        assert_eq!(snapshots.len(), 1);
        let written = fs::read_to_string(&snapshots[0]).expect("read snapshot");
        assert_eq!(
            written,
            ResourceDocument::fetched(stopped_flow())
                .to_pretty_string()
                .expect("pretty")
        );
    }

    #[tokio::test]
    async fn identical_replacement_sends_nothing() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(flow_path("/F1"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(started_flow());
        });
        let patch = server.mock(|when, then| {
            when.method(PATCH).path(flow_path("/F1"));
            then.status(200);
        });

        let ctx = context_with(&server);
        let operator = ScriptedOperator::answering(&[true]);
        let interrupt = Interrupt::new();
        let safety = SafetyOptions {
            confirm: true,
            backup_dir: None,
        };

        let outcome = Workflow::new(&ctx, &operator, &interrupt)
            .update(&start_plan(), &safety)
            .await
            .expect("no-op update");

        assert_eq!(outcome, MutationOutcome::NoChanges);
        patch.assert_calls(0);
        assert!(operator.prompts().is_empty());
    }

    #[tokio::test]
    async fn declined_confirmation_sends_nothing() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(flow_path("/F1"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(stopped_flow());
        });
        let patch = server.mock(|when, then| {
            when.method(PATCH).path(flow_path("/F1"));
            then.status(200);
        });

        let ctx = context_with(&server);
        let operator = ScriptedOperator::answering(&[false]);
        let interrupt = Interrupt::new();
        let safety = SafetyOptions {
            confirm: true,
            backup_dir: None,
        };

        let outcome = Workflow::new(&ctx, &operator, &interrupt)
            .update(&start_plan(), &safety)
            .await
            .expect("cancelled is not an error");

        assert_eq!(outcome, MutationOutcome::Cancelled);
        patch.assert_calls(0);
    }

    #[tokio::test]
    async fn malformed_file_fails_before_any_mutation() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(flow_path("/F1"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(stopped_flow());
        });
        let patch = server.mock(|when, then| {
            when.method(PATCH).path(flow_path("/F1"));
            then.status(200);
        });

        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("flow.json");
        fs::write(&file, "{\"properties\": ").expect("write file");

        let ctx = context_with(&server);
        let operator = ScriptedOperator::answering(&[true]);
        let interrupt = Interrupt::new();
        let plan = UpdatePlan {
            source: ReplacementSource::File(file),
            ..start_plan()
        };
        let safety = SafetyOptions {
            confirm: true,
            backup_dir: None,
        };

        let err = Workflow::new(&ctx, &operator, &interrupt)
            .update(&plan, &safety)
            .await
            .expect_err("parse error");

        assert!(matches!(err, CliError::Parse(_)));
        assert!(operator.prompts().is_empty());
        patch.assert_calls(0);
    }

    #[tokio::test]
    async fn edited_connector_is_put_with_injected_secret() {
        let server = MockServer::start_async().await;
        let mut fetched = custom_connector();
        fetched["properties"]["connectionParameters"] =
            json!({"token": {"oauthSettings": {"clientId": "app"}}});
        let fetched_clone = fetched.clone();
        server.mock(move |when, then| {
            when.method(GET).path(CONNECTOR_PATH);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(fetched_clone);
        });

        let mut edited = fetched.clone();
        edited["properties"]["description"] = json!("Tickets");
        let mut expected_body = edited.clone();
        expected_body["properties"]["connectionParameters"]["token"]["oauthSettings"]
            ["clientSecret"] = json!("s3cret");
        let response = edited.clone();
        let put = server.mock(move |when, then| {
            when.method(PUT)
                .path(CONNECTOR_PATH)
                .query_param("$filter", "environment eq 'Default-env'")
                .json_body(expected_body);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(response);
        });

        let ctx = context_with(&server);
        let operator = ScriptedOperator::answering(&[])
            .with_edit(serde_json::to_string_pretty(&edited).expect("serialize"));
        let interrupt = Interrupt::new();
        let plan = UpdatePlan {
            kind: ResourceKind::Connector,
            id: "C1".into(),
            source: ReplacementSource::Editor,
            submit: SubmitStyle::Replace,
            oauth_secret: Some("s3cret".into()),
        };
        let safety = SafetyOptions {
            confirm: false,
            backup_dir: None,
        };

        let outcome = Workflow::new(&ctx, &operator, &interrupt)
            .update(&plan, &safety)
            .await
            .expect("update");

        put.assert_calls(1);
        assert!(matches!(outcome, MutationOutcome::Applied(_)));
        assert!(operator.prompts().is_empty());
    }

    #[tokio::test]
    async fn managed_connectors_are_read_only() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/providers/Microsoft.PowerApps/apis/shared_sharepointonline");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"name": "shared_sharepointonline", "properties": {"isCustomApi": false}}));
        });

        let ctx = context_with(&server);
        let operator = ScriptedOperator::answering(&[true]);
        let interrupt = Interrupt::new();
        let err = Workflow::new(&ctx, &operator, &interrupt)
            .delete(ResourceKind::Connector, "shared_sharepointonline", &prompted())
            .await
            .expect_err("managed connector");

        assert!(matches!(err, CliError::Validation(_)));
        assert!(operator.prompts().is_empty());
    }

    #[tokio::test]
    async fn delete_with_yes_skips_prompt_and_deletes_once() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(CONNECTOR_PATH);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(custom_connector());
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path(CONNECTOR_PATH);
            then.status(200);
        });

        let ctx = context_with(&server);
        let operator = ScriptedOperator::default();
        let interrupt = Interrupt::new();
        let outcome = Workflow::new(&ctx, &operator, &interrupt)
            .delete(ResourceKind::Connector, "C1", &unattended())
            .await
            .expect("delete");

        assert_eq!(outcome, MutationOutcome::Deleted);
        delete.assert_calls(1);
        assert!(operator.prompts().is_empty());
    }

    #[tokio::test]
    async fn delete_prompt_names_the_resource() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(flow_path("/F1"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(stopped_flow());
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path(flow_path("/F1"));
            then.status(200);
        });

        let ctx = context_with(&server);
        let operator = ScriptedOperator::answering(&[false]);
        let interrupt = Interrupt::new();
        let outcome = Workflow::new(&ctx, &operator, &interrupt)
            .delete(ResourceKind::Flow, "F1", &prompted())
            .await
            .expect("cancelled");

        assert_eq!(outcome, MutationOutcome::Cancelled);
        assert_eq!(operator.prompts(), vec!["Delete flow 'F1' (Nightly sync)?"]);
        delete.assert_calls(0);
    }

    #[tokio::test]
    async fn interrupt_before_submit_sends_nothing() {
        let server = MockServer::start_async().await;
        let get = server.mock(|when, then| {
            when.method(GET).path(flow_path("/F1"));
            then.status(200);
        });

        let ctx = context_with(&server);
        let operator = ScriptedOperator::answering(&[true]);
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let safety = SafetyOptions {
            confirm: true,
            backup_dir: None,
        };

        let err = Workflow::new(&ctx, &operator, &interrupt)
            .update(&start_plan(), &safety)
            .await
            .expect_err("interrupted");

        assert!(matches!(
            err,
            CliError::Interrupted {
                outcome_unknown: false
            }
        ));
        get.assert_calls(0);
    }

    #[tokio::test]
    async fn interrupt_during_submit_refetches_and_reports_unknown_outcome() {
        let server = MockServer::start_async().await;
        let get = server.mock(|when, then| {
            when.method(GET).path(flow_path("/F1"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(stopped_flow());
        });
        server.mock(|when, then| {
            when.method(PATCH).path(flow_path("/F1"));
            then.status(200).delay(Duration::from_secs(5));
        });

        let ctx = context_with(&server);
        let operator = ScriptedOperator::default();
        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.trigger();
        });
        let safety = SafetyOptions {
            confirm: false,
            backup_dir: None,
        };

        let err = Workflow::new(&ctx, &operator, &interrupt)
            .update(&start_plan(), &safety)
            .await
            .expect_err("interrupted");

        assert!(matches!(
            err,
            CliError::Interrupted {
                outcome_unknown: true
            }
        ));
        get.assert_calls(2);
    }

    #[tokio::test]
    async fn create_posts_to_collection() {
        let server = MockServer::start_async().await;
        let post = server.mock(|when, then| {
            when.method(POST)
                .path(flow_path(""))
                .json_body(json!({"properties": {"displayName": "New flow", "state": "Stopped"}}));
            then.status(201)
                .header("content-type", "application/json")
                .json_body(json!({"name": "F9", "properties": {"displayName": "New flow"}}));
        });

        let ctx = context_with(&server);
        let operator = ScriptedOperator::answering(&[true]);
        let interrupt = Interrupt::new();
        let document = ResourceDocument::replacement(
            json!({"properties": {"displayName": "New flow", "state": "Stopped"}}),
            "flow",
        )
        .expect("valid");

        let outcome = Workflow::new(&ctx, &operator, &interrupt)
            .create(ResourceKind::Flow, document, true)
            .await
            .expect("create");

        post.assert_calls(1);
        let MutationOutcome::Created(created) = outcome else {
            panic!("expected created outcome");
        };
        assert_eq!(created.name(), Some("F9"));
        assert_eq!(operator.prompts(), vec!["Create flow 'New flow'?"]);
    }

    #[tokio::test]
    async fn delete_snapshots_before_submitting() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(flow_path("/F1"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(stopped_flow());
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path(flow_path("/F1"));
            then.status(500)
                .header("content-type", "application/json")
                .json_body(json!({"error": {"code": "InternalError", "message": "boom"}}));
        });

        let backups = tempfile::tempdir().expect("tempdir");
        let ctx = context_with(&server);
        let operator = ScriptedOperator::default();
        let interrupt = Interrupt::new();
        let safety = SafetyOptions {
            confirm: false,
            backup_dir: Some(backups.path().to_path_buf()),
        };

        let err = Workflow::new(&ctx, &operator, &interrupt)
            .delete(ResourceKind::Flow, "F1", &safety)
            .await
            .expect_err("server rejected delete");

        assert_eq!(err.exit_code(), 3);
        delete.assert_calls(1);
        let snapshots: Vec<_> = fs::read_dir(backups.path())
            .expect("backup dir")
            .map(|entry| entry.expect("entry").path())
            .collect();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(
            fs::read_to_string(&snapshots[0]).expect("read snapshot"),
            ResourceDocument::fetched(stopped_flow())
                .to_pretty_string()
                .expect("pretty")
        );
    }

    #[tokio::test]
    async fn edits_outside_properties_reach_the_patch() {
        let mut tagged = stopped_flow();
        tagged["tags"] = json!({"env": "dev"});
        let fetched = tagged.clone();
        let server = MockServer::start_async().await;
        server.mock(move |when, then| {
            when.method(GET).path(flow_path("/F1"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(fetched);
        });
        let mut edited = tagged.clone();
        edited["tags"]["env"] = json!("prod");
        let response = edited.clone();
        let patch = server.mock(move |when, then| {
            when.method(PATCH)
                .path(flow_path("/F1"))
                .json_body(json!({"tags": {"env": "prod"}}));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(response);
        });

        let ctx = context_with(&server);
        let operator = ScriptedOperator::answering(&[true])
            .with_edit(serde_json::to_string_pretty(&edited).expect("serialize"));
        let interrupt = Interrupt::new();
        let plan = UpdatePlan {
            source: ReplacementSource::Editor,
            ..start_plan()
        };

        let outcome = Workflow::new(&ctx, &operator, &interrupt)
            .update(&plan, &prompted())
            .await
            .expect("update");

        patch.assert_calls(1);
        assert_eq!(operator.prompts(), vec!["Apply 1 change(s) to flow 'F1'?"]);
        let MutationOutcome::Applied(current) = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(current.as_value().pointer("/tags/env"), Some(&json!("prod")));
    }

    #[tokio::test]
    async fn perform_posts_action_after_confirmation() {
        let server = MockServer::start_async().await;
        let connection = json!({"name": "conn-1", "properties": {"displayName": "ops@contoso.com"}});
        let fetched = connection.clone();
        let get = server.mock(move |when, then| {
            when.method(GET)
                .path("/providers/Microsoft.ProcessSimple/environments/Default-env/connections/conn-1");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(fetched);
        });
        let refresh = server.mock(|when, then| {
            when.method(POST).path(
                "/providers/Microsoft.ProcessSimple/environments/Default-env/connections/conn-1/refresh",
            );
            then.status(200);
        });

        let ctx = context_with(&server);
        let operator = ScriptedOperator::answering(&[true]);
        let interrupt = Interrupt::new();
        let outcome = Workflow::new(&ctx, &operator, &interrupt)
            .perform(ResourceKind::Connection, "conn-1", "refresh", "Refresh", true)
            .await
            .expect("refresh");

        refresh.assert_calls(1);
        get.assert_calls(2);
        assert_eq!(
            operator.prompts(),
            vec!["Refresh connection 'conn-1' (ops@contoso.com)?"]
        );
        assert_eq!(
            outcome,
            MutationOutcome::Applied(ResourceDocument::fetched(connection))
        );
    }
}
