//! Shared HTTP client, error taxonomy, and management API plumbing for the CLI.

use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use flowctl_auth::AuthError;
use flowctl_config::{ConfigError, ServiceEndpoints};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

pub(crate) const HEADER_REQUEST_ID: &str = "x-ms-client-request-id";
pub(crate) const API_VERSION: &str = "2016-11-01";

/// Exit code used when the operator interrupts a command.
pub(crate) const EXIT_INTERRUPTED: i32 = 130;

/// Management API resource families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceKind {
    Flow,
    Connector,
    Connection,
    Solution,
}

impl ResourceKind {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Flow => "flow",
            Self::Connector => "connector",
            Self::Connection => "connection",
            Self::Solution => "solution",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// CLI-level error type; each variant maps onto a process exit code.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Parse(String),
    AuthConfig(String),
    AuthExpired(String),
    AuthDenied(String),
    NotFound {
        kind: ResourceKind,
        id: String,
    },
    Api {
        operation: String,
        status: u16,
        message: String,
    },
    BackupWrite {
        path: PathBuf,
        source: io::Error,
    },
    Interrupted {
        outcome_unknown: bool,
    },
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::Parse(_) | Self::AuthConfig(_) => 2,
            Self::NotFound { .. }
            | Self::Api { .. }
            | Self::BackupWrite { .. }
            | Self::Failure(_) => 3,
            Self::AuthExpired(_) | Self::AuthDenied(_) => 4,
            Self::Interrupted { .. } => EXIT_INTERRUPTED,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Parse(message) => format!("invalid document: {message}"),
            Self::AuthConfig(message) => format!("{message} (set it in the environment or .env)"),
            Self::AuthExpired(message) | Self::AuthDenied(message) => message.clone(),
            Self::NotFound { kind, id } => format!("{kind} '{id}' was not found"),
            Self::Api {
                operation,
                status,
                message,
            } => format!("{operation} failed with status {status}: {message}"),
            Self::BackupWrite { path, source } => {
                format!("failed to write backup '{}': {source}", path.display())
            }
            Self::Interrupted {
                outcome_unknown: false,
            } => "interrupted; nothing was changed".to_string(),
            Self::Interrupted {
                outcome_unknown: true,
            } => "interrupted while submitting; the outcome is unknown".to_string(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.display_message())
    }
}

impl std::error::Error for CliError {}

impl From<AuthError> for CliError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Config { .. } => Self::AuthConfig(error.to_string()),
            AuthError::Expired => Self::AuthExpired(error.to_string()),
            AuthError::Denied { .. } => Self::AuthDenied(error.to_string()),
            other => Self::failure(other),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::Missing { .. } | ConfigError::Invalid { .. } => {
                Self::AuthConfig(error.to_string())
            }
            ConfigError::EnvFile { .. } => Self::failure(error),
        }
    }
}

/// Construct the shared HTTP client with the per-invocation request id.
pub(crate) fn build_http_client(timeout_secs: u64, request_id: &str) -> CliResult<Client> {
    let mut default_headers = HeaderMap::new();
    let request_id = HeaderValue::from_str(request_id)
        .map_err(|_| CliError::failure(anyhow!("request identifier contains invalid characters")))?;
    default_headers.insert(HEADER_REQUEST_ID, request_id);

    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .default_headers(default_headers)
        .build()
        .map_err(|err| CliError::failure(anyhow!("failed to build HTTP client: {err}")))
}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) client: Client,
    pub(crate) endpoints: ServiceEndpoints,
    pub(crate) environment: String,
    pub(crate) token: String,
}

/// `{ "value": [...], "nextLink": ... }` envelope returned by list endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListPage {
    #[serde(default)]
    pub(crate) value: Vec<Value>,
    #[serde(default, rename = "nextLink")]
    pub(crate) next_link: Option<String>,
}

impl AppContext {
    /// URL of a resource collection, or of an item below it when `segments`
    /// is non-empty.
    pub(crate) fn resource_url(&self, kind: ResourceKind, segments: &[&str]) -> CliResult<Url> {
        let environment = self.environment.as_str();
        let base = match kind {
            ResourceKind::Flow | ResourceKind::Connection | ResourceKind::Solution => {
                &self.endpoints.flow_api
            }
            ResourceKind::Connector => &self.endpoints.powerapps_api,
        };

        let mut url = base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                CliError::failure(anyhow!("base URL '{base}' cannot carry a path"))
            })?;
            path.pop_if_empty().push("providers");
            match kind {
                ResourceKind::Flow => {
                    path.extend(["Microsoft.ProcessSimple", "environments", environment, "flows"]);
                }
                ResourceKind::Connection => {
                    path.extend([
                        "Microsoft.ProcessSimple",
                        "environments",
                        environment,
                        "connections",
                    ]);
                }
                ResourceKind::Solution => {
                    path.extend([
                        "Microsoft.ProcessSimple",
                        "environments",
                        environment,
                        "solutions",
                    ]);
                }
                ResourceKind::Connector => {
                    path.extend(["Microsoft.PowerApps", "apis"]);
                }
            }
            path.extend(segments);
        }
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        if kind == ResourceKind::Connector {
            url.query_pairs_mut()
                .append_pair("$filter", &format!("environment eq '{environment}'"));
        }
        Ok(url)
    }

    /// Send an authenticated request and return the decoded body, if any.
    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        target: Option<(ResourceKind, &str)>,
    ) -> CliResult<Option<Value>> {
        let operation = format!("{method} {}", url.path());
        tracing::debug!(%operation, "management API request");

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| CliError::failure(anyhow!("request {operation} failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_problem(response, operation, target).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| CliError::failure(anyhow!("reading {operation} response failed: {err}")))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| CliError::failure(anyhow!("{operation} returned invalid JSON: {err}")))
    }

    /// GET one resource.
    pub(crate) async fn fetch(&self, kind: ResourceKind, id: &str) -> CliResult<Value> {
        let url = self.resource_url(kind, &[id])?;
        self.send(Method::GET, url, None, Some((kind, id)))
            .await?
            .ok_or_else(|| CliError::failure(anyhow!("{kind} '{id}' response had no body")))
    }

    /// GET one page of a collection. `parent` names the resource owning the
    /// collection, if any, so that a 404 is reported against it.
    pub(crate) async fn list(
        &self,
        url: Url,
        parent: Option<(ResourceKind, &str)>,
    ) -> CliResult<ListPage> {
        let Some(body) = self.send(Method::GET, url, None, parent).await? else {
            return Ok(ListPage::default());
        };
        serde_json::from_value(body)
            .map_err(|err| CliError::failure(anyhow!("unexpected list response: {err}")))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Classify a non-success HTTP response into a CLI error.
pub(crate) async fn classify_problem(
    response: reqwest::Response,
    operation: String,
    target: Option<(ResourceKind, &str)>,
) -> CliError {
    let status = response.status();
    let bytes = response.bytes().await.unwrap_or_default();

    if status == StatusCode::NOT_FOUND
        && let Some((kind, id)) = target
    {
        return CliError::NotFound {
            kind,
            id: id.to_string(),
        };
    }

    let body_text = String::from_utf8_lossy(&bytes).trim().to_string();
    let message = serde_json::from_slice::<ApiErrorEnvelope>(&bytes)
        .ok()
        .map(|envelope| match (envelope.error.code, envelope.error.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => body_text.clone(),
        })
        .unwrap_or_else(|| {
            if body_text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("no response body")
                    .to_string()
            } else {
                body_text.clone()
            }
        });

    CliError::Api {
        operation,
        status: status.as_u16(),
        message,
    }
}
