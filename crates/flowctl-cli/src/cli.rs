//! Command-line surface: argument parsing and command dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use flowctl_config::{ConfigLoader, ConfigOverrides, Settings, load_dotenv};
use flowctl_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use uuid::Uuid;

use crate::client::{AppContext, CliError, CliResult, build_http_client};
use crate::commands::Session;
use crate::commands::auth::{
    acquire_api_token, handle_auth_login, handle_auth_logout, handle_auth_status,
};
use crate::commands::connections::{
    handle_connection_create, handle_connection_delete, handle_connection_get,
    handle_connection_list, handle_connection_recreate, handle_connection_refresh,
    handle_connection_test, handle_connection_update,
};
use crate::commands::connectors::{
    handle_connector_create, handle_connector_delete, handle_connector_export,
    handle_connector_get, handle_connector_list, handle_connector_update,
};
use crate::commands::flows::{
    handle_flow_create, handle_flow_delete, handle_flow_export, handle_flow_get,
    handle_flow_list, handle_flow_run, handle_flow_runs, handle_flow_set_state,
    handle_flow_update,
};
use crate::commands::solutions::{
    handle_solution_components, handle_solution_flows, handle_solution_get, handle_solution_list,
};
use crate::workflow::document::FlowState;
use crate::workflow::interrupt::Interrupt;
use crate::workflow::operator::{Operator, TerminalOperator};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Parses CLI arguments, executes the requested command and returns the
/// process exit code.
pub async fn run() -> i32 {
    // `.env` is folded in before parsing so `env = ...` arguments see it.
    let env_file = load_dotenv();
    let cli = Cli::parse();

    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format,
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: logging unavailable: {err:#}");
    }
    if let Err(err) = env_file {
        let err = CliError::from(err);
        eprintln!("error: {}", err.display_message());
        return err.exit_code();
    }

    let interrupt = Interrupt::new();
    interrupt.listen_for_ctrl_c();

    exit_status(dispatch(cli, &interrupt).await)
}

/// Report a failed command on stderr and map the result to an exit code.
fn exit_status(result: CliResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli, interrupt: &Interrupt) -> CliResult<()> {
    let overrides = cli.config_overrides();
    let settings = ConfigLoader::from_process_env().load(&overrides)?;
    let operator = TerminalOperator::new(settings.editor.clone());
    execute(cli, &settings, interrupt, &operator).await
}

/// Run a parsed command against resolved settings.
async fn execute(
    cli: Cli,
    settings: &Settings,
    interrupt: &Interrupt,
    operator: &dyn Operator,
) -> CliResult<()> {
    let Cli {
        format,
        timeout,
        command,
        ..
    } = cli;

    let session = Session {
        operator,
        interrupt,
        backup_dir: settings.backup_dir.clone(),
    };

    match command {
        Command::Auth(auth) => match auth {
            AuthCommand::Login => handle_auth_login(settings, interrupt).await,
            AuthCommand::Status => handle_auth_status(settings, format),
            AuthCommand::Logout(args) => handle_auth_logout(settings, &args),
        },
        Command::Flow(flow) => {
            let ctx = connect(settings, timeout, interrupt).await?;
            dispatch_flow(flow, &ctx, &session, format).await
        }
        Command::Connector(connector) => {
            let ctx = connect(settings, timeout, interrupt).await?;
            dispatch_connector(connector, &ctx, &session, format).await
        }
        Command::Connection(connection) => {
            let ctx = connect(settings, timeout, interrupt).await?;
            dispatch_connection(connection, &ctx, &session, format).await
        }
        Command::Solution(solution) => {
            let ctx = connect(settings, timeout, interrupt).await?;
            match solution {
                SolutionCommand::List(args) => handle_solution_list(&ctx, &args, format).await,
                SolutionCommand::Get(args) => handle_solution_get(&ctx, &args, format).await,
                SolutionCommand::Components(args) => {
                    handle_solution_components(&ctx, &args, format).await
                }
                SolutionCommand::Flows(args) => handle_solution_flows(&ctx, &args, format).await,
            }
        }
    }
}

async fn dispatch_connection(
    command: ConnectionCommand,
    ctx: &AppContext,
    session: &Session<'_>,
    format: OutputFormat,
) -> CliResult<()> {
    match command {
        ConnectionCommand::List(args) => handle_connection_list(ctx, &args, format).await,
        ConnectionCommand::Get(args) => handle_connection_get(ctx, &args, format).await,
        ConnectionCommand::Create(args) => {
            handle_connection_create(ctx, session, &args, format).await
        }
        ConnectionCommand::Update(args) => {
            handle_connection_update(ctx, session, &args, format).await
        }
        ConnectionCommand::Refresh(args) => {
            handle_connection_refresh(ctx, session, &args, format).await
        }
        ConnectionCommand::Test(args) => handle_connection_test(ctx, &args, format).await,
        ConnectionCommand::Recreate(args) => {
            handle_connection_recreate(ctx, session, &args, format).await
        }
        ConnectionCommand::Delete(args) => {
            handle_connection_delete(ctx, session, &args, format).await
        }
    }
}

async fn dispatch_flow(
    command: FlowCommand,
    ctx: &AppContext,
    session: &Session<'_>,
    format: OutputFormat,
) -> CliResult<()> {
    match command {
        FlowCommand::List(args) => handle_flow_list(ctx, &args, format).await,
        FlowCommand::Get(args) => handle_flow_get(ctx, &args, format).await,
        FlowCommand::Create(args) => handle_flow_create(ctx, session, args, format).await,
        FlowCommand::Update(args) => handle_flow_update(ctx, session, args, format).await,
        FlowCommand::Start(args) => {
            handle_flow_set_state(ctx, session, args, FlowState::Started, format).await
        }
        FlowCommand::Stop(args) => {
            handle_flow_set_state(ctx, session, args, FlowState::Stopped, format).await
        }
        FlowCommand::Delete(args) => handle_flow_delete(ctx, session, &args, format).await,
        FlowCommand::Runs(args) => handle_flow_runs(ctx, &args, format).await,
        FlowCommand::Run(args) => handle_flow_run(ctx, &args, format).await,
        FlowCommand::Export(args) => handle_flow_export(ctx, &args).await,
    }
}

async fn dispatch_connector(
    command: ConnectorCommand,
    ctx: &AppContext,
    session: &Session<'_>,
    format: OutputFormat,
) -> CliResult<()> {
    match command {
        ConnectorCommand::List(args) => handle_connector_list(ctx, &args, format).await,
        ConnectorCommand::Get(args) => handle_connector_get(ctx, &args, format).await,
        ConnectorCommand::Create(args) => {
            handle_connector_create(ctx, session, &args, format).await
        }
        ConnectorCommand::Update(args) => {
            handle_connector_update(ctx, session, args, format).await
        }
        ConnectorCommand::Delete(args) => handle_connector_delete(ctx, session, &args, format).await,
        ConnectorCommand::Export(args) => handle_connector_export(ctx, &args).await,
    }
}

/// Check configuration, sign in and build the API context. Nothing touches
/// the network until every required key is present.
async fn connect(settings: &Settings, timeout: u64, interrupt: &Interrupt) -> CliResult<AppContext> {
    let environment = settings.require_api()?.to_string();
    let request_id = Uuid::new_v4().to_string();
    tracing::debug!(%request_id, environment = %environment, "starting invocation");
    let client = build_http_client(timeout, &request_id)?;

    let token = tokio::select! {
        token = acquire_api_token(settings) => token?,
        () = interrupt.wait() => return Err(CliError::Interrupted { outcome_unknown: false }),
    };

    Ok(AppContext {
        client,
        endpoints: settings.endpoints.clone(),
        environment,
        token: token.secret().to_string(),
    })
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    LogFormat::parse(value).ok_or_else(|| format!("unknown log format '{value}' (use pretty or json)"))
}

#[derive(Parser)]
#[command(
    name = "flowctl",
    version,
    about = "Manage Power Automate flows, connectors, connections and solutions"
)]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) format: OutputFormat,
    #[arg(
        long,
        global = true,
        env = "FLOWCTL_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        help = "HTTP request timeout in seconds"
    )]
    pub(crate) timeout: u64,
    #[arg(long, global = true, env = "FLOWCTL_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub(crate) log_level: String,
    #[arg(
        long,
        global = true,
        env = "FLOWCTL_LOG_FORMAT",
        value_parser = parse_log_format,
        default_value = "pretty"
    )]
    pub(crate) log_format: LogFormat,
    #[arg(long, global = true, help = "Directory tenant (overrides DATAVERSE_TENANT_ID)")]
    pub(crate) tenant: Option<String>,
    #[arg(long, global = true, help = "Public client id (overrides DATAVERSE_CLIENT_ID)")]
    pub(crate) client_id: Option<String>,
    #[arg(
        long,
        global = true,
        help = "Target environment (overrides DATAVERSE_ENVIRONMENT_ID)"
    )]
    pub(crate) environment: Option<String>,
    #[arg(long, global = true, help = "Token cache file (overrides FLOWCTL_TOKEN_CACHE)")]
    pub(crate) token_cache: Option<PathBuf>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

impl Cli {
    fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            tenant_id: self.tenant.clone(),
            client_id: self.client_id.clone(),
            environment_id: self.environment.clone(),
            token_cache_path: self.token_cache.clone(),
            ..ConfigOverrides::default()
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Sign in, inspect or clear cached credentials.
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Manage flows and their run history.
    #[command(subcommand)]
    Flow(FlowCommand),
    /// Manage custom connectors and browse managed ones.
    #[command(subcommand)]
    Connector(ConnectorCommand),
    /// Manage connections.
    #[command(subcommand)]
    Connection(ConnectionCommand),
    /// Browse solutions and their components.
    #[command(subcommand)]
    Solution(SolutionCommand),
}

#[derive(Subcommand)]
pub(crate) enum AuthCommand {
    /// Run the device-code sign-in and cache the token.
    Login,
    /// Show cached credentials without contacting the service.
    Status,
    /// Remove the cached credential.
    Logout(AuthLogoutArgs),
}

#[derive(Args)]
pub(crate) struct AuthLogoutArgs {
    #[arg(long, help = "Remove every cached credential")]
    pub(crate) all: bool,
}

#[derive(Subcommand)]
pub(crate) enum FlowCommand {
    /// List flows in the environment.
    List(FlowListArgs),
    /// Show one flow.
    Get(ResourceIdArgs),
    /// Create a stopped flow with an empty definition.
    Create(FlowCreateArgs),
    /// Replace or edit a flow.
    Update(FlowUpdateArgs),
    /// Turn a flow on.
    Start(FlowStateArgs),
    /// Turn a flow off.
    Stop(FlowStateArgs),
    /// Delete a flow.
    Delete(DeleteArgs),
    /// List recent runs of a flow.
    Runs(FlowRunsArgs),
    /// Show one run of a flow.
    Run(FlowRunArgs),
    /// Write a flow document to a file.
    Export(FlowExportArgs),
}

#[derive(Subcommand)]
pub(crate) enum ConnectorCommand {
    /// List custom and managed connectors.
    List(ConnectorListArgs),
    /// Show one connector.
    Get(ResourceIdArgs),
    /// Create a custom connector from a document.
    Create(ConnectorCreateArgs),
    /// Replace or edit a custom connector.
    Update(ConnectorUpdateArgs),
    /// Delete a custom connector.
    Delete(DeleteArgs),
    /// Write a connector document or its OpenAPI definition to a file.
    Export(ConnectorExportArgs),
}

#[derive(Subcommand)]
pub(crate) enum ConnectionCommand {
    /// List connections in the environment.
    List(ConnectionListArgs),
    /// Show one connection.
    Get(ResourceIdArgs),
    /// Create a connection for a connector.
    Create(ConnectionCreateArgs),
    /// Change connection settings.
    Update(ConnectionUpdateArgs),
    /// Force a connection to renew its OAuth token.
    Refresh(ConnectionActionArgs),
    /// Check that a connection is connected.
    Test(ResourceIdArgs),
    /// Delete a connection and create a new one for the same connector.
    Recreate(ConnectionRecreateArgs),
    /// Delete a connection.
    Delete(DeleteArgs),
}

#[derive(Subcommand)]
pub(crate) enum SolutionCommand {
    /// List solutions in the environment.
    List(SolutionListArgs),
    /// Show one solution.
    Get(SolutionRefArgs),
    /// List the components of a solution.
    Components(SolutionComponentsArgs),
    /// List the flows packaged in a solution.
    Flows(SolutionRefArgs),
}

/// Confirmation switch shared by every mutating command.
#[derive(Args, Clone, Copy, Debug, Default)]
pub(crate) struct ConfirmArgs {
    #[arg(short = 'y', long, help = "Apply without asking for confirmation")]
    pub(crate) yes: bool,
}

/// Confirmation and backup switches for commands that replace a document.
#[derive(Args, Clone, Debug, Default)]
pub(crate) struct SafetyArgs {
    #[command(flatten)]
    pub(crate) confirm: ConfirmArgs,
    #[arg(long, help = "Skip the pre-change backup")]
    pub(crate) no_backup: bool,
    #[arg(
        long,
        conflicts_with = "no_backup",
        help = "Directory for pre-change backups (overrides FLOWCTL_BACKUP_DIR)"
    )]
    pub(crate) backup_dir: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct ResourceIdArgs {
    #[arg(help = "Resource identifier (name)")]
    pub(crate) id: String,
}

#[derive(Args)]
pub(crate) struct DeleteArgs {
    #[arg(help = "Resource identifier (name)")]
    pub(crate) id: String,
    #[command(flatten)]
    pub(crate) safety: SafetyArgs,
}

#[derive(Args, Default)]
pub(crate) struct FlowListArgs {
    #[arg(long, help = "Maximum number of flows to return")]
    pub(crate) top: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum TriggerKind {
    /// HTTP request trigger.
    #[default]
    Http,
    /// Manually triggered (button) flow.
    Manual,
}

#[derive(Args)]
pub(crate) struct FlowCreateArgs {
    #[arg(short, long, help = "Flow display name")]
    pub(crate) name: String,
    #[arg(long, value_enum, default_value_t = TriggerKind::Http)]
    pub(crate) trigger: TriggerKind,
    #[arg(short, long)]
    pub(crate) description: Option<String>,
    #[arg(short, long, help = "Solution the flow belongs to")]
    pub(crate) solution: Option<String>,
    #[command(flatten)]
    pub(crate) confirm: ConfirmArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum StateArg {
    Started,
    Stopped,
}

impl From<StateArg> for FlowState {
    fn from(value: StateArg) -> Self {
        match value {
            StateArg::Started => Self::Started,
            StateArg::Stopped => Self::Stopped,
        }
    }
}

#[derive(Args)]
pub(crate) struct FlowUpdateArgs {
    #[arg(help = "Flow identifier (name)")]
    pub(crate) id: String,
    #[arg(
        long,
        conflicts_with_all = ["edit", "name", "description", "state"],
        help = "Replace the flow with the document in this file"
    )]
    pub(crate) definition_file: Option<PathBuf>,
    #[arg(
        long,
        conflicts_with_all = ["name", "description", "state"],
        help = "Edit the current document in $VISUAL/$EDITOR"
    )]
    pub(crate) edit: bool,
    #[arg(short, long, help = "New display name")]
    pub(crate) name: Option<String>,
    #[arg(short, long, help = "New description")]
    pub(crate) description: Option<String>,
    #[arg(long, value_enum, help = "New state")]
    pub(crate) state: Option<StateArg>,
    #[command(flatten)]
    pub(crate) safety: SafetyArgs,
}

#[derive(Args)]
pub(crate) struct FlowStateArgs {
    #[arg(help = "Flow identifier (name)")]
    pub(crate) id: String,
    #[command(flatten)]
    pub(crate) safety: SafetyArgs,
}

#[derive(Args)]
pub(crate) struct FlowRunsArgs {
    #[arg(help = "Flow identifier (name)")]
    pub(crate) id: String,
    #[arg(
        long,
        default_value_t = 50,
        value_parser = clap::value_parser!(u32).range(1..=100),
        help = "Number of runs to return (at most 100)"
    )]
    pub(crate) top: u32,
    #[arg(
        long,
        conflicts_with_all = ["failed", "succeeded", "running"],
        help = "Raw OData filter, e.g. \"status eq 'Failed'\""
    )]
    pub(crate) filter: Option<String>,
    #[arg(long, conflicts_with_all = ["succeeded", "running"], help = "Only failed runs")]
    pub(crate) failed: bool,
    #[arg(long, conflicts_with = "running", help = "Only successful runs")]
    pub(crate) succeeded: bool,
    #[arg(long, help = "Only runs still in progress")]
    pub(crate) running: bool,
}

#[derive(Args)]
pub(crate) struct FlowRunArgs {
    #[arg(help = "Flow identifier (name)")]
    pub(crate) id: String,
    #[arg(help = "Run identifier (name)")]
    pub(crate) run_id: String,
}

#[derive(Args)]
pub(crate) struct FlowExportArgs {
    #[arg(help = "Flow identifier (name)")]
    pub(crate) id: String,
    #[arg(short, long, help = "File to write")]
    pub(crate) output: PathBuf,
    #[arg(long, help = "Write only properties.definition")]
    pub(crate) definition_only: bool,
}

#[derive(Args, Default)]
pub(crate) struct ConnectorListArgs {
    #[arg(long, conflicts_with = "managed", help = "Only custom connectors")]
    pub(crate) custom: bool,
    #[arg(long, help = "Only managed connectors")]
    pub(crate) managed: bool,
    #[arg(
        short,
        long,
        help = "Case-insensitive match on id, display name or publisher"
    )]
    pub(crate) filter: Option<String>,
}

#[derive(Args)]
pub(crate) struct ConnectorCreateArgs {
    #[arg(long, help = "Connector document with `name` and `properties`")]
    pub(crate) definition_file: PathBuf,
    #[command(flatten)]
    pub(crate) confirm: ConfirmArgs,
}

#[derive(Args)]
pub(crate) struct ConnectorUpdateArgs {
    #[arg(help = "Connector identifier (name)")]
    pub(crate) id: String,
    #[arg(
        long,
        conflicts_with = "edit",
        required_unless_present = "edit",
        help = "Replace the connector with the document in this file"
    )]
    pub(crate) definition_file: Option<PathBuf>,
    #[arg(long, help = "Edit the current document in $VISUAL/$EDITOR")]
    pub(crate) edit: bool,
    #[arg(
        long,
        env = "FLOWCTL_OAUTH_SECRET",
        hide_env_values = true,
        help = "OAuth client secret sent with the update"
    )]
    pub(crate) oauth_secret: Option<String>,
    #[command(flatten)]
    pub(crate) safety: SafetyArgs,
}

#[derive(Args)]
pub(crate) struct ConnectorExportArgs {
    #[arg(help = "Connector identifier (name)")]
    pub(crate) id: String,
    #[arg(short, long, help = "File to write")]
    pub(crate) output: PathBuf,
    #[arg(long, help = "Write only the OpenAPI definition")]
    pub(crate) openapi: bool,
}

#[derive(Args, Default)]
pub(crate) struct ConnectionListArgs {
    #[arg(long, help = "Only connections of this connector")]
    pub(crate) connector: Option<String>,
}

#[derive(Args)]
pub(crate) struct ConnectionCreateArgs {
    #[arg(help = "Connector identifier, e.g. shared_office365")]
    pub(crate) connector: String,
    #[arg(short, long, help = "Connection display name")]
    pub(crate) name: String,
    #[command(flatten)]
    pub(crate) confirm: ConfirmArgs,
}

#[derive(Args)]
pub(crate) struct ConnectionUpdateArgs {
    #[arg(help = "Connection identifier (name)")]
    pub(crate) id: String,
    #[arg(long, conflicts_with = "no_auto_refresh", help = "Enable automatic token refresh")]
    pub(crate) auto_refresh: bool,
    #[arg(long, help = "Disable automatic token refresh")]
    pub(crate) no_auto_refresh: bool,
    #[command(flatten)]
    pub(crate) safety: SafetyArgs,
}

impl ConnectionUpdateArgs {
    /// Requested auto-refresh setting; `None` when neither flag was given.
    pub(crate) const fn auto_refresh(&self) -> Option<bool> {
        if self.auto_refresh {
            Some(true)
        } else if self.no_auto_refresh {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Args)]
pub(crate) struct ConnectionActionArgs {
    #[arg(help = "Connection identifier (name)")]
    pub(crate) id: String,
    #[command(flatten)]
    pub(crate) confirm: ConfirmArgs,
}

#[derive(Args)]
pub(crate) struct ConnectionRecreateArgs {
    #[arg(help = "Connection identifier (name)")]
    pub(crate) id: String,
    #[command(flatten)]
    pub(crate) safety: SafetyArgs,
}

#[derive(Args, Default)]
pub(crate) struct SolutionListArgs {
    #[arg(
        short,
        long,
        help = "Case-insensitive match on display name or unique name"
    )]
    pub(crate) filter: Option<String>,
}

#[derive(Args)]
pub(crate) struct SolutionRefArgs {
    #[arg(help = "Solution identifier, or unique name with --name")]
    pub(crate) solution: String,
    #[arg(long, help = "Treat the argument as the solution's unique name")]
    pub(crate) name: bool,
}

#[derive(Args)]
pub(crate) struct SolutionComponentsArgs {
    #[command(flatten)]
    pub(crate) solution: SolutionRefArgs,
    #[arg(long = "type", help = "Only components of this type, e.g. Workflow")]
    pub(crate) component_type: Option<String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}
