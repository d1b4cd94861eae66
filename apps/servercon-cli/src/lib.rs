use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use servercon_api::{
    AuthenticationMode, ConsoleClientConfig, ConsoleHttpClient, ConsoleToggle, PowerAction,
    ReinstallType,
};
use servercon_core::{
    ActionRequest, AdminConsole, DestructivePlan, DestructiveWorkflow, Fleet, MemoryCredentials,
    Navigator, Redirect, ServerCard, SessionGuard, UserDeletion, WorkflowError, parse_groups,
};

pub mod config;
mod prompt;
mod render;

use config::{Config, Overrides};

#[derive(Parser, Debug)]
#[command(name = "servercon")]
#[command(about = "Guarded operations against the servercon fleet console")]
pub struct Cli {
    /// Console API origin; overrides SERVERCON_BASE_URL.
    #[arg(long, global = true)]
    pub base_url: Option<String>,
    /// Raw Cookie header for the session; overrides SERVERCON_SESSION_COOKIE.
    #[arg(long, global = true)]
    pub cookie: Option<String>,
    /// Reachability re-check interval in seconds, 0 for a single check.
    #[arg(long, global = true)]
    pub ping_interval: Option<u64>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the identity behind the current session
    Whoami,
    /// List eligible servers
    Servers,
    /// Show one server with reachability of its address and hostname
    Show(ShowArgs),
    /// Start, stop or restart a server
    Power(PowerArgs),
    /// Reset a server's root password
    ResetPassword(ConfirmArgs),
    /// Enable or disable a server's remote console
    Console(ConsoleArgs),
    /// Print remote console credentials
    Credentials(ServerArg),
    /// Reinstall a server with an OS or application image
    Reinstall(ReinstallArgs),
    /// Restore a server from one of its snapshots
    Restore(RestoreArgs),
    /// Administrative operations
    Admin(AdminArgs),
}

#[derive(Args, Debug)]
pub struct ServerArg {
    pub server_id: u64,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub server_id: u64,
    /// Keep re-checking reachability until interrupted.
    #[arg(long)]
    pub watch: bool,
}

#[derive(Args, Debug)]
pub struct ConfirmArgs {
    pub server_id: u64,
    /// Answer yes to the confirmation prompt.
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct PowerArgs {
    pub server_id: u64,
    #[arg(value_enum)]
    pub action: PowerArg,
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct ConsoleArgs {
    pub server_id: u64,
    #[arg(value_enum)]
    pub toggle: ToggleArg,
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct ReinstallArgs {
    pub server_id: u64,
    #[arg(long = "type", value_enum, default_value_t = ReinstallTypeArg::Os)]
    pub reinstall_type: ReinstallTypeArg,
    /// OS or app id; defaults to the first entry of the catalog.
    #[arg(long)]
    pub option: Option<u64>,
    #[arg(long, value_enum, default_value_t = AuthArg::Password)]
    pub auth: AuthArg,
    #[arg(long)]
    pub ssh_key: Option<String>,
    /// Confirmation token; prompted for when absent.
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    pub server_id: u64,
    /// Snapshot name; defaults to the first snapshot listed.
    #[arg(long)]
    pub snapshot: Option<String>,
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Args, Debug)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Manage console users
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
    List,
    /// Add a user with comma-separated groups
    Add { email: String, groups: String },
    /// Replace a user's groups
    SetGroups { email: String, groups: String },
    Delete {
        email: String,
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerArg {
    Start,
    Stop,
    Restart,
}

impl From<PowerArg> for PowerAction {
    fn from(value: PowerArg) -> Self {
        match value {
            PowerArg::Start => Self::Start,
            PowerArg::Stop => Self::Stop,
            PowerArg::Restart => Self::Restart,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleArg {
    Enable,
    Disable,
}

impl From<ToggleArg> for ConsoleToggle {
    fn from(value: ToggleArg) -> Self {
        match value {
            ToggleArg::Enable => Self::Enable,
            ToggleArg::Disable => Self::Disable,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReinstallTypeArg {
    Os,
    App,
}

impl From<ReinstallTypeArg> for ReinstallType {
    fn from(value: ReinstallTypeArg) -> Self {
        match value {
            ReinstallTypeArg::Os => Self::Os,
            ReinstallTypeArg::App => Self::App,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthArg {
    Password,
    Ssh,
}

impl From<AuthArg> for AuthenticationMode {
    fn from(value: AuthArg) -> Self {
        match value {
            AuthArg::Password => Self::Password,
            AuthArg::Ssh => Self::Ssh,
        }
    }
}

/// Records where the session would have sent the operator.
#[derive(Debug, Default)]
pub struct TerminalNavigator {
    redirects: Mutex<Vec<Redirect>>,
}

impl TerminalNavigator {
    pub fn last(&self) -> Option<Redirect> {
        self.redirects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .copied()
    }
}

impl Navigator for TerminalNavigator {
    fn navigate(&self, target: Redirect) {
        tracing::info!(path = target.path(), "session redirect");
        self.redirects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(target);
    }
}

struct Connection {
    session: SessionGuard,
    fleet: Fleet,
    navigator: Arc<TerminalNavigator>,
    credentials: Arc<MemoryCredentials>,
}

pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    Config::from_env()
        .and_then(|config| {
            config.with_overrides(Overrides {
                base_url: cli.base_url.clone(),
                cookie: cli.cookie.clone(),
                ping_interval_secs: cli.ping_interval,
            })
        })
        .context("load servercon configuration")
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    tracing::debug!(
        origin = %config.origin,
        source = %config.origin.source(),
        timeout_ms = config.timeout_ms,
        "servercon configured"
    );
    let connection = connect(&config)?;
    let outcome = match cli.command {
        Command::Admin(args) => admin(&connection, args.command).await,
        command => operate(&connection, command).await,
    };
    if let Some(target) = connection.navigator.last() {
        report_redirect(&connection, target)?;
    }
    outcome
}

fn connect(config: &Config) -> Result<Connection> {
    let client = ConsoleHttpClient::new(ConsoleClientConfig {
        base_url: config.origin.url().to_string(),
        timeout_ms: config.timeout_ms,
        request_attempts: config.request_attempts,
    })
    .map_err(|error| anyhow!("console client: {error}"))?;
    let credentials = Arc::new(MemoryCredentials::new(
        config.origin.host(),
        config.session_cookie.as_deref(),
    ));
    let navigator = Arc::new(TerminalNavigator::default());
    let session = SessionGuard::new(Arc::new(client), credentials.clone(), navigator.clone());
    let fleet = Fleet::new(session.clone(), config.ping_interval);
    Ok(Connection {
        session,
        fleet,
        navigator,
        credentials,
    })
}

fn emit(text: &str) -> Result<()> {
    writeln!(io::stdout().lock(), "{text}")?;
    Ok(())
}

fn report_redirect(connection: &Connection, target: Redirect) -> Result<()> {
    let mut stderr = io::stderr().lock();
    for directive in connection.credentials.issued_expiries() {
        writeln!(stderr, "Set-Cookie: {directive}")?;
    }
    writeln!(stderr, "redirect: {}", target.path())?;
    Ok(())
}

/// Every non-admin command first proves the session resolves to an identity.
async fn operate(connection: &Connection, command: Command) -> Result<()> {
    let identity = connection.session.resolve_identity().await?;
    match command {
        Command::Whoami => emit(&render::identity(&identity)),
        Command::Servers => {
            let servers = connection.fleet.list().await?;
            emit(&render::server_list(&servers))
        }
        Command::Show(args) => show(connection, args).await,
        Command::Power(args) => {
            let card = open_card(connection, args.server_id).await?;
            let request = ActionRequest::power(args.server_id, args.action.into());
            execute(&card, request, args.yes).await
        }
        Command::ResetPassword(args) => {
            let card = open_card(connection, args.server_id).await?;
            execute(&card, ActionRequest::reset_password(args.server_id), args.yes).await
        }
        Command::Console(args) => {
            let card = open_card(connection, args.server_id).await?;
            let request = ActionRequest::console(args.server_id, args.toggle.into());
            execute(&card, request, args.yes).await
        }
        Command::Credentials(args) => {
            let card = open_card(connection, args.server_id).await?;
            let credentials = card.console_credentials().await?;
            emit(&render::credentials(&credentials))
        }
        Command::Reinstall(args) => {
            let card = open_card(connection, args.server_id).await?;
            reinstall(&card, args).await
        }
        Command::Restore(args) => {
            let card = open_card(connection, args.server_id).await?;
            restore(&card, args).await
        }
        Command::Admin(args) => admin(connection, args.command).await,
    }
}

async fn open_card(connection: &Connection, server_id: u64) -> Result<ServerCard> {
    connection
        .fleet
        .open_card(server_id)
        .await?
        .ok_or_else(|| anyhow!("server {server_id} is not an active server on this account"))
}

async fn execute(card: &ServerCard, request: ActionRequest, assume_yes: bool) -> Result<()> {
    let Some(confirmed) = request.confirm_with(|question| prompt::ask_yes_no(question, assume_yes))
    else {
        return emit("Cancelled.");
    };
    let ack = card.execute(confirmed).await?;
    emit(&render::ack(&ack))
}

async fn show(connection: &Connection, args: ShowArgs) -> Result<()> {
    let card = open_card(connection, args.server_id).await?;
    let states = card.refresh_reachability().await;
    emit(&render::server_detail(&card.entity(), &states))?;

    if !args.watch {
        return Ok(());
    }
    let Some(interval) = card.poller().interval() else {
        bail!("--watch needs a ping interval (--ping-interval or SERVERCON_PING_INTERVAL_SECS)");
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = ticker.tick() => {
                for state in card.refresh_reachability().await {
                    emit(&render::reachability_state(&state))?;
                }
            }
        }
    }
}

async fn reinstall(card: &ServerCard, args: ReinstallArgs) -> Result<()> {
    let mut workflow = card.reinstall_workflow().on_complete(|body| {
        tracing::info!(%body, "reinstall accepted");
    });
    workflow.open().await?;
    {
        let plan = workflow.plan_mut()?;
        plan.set_reinstall_type(args.reinstall_type.into());
        if let Some(option) = args.option {
            plan.select(option)?;
        }
        plan.set_authentication(args.auth.into());
        if args.auth == AuthArg::Ssh {
            let key = args
                .ssh_key
                .or_else(|| prompt::ask_line("SSH public key: "))
                .unwrap_or_default();
            plan.set_ssh_key(key);
        }
    }
    let plan = workflow.plan();
    emit(&render::catalog(&plan.options(), plan.selection()))?;
    commit(workflow, args.token).await
}

async fn restore(card: &ServerCard, args: RestoreArgs) -> Result<()> {
    let mut workflow = card.restore_workflow().on_complete(|body| {
        tracing::info!(%body, "restore accepted");
    });
    workflow.open().await?;
    if let Some(name) = args.snapshot.as_deref() {
        workflow.plan_mut()?.select(name)?;
    }
    let plan = workflow.plan();
    emit(&render::snapshots(plan.snapshots(), plan.selection()))?;
    commit(workflow, args.token).await
}

/// Confirming and committing, shared by both destructive workflows.
///
/// A mistyped token or a retryable failure re-prompts; an empty answer or EOF
/// closes the workflow. A `--token` value is submitted once.
async fn commit<P: DestructivePlan>(
    mut workflow: DestructiveWorkflow<P>,
    token: Option<String>,
) -> Result<()> {
    workflow.proceed()?;
    emit(&render::summary(&workflow.summary()))?;

    let interactive = token.is_none();
    let mut provided = token;
    loop {
        let typed = match provided.take() {
            Some(typed) => typed,
            None => match prompt::ask_token(workflow.token()) {
                Some(typed) => typed,
                None => {
                    workflow.close();
                    bail!("confirmation cancelled; nothing was sent");
                }
            },
        };
        match workflow.submit(&typed).await {
            Ok(ack) => return emit(&render::ack(&ack)),
            Err(error) if interactive && can_reprompt(&error) => {
                tracing::debug!(stage = %workflow.stage(), "re-prompting after failed submit");
                writeln!(io::stderr().lock(), "{error}")?;
            }
            Err(error) => {
                tracing::debug!(stage = %workflow.stage(), "closing workflow after failed submit");
                workflow.close();
                return Err(error.into());
            }
        }
    }
}

fn can_reprompt(error: &WorkflowError) -> bool {
    match error {
        WorkflowError::TokenMismatch { .. } => true,
        WorkflowError::Action(action) => action.is_retryable(),
        WorkflowError::InvalidTransition { .. } | WorkflowError::Validation(_) => false,
    }
}

async fn admin(connection: &Connection, command: AdminCommand) -> Result<()> {
    let console = AdminConsole::open(connection.session.clone()).await?;
    let AdminCommand::Users { command } = command;
    match command {
        UsersCommand::List => {
            let users = console.list_users().await?;
            emit(&render::users(&users))
        }
        UsersCommand::Add { email, groups } => {
            emit(console.add_user(&email, parse_groups(&groups)).await?)
        }
        UsersCommand::SetGroups { email, groups } => {
            emit(console.update_groups(&email, parse_groups(&groups)).await?)
        }
        UsersCommand::Delete { email, yes } => {
            let Some(deletion) =
                UserDeletion::new(email).confirm_with(|question| prompt::ask_yes_no(question, yes))
            else {
                return emit("Cancelled.");
            };
            emit(console.delete_user(deletion).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn cli_requires_subcommand() {
        let err = match Cli::try_parse_from(["servercon"]) {
            Ok(_) => panic!("expected missing subcommand parse error"),
            Err(err) => err,
        };
        assert_eq!(
            err.kind(),
            ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn power_parses_action_and_global_flags() {
        let cli = Cli::try_parse_from([
            "servercon",
            "power",
            "42",
            "restart",
            "--yes",
            "--base-url",
            "https://console.example.com",
        ])
        .expect("parse");
        assert_eq!(cli.base_url.as_deref(), Some("https://console.example.com"));
        match cli.command {
            Command::Power(args) => {
                assert_eq!(args.server_id, 42);
                assert_eq!(args.action, PowerArg::Restart);
                assert!(args.yes);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn power_rejects_unknown_action() {
        let err = Cli::try_parse_from(["servercon", "power", "42", "hibernate"])
            .expect_err("invalid action");
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn reinstall_defaults_to_os_with_password() {
        let cli = Cli::try_parse_from(["servercon", "reinstall", "42", "--option", "7"])
            .expect("parse");
        match cli.command {
            Command::Reinstall(args) => {
                assert_eq!(args.reinstall_type, ReinstallTypeArg::Os);
                assert_eq!(args.auth, AuthArg::Password);
                assert_eq!(args.option, Some(7));
                assert_eq!(args.token, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn admin_users_subcommands_parse() {
        let cli = Cli::try_parse_from([
            "servercon",
            "admin",
            "users",
            "set-groups",
            "ops@example.com",
            "ops, dev",
        ])
        .expect("parse");
        match cli.command {
            Command::Admin(AdminArgs {
                command:
                    AdminCommand::Users {
                        command: UsersCommand::SetGroups { email, groups },
                    },
            }) => {
                assert_eq!(email, "ops@example.com");
                assert_eq!(parse_groups(&groups), vec!["ops", "dev"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn mistyped_tokens_and_transient_failures_reprompt() {
        use servercon_core::{
            ActionError, AuthFailure, AuthFailureCause, Remedy, ValidationFailure, WorkflowStage,
        };

        let mismatch = WorkflowError::TokenMismatch {
            message: "Type \"CONFIRM\" to proceed".to_string(),
        };
        assert!(can_reprompt(&mismatch));
        assert!(can_reprompt(&WorkflowError::Action(ActionError::Remote {
            status: 502,
            message: "Failed to reinstall server".to_string(),
        })));
        assert!(can_reprompt(&WorkflowError::Action(ActionError::Transport {
            message: "Failed to reinstall server".to_string(),
            detail: "connection reset".to_string(),
        })));

        let signed_out = WorkflowError::Action(ActionError::Auth(AuthFailure {
            cause: AuthFailureCause::Unauthorized { status: 401 },
            remedy: Remedy::HardClear,
        }));
        assert!(!can_reprompt(&signed_out));
        assert!(!can_reprompt(&WorkflowError::Validation(
            ValidationFailure::MissingSshKey
        )));
        assert!(!can_reprompt(&WorkflowError::InvalidTransition {
            action: "submit",
            stage: WorkflowStage::Closed,
        }));
    }

    #[test]
    fn navigator_remembers_last_redirect() {
        let navigator = TerminalNavigator::default();
        assert_eq!(navigator.last(), None);
        navigator.navigate(Redirect::Login);
        navigator.navigate(Redirect::Landing);
        assert_eq!(navigator.last(), Some(Redirect::Landing));
    }
}
