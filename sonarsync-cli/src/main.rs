//! sonarsync: converge one SonarQube user group to a declared state.
//!
//! Reads flat parameters from flags or a JSON argument file, runs a single
//! reconciliation and prints the result as one JSON object on stdout. Logs
//! go to stderr.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sonarsync_core::sonarqube::UserGroups;
use sonarsync_core::{Error, HttpTransport, Outcome, Presence, Reconciler};

mod output;
mod params;

use output::ModuleResult;
use params::{ModuleParams, RunSpec};

/// Ensure a SonarQube user group is present or absent
#[derive(Parser)]
#[command(name = "sonarsync", version, about)]
struct Args {
    /// SonarQube base URL (e.g., http://localhost:9000)
    #[arg(long)]
    url: Option<String>,

    /// API token, sent as basic-auth user name with an empty password
    #[arg(long, env = "SONAR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Group name
    #[arg(short, long)]
    name: Option<String>,

    /// Group description, used when the group is created
    #[arg(short, long)]
    description: Option<String>,

    /// Desired state: present or absent
    #[arg(short, long)]
    state: Option<Presence>,

    /// Report what would change without changing anything
    #[arg(long)]
    check: bool,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// JSON file with the same parameters; flags take precedence
    #[arg(long)]
    args_file: Option<PathBuf>,
}

impl Args {
    fn into_params(self) -> anyhow::Result<ModuleParams> {
        let flags = ModuleParams {
            url: self.url,
            token: self.token,
            name: self.name,
            description: self.description,
            state: self.state,
            check_mode: self.check.then_some(true),
            runner_check_mode: None,
            validate_certs: self.insecure.then_some(false),
            timeout: self.timeout,
        };
        match self.args_file {
            Some(path) => Ok(flags.or(ModuleParams::from_file(&path)?)),
            None => Ok(flags),
        }
    }
}

/// Why a command line did not produce a run.
enum Rejected {
    /// Help or version text, printed by clap itself.
    Display(clap::Error),
    Invalid(ModuleResult),
}

/// Parse and validate a command line. Usage errors become a failed result
/// document like any other invalid input.
fn load<I, T>(argv: I) -> Result<RunSpec, Rejected>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::try_parse_from(argv).map_err(|e| match e.kind() {
        ClapErrorKind::DisplayHelp
        | ClapErrorKind::DisplayVersion
        | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => Rejected::Display(e),
        _ => Rejected::Invalid(ModuleResult::failure(&Error::InvalidInput(usage_error(&e)))),
    })?;
    let params = args.into_params().map_err(|e| {
        Rejected::Invalid(ModuleResult::failure(&Error::InvalidInput(format!("{e:#}"))))
    })?;
    params
        .resolve()
        .map_err(|e| Rejected::Invalid(ModuleResult::failure(&e)))
}

/// First line of a clap error without its `error: ` prefix.
fn usage_error(err: &clap::Error) -> String {
    let text = err.to_string();
    let line = text.lines().next().unwrap_or_default();
    line.strip_prefix("error: ").unwrap_or(line).trim().to_string()
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sonarsync=info,sonarsync_core=info,reqwest=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match load(std::env::args_os()) {
        Ok(spec) => run(spec).await,
        Err(Rejected::Display(e)) => e.exit(),
        Err(Rejected::Invalid(result)) => result,
    };

    match serde_json::to_string(&result) {
        Ok(doc) => println!("{doc}"),
        Err(e) => {
            error!("Failed to serialize result: {}", e);
            return ExitCode::FAILURE;
        }
    }
    ExitCode::from(result.exit_code())
}

async fn run(spec: RunSpec) -> ModuleResult {
    info!(
        "Reconciling group '{}' to {} at {}",
        spec.desired.key,
        spec.desired.presence,
        spec.endpoint.base_url()
    );
    if !spec.config.verify_tls {
        warn!("TLS certificate verification is disabled");
    }

    match reconcile(spec).await {
        Ok(outcome) => {
            info!("{}", outcome.message);
            ModuleResult::success(outcome)
        }
        Err(e) => {
            error!("{}", e);
            ModuleResult::failure(&e)
        }
    }
}

async fn reconcile(spec: RunSpec) -> sonarsync_core::Result<Outcome> {
    let transport = HttpTransport::new(spec.endpoint, &spec.config)?;
    let groups = Reconciler::new(Arc::new(transport), UserGroups::new());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    if spec.check_mode {
        groups.check_with_cancel(&spec.desired, &cancel).await
    } else {
        groups.reconcile_with_cancel(&spec.desired, &cancel).await
    }
}
