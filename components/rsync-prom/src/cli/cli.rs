use crate::runtime::runtime::{RunOptions, run_wrapper};
use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use rsync_prom::helpers::load_config::{Config, LogFormat, Overrides};
use rsync_prom::instrumentation::tracing::bootstrap_subscriber;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "rsync-prom",
    long_about = "rsync-prom wraps an rsync invocation, parses rsync's transfer totals and pushes them, \
                  with start and exit code markers, to a Prometheus push gateway.",
    about = "rsync wrapper exporting Prometheus metrics",
    version,
    term_width = 100,
    args_conflicts_with_subcommands = true,
    after_help = "\
    EXAMPLES:
        rsync-prom --job nightly_backup -- rsync -av /home/ backup:/srv/home/
        rsync-prom --config /etc/rsync-prom.toml --exit-24-is-exit-0 -- rsync --stats -a src/ dst/
        rsync-prom validate --config /etc/rsync-prom.toml

    rsync must run with --verbose or --stats, without --human-readable, in the C.UTF-8 locale."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    wrap: WrapArgs,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate the configuration file without running anything
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Debug, Args)]
struct WrapArgs {
    /// TOML configuration file, command line flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// URL of the Prometheus push gateway to push metrics to
    #[arg(long = "prometheus-push-gateway", alias = "prometheus_push_gateway")]
    pushgateway: Option<String>,

    /// Prometheus instance label, should be as descriptive as possible and must not contain '/'
    /// [default: rsync@<hostname>]
    #[arg(long)]
    instance: Option<String>,

    /// Prometheus job label, also prefixes the start and exit code metric names [default: rsync]
    #[arg(long)]
    job: Option<String>,

    /// rsync exits with status 24 when a file or directory vanishes between listing and
    /// transferring it. That can be expected (backing up while containers churn) or cause for
    /// concern (replicating an ever-growing data set). When set, exit code 24 is pushed as 0.
    #[arg(long, alias = "exit_24_is_exit_0")]
    exit_24_is_exit_0: bool,

    /// Copy rsync's output to stdout while parsing it
    #[arg(long)]
    echo_output: bool,

    /// Log metric readings instead of pushing them
    #[arg(long)]
    dry_publish: bool,

    /// Exit with rsync's exit code instead of 0 once metrics were pushed
    #[arg(long)]
    propagate_exit_code: bool,

    /// Log output format on stderr
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Additionally write logs to a daily rotated file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// The rsync command line to wrap, usually after `--`
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

impl WrapArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            pushgateway: self.pushgateway.clone(),
            instance: self.instance.clone(),
            job: self.job.clone(),
            exit_24_is_exit_0: self.exit_24_is_exit_0,
            echo_output: self.echo_output,
            log_format: self.log_format,
            log_dir: self.log_dir.clone(),
        }
    }
}

/// Entry function for CLI
pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Validate { config }) => validate_config(config),
        None => wrap(cli.wrap).await,
    }
}

//
// ------------------------ Command Implementations ------------------------------
//

async fn wrap(args: WrapArgs) -> Result<ExitCode> {
    if args.command.is_empty() {
        bail!("no command given, usage: rsync-prom [OPTIONS] -- rsync <ARGS>...");
    }

    // the configured subscriber needs the configuration first
    let config = tracing::subscriber::with_default(bootstrap_subscriber(), || {
        let mut config = Config::load_or_default(args.config.as_deref())?;
        config.apply_overrides(args.overrides());
        config.validate()?;
        anyhow::Ok(config)
    })?;

    let options = RunOptions {
        dry_publish: args.dry_publish,
        propagate_exit_code: args.propagate_exit_code,
    };
    run_wrapper(config, args.command, options).await
}

/// Validate configuration file
fn validate_config(config: PathBuf) -> Result<ExitCode> {
    println!("Validating configuration file: {:?}", config);
    let cfg = tracing::subscriber::with_default(bootstrap_subscriber(), || Config::load(&config))?;
    cfg.validate()?;
    println!("Configuration valid:\n{:#?}", cfg);
    Ok(ExitCode::SUCCESS)
}
