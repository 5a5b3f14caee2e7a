use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

use hookwrap::config::Config;
use hookwrap::hooks::{Phase, PhaseRunner};
use hookwrap::{doctor, util};

/// Staged lifecycle hooks around wrapped build/deploy commands.
#[derive(Parser, Debug)]
#[command(name = "hookwrap")]
#[command(version)]
#[command(about = "Run pre_build/build_env/build/deploy_env/deploy hooks around a wrapped command", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "HOOKWRAP_CONFIG")]
    config: Option<PathBuf>,

    /// Hook directory (overrides the config file and HOOKWRAP_HOOKS)
    #[arg(long, global = true)]
    hooks: Option<PathBuf>,

    /// Abort when a hook exists without the executable bit
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the assemble-phase hooks around the original assemble command
    Assemble {
        /// Original assemble command (overrides the config)
        #[arg(long)]
        original: Option<PathBuf>,

        /// Arguments forwarded to the original command (after `--`)
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Run the deploy-phase hooks, then become the original run command.
    /// There is no post-deploy stage: nothing can run in this process
    /// after the exec handoff.
    Run {
        /// Original run command (overrides the config)
        #[arg(long)]
        original: Option<PathBuf>,

        /// Arguments forwarded to the original command (after `--`)
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Report the state of every hook in the hook directory
    Check,

    /// Print `export` lines for a phase's inline environment hook,
    /// suitable for `eval` in an interactively attached shell
    Env {
        /// Which phase's environment hook to evaluate
        #[arg(long, value_enum, default_value = "run")]
        phase: PhaseArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PhaseArg {
    Assemble,
    Run,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Assemble => Phase::Assemble,
            PhaseArg::Run => Phase::Run,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout belongs to the wrapped commands and
    // to `env` output. Respects RUST_LOG, defaults to INFO.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{e:#}");
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(hooks) = cli.hooks {
        config.hooks_dir = hooks;
    }
    if cli.strict {
        config.strict = true;
    }

    let runner = PhaseRunner::new(&config.hooks_dir).strict(config.strict);

    match cli.command {
        Commands::Assemble { original, args } => {
            let original = original.unwrap_or(config.assemble_original);
            match runner.run_assemble(&original, &args) {
                Ok(result) => Ok(result.exit_code()),
                Err(e) => {
                    error!("assemble phase failed: {e}");
                    Ok(e.exit_code())
                }
            }
        }
        Commands::Run { original, args } => {
            let original = original.unwrap_or(config.run_original);
            match runner.run_deploy(&original, &args) {
                Ok(never) => match never {},
                Err(e) => {
                    error!("run phase failed: {e}");
                    Ok(e.exit_code())
                }
            }
        }
        Commands::Check => Ok(if doctor::run(&config.hooks_dir) { 0 } else { 1 }),
        Commands::Env { phase } => {
            let exports = runner.env_exports(phase.into())?;
            for (name, value) in exports {
                println!("export {}={}", name, util::shell_single_quote(&value));
            }
            Ok(0)
        }
    }
}
