// fieldaudit CLI - audit XML documents against a relational store

mod audit;
mod exit_codes;
mod resolve;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "fieldaudit")]
#[command(about = "Compare XML document fields with the records stored for them")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG wins when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an audit from a TOML config file
    #[command(after_help = "\
Examples:
  fieldaudit run audit.toml
  fieldaudit run audit.toml --json
  fieldaudit run audit.toml --output result.json --csv rows.csv
  fieldaudit run audit.toml --strict")]
    Run {
        /// Path to the audit config file
        config: PathBuf,

        /// Write the JSON result to stdout instead of a human summary
        #[arg(long)]
        json: bool,

        /// Write the JSON result to a file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write comparison rows as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Exit 3 when any field is not a match
        #[arg(long)]
        strict: bool,
    },

    /// Check a config and its mapping sheet without touching the store
    #[command(after_help = "\
Examples:
  fieldaudit validate audit.toml")]
    Validate {
        /// Path to the audit config file
        config: PathBuf,
    },

    /// Evaluate one path expression against one XML document
    #[command(after_help = "\
Examples:
  fieldaudit resolve invoice.xml 'Invoice/Header/Number'
  fieldaudit resolve invoice.xml 'Lines/ROW[2]/Sku | Lines/ROW[2]/Code' --explain
  fieldaudit resolve invoice.xml 'Street + City' --separator ', '")]
    Resolve {
        /// XML document
        document: PathBuf,

        /// Path expression (`A/B[2]`, `a + b`, `a | b`, `<A> <B>`)
        path: String,

        /// Separator between concatenated values
        #[arg(long, default_value = fieldaudit_recon::resolve::DEFAULT_SEPARATOR)]
        separator: String,

        /// Show every strategy attempt on stderr
        #[arg(long)]
        explain: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("FIELDAUDIT_COMMIT"),
        ")",
        "\nengine:  fieldaudit-recon ",
        env!("CARGO_PKG_VERSION"),
        "\ntarget:  ",
        env!("FIELDAUDIT_TARGET"),
    )
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Run {
            config,
            json,
            output,
            csv,
            strict,
        } => audit::cmd_run(audit::RunArgs {
            config,
            json,
            output,
            csv,
            strict,
            quiet: cli.quiet,
        }),
        Commands::Validate { config } => audit::cmd_validate(config),
        Commands::Resolve {
            document,
            path,
            separator,
            explain,
        } => resolve::cmd_resolve(document, &path, &separator, explain),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            hint: None,
        }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
