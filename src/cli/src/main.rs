//! Warden CLI - inspect and edit hierarchical authorization policies.
//!
//! Provides check, matrix, tree, group, grant/revoke, and list commands over a
//! policy file.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{check, grant, group, list, report, Context};
use output::OutputFormat;
use warden_core::config::Config;
use warden_core::telemetry::{init_telemetry, LoggingConfig, TelemetryConfig};

/// Warden - hierarchical authorization for agent tools
#[derive(Parser)]
#[command(
    name = "warden",
    version,
    about = "Warden - hierarchical authorization for agent tools",
    long_about = "Check, report on, and edit a policy of API keys, groups, and tool → mcp → agent resources.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Policy file [default: policy.path, then ~/.warden/policy.csv]
    #[arg(short, long, global = true)]
    policy: Option<PathBuf>,

    /// Configuration file (toml, yaml or json)
    #[arg(short, long, global = true, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Emit engine logs to stderr using the configured logging settings
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether a principal may act on a resource
    Check(check::CheckArgs),

    /// Principal × leaf-resource decision table
    Matrix(report::MatrixArgs),

    /// Nested view of a hierarchy
    Tree(report::TreeArgs),

    /// Membership and containment edits
    #[command(subcommand)]
    Group(group::GroupCommands),

    /// Grant a permission
    Grant(grant::GrantArgs),

    /// Revoke a permission
    Revoke(grant::GrantArgs),

    /// List stored rules
    #[command(subcommand)]
    List(list::ListCommands),
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    let logging = if cli.verbose {
        config.logging.clone()
    } else {
        LoggingConfig::quiet()
    };
    init_telemetry(&TelemetryConfig::with_logging(logging))?;

    let ctx = Context::open(cli.policy, config, cli.output)?;
    tracing::debug!(policy = %ctx.policy_path().display(), "Running command");

    match cli.command {
        Commands::Check(args) => check::execute(args, &ctx),
        Commands::Matrix(args) => report::matrix(args, &ctx),
        Commands::Tree(args) => report::tree(args, &ctx),
        Commands::Group(cmd) => group::execute(cmd, &ctx),
        Commands::Grant(args) => grant::grant(args, &ctx),
        Commands::Revoke(args) => grant::revoke(args, &ctx),
        Commands::List(cmd) => list::execute(cmd, &ctx),
    }
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_group_add_resource() {
        let cli = Cli::try_parse_from([
            "warden", "--output", "json", "group", "add", "tool123", "mcp12", "--resource",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Group(group::GroupCommands::Add(ref a)) if a.resource));
    }

    #[test]
    fn test_parse_check_with_action() {
        let cli = Cli::try_parse_from(["warden", "check", "bob", "tool111", "-a", "call"]).unwrap();
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.principal, "bob");
                assert_eq!(args.action.as_deref(), Some("call"));
            }
            _ => panic!("expected check"),
        }
    }
}
