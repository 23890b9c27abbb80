use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;
mod output;

use commands::{CommandError, ToolCommand};
use config::{AppConfig, AppState};

#[derive(Parser, Debug)]
#[command(name = "toolreg")]
#[command(about = "Register source-code tools and manage their document stores", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "TOOLREG_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Log more (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage registered tools
    #[command(subcommand)]
    Tool(ToolCommand),
}

fn init_tracing(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    // Logs go to stderr; stdout carries command output
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn run(args: Args) -> Result<(), CommandError> {
    let config = AppConfig::load(&args.config).map_err(anyhow::Error::from)?;
    let state = AppState::new(config)?;

    let Command::Tool(command) = args.command;
    let stdout = std::io::stdout();
    commands::run(&state, command, &mut stdout.lock())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose, args.log_json);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_add() {
        let args = Args::try_parse_from([
            "toolreg", "-vv", "tool", "add", "-n", "alpha", "-d", "desc", "-s", "/tmp",
        ])
        .unwrap();

        assert_eq!(args.verbose, 2);
        assert_eq!(args.config, PathBuf::from("config.toml"));
        match args.command {
            Command::Tool(ToolCommand::Add {
                name, app_version, ..
            }) => {
                assert_eq!(name, "alpha");
                assert_eq!(app_version, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_list_format() {
        let args = Args::try_parse_from([
            "toolreg", "tool", "list", "--active", "--format", "json", "--config", "other.toml",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("other.toml"));
        assert!(matches!(
            args.command,
            Command::Tool(ToolCommand::List {
                active: true,
                format: Some(output::OutputFormat::Json)
            })
        ));
    }

    #[test]
    fn test_add_requires_source() {
        assert!(Args::try_parse_from(["toolreg", "tool", "add", "-n", "alpha", "-d", "x"]).is_err());
    }
}
