mod cli;
mod clickhouse;
mod config;
mod engine;
mod error;
mod utilities;

use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let config_path = config::resolve_config_path(cli.config.as_deref());
    let loaded = config::load(&config_path).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });
    let chkit_config = config::apply_env_overrides(loaded);

    cli::logger::setup_logging(&cli::logger::LoggerSettings {
        level: cli::logger::LoggerLevel::Info,
        format: cli::logger::LogFormat::Text,
        stdout: false,
    });

    // The async runtime is built explicitly, not via #[tokio::main], so
    // argument parsing, config loading, and logging setup run in a plain
    // synchronous prelude before any executor exists.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create Tokio runtime");

    let exit_code = runtime.block_on(cli::run(cli, chkit_config));
    ExitCode::from(exit_code as u8)
}
