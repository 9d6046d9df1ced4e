//! Config validation CLI tool
//!
//! Validates a beckon configuration file and reports any errors.

use beckon_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a beckon configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match beckon_config::load_config(&config_path) {
        Ok(policy) => {
            let scheduler = &policy.scheduler;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", beckon_config::CURRENT_CONFIG_VERSION);
            println!("  Calls by name: {}", scheduler.by_name_attempts);
            println!("  Special phrase calls: {}", scheduler.phrase_attempts());
            println!("  Notification queue: {}", scheduler.notification_queue);
            println!("  Session logs: {}", policy.log.dir.display());
            println!("  Player: {}", policy.relay.player.join(" "));
            println!("  Name sound: {}", policy.relay.name_sound.display());
            println!("  Phrase sound: {}", policy.relay.phrase_sound.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                beckon_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                beckon_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                beckon_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                beckon_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        beckon_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
