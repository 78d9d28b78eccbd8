//! Config validation CLI tool
//!
//! Validates a powerwatchd configuration file, compiles both policy
//! expressions and reports any errors.

use powerwatch_api::policy_schema;
use powerwatch_config::{ConfigError, load_raw_config, settings_from_raw};
use powerwatch_expr::Predicate;
use powerwatch_util::default_config_path;
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
            eprintln!("Validates a powerwatchd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    // Server and topic may be left to the command line.
    let mut missing = Vec::new();
    let result = load_raw_config(&config_path).and_then(|mut raw| {
        if raw.mqtt.server.is_none() {
            missing.push("mqtt.server");
            raw.mqtt.server = Some("localhost:1883".into());
        }
        if raw.mqtt.topic.is_none() {
            missing.push("mqtt.topic");
            raw.mqtt.topic = Some("-".into());
        }
        settings_from_raw(raw)
    });

    let settings = match result {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        powerwatch_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            return ExitCode::from(1);
        }
    };

    let schema = policy_schema();
    let mut compile_failed = false;
    for (name, source) in [
        ("arm_expr", &settings.policy.arm_expr),
        ("disarm_expr", &settings.policy.disarm_expr),
    ] {
        if let Err(e) = Predicate::compile(source, &schema) {
            if !compile_failed {
                eprintln!("✗ Policy expression compilation failed");
                eprintln!();
            }
            eprintln!("  - {} '{}': {}", name, source, e);
            compile_failed = true;
        }
    }
    if compile_failed {
        return ExitCode::from(1);
    }

    println!("✓ Configuration is valid");
    println!();
    println!("Summary:");
    println!("  Config version: {}", powerwatch_config::CURRENT_CONFIG_VERSION);
    if missing.contains(&"mqtt.server") {
        println!("  Server: (not set; pass --server)");
    } else {
        println!("  Server: {}", settings.mqtt.server());
    }
    if missing.contains(&"mqtt.topic") {
        println!("  Topic: (not set; pass --topic)");
    } else {
        println!("  Topic: {}", settings.mqtt.topic);
    }
    println!("  Arm: {}", settings.policy.arm_expr);
    println!("  Disarm: {}", settings.policy.disarm_expr);
    println!(
        "  Recovery period: {}",
        humantime::format_duration(settings.policy.recovery_period)
    );
    println!("  Strict: {}", settings.policy.strict);
    println!("  Shutdown command: {}", settings.shutdown.command.join(" "));

    ExitCode::SUCCESS
}
