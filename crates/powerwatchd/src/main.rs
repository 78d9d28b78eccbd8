//! powerwatchd - The powerwatch background service
//!
//! This is the main entry point for the powerwatchd service.
//! It wires together all the components:
//! - Configuration loading (file, then command line)
//! - Policy compilation
//! - Debounce engine and serial dispatcher
//! - Shutdown action (Linux)
//! - MQTT transport

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use powerwatch_api::{InboundMessage, Validator};
use powerwatch_config::{
    ConfigError, ConfigResult, RawConfig, Settings, settings_from_raw, load_raw_config,
};
use powerwatch_core::{
    CoreEvent, CoreEventReceiver, DebounceEngine, DispatchError, Dispatcher, PolicySet,
};
use powerwatch_host_linux::{CommandShutdown, default_client_id};
use powerwatch_mqtt::{MqttSubscriber, TransportError};
use powerwatch_util::{POWERWATCH_CONFIG_ENV, default_config_path};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "powerwatchd";

/// Capacity of the transport -> dispatcher mailbox
const MAILBOX_CAPACITY: usize = 64;

/// Exit code for missing or invalid configuration
const EXIT_INVALID_ARGUMENT: u8 = 2;

/// LSB "program is not configured" exit code
const EXIT_NOT_CONFIGURED: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// powerwatchd - Shut the machine down when utility power stays out
#[derive(Parser, Debug)]
#[command(name = "powerwatchd", version)]
#[command(
    about = "Subscribes to an MQTT topic and shuts the system down when utility power stays out",
    after_help = "The arm and disarm expressions can use these variables:\n  \
        powerType  int     power source (1 = utility, 2 = generator, 3 = battery, 4 = solar, 5 = unknown, 6 = other)\n  \
        online     bool    whether that power source is available\n  \
        scope      string  locality of the event (e.g. 'global')"
)]
struct Args {
    /// Configuration file path (default: /etc/powerwatchd/config.toml or ~/.config/powerwatchd/config.toml)
    #[arg(short, long, env = POWERWATCH_CONFIG_ENV)]
    config: Option<PathBuf>,

    /// MQTT server and port, e.g. 'mymqttserver.lan:1883'
    #[arg(long, env = "POWERWATCH_SERVER")]
    server: Option<String>,

    /// MQTT topic to subscribe to
    #[arg(long, env = "POWERWATCH_TOPIC")]
    topic: Option<String>,

    /// MQTT username
    #[arg(long, env = "POWERWATCH_USER")]
    user: Option<String>,

    /// MQTT password
    #[arg(long, env = "POWERWATCH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Seconds a session survives after disconnection (default: 300)
    #[arg(long)]
    session_expiry: Option<u32>,

    /// Delay between power loss and shutdown, e.g. '3m' (default: 3m)
    #[arg(long)]
    recovery_period: Option<String>,

    /// Expression deciding whether an event schedules a shutdown
    #[arg(long, visible_alias = "down-expr")]
    arm_expr: Option<String>,

    /// Expression deciding whether an event cancels a pending shutdown
    #[arg(long, visible_alias = "recovered-expr")]
    disarm_expr: Option<String>,

    /// Exit on invalid messages, unexpected topics and evaluation failures
    #[arg(long)]
    strict: bool,

    /// Reject events whose scope is not global, local, 1p or 1c
    #[arg(long)]
    validate_scope: bool,

    /// Enable debug-level logging (same as --log-level debug)
    #[arg(long)]
    debug: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print instructions on configuring the systemd unit, then exit
    #[arg(long)]
    help_systemd_usage: bool,
}

impl Args {
    /// Command-line values as a config layer; unset flags stay unset.
    fn to_raw(&self) -> RawConfig {
        let mut raw = RawConfig::default();
        raw.mqtt.server = self.server.clone();
        raw.mqtt.topic = self.topic.clone();
        raw.mqtt.username = self.user.clone();
        raw.mqtt.password = self.password.clone();
        raw.mqtt.session_expiry_seconds = self.session_expiry;
        raw.policy.arm_expr = self.arm_expr.clone();
        raw.policy.disarm_expr = self.disarm_expr.clone();
        raw.policy.recovery_period = self.recovery_period.clone();
        raw.policy.strict = self.strict.then_some(true);
        raw.policy.validate_scope = self.validate_scope.then_some(true);
        raw
    }
}

/// Merge the config file (if any) under the command line and validate.
fn load_settings(args: &Args) -> ConfigResult<Settings> {
    let file = match &args.config {
        Some(path) => Some(load_raw_config(path)?),
        None => {
            let path = default_config_path();
            if path.exists() {
                Some(load_raw_config(&path)?)
            } else {
                debug!(path = %path.display(), "No configuration file; using command line only");
                None
            }
        }
    };

    let raw = file.unwrap_or_default().overlay(args.to_raw());
    settings_from_raw(raw)
}

fn init_logging(args: &Args) {
    let level = if args.debug { "debug" } else { args.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn print_systemd_usage() {
    eprintln!("To use the powerwatchd systemd service, you must customize the service file via:");
    eprintln!();
    eprintln!("  sudo systemctl edit powerwatchd.service");
    eprintln!();
    eprintln!("Customize the [Service] ExecStart line to include the desired arguments.");
    eprintln!("For example, to set the MQTT server and topic (the minimal required arguments), add the following to your edit:");
    eprintln!();
    eprintln!("  [Service]");
    eprintln!("  ExecStart=");
    eprintln!("  ExecStart=/usr/bin/powerwatchd --server mymqttserver.lan:1883 --topic power/alarms");
    eprintln!();
    eprintln!("(Both ExecStart= lines are required: the empty one clears the packaged command.)");
    eprintln!();
    eprintln!("Alternatively, put the settings in /etc/powerwatchd/config.toml.");
    eprintln!();
    eprintln!("After saving and closing the editor, reload systemd and restart the service:");
    eprintln!();
    eprintln!("  sudo systemctl daemon-reload");
    eprintln!("  sudo systemctl restart powerwatchd");
}

fn print_config_error(e: &ConfigError) {
    match e {
        ConfigError::ValidationFailed { errors } => {
            eprintln!("Invalid configuration:");
            for err in errors {
                eprintln!("  - {}", err);
            }
        }
        other => eprintln!("Invalid configuration: {}", other),
    }
    eprintln!();
    eprintln!("Run '{} --help' for usage.", APP_NAME);
}

/// Main service state
struct Service {
    engine: DebounceEngine,
    core_events: CoreEventReceiver,
    dispatcher: Dispatcher,
    subscriber: MqttSubscriber,
}

impl Service {
    fn new(settings: &Settings) -> Result<Self> {
        let policy = PolicySet::compile(&settings.policy.arm_expr, &settings.policy.disarm_expr)
            .context("Failed to compile policy expressions")?;

        let action = Arc::new(CommandShutdown::new(settings.shutdown.command.clone()));
        let (engine, core_events) =
            DebounceEngine::new(policy, settings.policy.recovery_period, action);

        let validator = Validator::new().with_scope_check(settings.policy.validate_scope);
        let dispatcher = Dispatcher::new(settings.mqtt.topic.clone(), engine.clone())
            .strict(settings.policy.strict)
            .validator(validator);

        let client_id = settings
            .mqtt
            .client_id
            .clone()
            .unwrap_or_else(|| default_client_id(APP_NAME));
        info!(client_id = %client_id, "Using client ID");

        let subscriber = MqttSubscriber::new(&settings.mqtt, &client_id);

        Ok(Self {
            engine,
            core_events,
            dispatcher,
            subscriber,
        })
    }

    async fn run(self) -> Result<()> {
        let Self {
            engine,
            mut core_events,
            dispatcher,
            subscriber,
        } = self;

        let (mailbox_tx, mailbox_rx) = mpsc::channel::<InboundMessage>(MAILBOX_CAPACITY);

        let mqtt = subscriber.handle();
        let mut transport: JoinHandle<Result<(), TransportError>> =
            tokio::spawn(subscriber.run(mailbox_tx));
        let mut dispatch: JoinHandle<Result<(), DispatchError>> =
            tokio::spawn(dispatcher.run(mailbox_rx));

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let stop = async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
        };

        info!("Service running");

        let result = supervise(stop, &mut core_events, &mut dispatch, &mut transport).await;

        info!("Shutting down powerwatchd");

        engine.shutdown();
        if let Err(e) = mqtt.disconnect().await {
            warn!(error = %e, "Failed to disconnect from broker");
        }
        transport.abort();
        dispatch.abort();

        match &result {
            Ok(()) => info!("Shutdown complete"),
            Err(e) => error!(error = %format!("{:#}", e), "Exiting after fatal error"),
        }
        result
    }
}

/// Wait for the first reason to stop: `stop` resolving, the dispatcher or
/// transport task ending, or a fatal core event.
async fn supervise(
    stop: impl Future<Output = ()>,
    core_events: &mut CoreEventReceiver,
    dispatch: &mut JoinHandle<Result<(), DispatchError>>,
    transport: &mut JoinHandle<Result<(), TransportError>>,
) -> Result<()> {
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => return Ok(()),

            res = &mut *dispatch => {
                return match res {
                    Ok(Ok(())) => Err(anyhow!("Dispatcher stopped: transport closed the mailbox")),
                    Ok(Err(e)) => {
                        let kind = e.kind();
                        Err(anyhow::Error::new(e).context(format!("Dispatcher stopped on {} error", kind)))
                    }
                    Err(e) => Err(anyhow::Error::new(e).context("Dispatcher task failed")),
                };
            }

            res = &mut *transport => {
                return match res {
                    Ok(Ok(())) => Err(anyhow!("Transport stopped")),
                    Ok(Err(e)) => Err(anyhow::Error::new(e).context("Transport failed")),
                    Err(e) => Err(anyhow::Error::new(e).context("Transport task failed")),
                };
            }

            Some(event) = core_events.recv() => {
                match event {
                    CoreEvent::ShutdownFailed { arm_id, error } => {
                        return Err(anyhow!("Shutdown action failed (arm {}): {}", arm_id, error));
                    }
                    CoreEvent::ShutdownInvoked { arm_id } => {
                        info!(arm_id = %arm_id, "Shutdown in progress; waiting for termination");
                    }
                    other => debug!(event = ?other, "Core event"),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    if args.help_systemd_usage {
        print_systemd_usage();
        return Ok(ExitCode::from(EXIT_NOT_CONFIGURED));
    }

    init_logging(&args);

    info!(version = env!("CARGO_PKG_VERSION"), "powerwatchd starting");

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            print_config_error(&e);
            return Ok(ExitCode::from(EXIT_INVALID_ARGUMENT));
        }
    };

    info!(
        server = %settings.mqtt.server(),
        topic = %settings.mqtt.topic,
        strict = settings.policy.strict,
        validate_scope = settings.policy.validate_scope,
        "Configuration loaded"
    );

    let service = Service::new(&settings)?;
    service.run().await?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("powerwatchd").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn legacy_expression_flags_are_aliases() {
        let args = parse(&["--down-expr", "!online", "--recovered-expr", "online"]);
        assert_eq!(args.arm_expr.as_deref(), Some("!online"));
        assert_eq!(args.disarm_expr.as_deref(), Some("online"));
    }

    #[test]
    fn unset_flags_do_not_override_file() {
        let raw = parse(&[]).to_raw();
        assert_eq!(raw.policy.strict, None);
        assert_eq!(raw.policy.validate_scope, None);
        assert_eq!(raw.mqtt.server, None);

        let raw = parse(&["--strict"]).to_raw();
        assert_eq!(raw.policy.strict, Some(true));
    }

    #[test]
    fn command_line_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            config_version = 1
            [mqtt]
            server = "file.lan:1883"
            topic = "power/alarms"
            [policy]
            recovery_period = "5m"
            "#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let args = parse(&["--config", path, "--recovery-period", "90s"]);
        let settings = load_settings(&args).unwrap();
        assert_eq!(settings.mqtt.host, "file.lan");
        assert_eq!(settings.policy.recovery_period, Duration::from_secs(90));
    }

    #[test]
    fn missing_topic_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "config_version = 1").unwrap();
        let path = file.path().to_str().unwrap();

        let args = parse(&["--config", path, "--server", "mqtt.lan:1883"]);
        match load_settings(&args) {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].to_string(), "mqtt.topic is required");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn non_boolean_expression_fails_startup() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "config_version = 1").unwrap();
        let path = file.path().to_str().unwrap();

        let args = parse(&[
            "--config", path, "--server", "mqtt.lan:1883", "--topic", "power/alarms",
            "--arm-expr", "powerType",
        ]);
        let settings = load_settings(&args).unwrap();
        let err = Service::new(&settings).err().unwrap();
        assert!(format!("{:#}", err).contains("Failed to compile policy expressions"));
    }

    fn wire(
        mock: &powerwatch_host_api::MockShutdown,
        strict: bool,
    ) -> (
        CoreEventReceiver,
        mpsc::Sender<InboundMessage>,
        JoinHandle<Result<(), DispatchError>>,
    ) {
        let policy = PolicySet::compile("!online", "online").unwrap();
        let (engine, core_events) =
            DebounceEngine::new(policy, Duration::from_secs(30), Arc::new(mock.clone()));
        let dispatcher = Dispatcher::new("power/alarms", engine).strict(strict);
        let (tx, rx) = mpsc::channel(8);
        (core_events, tx, tokio::spawn(dispatcher.run(rx)))
    }

    fn idle_transport() -> JoinHandle<Result<(), TransportError>> {
        tokio::spawn(std::future::pending())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_shutdown_ends_service_with_error() {
        let mock = powerwatch_host_api::MockShutdown::failing();
        let (mut core_events, tx, mut dispatch) = wire(&mock, false);
        let mut transport = idle_transport();

        tx.send(InboundMessage::new("power/alarms", r#"{"up":false,"type":1}"#))
            .await
            .unwrap();

        let err = supervise(
            std::future::pending(),
            &mut core_events,
            &mut dispatch,
            &mut transport,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Shutdown action failed"));
        assert_eq!(mock.invocations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn strict_dispatch_error_ends_service_with_error() {
        let mock = powerwatch_host_api::MockShutdown::new();
        let (mut core_events, tx, mut dispatch) = wire(&mock, true);
        let mut transport = idle_transport();

        tx.send(InboundMessage::new("power/alarms", r#"{"up":false,"type":42}"#))
            .await
            .unwrap();

        let err = supervise(
            std::future::pending(),
            &mut core_events,
            &mut dispatch,
            &mut transport,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("invalid_schema"));
        assert_eq!(mock.invocations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_subscription_ends_service_with_error() {
        let mock = powerwatch_host_api::MockShutdown::new();
        let (mut core_events, _tx, mut dispatch) = wire(&mock, false);
        let mut transport: JoinHandle<Result<(), TransportError>> = tokio::spawn(async {
            Err(TransportError::SubscriptionRejected {
                topic: "power/alarms".into(),
                reason: "NotAuthorized".into(),
            })
        });

        let err = supervise(
            std::future::pending(),
            &mut core_events,
            &mut dispatch,
            &mut transport,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Transport failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_ends_service_cleanly() {
        let mock = powerwatch_host_api::MockShutdown::new();
        let (mut core_events, _tx, mut dispatch) = wire(&mock, false);
        let mut transport = idle_transport();

        supervise(
            std::future::ready(()),
            &mut core_events,
            &mut dispatch,
            &mut transport,
        )
        .await
        .unwrap();
    }
}
