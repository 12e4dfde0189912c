//! # flightmon
//!
//! Flight Monitor binary: wires the catalog, the simulated telemetry source
//! and the WebSocket server together and runs until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use flightmon_core::VariableCatalog;
use flightmon_server::metrics::install_recorder;
use flightmon_server::shutdown::ShutdownCoordinator;
use flightmon_server::{FlightMonitorServer, Monitor, MonitorConfig, ServerConfig};
use flightmon_settings::{FlightMonitorSettings, LogFormat};
use flightmon_sim::SimulatedSource;

/// Flight Monitor telemetry bridge.
#[derive(Parser, Debug)]
#[command(name = "flightmon", about = "Stream flight simulator telemetry to WebSocket clients")]
struct Cli {
    /// Settings file (default `~/.flightmon/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Variable catalog file.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Sample/broadcast period in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Log output format.
    #[arg(long, value_enum)]
    log_format: Option<CliLogFormat>,

    /// Log filter directive, e.g. `debug` or `flightmon_server=trace`.
    #[arg(long)]
    log_level: Option<String>,

    /// Start without connecting to the telemetry source.
    #[arg(long)]
    no_connect: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CliLogFormat {
    Pretty,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Pretty => Self::Pretty,
            CliLogFormat::Json => Self::Json,
        }
    }
}

impl Cli {
    /// Command-line flags override every other settings layer.
    fn apply(&self, settings: &mut FlightMonitorSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref catalog) = self.catalog {
            settings.monitor.catalog_path = catalog.display().to_string();
        }
        if let Some(ms) = self.poll_interval_ms {
            settings.monitor.poll_interval_ms = ms;
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format.into();
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.no_connect {
            settings.monitor.connect_on_start = false;
        }
    }
}

fn load_settings(cli: &Cli) -> Result<FlightMonitorSettings> {
    let mut settings = match cli.config {
        Some(ref path) => flightmon_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => flightmon_settings::load_settings().context("Failed to load settings")?,
    };
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn load_catalog(path: &Path) -> Result<VariableCatalog> {
    let catalog = VariableCatalog::load(path)
        .with_context(|| format!("Failed to load variable catalog {}", path.display()))?;
    tracing::info!(path = %path.display(), variables = catalog.len(), "variable catalog loaded");
    Ok(catalog)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    flightmon_logging::init_subscriber(&settings.logging)
        .context("Failed to initialise logging")?;

    let catalog = Arc::new(load_catalog(Path::new(&settings.monitor.catalog_path))?);
    let metrics_handle = install_recorder();

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let source = Arc::new(SimulatedSource::new());
    let monitor = Arc::new(Monitor::new(
        catalog,
        source,
        MonitorConfig::from(&settings),
        shutdown.token(),
    ));

    let server = FlightMonitorServer::new(
        ServerConfig::from(&settings),
        Arc::clone(&monitor),
        Arc::clone(&shutdown),
        metrics_handle,
    );
    let (addr, serve_task) = server
        .listen()
        .await
        .context("Failed to bind WebSocket listener")?;
    tracing::info!(
        "Flight Monitor listening on ws://{addr}/ws (poll every {} ms)",
        settings.monitor.poll_interval_ms
    );

    if settings.monitor.connect_on_start {
        if let Err(err) = monitor.connect() {
            tracing::warn!(error = %err, "telemetry connection failed; serving without data");
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown_gracefully(vec![serve_task])
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("flightmon").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_flags_keep_settings() {
        let cli = parse(&[]);
        let mut settings = FlightMonitorSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, FlightMonitorSettings::default());
    }

    #[test]
    fn flags_override_settings() {
        let cli = parse(&[
            "--host",
            "127.0.0.1",
            "--port",
            "9100",
            "--catalog",
            "/tmp/vars.csv",
            "--poll-interval-ms",
            "250",
            "--log-format",
            "json",
            "--log-level",
            "debug",
            "--no-connect",
        ]);
        let mut settings = FlightMonitorSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.monitor.catalog_path, "/tmp/vars.csv");
        assert_eq!(settings.monitor.poll_interval_ms, 250);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.logging.level, "debug");
        assert!(!settings.monitor.connect_on_start);
    }

    #[test]
    fn invalid_log_format_rejected() {
        let result = Cli::try_parse_from(["flightmon", "--log-format", "xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn out_of_range_poll_interval_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{}").unwrap();
        let path_arg = path.display().to_string();

        let cli = parse(&["--config", &path_arg, "--poll-interval-ms", "1"]);
        assert!(load_settings(&cli).is_err());
    }

    #[test]
    fn config_file_layer_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"monitor":{"defaultVariables":["TITLE"]}}"#).unwrap();
        let path_arg = path.display().to_string();

        let settings = load_settings(&parse(&["--config", &path_arg])).unwrap();
        assert_eq!(settings.monitor.default_variables, vec!["TITLE".to_string()]);
    }

    #[test]
    fn catalog_load_failure_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "INDICATED ALTITUDE feet").unwrap();
        assert!(load_catalog(file.path()).is_err());
        assert!(load_catalog(Path::new("/nonexistent/variables.csv")).is_err());
    }

    #[test]
    fn bundled_catalog_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data/variables.csv");
        let catalog = load_catalog(&path).unwrap();
        let altitude = catalog.by_name("INDICATED ALTITUDE").unwrap();
        assert_eq!(altitude.id.get(), 0);
        assert_eq!(altitude.unit, "feet");
    }
}
