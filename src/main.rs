mod config;
mod display;
mod reload;
mod scheduler;
mod snapshot;
mod watch;

use clap::Parser;
use display::server::{DisplayError, DisplayServer};
use display::Renderer;
use scheduler::{Scheduler, Timing};
use snapshot::{Simulation, SnapshotError, SnapshotStore};
use std::convert::Infallible;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use watch::WatchState;

/// Live viewer for a simulation snapshot file: watches the file, reloads it
/// whenever the producer overwrites it, and serves the visualization to a
/// browser. Never touches the producer.
#[derive(Parser, Debug)]
#[command(name = "snapview", version, about, args_override_self = true)]
pub struct Cli {
    /// Snapshot file to watch (default: from config, else `dump`). Last one wins.
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Seconds between file checks
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Verbose diagnostics (baseline, size changes, cooldown skips)
    #[arg(short, long)]
    debug: bool,

    /// Settings file path
    #[arg(long, default_value = "snapview.toml")]
    config: PathBuf,

    /// Display server bind address (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Display server port (overrides config)
    #[arg(long)]
    port: Option<u16>,
}

/// Single-dash long flags accepted for compatibility (`-interval 5`).
const LEGACY_FLAGS: &[&str] = &["interval", "debug", "config", "bind", "port"];

/// Rewrite `-interval`, `-debug`, ... into their `--` forms so clap can parse
/// them. Everything else passes through untouched.
fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            let Some(s) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = s.strip_prefix('-') else {
                return arg;
            };
            let name = rest.split('=').next().unwrap_or(rest);
            if !rest.starts_with('-') && LEGACY_FLAGS.contains(&name) {
                OsString::from(format!("-{s}"))
            } else {
                arg
            }
        })
        .collect()
}

/// Fully resolved startup settings: CLI flags over config file over defaults.
#[derive(Debug)]
struct Settings {
    path: PathBuf,
    check_interval_secs: u64,
    debug: bool,
    display: config::DisplayConfig,
    timing: Timing,
}

impl Settings {
    fn resolve(cli: Cli, config: config::ViewerConfig) -> Self {
        let mut display = config.display;
        if let Some(bind) = cli.bind {
            display.bind = bind;
        }
        if let Some(port) = cli.port {
            display.port = port;
        }
        Self {
            path: cli.files.into_iter().last().unwrap_or(config.watch.file),
            check_interval_secs: cli.interval.unwrap_or(config.watch.check_interval_secs),
            debug: cli.debug,
            display,
            timing: Timing::from(&config.scheduler),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("could not restore from '{}': {source}", path.display())]
    InitialLoad {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },
    #[error(transparent)]
    Display(#[from] DisplayError),
}

fn init_tracing(debug: bool) {
    let default = if debug { "snapview=debug" } else { "snapview=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(settings: Settings) -> Result<Infallible, StartupError> {
    let mut sim = SnapshotStore::new();
    scheduler::initial_load(&settings.path, &mut sim).map_err(|e| StartupError::InitialLoad {
        path: settings.path.clone(),
        source: e,
    })?;
    tracing::info!(
        t = sim.time(),
        iteration = ?sim.iteration(),
        fields = sim.fields().len(),
        "snapshot loaded"
    );

    let renderer = DisplayServer::start(&settings.display)?;
    let state = WatchState::new(&settings.path, settings.check_interval_secs, settings.debug);
    let scheduler = Scheduler::new(state, sim, renderer, settings.timing);

    eprintln!();
    eprintln!("{}", scheduler.renderer().url());
    eprintln!();
    eprintln!(
        "Monitoring {} for changes every {} seconds...",
        settings.path.display(),
        settings.check_interval_secs
    );
    if scheduler.state().debug {
        eprintln!("Debug output enabled.");
    }
    eprintln!("Press Ctrl+C to stop.");
    eprintln!();

    scheduler.run()
}

fn main() {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    init_tracing(cli.debug);
    tracing::debug!(?cli, "parsed CLI arguments");

    let config = config::load_config(&cli.config);
    let settings = Settings::resolve(cli, config);

    match run(settings) {
        Ok(never) => match never {},
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["snapview"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(normalize_args(argv)).unwrap()
    }

    fn settings(args: &[&str]) -> Settings {
        Settings::resolve(parse(args), config::ViewerConfig::default())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]);
        assert_eq!(s.path, PathBuf::from("dump"));
        assert_eq!(s.check_interval_secs, 2);
        assert!(!s.debug);
        assert_eq!(s.display.port, 7100);
    }

    #[test]
    fn test_legacy_flags_before_path() {
        let s = settings(&["-interval", "5", "-debug", "out/restart"]);
        assert_eq!(s.check_interval_secs, 5);
        assert!(s.debug);
        assert_eq!(s.path, PathBuf::from("out/restart"));
    }

    #[test]
    fn test_flag_order_relative_to_path_is_irrelevant() {
        for args in [
            ["out/restart", "-interval", "5", "-debug"],
            ["-debug", "out/restart", "-interval", "5"],
            ["-interval", "5", "out/restart", "-debug"],
        ] {
            let s = settings(&args);
            assert_eq!(s.check_interval_secs, 5);
            assert!(s.debug);
            assert_eq!(s.path, PathBuf::from("out/restart"));
        }
    }

    #[test]
    fn test_short_and_long_debug() {
        assert!(settings(&["-d"]).debug);
        assert!(settings(&["--debug"]).debug);
        assert!(settings(&["-d", "-debug", "-d"]).debug);
    }

    #[test]
    fn test_last_interval_wins() {
        let s = settings(&["-interval", "5", "--interval", "9", "-interval", "3"]);
        assert_eq!(s.check_interval_secs, 3);
    }

    #[test]
    fn test_last_path_wins() {
        let s = settings(&["first", "second", "-d", "third"]);
        assert_eq!(s.path, PathBuf::from("third"));
    }

    #[test]
    fn test_equals_form_is_normalized() {
        let s = settings(&["-interval=7"]);
        assert_eq!(s.check_interval_secs, 7);
    }

    #[test]
    fn test_non_numeric_interval_rejected() {
        let argv = normalize_args(["snapview", "-interval", "abc"]);
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_normalize_leaves_other_tokens_alone() {
        let args = normalize_args(["snapview", "-d", "--port", "80", "-intervalx", "file"]);
        let args: Vec<_> = args.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(args, vec!["snapview", "-d", "--port", "80", "-intervalx", "file"]);
    }

    #[test]
    fn test_cli_overrides_config() {
        let mut config = config::ViewerConfig::default();
        config.watch.file = PathBuf::from("from-config");
        config.watch.check_interval_secs = 11;
        config.display.port = 9000;

        let s = Settings::resolve(parse(&[]), config.clone());
        assert_eq!(s.path, PathBuf::from("from-config"));
        assert_eq!(s.check_interval_secs, 11);
        assert_eq!(s.display.port, 9000);

        let s = Settings::resolve(parse(&["-interval", "4", "-port", "9100", "cli-file"]), config);
        assert_eq!(s.path, PathBuf::from("cli-file"));
        assert_eq!(s.check_interval_secs, 4);
        assert_eq!(s.display.port, 9100);
    }

    #[test]
    fn test_missing_snapshot_is_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::resolve(
            parse(&[dir.path().join("dump").to_str().unwrap()]),
            config::ViewerConfig::default(),
        );
        let err = run(s).unwrap_err();
        assert!(matches!(err, StartupError::InitialLoad { .. }));
        assert!(err.to_string().starts_with("could not restore from"));
    }
}
