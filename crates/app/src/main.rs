mod config;

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use folio_application::Store;
use folio_engine::{Engine, GeminiClient};
use folio_storage::Storage;
use folio_ui::Ui;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

const USAGE: &str = "usage: folio [FILE.pdf]";

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let Some(initial) = parse_args(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };

    let config = AppConfig::from_env()?;
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("create data dir {}", config.data_dir.display()))?;
    init_logging(&config)?;
    tracing::info!(data_dir = %config.data_dir.display(), model = %config.gemini.model, "starting folio");

    let storage = Storage::open(config.db_path())?;
    let store = Store::open(Box::new(storage));
    let recommender = Arc::new(GeminiClient::new(config.gemini.clone()));

    let mut ui = Ui::new(
        store,
        Box::new(Engine::new()),
        recommender,
        config.gemini_api_key.clone(),
    );
    if let Some(path) = initial.path {
        ui.open_path(&path)?;
    }
    ui.run()?;
    tracing::info!("folio exited");
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Launch {
    path: Option<PathBuf>,
}

/// `Ok(None)` means help was requested.
fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Option<Launch>> {
    let mut launch = Launch::default();
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            _ if arg.starts_with('-') => anyhow::bail!("unknown option {arg}\n{USAGE}"),
            _ if launch.path.is_some() => anyhow::bail!("only one file can be opened\n{USAGE}"),
            _ => launch.path = Some(PathBuf::from(arg)),
        }
    }
    Ok(Some(launch))
}

fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let log_path = config.log_path();
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("open log file {}", log_path.display()))?;
    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("invalid FOLIO_LOG filter {}", config.log_filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("install logger: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_args_opens_nothing() -> anyhow::Result<()> {
        assert_eq!(parse_args(args(&[]))?, Some(Launch::default()));
        Ok(())
    }

    #[test]
    fn single_path_is_opened() -> anyhow::Result<()> {
        let launch = parse_args(args(&["moby.pdf"]))?;
        assert_eq!(launch.and_then(|l| l.path), Some(PathBuf::from("moby.pdf")));
        Ok(())
    }

    #[test]
    fn help_and_bad_args() {
        assert!(matches!(parse_args(args(&["--help"])), Ok(None)));
        assert!(parse_args(args(&["--zoom"])).is_err());
        assert!(parse_args(args(&["a.pdf", "b.pdf"])).is_err());
    }
}
