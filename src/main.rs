use std::sync::Arc;

use clap::Parser;

mod config;
mod constants;
mod conversation;
mod error;
mod http;
mod logging;
mod repl;
mod settings;
mod storage;
mod streaming;

#[cfg(test)]
mod tests;

use conversation::{ConversationEngine, EngineOptions};
use settings::SettingsStore;
use storage::{FileStorage, KeyValueStorage, MemoryStorage};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::Config::parse();

    config::validate_config(&cfg)?;

    setup_logging(&cfg)?;

    let debug_enabled =
        cfg.log_level.eq_ignore_ascii_case("debug") || cfg.log_level.eq_ignore_ascii_case("trace");
    logging::LogConfig::init(debug_enabled);

    let storage: Arc<dyn KeyValueStorage> = if cfg.no_persist {
        log::info!("settings kept in memory for this session");
        Arc::new(MemoryStorage::new())
    } else {
        let dir = cfg
            .config_dir
            .clone()
            .unwrap_or_else(storage::default_storage_dir);
        match FileStorage::new(&dir) {
            Ok(storage) => {
                log::info!("settings directory: {}", storage.base_dir().display());
                Arc::new(storage)
            }
            Err(e) => {
                eprintln!("⚠️  {}; settings will not be saved", e);
                Arc::new(MemoryStorage::new())
            }
        }
    };

    let (mut store, load_errors) = SettingsStore::load(storage);
    for error in &load_errors {
        eprintln!("⚠️  {}", error);
    }

    let overrides = cfg.setting_overrides()?;
    if !overrides.is_empty() {
        let report = store.set_multiple(overrides)?;
        for error in &report.errors {
            eprintln!("⚠️  {}", error);
        }
    }
    let settings = store.into_shared();

    let transport = http::HttpTransport::new(cfg.connect_timeout())?;
    let (engine, events) = ConversationEngine::new(
        Arc::new(transport),
        settings.clone(),
        EngineOptions {
            context_rounds: cfg.context_rounds,
        },
    );

    repl::Repl::new(Arc::new(engine), settings, events)
        .run()
        .await
}

fn setup_logging(cfg: &config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let level = cfg
        .log_level
        .to_lowercase()
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Warn);

    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            let level_str = match record.level() {
                log::Level::Error => "\x1b[1;31merror:\x1b[0m",
                log::Level::Warn => "\x1b[1;33mwarn:\x1b[0m",
                log::Level::Info => "\x1b[1;32minfo:\x1b[0m",
                log::Level::Debug => "\x1b[1;34mdebug:\x1b[0m",
                log::Level::Trace => "\x1b[1;35mtrace:\x1b[0m",
            };
            out.finish(format_args!(
                "{} {} {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                level_str,
                message
            ))
        })
        .level(level)
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("hyper_util", log::LevelFilter::Warn);

    // stdout belongs to the conversation
    match &cfg.log_file {
        Some(path) => dispatch.chain(fern::log_file(path)?).apply()?,
        None => dispatch.chain(std::io::stderr()).apply()?,
    }

    Ok(())
}
