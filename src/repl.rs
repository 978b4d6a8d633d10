use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::constants::{
    ANSI_BRIGHT_BLUE, ANSI_BRIGHT_CYAN, ANSI_BRIGHT_GREEN, ANSI_BRIGHT_MAGENTA, ANSI_BRIGHT_RED,
    ANSI_BRIGHT_WHITE, ANSI_BRIGHT_YELLOW, ANSI_DIM, ANSI_RESET,
};
use crate::conversation::{ChatEvent, ConversationEngine, Rejection, TurnOutcome, TurnPhase};
use crate::logging::mask_secret;
use crate::settings::{
    CommitReport, Feature, SettingKey, SettingValue, SettingsStore, SharedSettings,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Clear,
    Quit,
    Status,
    ShowConfig,
    Set { key: String, value: String },
    Reset,
    Theme(String),
    Export(Option<PathBuf>),
    ExportConfig(Option<PathBuf>),
    ImportConfig(PathBuf),
    Unknown(String),
}

/// Returns `None` for plain chat input.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let rest = line.strip_prefix('/')?;
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let optional_path = || (!args.is_empty()).then(|| PathBuf::from(args));

    let command = match name.to_ascii_lowercase().as_str() {
        "help" => Command::Help,
        "clear" => Command::Clear,
        "quit" | "exit" => Command::Quit,
        "status" => Command::Status,
        "config" => Command::ShowConfig,
        "set" => match args.split_once(char::is_whitespace) {
            Some((key, value)) => Command::Set {
                key: key.to_string(),
                value: value.trim().to_string(),
            },
            None if !args.is_empty() => Command::Set {
                key: args.to_string(),
                value: String::new(),
            },
            None => Command::Unknown(line.to_string()),
        },
        "reset" => Command::Reset,
        "theme" if !args.is_empty() => Command::Theme(args.to_string()),
        "export" => Command::Export(optional_path()),
        "export-config" => Command::ExportConfig(optional_path()),
        "import-config" if !args.is_empty() => Command::ImportConfig(PathBuf::from(args)),
        _ => Command::Unknown(line.to_string()),
    };
    Some(command)
}

/// `(name, shown value)` for every setting, with the API key masked.
pub fn config_lines(store: &SettingsStore) -> Vec<(&'static str, String)> {
    SettingKey::ALL
        .into_iter()
        .filter_map(|key| {
            let value = store.get(key.as_str())?;
            let shown = match (key.is_secret(), value) {
                (true, SettingValue::Text(secret)) => mask_secret(&secret),
                (_, value) => value.to_string(),
            };
            Some((key.as_str(), shown))
        })
        .collect()
}

fn phase_label(phase: TurnPhase) -> &'static str {
    match phase {
        TurnPhase::Idle => "idle",
        TurnPhase::AwaitingResponse => "waiting for response",
        TurnPhase::Streaming => "streaming",
    }
}

const FEATURES: [(&str, Feature); 4] = [
    ("stream", Feature::Stream),
    ("timestamp", Feature::Timestamp),
    ("notifications", Feature::Notifications),
    ("autosave", Feature::AutoSave),
];

/// `stream on, timestamp off, ...` for the status line
pub fn feature_summary(store: &SettingsStore) -> String {
    FEATURES
        .iter()
        .map(|(name, feature)| {
            let state = if store.is_feature_enabled(*feature) { "on" } else { "off" };
            format!("{} {}", name, state)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn clock_stamp(show_timestamp: bool, frame_color: &str) -> String {
    if !show_timestamp {
        return String::new();
    }
    format!(
        "─[{}{}{}]",
        ANSI_BRIGHT_YELLOW,
        Local::now().format("%H:%M:%S"),
        frame_color
    )
}

/// Writes engine events to the terminal as they arrive.
#[derive(Default)]
struct Renderer {
    in_reply: bool,
}

impl Renderer {
    fn render(&mut self, event: ChatEvent, show_timestamp: bool) -> std::io::Result<()> {
        let mut out = std::io::stdout().lock();
        match event {
            ChatEvent::TurnStarted { .. } => {
                write!(
                    out,
                    "\n{}┌─[{}AI{}]{}\n└─➤ {}",
                    ANSI_BRIGHT_MAGENTA,
                    ANSI_BRIGHT_CYAN,
                    ANSI_BRIGHT_MAGENTA,
                    clock_stamp(show_timestamp, ANSI_BRIGHT_MAGENTA),
                    ANSI_BRIGHT_WHITE
                )?;
                self.in_reply = true;
            }
            ChatEvent::Fragment { delta, .. } => write!(out, "{}", delta)?,
            ChatEvent::Completed { committed, .. } => {
                writeln!(out, "{}", ANSI_RESET)?;
                if !committed {
                    writeln!(
                        out,
                        "{}⚠️  the model returned an empty response{}",
                        ANSI_BRIGHT_YELLOW, ANSI_RESET
                    )?;
                }
                self.in_reply = false;
            }
            ChatEvent::Failed { error, .. } => {
                if self.in_reply {
                    writeln!(out, "{}", ANSI_RESET)?;
                }
                writeln!(out, "{}❌ error: {}{}", ANSI_BRIGHT_RED, error, ANSI_RESET)?;
                if error.is_unauthorized() {
                    writeln!(
                        out,
                        "{}   check the api key with /set apiKey <key>{}",
                        ANSI_DIM, ANSI_RESET
                    )?;
                }
                self.in_reply = false;
            }
            ChatEvent::ConnectionChanged { connected } => {
                if connected {
                    writeln!(out, "{}● online{}", ANSI_BRIGHT_GREEN, ANSI_RESET)?;
                } else {
                    writeln!(out, "{}○ offline{}", ANSI_BRIGHT_RED, ANSI_RESET)?;
                }
            }
        }
        out.flush()
    }
}

pub struct Repl {
    engine: Arc<ConversationEngine>,
    settings: SharedSettings,
    events: mpsc::UnboundedReceiver<ChatEvent>,
    renderer: Renderer,
    recheck: Arc<AtomicBool>,
    started: Instant,
}

enum Flow {
    Continue,
    Exit,
}

impl Repl {
    pub fn new(
        engine: Arc<ConversationEngine>,
        settings: SharedSettings,
        events: mpsc::UnboundedReceiver<ChatEvent>,
    ) -> Self {
        Self {
            engine,
            settings,
            events,
            renderer: Renderer::default(),
            recheck: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
        }
    }

    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        let recheck = self.recheck.clone();
        let listener_id = self.settings.write().await.add_listener(move |change| {
            if matches!(change.key, SettingKey::ApiKey | SettingKey::ApiUrl) {
                recheck.store(true, Ordering::SeqCst);
            }
            Ok(())
        });

        self.print_banner().await?;
        self.engine.probe_connection().await;
        self.drain_events().await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print_prompt(self.show_timestamp().await)?;
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    println!("\n{}interrupted, exiting...{}", ANSI_BRIGHT_YELLOW, ANSI_RESET);
                    break;
                }
            };
            let Some(line) = line else {
                println!("\n{}end of input, exiting...{}", ANSI_BRIGHT_YELLOW, ANSI_RESET);
                break;
            };

            let flow = match parse_command(&line) {
                Some(command) => self.handle_command(command).await?,
                None => {
                    self.chat(&line).await?;
                    Flow::Continue
                }
            };
            if matches!(flow, Flow::Exit) {
                break;
            }
            if self.recheck.swap(false, Ordering::SeqCst) {
                self.engine.probe_connection().await;
                self.drain_events().await?;
            }
        }

        self.settings.write().await.remove_listener(listener_id);
        self.print_goodbye().await;
        Ok(())
    }

    /// Read on every render so imports and resets apply immediately.
    async fn show_timestamp(&self) -> bool {
        self.settings
            .read()
            .await
            .is_feature_enabled(Feature::Timestamp)
    }

    async fn chat(&mut self, line: &str) -> std::io::Result<()> {
        let show_timestamp = self.show_timestamp().await;
        let engine = self.engine.clone();
        let send = engine.send_message(line);
        tokio::pin!(send);

        let outcome = loop {
            tokio::select! {
                outcome = &mut send => break outcome,
                Some(event) = self.events.recv() => {
                    self.renderer.render(event, show_timestamp)?
                }
            }
        };
        self.drain_events().await?;

        if let TurnOutcome::Rejected(reason) = outcome {
            let hint = match reason {
                Rejection::EmptyMessage => "please enter a message",
                Rejection::NotConnected => {
                    "offline: set an api key with /set apiKey <key>, then /status"
                }
                Rejection::Busy => "still answering the previous message",
            };
            print_warning(hint);
        }
        Ok(())
    }

    async fn drain_events(&mut self) -> std::io::Result<()> {
        let show_timestamp = self.show_timestamp().await;
        while let Ok(event) = self.events.try_recv() {
            self.renderer.render(event, show_timestamp)?;
        }
        Ok(())
    }

    async fn handle_command(
        &mut self,
        command: Command,
    ) -> Result<Flow, Box<dyn std::error::Error>> {
        match command {
            Command::Help => print_help(),
            Command::Quit => return Ok(Flow::Exit),
            Command::Clear => {
                self.engine.clear_history().await;
                print!("\x1b[2J\x1b[H");
                self.print_banner().await?;
                print_success("conversation history cleared");
            }
            Command::Status => {
                self.engine.probe_connection().await;
                self.drain_events().await?;
                let connected = self.engine.is_connected().await;
                let phase = self.engine.phase().await;
                let messages = self.engine.history_len().await;
                let exchanges = self.engine.turn_count().await;

                let store = self.settings.read().await;
                let settings = store.all();
                println!(
                    "{}status:{} {} | {} | mode: {} | theme: {}",
                    ANSI_BRIGHT_WHITE,
                    ANSI_RESET,
                    if connected { "online" } else { "offline" },
                    phase_label(phase),
                    store.mode(),
                    store.theme()
                );
                println!(
                    "  model: {} | endpoint: {} | {} exchanges ({} messages)",
                    settings.model, settings.api_url, exchanges, messages
                );
                println!("  features: {}", feature_summary(&store));
                if !store.is_api_configured() {
                    print_warning("api key, url or model missing");
                }
            }
            Command::ShowConfig => {
                let store = self.settings.read().await;
                for (name, shown) in config_lines(&store) {
                    println!("  {}{:<20}{} {}", ANSI_BRIGHT_CYAN, name, ANSI_RESET, shown);
                }
            }
            Command::Set { key, value } => {
                let parsed = key.parse::<SettingKey>().and_then(|key| {
                    let value = SettingValue::parse_for(key, &value)?;
                    Ok((key, value))
                });
                match parsed {
                    Ok((key, value)) => {
                        let result = self.settings.write().await.set(key, value);
                        match result {
                            Ok(report) => print_report(&report, &format!("{} updated", key)),
                            Err(e) => print_error(&e.to_string()),
                        }
                    }
                    Err(e) => print_error(&e.to_string()),
                }
            }
            Command::Reset => {
                let report = self.settings.write().await.reset();
                print_report(&report, "configuration reset to defaults");
            }
            Command::Theme(theme) => match self.settings.write().await.set_theme(&theme) {
                Ok(report) => print_report(&report, &format!("theme set to {}", theme)),
                Err(e) => print_error(&e.to_string()),
            },
            Command::Export(path) => match self.engine.export_transcript().await {
                Some(transcript) => {
                    let path = path.unwrap_or_else(|| {
                        PathBuf::from(format!("ai-chat-{}.md", Local::now().format("%Y-%m-%d")))
                    });
                    match tokio::fs::write(&path, transcript).await {
                        Ok(()) => print_success(&format!(
                            "transcript exported to {}",
                            path.display()
                        )),
                        Err(e) => {
                            print_error(&format!("failed to write {}: {}", path.display(), e))
                        }
                    }
                }
                None => print_warning("no conversation to export"),
            },
            Command::ExportConfig(path) => {
                let exported = self.settings.read().await.export();
                match (exported, path) {
                    (Ok(json), Some(path)) => match tokio::fs::write(&path, json).await {
                        Ok(()) => print_success(&format!(
                            "configuration exported to {}",
                            path.display()
                        )),
                        Err(e) => {
                            print_error(&format!("failed to write {}: {}", path.display(), e))
                        }
                    },
                    (Ok(json), None) => println!("{}", json),
                    (Err(e), _) => print_error(&e.to_string()),
                }
            }
            Command::ImportConfig(path) => match tokio::fs::read_to_string(&path).await {
                Ok(data) => match self.settings.write().await.import(&data) {
                    Ok(report) => print_report(&report, "configuration imported"),
                    Err(e) => print_error(&e.to_string()),
                },
                Err(e) => print_error(&format!("failed to read {}: {}", path.display(), e)),
            },
            Command::Unknown(input) => {
                print_warning(&format!("unknown command: {} (try /help)", input))
            }
        }
        Ok(Flow::Continue)
    }

    async fn print_banner(&self) -> std::io::Result<()> {
        let store = self.settings.read().await;
        let settings = store.all();
        let mut out = std::io::stdout().lock();
        writeln!(
            out,
            "{}╔══════════════════════════════════════════════╗",
            ANSI_BRIGHT_CYAN
        )?;
        writeln!(
            out,
            "║  {}🤖 AI chat assistant v{}{}                  ║",
            ANSI_BRIGHT_YELLOW,
            crate::VERSION,
            ANSI_BRIGHT_CYAN
        )?;
        writeln!(
            out,
            "╚══════════════════════════════════════════════╝{}",
            ANSI_RESET
        )?;
        writeln!(out, "{}  endpoint: {}{}", ANSI_BRIGHT_GREEN, settings.api_url, ANSI_RESET)?;
        writeln!(out, "{}  model:    {}{}", ANSI_BRIGHT_GREEN, settings.model, ANSI_RESET)?;
        writeln!(
            out,
            "{}  api key:  {}{}",
            ANSI_BRIGHT_GREEN,
            mask_secret(&settings.api_key),
            ANSI_RESET
        )?;
        writeln!(out, "{}  type /help for commands{}", ANSI_DIM, ANSI_RESET)?;
        out.flush()
    }

    async fn print_goodbye(&self) {
        let session = Duration::from_secs(self.started.elapsed().as_secs());
        println!(
            "\n{}👋 goodbye | {} exchanges | session {}{}",
            ANSI_BRIGHT_MAGENTA,
            self.engine.turn_count().await,
            humantime::format_duration(session),
            ANSI_RESET
        );
    }
}

fn print_prompt(show_timestamp: bool) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    write!(
        out,
        "\n{}┌─[{}USER{}]{}\n└─➤ {}",
        ANSI_BRIGHT_BLUE,
        ANSI_BRIGHT_GREEN,
        ANSI_BRIGHT_BLUE,
        clock_stamp(show_timestamp, ANSI_BRIGHT_BLUE),
        ANSI_BRIGHT_WHITE
    )?;
    out.flush()
}

fn print_report(report: &CommitReport, success: &str) {
    if report.is_clean() {
        print_success(success);
    }
    for error in &report.errors {
        print_error(&error.to_string());
    }
}

fn print_success(message: &str) {
    println!("{}✅ {}{}", ANSI_BRIGHT_GREEN, message, ANSI_RESET);
}

fn print_warning(message: &str) {
    println!("{}⚠️  {}{}", ANSI_BRIGHT_YELLOW, message, ANSI_RESET);
}

fn print_error(message: &str) {
    println!("{}❌ {}{}", ANSI_BRIGHT_RED, message, ANSI_RESET);
}

fn print_help() {
    println!(
        "{}commands:{}
  /help                  show this help
  /status                check the api and show connection details
  /config                show current settings
  /set <key> <value>     change a setting (e.g. /set temperature 1.2)
  /theme <dark|light|auto>
  /reset                 restore default settings
  /export [path]         save the conversation as markdown
  /export-config [path]  export settings (api key excluded)
  /import-config <path>  import settings (api key kept)
  /clear                 clear the conversation
  /quit, /exit           leave",
        ANSI_BRIGHT_WHITE, ANSI_RESET
    );
}
