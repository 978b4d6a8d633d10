use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::constants::DEFAULT_SYSTEM_PROMPT_FILE;
use crate::settings::{SettingKey, SettingValue, is_valid_url};

#[derive(Parser, Debug, Clone)]
#[command(name = "ai-chat-assistant")]
#[command(about = "terminal chat client streaming answers from openai-compatible chat APIs")]
pub struct Config {
    #[arg(
        long,
        env = "DEEPSEEK_API_KEY",
        hide_env_values = true,
        help = "api key (stored in the local settings)"
    )]
    pub api_key: Option<String>,

    #[arg(long, env = "DEEPSEEK_BASE_URL", help = "api base url, e.g. https://api.deepseek.com/v1")]
    pub api_url: Option<String>,

    #[arg(long, help = "model name sent with each request")]
    pub model: Option<String>,

    #[arg(
        long,
        help = "file holding the system prompt (defaults to ./systemprompt.md when present)"
    )]
    pub system_prompt_file: Option<PathBuf>,

    #[arg(long, help = "directory for persisted settings")]
    pub config_dir: Option<PathBuf>,

    #[arg(long, help = "keep settings in memory only for this session")]
    pub no_persist: bool,

    #[arg(
        long,
        default_value = "10",
        help = "past exchanges replayed with each request"
    )]
    pub context_rounds: usize,

    #[arg(
        long,
        default_value = "10s",
        value_parser = parse_timeout,
        help = "tcp connect timeout (e.g. 5s, 1m); 0s disables it"
    )]
    pub connect_timeout: Duration,

    #[arg(
        long,
        default_value = "warn",
        help = "log level (off, error, warn, info, debug, trace)"
    )]
    pub log_level: String,

    #[arg(long, help = "write logs to this file instead of stderr")]
    pub log_file: Option<PathBuf>,
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    humantime::parse_duration(raw).map_err(|e| format!("invalid duration '{}': {}", raw, e))
}

impl Config {
    pub fn connect_timeout(&self) -> Option<Duration> {
        (!self.connect_timeout.is_zero()).then_some(self.connect_timeout)
    }

    /// Settings given on the command line, applied over the stored ones
    /// at startup.
    pub fn setting_overrides(&self) -> Result<Vec<(SettingKey, SettingValue)>, String> {
        let mut overrides = Vec::new();
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            overrides.push((SettingKey::ApiKey, SettingValue::from(key)));
        }
        if let Some(url) = &self.api_url {
            overrides.push((SettingKey::ApiUrl, SettingValue::from(url.as_str())));
        }
        if let Some(model) = &self.model {
            overrides.push((SettingKey::Model, SettingValue::from(model.as_str())));
        }
        if let Some(prompt) = self.read_system_prompt()? {
            overrides.push((SettingKey::SystemPrompt, SettingValue::from(prompt)));
        }
        Ok(overrides)
    }

    fn read_system_prompt(&self) -> Result<Option<String>, String> {
        match &self.system_prompt_file {
            Some(path) => read_prompt_file(path).map(Some),
            None => {
                let default_path = Path::new(DEFAULT_SYSTEM_PROMPT_FILE);
                if default_path.is_file() {
                    read_prompt_file(default_path).map(Some)
                } else {
                    Ok(None)
                }
            }
        }
    }
}

fn read_prompt_file(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path)
        .map(|prompt| prompt.trim().to_string())
        .map_err(|e| format!("failed to read system prompt {}: {}", path.display(), e))
}

pub fn validate_config(config: &Config) -> Result<(), String> {
    if let Some(url) = &config.api_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(format!(
                "invalid API URL (must start with http:// or https://): {}",
                url
            ));
        }
        if !is_valid_url(url) {
            return Err(format!("invalid API URL format: {}", url));
        }
    }
    if config.context_rounds > 50 {
        return Err(format!(
            "context rounds must be at most 50, got {}",
            config.context_rounds
        ));
    }
    if let Some(path) = &config.system_prompt_file
        && !path.is_file()
    {
        return Err(format!("system prompt file not found: {}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod config_tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["ai-chat-assistant"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).expect("arguments should parse")
    }

    #[test]
    fn defaults_parse() {
        let cfg = parse(&[]);
        assert_eq!(cfg.context_rounds, 10);
        assert_eq!(cfg.connect_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(cfg.log_level, "warn");
        assert!(!cfg.no_persist);
    }

    #[test]
    fn missing_prompt_file_fails_validation() {
        let cfg = parse(&["--system-prompt-file", "/nonexistent/prompt.md"]);
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn zero_timeout_disables_connect_timeout() {
        let cfg = parse(&["--connect-timeout", "0s"]);
        assert_eq!(cfg.connect_timeout(), None);
    }

    #[test]
    fn humantime_durations_are_accepted() {
        let cfg = parse(&["--connect-timeout", "1m 30s"]);
        assert_eq!(cfg.connect_timeout(), Some(Duration::from_secs(90)));
        let bad = Config::try_parse_from(["ai-chat-assistant", "--connect-timeout", "soon"]);
        assert!(bad.is_err());
    }

    #[test]
    fn non_http_urls_are_rejected() {
        let cfg = parse(&["--api-url", "ftp://example.com"]);
        assert!(validate_config(&cfg).is_err());

        let cfg = parse(&["--api-url", "http://localhost:1234/v1"]);
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn explicit_prompt_file_becomes_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prompt_path = dir.path().join("prompt.md");
        std::fs::write(&prompt_path, "  Answer tersely.\n").expect("write prompt");

        let cfg = parse(&[
            "--model",
            "deepseek-reasoner",
            "--system-prompt-file",
            prompt_path.to_str().expect("utf-8 path"),
        ]);
        let overrides = cfg.setting_overrides().expect("overrides");

        let model = (SettingKey::Model, SettingValue::from("deepseek-reasoner"));
        let prompt = (SettingKey::SystemPrompt, SettingValue::from("Answer tersely."));
        assert!(overrides.contains(&model));
        assert!(overrides.contains(&prompt));
    }
}
