/// Chat completion API endpoints, relative to the configured base URL
pub const API_CHAT_COMPLETIONS: &str = "/chat/completions";
pub const API_MODELS: &str = "/models";

/// Request headers
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Default setting values
pub const DEFAULT_API_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: i64 = 2000;
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant that can answer all kinds of questions and provide help.";
pub const DEFAULT_THEME: &str = "dark";
pub const DEFAULT_LANGUAGE: &str = "zh-CN";
pub const DEFAULT_MAX_HISTORY_LENGTH: i64 = 40;
pub const DEFAULT_CONTEXT_ROUNDS: usize = 10;

/// Setting bounds (inclusive)
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);
pub const MAX_TOKENS_RANGE: (i64, i64) = (1, 8000);
pub const MAX_HISTORY_LENGTH_RANGE: (i64, i64) = (0, 100);

pub const SUPPORTED_THEMES: [&str; 3] = ["dark", "light", "auto"];

/// Settings persistence
pub const SETTINGS_STORAGE_KEY: &str = "ai-chat-config";
pub const SETTINGS_EXPORT_VERSION: &str = "1.0";
pub const APP_DIR_NAME: &str = "ai-chat-assistant";
pub const DEFAULT_SYSTEM_PROMPT_FILE: &str = "systemprompt.md";

/// Error messages
pub const ERROR_INVALID_API_URL: &str = "API URL format is invalid";
pub const ERROR_TEMPERATURE_RANGE: &str = "temperature must be between 0 and 2";
pub const ERROR_MAX_TOKENS_RANGE: &str = "max tokens must be between 1 and 8000";
pub const ERROR_HISTORY_RANGE: &str = "history length must be between 0 and 100";
pub const ERROR_INVALID_IMPORT: &str = "invalid configuration data format";
pub const ERROR_API_UNAVAILABLE: &str = "chat API not reachable";
pub const ERROR_TIMEOUT: &str = "request timed out";

/// SSE parsing constants
pub const SSE_DATA_PREFIX: &str = "data: ";
pub const SSE_DONE_MESSAGE: &str = "[DONE]";
pub const SSE_LINE_BOUNDARY: u8 = b'\n';

/// Logging prefixes
pub const LOG_PREFIX_SUCCESS: &str = "✅";
pub const LOG_PREFIX_ERROR: &str = "❌";
pub const LOG_PREFIX_WARNING: &str = "⚠️";
pub const LOG_PREFIX_CONN: &str = "↔️";

/// Terminal colors used by the REPL
pub const ANSI_RESET: &str = "\x1b[0m";
pub const ANSI_DIM: &str = "\x1b[2m";
pub const ANSI_BRIGHT_RED: &str = "\x1b[91m";
pub const ANSI_BRIGHT_GREEN: &str = "\x1b[92m";
pub const ANSI_BRIGHT_YELLOW: &str = "\x1b[93m";
pub const ANSI_BRIGHT_BLUE: &str = "\x1b[94m";
pub const ANSI_BRIGHT_MAGENTA: &str = "\x1b[95m";
pub const ANSI_BRIGHT_CYAN: &str = "\x1b[96m";
pub const ANSI_BRIGHT_WHITE: &str = "\x1b[97m";
