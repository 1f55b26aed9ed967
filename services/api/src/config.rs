use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported backends for reply generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub chat_provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    /// Primary transcription credential; when absent Gemini transcribes instead.
    pub deepgram_api_key: Option<String>,
    /// Google Cloud TTS key, falling back to the Gemini key.
    pub google_tts_api_key: Option<String>,
    pub chat_model: String,
    pub transcribe_model: String,
    pub deepgram_model: String,
    pub transcribe_language: String,
    pub tts_voice: String,
    pub tts_language_code: String,
    pub provider_timeout: Duration,
    pub log_level: Level,
    pub prompts_path: PathBuf,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Treats empty values like unset ones, as `.env` templates often leave keys blank.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let provider_str = var_or("CHAT_PROVIDER", "gemini");
        let chat_provider = match provider_str.to_lowercase().as_str() {
            "gemini" => Provider::Gemini,
            "openai" => Provider::OpenAI,
            other => {
                return Err(ConfigError::InvalidValue(
                    "CHAT_PROVIDER".to_string(),
                    format!("'{}' is not one of 'gemini' or 'openai'", other),
                ));
            }
        };

        let openai_api_key = optional_var("OPENAI_API_KEY");
        let gemini_api_key = optional_var("GEMINI_API_KEY");
        let deepgram_api_key = optional_var("DEEPGRAM_API_KEY");
        let google_tts_api_key = optional_var("GOOGLE_TTS_API_KEY").or_else(|| gemini_api_key.clone());

        let default_chat_model = match chat_provider {
            Provider::Gemini => "gemini-2.0-flash",
            Provider::OpenAI => "gpt-4o-mini",
        };
        let chat_model = var_or("CHAT_MODEL", default_chat_model);
        let transcribe_model = var_or("TRANSCRIBE_MODEL", "gemini-2.0-flash");
        let deepgram_model = var_or("DEEPGRAM_MODEL", "nova-2");
        let transcribe_language = var_or("TRANSCRIBE_LANGUAGE", "en");
        let tts_voice = var_or("TTS_VOICE", "en-GB-Neural2-C");
        let tts_language_code = var_or("TTS_LANGUAGE_CODE", "en-GB");

        let timeout_str = var_or("PROVIDER_TIMEOUT_SECS", "30");
        let provider_timeout = match timeout_str.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                return Err(ConfigError::InvalidValue(
                    "PROVIDER_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                ));
            }
        };

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        match chat_provider {
            Provider::OpenAI => {
                if openai_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
                    ));
                }
            }
            Provider::Gemini => {
                if gemini_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
                    ));
                }
            }
        }
        if deepgram_api_key.is_none() && gemini_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "DEEPGRAM_API_KEY or GEMINI_API_KEY must be set for transcription".to_string(),
            ));
        }
        if google_tts_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "GOOGLE_TTS_API_KEY or GEMINI_API_KEY must be set for speech synthesis".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            chat_provider,
            openai_api_key,
            gemini_api_key,
            deepgram_api_key,
            google_tts_api_key,
            chat_model,
            transcribe_model,
            deepgram_model,
            transcribe_language,
            tts_voice,
            tts_language_code,
            provider_timeout,
            log_level,
            prompts_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            for name in [
                "BIND_ADDRESS",
                "CHAT_PROVIDER",
                "OPENAI_API_KEY",
                "GEMINI_API_KEY",
                "DEEPGRAM_API_KEY",
                "GOOGLE_TTS_API_KEY",
                "CHAT_MODEL",
                "TRANSCRIBE_MODEL",
                "DEEPGRAM_MODEL",
                "TRANSCRIBE_LANGUAGE",
                "TTS_VOICE",
                "TTS_LANGUAGE_CODE",
                "PROVIDER_TIMEOUT_SECS",
                "RUST_LOG",
                "PROMPTS_PATH",
            ] {
                env::remove_var(name);
            }
        }
    }

    fn set_minimal_env_gemini() {
        unsafe {
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal_gemini() {
        clear_env_vars();
        set_minimal_env_gemini();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.chat_provider, Provider::Gemini);
        assert_eq!(config.gemini_api_key, Some("test-gemini-key".to_string()));
        assert_eq!(config.google_tts_api_key, Some("test-gemini-key".to_string()));
        assert_eq!(config.deepgram_api_key, None);
        assert_eq!(config.openai_api_key, None);
        assert_eq!(config.chat_model, "gemini-2.0-flash");
        assert_eq!(config.transcribe_language, "en");
        assert_eq!(config.provider_timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.prompts_path, PathBuf::from("./prompts"));
    }

    #[test]
    #[serial]
    fn test_config_from_env_openai_provider() {
        clear_env_vars();
        unsafe {
            env::set_var("CHAT_PROVIDER", "OpenAI");
            env::set_var("OPENAI_API_KEY", "test-openai-key");
            env::set_var("DEEPGRAM_API_KEY", "test-deepgram-key");
            env::set_var("GOOGLE_TTS_API_KEY", "test-tts-key");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.chat_provider, Provider::OpenAI);
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.deepgram_api_key, Some("test-deepgram-key".to_string()));
        assert_eq!(config.google_tts_api_key, Some("test-tts-key".to_string()));
        assert_eq!(config.gemini_api_key, None);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env_gemini();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("CHAT_MODEL", "gemini-1.5-pro");
            env::set_var("TRANSCRIBE_LANGUAGE", "fr");
            env::set_var("TTS_VOICE", "fr-FR-Neural2-A");
            env::set_var("PROVIDER_TIMEOUT_SECS", "5");
            env::set_var("RUST_LOG", "debug");
            env::set_var("PROMPTS_PATH", "/custom/prompts");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.chat_model, "gemini-1.5-pro");
        assert_eq!(config.transcribe_language, "fr");
        assert_eq!(config.tts_voice, "fr-FR-Neural2-A");
        assert_eq!(config.provider_timeout, Duration::from_secs(5));
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.prompts_path, PathBuf::from("/custom/prompts"));
    }

    #[test]
    #[serial]
    fn test_config_blank_key_counts_as_missing() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "  ");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("GEMINI_API_KEY")),
            _ => panic!("Expected MissingVar for GEMINI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env_gemini();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_provider() {
        clear_env_vars();
        set_minimal_env_gemini();
        unsafe {
            env::set_var("CHAT_PROVIDER", "claude");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "CHAT_PROVIDER"),
            _ => panic!("Expected InvalidValue for CHAT_PROVIDER"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_timeout() {
        clear_env_vars();
        set_minimal_env_gemini();
        unsafe {
            env::set_var("PROVIDER_TIMEOUT_SECS", "0");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "PROVIDER_TIMEOUT_SECS"),
            _ => panic!("Expected InvalidValue for PROVIDER_TIMEOUT_SECS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env_gemini();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();
        set_minimal_env_gemini();
        unsafe {
            env::set_var("CHAT_PROVIDER", "openai");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("OPENAI_API_KEY")),
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_transcription_credential() {
        clear_env_vars();
        unsafe {
            env::set_var("CHAT_PROVIDER", "openai");
            env::set_var("OPENAI_API_KEY", "test-openai-key");
            env::set_var("GOOGLE_TTS_API_KEY", "test-tts-key");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("DEEPGRAM_API_KEY")),
            _ => panic!("Expected MissingVar for transcription"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_synthesis_credential() {
        clear_env_vars();
        unsafe {
            env::set_var("CHAT_PROVIDER", "openai");
            env::set_var("OPENAI_API_KEY", "test-openai-key");
            env::set_var("DEEPGRAM_API_KEY", "test-deepgram-key");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("GOOGLE_TTS_API_KEY")),
            _ => panic!("Expected MissingVar for synthesis"),
        }
    }
}
