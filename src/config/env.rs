use super::ConfigError;

pub const ENV_API_KEY: &str = "DASHSCOPE_API_KEY";
pub const ENV_BASE_URL: &str = "COSY_TTS_BASE_URL";
pub const ENV_WS_URL: &str = "COSY_TTS_WS_URL";
pub const ENV_VOICE: &str = "COSY_TTS_VOICE";
pub const ENV_MODEL: &str = "COSY_TTS_MODEL";
pub const ENV_SAMPLE_RATE: &str = "COSY_TTS_SAMPLE_RATE";

/// TTS settings read from the process environment.
///
/// Unset and empty variables are both `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub ws_url: Option<String>,
    pub voice: Option<String>,
    pub model: Option<String>,
    pub sample_rate: Option<u32>,
}

impl EnvConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let sample_rate = match var(ENV_SAMPLE_RATE) {
            Some(raw) => Some(raw.trim().parse::<u32>().map_err(|e| {
                ConfigError::InvalidValue {
                    key: ENV_SAMPLE_RATE.to_string(),
                    message: format!("'{raw}' is not a valid sample rate: {e}"),
                }
            })?),
            None => None,
        };

        Ok(Self {
            api_key: var(ENV_API_KEY),
            base_url: var(ENV_BASE_URL),
            ws_url: var(ENV_WS_URL),
            voice: var(ENV_VOICE),
            model: var(ENV_MODEL),
            sample_rate,
        })
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
