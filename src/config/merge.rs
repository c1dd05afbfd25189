use super::env::EnvConfig;
use super::yaml::YamlConfig;
use crate::core::tts::TTSConfig;

/// Merge YAML values over environment values over defaults.
pub fn merge_config(yaml: Option<YamlConfig>, env: EnvConfig) -> TTSConfig {
    let yaml = yaml.and_then(|config| config.tts).unwrap_or_default();
    let defaults = TTSConfig::default();

    TTSConfig {
        api_key: yaml.api_key.or(env.api_key).unwrap_or(defaults.api_key),
        base_url: yaml.base_url.or(env.base_url).or(defaults.base_url),
        ws_url: yaml.ws_url.or(env.ws_url).unwrap_or(defaults.ws_url),
        voice: yaml.voice.or(env.voice).unwrap_or(defaults.voice),
        model: yaml.model.or(env.model).unwrap_or(defaults.model),
        sample_rate: yaml
            .sample_rate
            .or(env.sample_rate)
            .unwrap_or(defaults.sample_rate),
    }
}
