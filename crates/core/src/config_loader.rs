use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration by merging defaults, TOML, and
    /// environment variables (prefixed `ODDSIGHT_`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed,
    /// or if the tier thresholds are not monotonic.
    pub fn load(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ODDSIGHT_").split("__"))
            .extract()?;

        config.tiers.validate()?;
        tracing::debug!(path, sources = config.sources.len(), "configuration loaded");
        Ok(config)
    }

    /// Loads application configuration with a profile overlay
    /// (`Config.<profile>.toml` next to the base file).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed,
    /// or if the tier thresholds are not monotonic.
    pub fn load_with_profile(path: &str, profile: &str) -> Result<AppConfig> {
        let overlay = profile_path(path, profile);
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Toml::file(overlay))
            .merge(Env::prefixed("ODDSIGHT_").split("__"))
            .extract()?;

        config.tiers.validate()?;
        Ok(config)
    }
}

fn profile_path(path: &str, profile: &str) -> String {
    match path.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}.{profile}.{ext}"),
        None => format!("{path}.{profile}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_path_inserts_profile() {
        assert_eq!(
            profile_path("config/Config.toml", "prod"),
            "config/Config.prod.toml"
        );
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = ConfigLoader::load("definitely/not/here.toml").unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.sources.is_empty());
    }
}
