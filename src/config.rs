use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite file
    pub path: String,
    pub max_connections: u32,
    pub busy_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "flight_recorder.db".to_string(),
            max_connections: 5,
            busy_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    let defaults = DatabaseConfig::default();

    let config = config::Config::builder()
        .set_default("database.path", defaults.path)?
        .set_default("database.max_connections", defaults.max_connections)?
        .set_default("database.busy_timeout_seconds", defaults.busy_timeout_seconds)?
        .add_source(config::File::with_name("flight-recorder").required(false))
        .add_source(config::Environment::with_prefix("FLIGHT_RECORDER").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.database.path.is_empty() {
        anyhow::bail!("database.path must not be empty");
    }
    if cfg.database.max_connections == 0 {
        anyhow::bail!("database.max_connections must be at least 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = Config { database: DatabaseConfig::default() };
        assert!(validate_config(&cfg).is_ok());
        assert_eq!(cfg.database.database_url(), "sqlite:flight_recorder.db");
    }

    #[test]
    fn test_zero_connections_rejected() {
        let cfg = Config {
            database: DatabaseConfig { max_connections: 0, ..DatabaseConfig::default() },
        };
        assert!(validate_config(&cfg).is_err());
    }
}
