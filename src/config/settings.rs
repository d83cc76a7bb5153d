use super::ServerConfig;
use crate::Result;
use config::{Config, Environment};

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let settings = Config::builder()
            .add_source(Environment::with_prefix("NETFRAME"))
            .build()
            .map_err(|e| crate::NetframeError::Config(e.to_string()))?;

        let config = settings
            .try_deserialize::<ServerConfig>()
            .map_err(|e| crate::NetframeError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }
}
