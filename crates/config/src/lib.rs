#![forbid(unsafe_code)]

//! Configuration for the recording engine.
//!
//! Every section falls back to its defaults, so an empty TOML file (or no
//! file at all) yields a working configuration.

mod error;
mod metrics;
mod persistence;
mod recording;
mod zones;

pub use error::Error;
pub use metrics::Metrics;
pub use persistence::Persistence;
pub use recording::Recording;
pub use zones::Zones;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub recording: Recording,
    pub metrics: Metrics,
    pub zones: Zones,
    pub persistence: Persistence,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TOML file on top of the defaults and validate the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::InvalidPath(path.to_owned()));
        }
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, merged over the defaults.
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(contents))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.recording.validate()?;
        self.metrics.validate()?;
        self.zones.validate()?;
        self.persistence.validate()?;
        Ok(())
    }

    /// Render the configuration as a TOML document.
    pub fn to_toml(&self) -> Result<String, Error> {
        Ok(toml_edit::ser::to_string_pretty(self)?)
    }
}
