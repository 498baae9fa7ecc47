//! Server configuration

use crate::error::{Error, Result};
use squall_native::{ServeOptions, DEFAULT_MAX_BODY_SIZE};
use std::env;
use std::str::FromStr;

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    /// Largest request body read into memory
    pub max_body_size: usize,
    /// Listen backlog
    pub backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 3000,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            backlog: 1024,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by environment variables
    ///
    /// - `SQUALL_HOSTNAME`
    /// - `SQUALL_PORT`, falling back to `PORT`
    /// - `SQUALL_MAX_BODY_SIZE` (bytes)
    /// - `SQUALL_BACKLOG`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(hostname) = lookup("SQUALL_HOSTNAME") {
            config.hostname = hostname;
        }
        if let Some(port) = lookup("SQUALL_PORT").or_else(|| lookup("PORT")) {
            config.port = parse("port", &port)?;
        }
        if let Some(size) = lookup("SQUALL_MAX_BODY_SIZE") {
            config.max_body_size = parse("max body size", &size)?;
        }
        if let Some(backlog) = lookup("SQUALL_BACKLOG") {
            config.backlog = parse("backlog", &backlog)?;
        }
        Ok(config)
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn serve_options(&self) -> ServeOptions {
        ServeOptions {
            hostname: self.hostname.clone(),
            port: self.port,
            max_body_size: self.max_body_size,
            backlog: self.backlog,
        }
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid {}: {:?}", name, value)))
}
