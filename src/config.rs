//! Client settings taken from the process environment.

use crate::api::{
    error::Error,
    retry::{Backoff, RetryPolicy},
};
use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

const TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
const PROXY_URL: &str = "http://127.0.0.1:8001";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub namespace: String,
    pub token: Option<String>,
    /// PEM file with the CA certificates to trust for `https` URLs.
    pub ca_file: Option<PathBuf>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: PROXY_URL.to_owned(),
            namespace: "default".to_owned(),
            token: None,
            ca_file: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, Error> {
    match value {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| {
            Error::Configuration(format!("{} has an invalid value: {:?}", key, value))
        }),
    }
}

impl Config {
    /// Read the settings from the environment.
    ///
    /// Inside a cluster the API server address comes from the service
    /// variables, the token and CA from the mounted service account.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Config::from_lookup(|key| env::var(key).ok())?;
        if config.token.is_none() {
            config.token = std::fs::read_to_string(TOKEN_PATH)
                .ok()
                .map(|token| token.trim().to_owned())
                .filter(|token| !token.is_empty());
        }
        if config.ca_file.is_none() && config.api_url.starts_with("https://") {
            config.ca_file = Some(Path::new(CA_PATH))
                .filter(|path| path.is_file())
                .map(Path::to_path_buf);
        }
        Ok(config)
    }

    /// Build the settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let defaults = Config::default();

        let api_url = match (
            get("EXPERIMENTS_API_URL"),
            get("KUBERNETES_SERVICE_HOST"),
            get("KUBERNETES_SERVICE_PORT"),
        ) {
            (Some(url), _, _) => url,
            (None, Some(host), port) => {
                format!("https://{}:{}", host, port.as_deref().unwrap_or("443"))
            }
            (None, None, _) => defaults.api_url,
        };

        let max_attempts = parse(
            "EXPERIMENTS_MAX_RETRIES",
            get("EXPERIMENTS_MAX_RETRIES"),
            defaults.retry.max_attempts,
        )?;
        let interval = parse(
            "EXPERIMENTS_RETRY_INTERVAL_MS",
            get("EXPERIMENTS_RETRY_INTERVAL_MS"),
            1000,
        )?;
        let timeout = parse("EXPERIMENTS_TIMEOUT_MS", get("EXPERIMENTS_TIMEOUT_MS"), 30_000)?;

        Ok(Config {
            api_url,
            namespace: get("EXPERIMENT_NAMESPACE").unwrap_or(defaults.namespace),
            token: get("EXPERIMENTS_API_TOKEN"),
            ca_file: get("EXPERIMENTS_CA_FILE").map(PathBuf::from),
            timeout: Duration::from_millis(timeout),
            retry: RetryPolicy::new(max_attempts, Backoff::Fixed(Duration::from_millis(interval))),
        })
    }
}
