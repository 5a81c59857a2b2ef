//! Static configuration templates
//!
//! A template lists the compilers and networks to configure and marks which
//! fields are read from the environment. In TOML:
//!
//! ```toml
//! [[compilers]]
//! version = "0.8.17"
//! optimizer = { enabled = true, runs = 200 }
//!
//! [networks.test_polygon]
//! url = { env = "POLYGON_TEST_NETWORK" }
//! chain_id = 80001
//! gas_price = "auto"
//! accounts = [{ env = "DEPLOYER" }, { env = "TESTER1" }]
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::config::{ConfigError, GasPrice, OptimizerSettings};
use crate::env::Environment;

/// Environment variable naming a template file to use
pub const TEMPLATE_ENV: &str = "POLYDEPLOY_TEMPLATE";

/// Template file picked up from the working directory
pub const DEFAULT_TEMPLATE_FILE: &str = "deploy.toml";

pub const TEST_POLYGON: &str = "test_polygon";
pub const MAIN_POLYGON: &str = "main_polygon";

/// Where a field's value comes from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Source<T> {
    /// Read from the named environment variable
    Env { env: String },
    /// Used as written
    Value(T),
}

impl<T> Source<T> {
    pub fn env(name: impl Into<String>) -> Self {
        Source::Env { env: name.into() }
    }

    /// Environment variable this field reads, if any
    pub fn env_name(&self) -> Option<&str> {
        match self {
            Source::Env { env } => Some(env),
            Source::Value(_) => None,
        }
    }
}

impl<T> Source<T>
where
    T: Clone + FromStr,
    T::Err: fmt::Display,
{
    /// Produce the field value, reading and parsing the environment if needed
    ///
    /// # Errors
    ///
    /// `MissingVar` when the variable is unset or blank, `Validation` when
    /// its value does not parse.
    pub fn resolve<E>(&self, env: &E, field: &str) -> Result<T, ConfigError>
    where
        E: Environment + ?Sized,
    {
        self.resolve_with(env, field, |raw: &str| raw.parse::<T>())
    }
}

impl<T: Clone> Source<T> {
    /// Like [`Source::resolve`], parsing environment values with `parse`
    pub fn resolve_with<E, F, Err>(
        &self,
        env: &E,
        field: &str,
        parse: F,
    ) -> Result<T, ConfigError>
    where
        E: Environment + ?Sized,
        F: FnOnce(&str) -> Result<T, Err>,
        Err: fmt::Display,
    {
        match self {
            Source::Value(value) => Ok(value.clone()),
            Source::Env { env: key } => {
                let raw = env
                    .non_empty(key)
                    .ok_or_else(|| ConfigError::MissingVar(key.clone()))?;
                debug!(var = %key, field, "resolved from environment");
                parse(&raw).map_err(|e| {
                    ConfigError::Validation(format!("{} (from {}): {}", field, key, e))
                })
            }
        }
    }
}

/// Compiler entry of a template
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompilerTemplate {
    pub version: String,
    #[serde(default)]
    pub optimizer: OptimizerSettings,
}

/// Network entry of a template
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkTemplate {
    pub url: Source<String>,
    pub chain_id: Source<u64>,
    #[serde(default = "auto_gas_price")]
    pub gas_price: Source<GasPrice>,
    #[serde(default)]
    pub accounts: Vec<Source<String>>,
}

fn auto_gas_price() -> Source<GasPrice> {
    Source::Value(GasPrice::Auto)
}

impl NetworkTemplate {
    fn env_vars(&self) -> impl Iterator<Item = &str> {
        self.url
            .env_name()
            .into_iter()
            .chain(self.chain_id.env_name())
            .chain(self.gas_price.env_name())
            .chain(self.accounts.iter().filter_map(Source::env_name))
    }
}

/// Compilers and networks to resolve
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub compilers: Vec<CompilerTemplate>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkTemplate>,
}

impl Template {
    /// Polygon Mumbai testnet and Polygon mainnet, compiler 0.8.17
    pub fn builtin() -> Self {
        let accounts = || {
            vec![
                Source::env("DEPLOYER"),
                Source::env("TESTER1"),
                Source::env("TESTER2"),
            ]
        };

        let networks = BTreeMap::from([
            (
                TEST_POLYGON.to_string(),
                NetworkTemplate {
                    url: Source::env("POLYGON_TEST_NETWORK"),
                    chain_id: Source::Value(80001),
                    gas_price: auto_gas_price(),
                    accounts: accounts(),
                },
            ),
            (
                MAIN_POLYGON.to_string(),
                NetworkTemplate {
                    url: Source::env("POLYGON_MAINNET_NETWORK"),
                    chain_id: Source::Value(137),
                    gas_price: auto_gas_price(),
                    accounts: accounts(),
                },
            ),
        ]);

        Template {
            compilers: vec![CompilerTemplate {
                version: "0.8.17".to_string(),
                optimizer: OptimizerSettings {
                    enabled: true,
                    runs: 200,
                },
            }],
            networks,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Toml)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Pick the template for this invocation
    ///
    /// `$POLYDEPLOY_TEMPLATE` wins, then `deploy.toml` in the working
    /// directory, then [`Template::builtin`].
    pub fn discover<E>(env: &E) -> Result<Self, ConfigError>
    where
        E: Environment + ?Sized,
    {
        if let Some(path) = env.non_empty(TEMPLATE_ENV) {
            debug!(path = %path, "using template from {}", TEMPLATE_ENV);
            return Self::from_path(path);
        }

        let local = Path::new(DEFAULT_TEMPLATE_FILE);
        if local.exists() {
            debug!(path = %local.display(), "using template from working directory");
            return Self::from_path(local);
        }

        debug!("using built-in template");
        Ok(Self::builtin())
    }

    /// `path` if given, otherwise [`Template::discover`]
    pub fn locate<E>(path: Option<&Path>, env: &E) -> Result<Self, ConfigError>
    where
        E: Environment + ?Sized,
    {
        match path {
            Some(path) => {
                debug!(path = %path.display(), "using explicit template");
                Self::from_path(path)
            }
            None => Self::discover(env),
        }
    }

    /// Every environment variable the template reads, sorted and deduplicated
    pub fn env_vars(&self) -> Vec<&str> {
        self.networks
            .values()
            .flat_map(NetworkTemplate::env_vars)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
