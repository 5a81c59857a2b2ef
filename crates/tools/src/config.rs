//! Compiler and network configuration for the contract toolchain
//!
//! This module resolves a [`Template`] against an [`Environment`] and
//! produces an immutable [`Config`]: the compiler profiles and the named
//! network profiles the external build/deploy tool consumes.
//!
//! Resolution order:
//!
//! 1. `.env` in the working directory (optional, loaded by [`Config::load`])
//! 2. Template from `$POLYDEPLOY_TEMPLATE`, `deploy.toml`, or the built-in one
//! 3. Every `{ env = "..." }` reference is read from the environment
//! 4. Error if a referenced variable is unset or a value fails validation
//!
//! # Examples
//!
//! ```rust,no_run
//! use polydeploy_tools::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let test = config.network("test_polygon").expect("declared network");
//! println!("RPC URL: {}", test.url);
//! println!("Chain ID: {}", test.chain_id);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::env::{Environment, ProcessEnv};
use crate::template::{CompilerTemplate, NetworkTemplate, Template};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required environment variable is unset or empty
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    /// A value is present but structurally invalid
    #[error("Configuration validation failed: {0}")]
    Validation(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

impl ConfigError {
    /// True for missing or empty required inputs
    pub fn is_configuration(&self) -> bool {
        matches!(self, ConfigError::MissingVar(_))
    }

    /// True for inputs that are present but malformed
    pub fn is_validation(&self) -> bool {
        matches!(self, ConfigError::Validation(_))
    }
}

/// Optimizer switch and run count passed to the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    pub enabled: bool,
    pub runs: u32,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        OptimizerSettings {
            enabled: false,
            runs: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompilerSettings {
    pub optimizer: OptimizerSettings,
}

/// One compiler release with its settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilerProfile {
    /// `MAJOR.MINOR.PATCH` compiler release
    pub version: String,
    pub settings: CompilerSettings,
}

impl CompilerProfile {
    pub fn optimizer(&self) -> OptimizerSettings {
        self.settings.optimizer
    }
}

/// Gas price policy for transactions sent to a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GasPrice {
    /// Let the node estimate the price
    #[default]
    Auto,
    /// Fixed price in wei
    Wei(u64),
}

impl FromStr for GasPrice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(GasPrice::Auto);
        }
        let invalid = || format!("expected \"auto\" or an integer wei amount, got {:?}", s);
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        s.parse::<u64>().map(GasPrice::Wei).map_err(|_| invalid())
    }
}

impl fmt::Display for GasPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasPrice::Auto => write!(f, "auto"),
            GasPrice::Wei(wei) => write!(f, "{} wei", wei),
        }
    }
}

impl Serialize for GasPrice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            GasPrice::Auto => serializer.serialize_str("auto"),
            GasPrice::Wei(wei) => serializer.serialize_u64(*wei),
        }
    }
}

impl<'de> Deserialize<'de> for GasPrice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Wei(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Wei(wei) => Ok(GasPrice::Wei(wei)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Account credential (private key or signer reference)
///
/// Formatting redacts the value; use [`Secret::expose`] to read it.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    fn redacted(&self) -> String {
        if self.0.chars().count() > 8 {
            let prefix: String = self.0.chars().take(4).collect();
            format!("{}...", prefix)
        } else {
            "****".to_string()
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", self.redacted())
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl PartialEq<&str> for Secret {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Resolved connection descriptor for one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    #[serde(skip)]
    pub name: String,
    pub url: String,
    pub chain_id: u64,
    pub gas_price: GasPrice,
    /// Signers in precedence order; the first one deploys
    pub accounts: Vec<Secret>,
}

impl NetworkProfile {
    /// Primary deployer account
    pub fn deployer(&self) -> Option<&Secret> {
        self.accounts.first()
    }
}

/// Resolved runtime configuration with all required fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Compiler profiles in declaration order
    pub compilers: Vec<CompilerProfile>,
    /// Network profiles keyed by name
    pub networks: BTreeMap<String, NetworkProfile>,
}

impl Config {
    /// Load configuration from `.env`, the discovered template and the
    /// process environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The template file cannot be read or parsed
    /// - A variable referenced by the template is unset or empty
    /// - A resolved value fails validation
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None, None)
    }

    /// [`Config::load`] with an explicit template file and/or a single network
    ///
    /// `None` for `template` falls back to [`Template::discover`]; `None` for
    /// `network` resolves every network.
    pub fn load_with(template: Option<&Path>, network: Option<&str>) -> Result<Self, ConfigError> {
        load_dotenv();

        let template = Template::locate(template, &ProcessEnv)?;
        match network {
            Some(name) => Self::load_network(&ProcessEnv, &template, name),
            None => Self::load_from(&ProcessEnv, &template),
        }
    }

    /// Resolve every compiler and every network of `template`
    pub fn load_from<E>(env: &E, template: &Template) -> Result<Self, ConfigError>
    where
        E: Environment + ?Sized,
    {
        let compilers = resolve_compilers(template)?;

        let mut networks = BTreeMap::new();
        for (name, network) in &template.networks {
            networks.insert(name.clone(), resolve_network(env, name, network)?);
        }

        info!(
            compilers = compilers.len(),
            networks = networks.len(),
            "configuration loaded"
        );

        Ok(Config {
            compilers,
            networks,
        })
    }

    /// Resolve the compilers and only the named network
    ///
    /// Variables referenced solely by other networks are not required.
    pub fn load_network<E>(env: &E, template: &Template, name: &str) -> Result<Self, ConfigError>
    where
        E: Environment + ?Sized,
    {
        let network = template
            .networks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))?;

        let compilers = resolve_compilers(template)?;
        let profile = resolve_network(env, name, network)?;

        info!(network = name, "configuration loaded for single network");

        Ok(Config {
            compilers,
            networks: BTreeMap::from([(name.to_string(), profile)]),
        })
    }

    /// Look up a network by name
    pub fn network(&self, name: &str) -> Option<&NetworkProfile> {
        self.networks.get(name)
    }

    pub fn network_names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }

    /// Primary compiler profile
    pub fn compiler(&self) -> Option<&CompilerProfile> {
        self.compilers.first()
    }

    /// Human-readable summary with secrets redacted
    pub fn summary(&self) -> String {
        self.to_string()
    }

    /// Print the resolved configuration
    pub fn print_summary(&self) {
        print!("{}", self.summary());
    }

    /// Get configuration as JSON in the toolchain's config shape
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔════════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║         CONTRACT TOOLCHAIN CONFIGURATION RESOLVED              ║")?;
        writeln!(f, "╚════════════════════════════════════════════════════════════════╝")?;

        for compiler in &self.compilers {
            let optimizer = compiler.optimizer();
            writeln!(f, "  Compiler:            {}", compiler.version)?;
            if optimizer.enabled {
                writeln!(f, "  Optimizer:           enabled ({} runs)", optimizer.runs)?;
            } else {
                writeln!(f, "  Optimizer:           disabled")?;
            }
        }

        for network in self.networks.values() {
            writeln!(f, "  ── {} ──", network.name)?;
            writeln!(f, "  RPC URL:             {}", network.url)?;
            writeln!(f, "  Chain ID:            {}", network.chain_id)?;
            writeln!(f, "  Gas Price:           {}", network.gas_price)?;
            for (index, account) in network.accounts.iter().enumerate() {
                let role = if index == 0 { "deployer" } else { "signer" };
                writeln!(f, "  Account #{:<2}         {} ({})", index, account, role)?;
            }
        }

        writeln!(f, "╚════════════════════════════════════════════════════════════════╝")
    }
}

// The toolchain expects compilers nested under "solidity".
impl Serialize for Config {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        #[derive(Serialize)]
        struct Solidity<'a> {
            compilers: &'a [CompilerProfile],
        }

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(
            "solidity",
            &Solidity {
                compilers: &self.compilers,
            },
        )?;
        map.serialize_entry("networks", &self.networks)?;
        map.end()
    }
}

/// Load `.env` from the working directory or its parents, if any
///
/// Variables already set in the process environment are not overridden.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "loaded .env");
    }
}

/// Parse a chain ID from text: ASCII digits only, no sign
pub(crate) fn parse_chain_id(raw: &str) -> Result<u64, String> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("chain ID must be a decimal integer, got {:?}", raw));
    }
    raw.parse::<u64>().map_err(|e| format!("chain ID {:?}: {}", raw, e))
}

fn resolve_compilers(template: &Template) -> Result<Vec<CompilerProfile>, ConfigError> {
    if template.compilers.is_empty() {
        return Err(ConfigError::Validation(
            "at least one compiler must be declared".to_string(),
        ));
    }
    template.compilers.iter().map(resolve_compiler).collect()
}

fn resolve_compiler(compiler: &CompilerTemplate) -> Result<CompilerProfile, ConfigError> {
    validate_version(&compiler.version)?;
    Ok(CompilerProfile {
        version: compiler.version.clone(),
        settings: CompilerSettings {
            optimizer: compiler.optimizer,
        },
    })
}

fn resolve_network<E>(
    env: &E,
    name: &str,
    network: &NetworkTemplate,
) -> Result<NetworkProfile, ConfigError>
where
    E: Environment + ?Sized,
{
    debug!(network = name, "resolving network");

    let url = network.url.resolve(env, &format!("{}.url", name))?;
    validate_url(name, &url)?;

    let chain_id = network
        .chain_id
        .resolve_with(env, &format!("{}.chain_id", name), parse_chain_id)?;
    if chain_id == 0 {
        return Err(ConfigError::Validation(format!(
            "{}: chain ID must be a positive integer",
            name
        )));
    }

    let gas_price = network.gas_price.resolve(env, &format!("{}.gas_price", name))?;
    if gas_price == GasPrice::Wei(0) {
        return Err(ConfigError::Validation(format!(
            "{}: fixed gas price must be greater than zero",
            name
        )));
    }

    if network.accounts.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{}: at least one account is required",
            name
        )));
    }

    let mut accounts = Vec::with_capacity(network.accounts.len());
    for (index, account) in network.accounts.iter().enumerate() {
        let value = account.resolve(env, &format!("{}.accounts[{}]", name, index))?;
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{}: account #{} is empty",
                name, index
            )));
        }
        accounts.push(Secret::new(value.trim()));
    }

    Ok(NetworkProfile {
        name: name.to_string(),
        url,
        chain_id,
        gas_price,
        accounts,
    })
}

/// Check a `MAJOR.MINOR.PATCH` compiler release in the 0.4 to 0.8 series
fn validate_version(version: &str) -> Result<(), ConfigError> {
    let invalid = || {
        ConfigError::Validation(format!(
            "compiler version must be MAJOR.MINOR.PATCH: {:?}",
            version
        ))
    };

    let parts = version
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u32>().map_err(|_| invalid())
        })
        .collect::<Result<Vec<_>, _>>()?;

    match parts.as_slice() {
        [0, minor, _] if (4..=8).contains(minor) => Ok(()),
        [_, _, _] => Err(ConfigError::Validation(format!(
            "unsupported compiler version {}: expected a 0.4.x to 0.8.x release",
            version
        ))),
        _ => Err(invalid()),
    }
}

fn validate_url(network: &str, url: &str) -> Result<(), ConfigError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));

    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ConfigError::Validation(format!(
            "{}: RPC URL must start with http:// or https://: {}",
            network, url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Source;

    fn polygon_env() -> BTreeMap<String, String> {
        [
            ("POLYGON_TEST_NETWORK", "https://rpc.test"),
            ("POLYGON_MAINNET_NETWORK", "https://rpc.main"),
            ("DEPLOYER", "0xAA"),
            ("TESTER1", "0xBB"),
            ("TESTER2", "0xCC"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_validate_version() {
        assert!(validate_version("0.8.17").is_ok());
        assert!(validate_version("0.4.11").is_ok());
        assert!(validate_version("0.8").unwrap_err().is_validation());
        assert!(validate_version("v0.8.17").unwrap_err().is_validation());
        assert!(validate_version("0.8.17.1").unwrap_err().is_validation());
        assert!(validate_version("0.8.x").unwrap_err().is_validation());
        assert!(validate_version("1.0.0").unwrap_err().is_validation());
        assert!(validate_version("0.3.6").unwrap_err().is_validation());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("n", "https://rpc.test").is_ok());
        assert!(validate_url("n", "http://localhost:8545").is_ok());
        assert!(validate_url("n", "ftp://example.com").is_err());
        assert!(validate_url("n", "https://").is_err());
        assert!(validate_url("n", "undefined").is_err());
    }

    #[test]
    fn test_gas_price_parse() {
        assert_eq!("auto".parse::<GasPrice>().unwrap(), GasPrice::Auto);
        assert_eq!("AUTO".parse::<GasPrice>().unwrap(), GasPrice::Auto);
        assert_eq!(
            "30000000000".parse::<GasPrice>().unwrap(),
            GasPrice::Wei(30_000_000_000)
        );
        assert!("fast".parse::<GasPrice>().is_err());
        assert!("+5".parse::<GasPrice>().is_err());
        assert!("-5".parse::<GasPrice>().is_err());
    }

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(parse_chain_id("80001"), Ok(80001));
        assert!(parse_chain_id("+80001").is_err());
        assert!(parse_chain_id("-1").is_err());
        assert!(parse_chain_id("0x13881").is_err());
        assert!(parse_chain_id("").is_err());
        assert!(parse_chain_id("99999999999999999999999").is_err());
    }

    #[test]
    fn test_signed_env_chain_id_rejected() {
        let mut template = Template::builtin();
        template.networks.get_mut("test_polygon").unwrap().chain_id = Source::env("CHAIN_ID");

        let mut env = polygon_env();
        env.insert("CHAIN_ID".to_string(), "+80001".to_string());
        let err = Config::load_from(&env, &template).unwrap_err();
        assert!(err.is_validation(), "{}", err);
        assert!(err.to_string().contains("CHAIN_ID"));

        env.insert("CHAIN_ID".to_string(), "80001".to_string());
        let config = Config::load_from(&env, &template).unwrap();
        assert_eq!(config.networks["test_polygon"].chain_id, 80001);
    }

    #[test]
    fn test_gas_price_serialize() {
        assert_eq!(serde_json::to_string(&GasPrice::Auto).unwrap(), "\"auto\"");
        assert_eq!(serde_json::to_string(&GasPrice::Wei(5)).unwrap(), "5");
    }

    #[test]
    fn test_secret_redaction() {
        let long = Secret::new(
            "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        );
        assert_eq!(long.to_string(), "0x59...");
        assert!(!format!("{:?}", long).contains("dc9e86"));

        let short = Secret::new("0xAA");
        assert_eq!(short.to_string(), "****");
        assert_eq!(short.expose(), "0xAA");
    }

    #[test]
    fn test_load_builtin() {
        let config = Config::load_from(&polygon_env(), &Template::builtin()).unwrap();

        assert_eq!(config.compilers.len(), 1);
        assert_eq!(config.network_names().collect::<Vec<_>>(), ["main_polygon", "test_polygon"]);

        let test = config.network("test_polygon").unwrap();
        assert_eq!(test.name, "test_polygon");
        assert_eq!(test.url, "https://rpc.test");
        assert_eq!(test.chain_id, 80001);
        assert_eq!(test.gas_price, GasPrice::Auto);
        assert_eq!(test.accounts, ["0xAA", "0xBB", "0xCC"]);
        assert_eq!(test.deployer().map(Secret::expose), Some("0xAA"));

        let main = config.network("main_polygon").unwrap();
        assert_eq!(main.url, "https://rpc.main");
        assert_eq!(main.chain_id, 137);
    }

    #[test]
    fn test_zero_chain_id_rejected() {
        let mut template = Template::builtin();
        template.networks.get_mut("test_polygon").unwrap().chain_id = Source::Value(0);

        let err = Config::load_from(&polygon_env(), &template).unwrap_err();
        assert!(err.is_validation(), "{}", err);
    }

    #[test]
    fn test_empty_accounts_rejected() {
        let mut template = Template::builtin();
        template.networks.get_mut("main_polygon").unwrap().accounts.clear();

        let err = Config::load_from(&polygon_env(), &template).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("main_polygon"));
    }

    #[test]
    fn test_no_compilers_rejected() {
        let mut template = Template::builtin();
        template.compilers.clear();

        assert!(Config::load_from(&polygon_env(), &template)
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_summary_redacts_accounts() {
        let mut env = polygon_env();
        env.insert(
            "DEPLOYER".to_string(),
            "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d".to_string(),
        );

        let config = Config::load_from(&env, &Template::builtin()).unwrap();
        let summary = config.summary();
        assert_eq!(summary, format!("{}", config));
        assert!(summary.contains("0.8.17"));
        assert!(summary.contains("enabled (200 runs)"));
        assert!(summary.contains("80001"));
        assert!(summary.contains("0x59... (deployer)"));
        assert!(!summary.contains("dc9e86"));
        assert!(!summary.contains("0xBB"));
    }

    #[test]
    fn test_json_shape() {
        let config = Config::load_from(&polygon_env(), &Template::builtin()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&config.to_json().unwrap()).unwrap();

        let compiler = &json["solidity"]["compilers"][0];
        assert_eq!(compiler["version"], "0.8.17");
        assert_eq!(compiler["settings"]["optimizer"]["enabled"], true);
        assert_eq!(compiler["settings"]["optimizer"]["runs"], 200);

        let test = &json["networks"]["test_polygon"];
        assert_eq!(test["url"], "https://rpc.test");
        assert_eq!(test["chainId"], 80001);
        assert_eq!(test["gasPrice"], "auto");
        assert_eq!(test["accounts"], serde_json::json!(["0xAA", "0xBB", "0xCC"]));
        assert!(test.get("name").is_none());
    }
}
