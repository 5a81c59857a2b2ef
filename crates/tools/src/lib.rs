//! Polydeploy Tools Library
//!
//! Resolves compiler and network configuration for a smart contract
//! build/deployment toolchain from a template and environment variables.

pub mod config;
pub mod env;
pub mod logging;
pub mod template;

pub use config::{
    CompilerProfile, Config, ConfigError, GasPrice, NetworkProfile, OptimizerSettings, Secret,
};
pub use env::{Environment, ProcessEnv};
pub use template::{Source, Template};
