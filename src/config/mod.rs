//! Configuration module for the Terrace apply engine.
//!
//! This module handles the read-only configuration consumed by an apply:
//! - The module tree (variables, providers, resources, outputs, module calls)
//! - Expressions and postconditions attached to it
//! - Loading the tree from YAML

mod parser;
mod spec;

pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{
    CheckRule, Config, Expression, ModuleCall, ModuleConfig, OutputDecl, ProviderBlock,
    ResourceBlock, VariableDecl,
};
