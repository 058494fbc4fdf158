//! CLI command definitions for layerconf
//!
//! This module defines the CLI structure using clap's derive macros, plus
//! the helpers the binary uses to turn arguments into a loaded [`Config`].

use crate::builder::{Config, ConfigBuilder};
use crate::decoder::{DecodedValue, TypeDescriptor};
use crate::error::Result;
use crate::roots::StrategyKind;
use crate::settings::ConfigSettings;
use crate::source::{EnvironmentConfigSource, FileConfigSource};
use crate::tags::Tags;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

/// Layered configuration inspector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Policy settings file (YAML)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    /// Tag resolution strategy
    #[arg(long, value_enum, default_value = "exact", global = true)]
    pub strategy: StrategyArg,

    /// Also load environment variables under this prefix (highest precedence)
    #[arg(long, global = true)]
    pub env_prefix: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve and print a single value
    Get(GetArgs),

    /// Print the merged tree for a tag set, secrets masked
    Dump(DumpArgs),

    /// Print a value, then print it again after every reload
    Watch(GetArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GetArgs {
    /// Dotted config path, e.g. `db.hosts[0]`
    pub path: String,

    /// Type to decode the value as
    #[arg(long = "type", value_enum, default_value = "string")]
    pub kind: ValueKind,

    /// Request tags, `key=value` (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Config files, lowest precedence first
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DumpArgs {
    /// Request tags, `key=value` (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Show secret values instead of masking them
    #[arg(long)]
    pub show_secrets: bool,

    /// Config files, lowest precedence first
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StrategyArg {
    /// Untagged root, then the exact tag match
    #[default]
    Exact,
    /// Untagged root, then every root whose tags are a subset of the request
    Subset,
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Exact => StrategyKind::ExactMatchWithFallback,
            StrategyArg::Subset => StrategyKind::SubsetWithFallback,
        }
    }
}

/// Decode targets available from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ValueKind {
    #[default]
    String,
    Int,
    Uint,
    Float,
    Bool,
    Duration,
    Date,
    DateTime,
    Uuid,
    Path,
    /// List of strings
    List,
    /// Map of string to string
    Map,
    /// The raw subtree
    Node,
}

impl ValueKind {
    pub fn descriptor(self) -> TypeDescriptor {
        match self {
            ValueKind::String => TypeDescriptor::String,
            ValueKind::Int => TypeDescriptor::I64,
            ValueKind::Uint => TypeDescriptor::U64,
            ValueKind::Float => TypeDescriptor::F64,
            ValueKind::Bool => TypeDescriptor::Bool,
            ValueKind::Duration => TypeDescriptor::Duration,
            ValueKind::Date => TypeDescriptor::Date,
            ValueKind::DateTime => TypeDescriptor::DateTime,
            ValueKind::Uuid => TypeDescriptor::Uuid,
            ValueKind::Path => TypeDescriptor::Path,
            ValueKind::List => TypeDescriptor::list(TypeDescriptor::String),
            ValueKind::Map => TypeDescriptor::map(TypeDescriptor::String, TypeDescriptor::String),
            ValueKind::Node => TypeDescriptor::Node,
        }
    }
}

/// Combine repeated `--tag key=value` arguments.
pub fn parse_tags(args: &[String]) -> std::result::Result<Tags, String> {
    Tags::from_str(&args.join(","))
}

/// Build and load a config from files plus an optional environment prefix.
pub fn load_config(cli: &Cli, files: &[PathBuf]) -> Result<Config> {
    let settings = match &cli.settings {
        Some(path) => ConfigSettings::load(path)?,
        None => ConfigSettings::default(),
    };
    let mut builder = ConfigBuilder::new()
        .with_settings(settings)
        .with_strategy(StrategyKind::from(cli.strategy).build());
    for file in files {
        builder = builder.add_source(FileConfigSource::new(file));
    }
    if let Some(prefix) = &cli.env_prefix {
        builder = builder.add_source(EnvironmentConfigSource::new(prefix));
    }
    let config = builder.build()?;
    config.load_configs()?;
    Ok(config)
}

/// Text shown for a decoded value.
pub fn render_value(value: &DecodedValue, mask_secrets: bool) -> String {
    match value {
        DecodedValue::Node(node) => node.render(mask_secrets),
        DecodedValue::Duration(d) => format!("{:?}", d),
        DecodedValue::List(_) | DecodedValue::Map(_) | DecodedValue::Object(_) => {
            serde_json::to_string_pretty(&value.to_json()).unwrap_or_else(|_| value.to_key_string())
        }
        scalar => scalar.to_key_string(),
    }
}
