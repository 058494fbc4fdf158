//! Layered configuration resolution.
//!
//! Sources hand in trees of leaf, map and array nodes. The engine merges
//! them per tag set, walks the merged tree for a dotted path, and decodes
//! the node into a typed value, collecting leveled diagnostics on the way
//! instead of failing at the first problem.

pub mod builder;
pub mod cache;
pub mod cli;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod loader;
pub mod logging;
pub mod merge;
pub mod navigator;
pub mod node;
pub mod roots;
pub mod settings;
pub mod source;
pub mod tags;
pub mod transform;
pub mod validation;
pub mod watcher;

pub use builder::{Config, ConfigBuilder};
pub use cache::CachedConfig;
pub use decoder::{ConfigType, DecodedValue, ObjectDescriptor, TypeDescriptor};
pub use engine::{ConfigEngine, ConfigProvider, ReloadListener};
pub use error::{ConfigError, Result};
pub use node::{ConfigNode, ConfigNodeContainer, NodeRef, SourceId};
pub use settings::ConfigSettings;
pub use tags::{Tag, Tags};
pub use validation::{Validated, ValidationError, ValidationLevel};
