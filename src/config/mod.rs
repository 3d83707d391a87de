//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → ServerHandle::create
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a handle is created
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ConnectionConfig, DebugConfig, ObservabilityConfig, PayloadConfig, ServerConfig,
    ServerSettings, TimeoutConfig,
};
pub use validation::ValidationIssue;
