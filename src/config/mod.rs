//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EchoConfig (validated, immutable)
//!     → CLI flags override individual fields
//!     → handed to server / client by value
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow running without a config file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    parse_metadata, ClientConfig, EchoConfig, ListenerConfig, LoggingConfig,
    ObservabilityConfig, ServerConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
