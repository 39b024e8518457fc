//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            ClientBuilder::with_* calls
//!     → loader.rs (parse)               │
//!     → validation.rs (semantic checks) ◀┘
//!     → ClientSettings (validated, immutable)
//!     → ClientBuilder::build composes the client
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a client is built; a new client is built to change it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BreakerConfig, ClientConfig, ClientSettings, ObservabilityConfig, PoolConfig, RetryConfig,
};
pub use validation::ValidationError;
