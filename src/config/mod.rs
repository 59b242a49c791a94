//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, read node files)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → handed to Server::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::IdentityConfig;
pub use schema::LimitsConfig;
pub use schema::NamespaceConfig;
pub use schema::ObservabilityConfig;
pub use schema::RunnerConfig;
pub use schema::SchedulerConfig;
pub use schema::ServerConfig;
