//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → PolicyGateConfig (validated, immutable)
//!     → policy.rs (fragments with compiled matchers)
//!     → AggregatedConfiguration::replace
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → sent to the server, which replaces both policies
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A file that fails to parse or validate never replaces live policy

pub mod loader;
pub mod policy;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CorsConfig, CorsFragmentConfig, CsrfConfig, CsrfFragmentConfig, ListenerConfig, MatcherConfig,
    ObservabilityConfig, PolicyGateConfig, TimeoutConfig,
};
