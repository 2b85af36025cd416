//! Application configuration

mod app_config;
pub mod layered;

pub use app_config::{AppConfig, LogFormat, LoggingConfig, ServerConfig};
pub use layered::{LayeredResolver, LayeredSettings, ResolvedFrom};
