//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, CompletionSettings, EmbeddingSettings, IndexSettings, LogFormat, LoggingConfig,
};
