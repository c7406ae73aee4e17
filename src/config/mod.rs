//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, ConnectionStrings, LogFormat, LoggingConfig, StorageSettings, StorageType,
    USER_STORE_CONNECTION_NAME,
};
