pub mod config;
pub mod dataset;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use dataset::{DatasetLoader, Table};
pub use errors::{
    AgentError, ConnectError, DatasetError, PersistError, RenderError, SendError,
};
