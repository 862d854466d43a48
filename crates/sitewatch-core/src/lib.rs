pub mod config;
pub mod types;

pub use config::{NotifyConfig, SitewatchConfig};
pub use types::*;
