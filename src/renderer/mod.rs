pub mod config;
pub mod core;

pub use self::config::{ContextConfig, WindowConfig};
pub use self::core::ResourceContext;
