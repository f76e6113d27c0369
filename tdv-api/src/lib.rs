//! TDV API - Service and pipeline layer
//!
//! Provides the entry points a host program works with:
//! - [`Service`]: creates processing blocks (with SDK defaults injected) and contexts
//! - [`Pipeline`]: runs several blocks over one tree
//! - Global configuration singleton for CLI convenience
//!
//! For library use, prefer passing a [`ServiceConfig`] explicitly.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;

pub use config::{config as get_config, init as init_config, is_initialized};
pub use error::ApiError;
pub use pipeline::Pipeline;
pub use service::Service;

// Re-export config types from tdv_config
pub use tdv_config::{LimitConfig, ServiceConfig, Target, TdvConfig};

// Re-export core types
pub use tdv_config;
pub use tdv_core::{
    Bridge, Context, ContextRef, ErrorReport, Map, MemoryBridge, ProcessingBlock, TdvError, Value,
};
