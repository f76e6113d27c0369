//! 全局配置（供 CLI 使用）
//!
//! 库使用时应显式传递 [`ServiceConfig`](tdv_config::ServiceConfig)。

use crate::error::ApiError;
use once_cell::sync::{Lazy, OnceCell};
use tdv_config::TdvConfig;

// Global config singleton for CLI convenience
static GLOBAL_CONFIG: OnceCell<TdvConfig> = OnceCell::new();

static DEFAULT_CONFIG: Lazy<TdvConfig> = Lazy::new(TdvConfig::default);

/// Initialize global configuration (once per process)
pub fn init(config: TdvConfig) -> Result<(), ApiError> {
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| ApiError::AlreadyInitialized)
}

/// Get global config reference; defaults when not initialized
pub fn config() -> &'static TdvConfig {
    GLOBAL_CONFIG.get().unwrap_or(&*DEFAULT_CONFIG)
}

/// Check if config is initialized
pub fn is_initialized() -> bool {
    GLOBAL_CONFIG.get().is_some()
}
