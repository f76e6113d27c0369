//! CLI 配置
//!
//! 日志级别：全局级别 + 按目标覆盖

use std::collections::HashMap;
use tdv_config::Target;
use tracing::Level;

/// CLI 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub global: Level,
    pub context: Option<Level>,
    pub bridge: Option<Level>,
    pub block: Option<Level>,
    pub engine: Option<Level>,
    pub service: Option<Level>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: Level::WARN,
            context: None,
            bridge: None,
            block: None,
            engine: None,
            service: None,
        }
    }
}

impl LogConfig {
    /// 由项目文件中的字符串构造；无法识别的级别或目标返回错误
    pub fn from_project(
        global: Option<&str>,
        overrides: &HashMap<String, String>,
    ) -> Result<Self, String> {
        let mut config = LogConfig::default();
        if let Some(level) = global {
            config.global = parse_log_level(level)?;
        }
        for (name, level) in overrides {
            let target =
                Target::from_name(name).ok_or_else(|| format!("未知的日志目标 '{}'", name))?;
            let level = Some(parse_log_level(level)?);
            match target {
                Target::Context => config.context = level,
                Target::Bridge => config.bridge = level,
                Target::Block => config.block = level,
                Target::Engine => config.engine = level,
                Target::Service => config.service = level,
                Target::Cli => {}
            }
        }
        Ok(config)
    }

    /// Get log level for a specific target
    pub fn level_for(&self, target: &str) -> Level {
        match target {
            "tdv::context" => self.context.unwrap_or(self.global),
            "tdv::bridge" => self.bridge.unwrap_or(self.global),
            "tdv::block" => self.block.unwrap_or(self.global),
            "tdv::engine" => self.engine.unwrap_or(self.global),
            "tdv::service" => self.service.unwrap_or(self.global),
            _ => self.global,
        }
    }
}

/// Parse log level string
pub fn parse_log_level(s: &str) -> Result<Level, String> {
    match s.to_lowercase().as_str() {
        "silent" => Ok(Level::ERROR), // silent = only errors
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(format!("未知的日志级别 '{}'", s)),
    }
}
