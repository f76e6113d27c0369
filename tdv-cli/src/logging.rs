//! CLI 日志系统初始化
//!
//! 基于 `tracing-subscriber`，按目标（context / bridge / block / engine / service）控制级别。
//! 日志写到 stderr，stdout 只留给结果文档。

use crate::config::LogConfig;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tdv_config::Target;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::Targets,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// 日志输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// 彩色格式化（开发使用）
    Pretty,
    /// 紧凑格式
    Compact,
    /// JSON 格式（工具集成）
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Result<LogFormat, String> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("未知的日志格式 '{}'", s)),
        }
    }
}

/// 按日志配置构造目标过滤器
pub fn build_targets(log_config: &LogConfig) -> Targets {
    Target::ALL
        .into_iter()
        .map(|t| t.target())
        .fold(Targets::new().with_default(log_config.global), |targets, name| {
            targets.with_target(name, log_config.level_for(name))
        })
}

/// 使用指定格式和日志配置初始化日志系统
///
/// 指定文件时同时写入 stderr 和文件（追加）。
pub fn init_with_file<P: AsRef<Path>>(
    log_config: &LogConfig,
    format: LogFormat,
    file: Option<P>,
) -> Result<(), String> {
    let targets = build_targets(log_config);

    let file_layer = match file {
        Some(path) => {
            let path = path.as_ref();
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("无法打开日志文件 '{}': {}", path.display(), e))?;
            Some(create_format_layer(format, Mutex::new(handle), false).with_filter(targets.clone()))
        }
        None => None,
    };
    let stderr_layer = create_format_layer(format, io::stderr, true).with_filter(targets);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("日志系统初始化失败: {}", e))
}

/// Create formatter layer based on format
fn create_format_layer<S, W>(
    format: LogFormat,
    make_writer: W,
    ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_ansi(ansi)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_ansi(ansi)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
    }
}
