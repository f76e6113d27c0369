//! API 错误类型

use tdv_core::{ErrorReport, TdvError};
use thiserror::Error;

/// API 层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 值树、错误通道或处理单元的错误
    #[error("{0}")]
    Tdv(#[from] TdvError),

    /// 全局配置重复初始化
    #[error("config already initialized")]
    AlreadyInitialized,
}

impl ApiError {
    /// 转换为结构化错误报告
    pub fn to_report(&self) -> ErrorReport {
        match self {
            ApiError::Tdv(e) => e.to_report(),
            ApiError::AlreadyInitialized => ErrorReport {
                kind: "config",
                code: None,
                message: self.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_passes_through_core_errors() {
        let err = ApiError::from(TdvError::UnsupportedValueType("no unit_type".into()));
        let report = err.to_report();
        assert_eq!(report.kind, "unsupported_value_type");
        assert_eq!(report.message, "no unit_type");
    }

    #[test]
    fn test_already_initialized_report() {
        let report = ApiError::AlreadyInitialized.to_report();
        assert_eq!(report.to_string(), "[config] config already initialized");
    }
}
