//! 错误类型
//!
//! - [`BridgeError`]：原生侧失败（错误码 + 消息），由错误通道构造
//! - [`TdvError`]：包装层的统一错误

use std::fmt;
use thiserror::Error;

/// 原生侧错误
///
/// 只能由非空的异常句柄构造；句柄本身在读取后立即释放，不属于错误的一部分。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code:#x}: {message}")]
pub struct BridgeError {
    pub code: u32,
    pub message: String,
}

impl BridgeError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// TDV 错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TdvError {
    /// 原生调用失败
    #[error("{0}")]
    Bridge(#[from] BridgeError),

    /// 在已释放的值树上操作
    #[error("use after release: {0}")]
    UseAfterRelease(String),

    /// 无法识别的值类型（如缺少 unit_type）
    #[error("unsupported value type: {0}")]
    UnsupportedValueType(String),
}

pub type Result<T, E = TdvError> = std::result::Result<T, E>;

impl TdvError {
    /// 错误类别名称
    pub fn kind(&self) -> &'static str {
        match self {
            TdvError::Bridge(_) => "bridge",
            TdvError::UseAfterRelease(_) => "use_after_release",
            TdvError::UnsupportedValueType(_) => "unsupported_value_type",
        }
    }

    /// 原生错误码（仅 Bridge 错误有）
    pub fn code(&self) -> Option<u32> {
        match self {
            TdvError::Bridge(e) => Some(e.code),
            _ => None,
        }
    }

    /// 转换为结构化错误报告
    pub fn to_report(&self) -> ErrorReport {
        let message = match self {
            TdvError::Bridge(e) => e.message.clone(),
            TdvError::UseAfterRelease(m) | TdvError::UnsupportedValueType(m) => m.clone(),
        };
        ErrorReport {
            kind: self.kind(),
            code: self.code(),
            message,
        }
    }
}

/// 结构化错误报告
///
/// CLI 直接打印，上层应用可以自行格式化。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// 错误类别: bridge, use_after_release, unsupported_value_type
    pub kind: &'static str,
    /// 原生错误码
    pub code: Option<u32>,
    /// 错误消息（原生消息原样保留）
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {:#x}: {}", self.kind, code, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display_hex() {
        let err = BridgeError::new(0x9398017a, "no image");
        assert_eq!(err.to_string(), "0x9398017a: no image");
    }

    #[test]
    fn test_tdv_error_from_bridge() {
        let err: TdvError = BridgeError::new(0xb2a4ab43, "key not found").into();
        assert_eq!(err.kind(), "bridge");
        assert_eq!(err.code(), Some(0xb2a4ab43));
        assert_eq!(err.to_string(), "0xb2a4ab43: key not found");
    }

    #[test]
    fn test_report_without_code() {
        let err = TdvError::UnsupportedValueType("missing unit_type".into());
        let report = err.to_report();
        assert_eq!(report.kind, "unsupported_value_type");
        assert_eq!(report.code, None);
        assert_eq!(report.to_string(), "[unsupported_value_type] missing unit_type");
    }

    #[test]
    fn test_report_with_code() {
        let err: TdvError = BridgeError::new(0x10, "bad").into();
        assert_eq!(err.to_report().to_string(), "[bridge] 0x10: bad");
    }
}
