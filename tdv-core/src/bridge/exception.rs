//! 错误通道
//!
//! 把原生异常句柄转换为 [`BridgeError`]，并保证句柄在任何路径上恰好释放一次。

use super::{Bridge, ExceptionHandle, ExceptionSlot};
use crate::error::BridgeError;
use crate::log::BRIDGE;
use tracing::debug;

/// 异常句柄守卫：离开作用域时释放句柄
struct ExceptionGuard<'a> {
    bridge: &'a dyn Bridge,
    handle: ExceptionHandle,
}

impl Drop for ExceptionGuard<'_> {
    fn drop(&mut self) {
        self.bridge.exception_release(self.handle);
    }
}

/// 检查异常槽
///
/// 槽为空时直接返回；否则读取错误码和消息、释放句柄并返回错误。
pub fn check_exception(bridge: &dyn Bridge, slot: ExceptionSlot) -> Result<(), BridgeError> {
    let Some(handle) = slot else {
        return Ok(());
    };
    let guard = ExceptionGuard { bridge, handle };
    let code = bridge.exception_code(guard.handle);
    let message = bridge.exception_message(guard.handle);
    drop(guard);

    debug!(target: BRIDGE, code = %format!("{:#x}", code), %message, "native call raised");
    Err(BridgeError { code, message })
}

/// 执行一次原生调用：准备空异常槽、调用、检查
///
/// 所有入口都经由这里，调用方拿不到未检查的结果。
pub fn call<T>(
    bridge: &dyn Bridge,
    f: impl FnOnce(&mut ExceptionSlot) -> T,
) -> Result<T, BridgeError> {
    let mut slot: ExceptionSlot = None;
    let out = f(&mut slot);
    check_exception(bridge, slot)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{codes, MemoryBridge};

    #[test]
    fn test_empty_slot_releases_nothing() {
        let bridge = MemoryBridge::new();
        assert!(check_exception(&bridge, None).is_ok());
        assert_eq!(bridge.stats().exceptions_released, 0);
    }

    #[test]
    fn test_raised_exception_released_once() {
        let bridge = MemoryBridge::new();
        let result = call(&bridge, |eh| {
            let root = bridge.context_create(eh);
            let root = root.unwrap();
            bridge.context_get_by_key(root, "missing", eh)
        });

        let err = result.unwrap_err();
        assert_eq!(err.code, codes::CONTEXT_GET_BY_KEY);
        let stats = bridge.stats();
        assert_eq!(stats.exceptions_raised, 1);
        assert_eq!(stats.exceptions_released, 1);
        assert_eq!(bridge.outstanding_exceptions(), 0);
    }

    #[test]
    fn test_call_returns_value_on_success() {
        let bridge = MemoryBridge::new();
        let root = call(&bridge, |eh| bridge.context_create(eh)).unwrap();
        assert!(root.is_some());
    }
}
