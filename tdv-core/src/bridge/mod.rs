//! 原生桥接层
//!
//! [`Bridge`] 描述原生 SDK 暴露的全部入口：值树的分配/释放、标量读写、
//! 按键/下标导航、键枚举、处理单元的创建与执行。
//! 每个入口都接收一个异常槽 [`ExceptionSlot`]，失败时由原生侧填充。
//!
//! 包装层从不直接调用这些入口，而是经由 [`exception::call`]，
//! 它保证异常槽一定会被检查、异常句柄恰好释放一次。

pub mod codes;
pub mod exception;
pub mod memory;

#[cfg(feature = "native")]
pub mod ffi;
#[cfg(feature = "native")]
pub mod native;

use crate::value::Kind;
use std::num::NonZeroUsize;

pub use exception::{call, check_exception};
pub use memory::{BridgeStats, MemoryBridge};
#[cfg(feature = "native")]
pub use native::NativeBridge;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroUsize);

        impl $name {
            /// 从原始值构造；0 表示空句柄
            pub fn from_raw(raw: usize) -> Option<Self> {
                NonZeroUsize::new(raw).map(Self)
            }

            pub fn as_raw(self) -> usize {
                self.0.get()
            }
        }
    };
}

opaque_handle!(
    /// 值树节点句柄（根或视图）
    ContextHandle
);
opaque_handle!(
    /// 处理单元句柄
    BlockHandle
);
opaque_handle!(
    /// 异常句柄，读取后必须释放
    ExceptionHandle
);
opaque_handle!(
    /// 原生分配的内存（字符串、键缓冲区），需经 `free_ptr` 释放
    NativePtr
);

/// 异常槽：调用前为空，失败时被原生侧填充
pub type ExceptionSlot = Option<ExceptionHandle>;

/// `context_get_keys` 返回的临时缓冲区
///
/// 每个条目和缓冲区本身都是原生分配，调用方拷贝后必须逐一释放。
#[derive(Debug)]
pub struct KeyBuffer {
    pub buffer: NativePtr,
    pub entries: Vec<NativePtr>,
}

/// `getKeys` 实际写入的条目数
///
/// 长度超出时原生侧已按当前大小填充了前面的条目，其余槽位未初始化；
/// 其他错误不产生可用条目。
#[cfg_attr(not(feature = "native"), allow(dead_code))]
pub(crate) fn filled_key_entries(
    requested: u64,
    raised: Option<u32>,
    current_len: impl FnOnce() -> u64,
) -> u64 {
    match raised {
        None => requested,
        Some(codes::KEYS_LENGTH_EXCEEDS) => current_len().min(requested),
        Some(_) => 0,
    }
}

/// 原生入口集合
pub trait Bridge {
    // ==================== 异常 ====================

    fn exception_code(&self, eh: ExceptionHandle) -> u32;
    fn exception_message(&self, eh: ExceptionHandle) -> String;
    fn exception_release(&self, eh: ExceptionHandle);

    // ==================== 生命周期 ====================

    /// 分配新的根节点（初始为 None）
    fn context_create(&self, eh: &mut ExceptionSlot) -> Option<ContextHandle>;
    /// 释放根节点及其整棵子树
    fn context_destroy(&self, ctx: ContextHandle, eh: &mut ExceptionSlot);
    /// 深拷贝为新的根节点
    fn context_clone(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> Option<ContextHandle>;
    /// 用 `src` 的深拷贝覆盖 `dst`
    fn context_copy(&self, src: ContextHandle, dst: ContextHandle, eh: &mut ExceptionSlot);
    /// 重置为 None
    fn context_clear(&self, ctx: ContextHandle, eh: &mut ExceptionSlot);

    // ==================== 导航 ====================

    fn context_get_by_index(
        &self,
        ctx: ContextHandle,
        index: u64,
        eh: &mut ExceptionSlot,
    ) -> Option<ContextHandle>;
    fn context_get_by_key(
        &self,
        ctx: ContextHandle,
        key: &str,
        eh: &mut ExceptionSlot,
    ) -> Option<ContextHandle>;
    fn context_get_or_insert_by_key(
        &self,
        ctx: ContextHandle,
        key: &str,
        eh: &mut ExceptionSlot,
    ) -> Option<ContextHandle>;
    /// 追加元素；`copy` 为 false 时移走 `data` 的内容
    fn context_push_back(
        &self,
        ctx: ContextHandle,
        data: ContextHandle,
        copy: bool,
        eh: &mut ExceptionSlot,
    );
    fn context_get_length(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> u64;
    /// 枚举键；`length` 为调用方预先取得的长度
    fn context_get_keys(
        &self,
        ctx: ContextHandle,
        length: u64,
        eh: &mut ExceptionSlot,
    ) -> Option<KeyBuffer>;

    /// 拷贝一个原生字符串
    fn read_str(&self, ptr: NativePtr) -> String;
    /// 释放原生分配
    fn free_ptr(&self, ptr: NativePtr);

    // ==================== 写入 ====================

    fn context_put_str(&self, ctx: ContextHandle, value: &str, eh: &mut ExceptionSlot);
    fn context_put_long(&self, ctx: ContextHandle, value: i64, eh: &mut ExceptionSlot);
    fn context_put_unsigned_long(&self, ctx: ContextHandle, value: u64, eh: &mut ExceptionSlot);
    fn context_put_double(&self, ctx: ContextHandle, value: f64, eh: &mut ExceptionSlot);
    fn context_put_bool(&self, ctx: ContextHandle, value: bool, eh: &mut ExceptionSlot);
    fn context_put_data(&self, ctx: ContextHandle, value: &[u8], eh: &mut ExceptionSlot);

    // ==================== 读取 ====================

    fn context_get_str(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> String;
    fn context_get_str_size(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> u64;
    fn context_get_long(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> i64;
    fn context_get_unsigned_long(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> u64;
    fn context_get_double(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> f64;
    fn context_get_bool(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> bool;
    fn context_get_data(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> Vec<u8>;

    // ==================== 类型探测 ====================

    /// 对应 isNone / isBool / ... / isObject，无副作用
    fn context_is(&self, ctx: ContextHandle, kind: Kind, eh: &mut ExceptionSlot) -> bool;

    // ==================== 处理单元 ====================

    fn block_create(&self, config: ContextHandle, eh: &mut ExceptionSlot) -> Option<BlockHandle>;
    fn block_destroy(&self, block: BlockHandle, eh: &mut ExceptionSlot);
    fn block_process(&self, block: BlockHandle, ctx: ContextHandle, eh: &mut ExceptionSlot);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_zero_is_null() {
        assert!(ContextHandle::from_raw(0).is_none());
        assert_eq!(ContextHandle::from_raw(7).map(|h| h.as_raw()), Some(7));
    }

    #[test]
    fn test_filled_key_entries_after_length_exceeded() {
        assert_eq!(filled_key_entries(3, None, || unreachable!()), 3);
        assert_eq!(filled_key_entries(5, Some(codes::KEYS_LENGTH_EXCEEDS), || 2), 2);
        assert_eq!(filled_key_entries(1, Some(codes::KEYS_LENGTH_EXCEEDS), || 4), 1);
        assert_eq!(filled_key_entries(5, Some(codes::GET_KEYS), || 2), 0);
    }

    #[test]
    fn test_handles_are_distinct_types() {
        let ctx = ContextHandle::from_raw(1).unwrap();
        let blk = BlockHandle::from_raw(1).unwrap();
        assert_eq!(ctx.as_raw(), blk.as_raw());
    }
}
