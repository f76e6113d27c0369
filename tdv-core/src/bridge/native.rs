//! 基于真实 SDK 的桥接实现
//!
//! C 接口无法表达的情况（下标超出 `int`、字符串含 NUL、缺少长度信息的字节块等）
//! 由本层合成异常句柄，经同一错误通道上报。合成句柄的最低位为 1，
//! 原生句柄是对齐的指针，最低位恒为 0。

use super::codes;
use super::ffi::*;
use super::{
    filled_key_entries, Bridge, BlockHandle, ContextHandle, ExceptionHandle, ExceptionSlot,
    KeyBuffer, NativePtr,
};
use crate::error::BridgeError;
use crate::log::BRIDGE;
use crate::value::Kind;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_long, c_ulong, c_void, CStr, CString};
use std::ptr;
use tracing::warn;

type RawSlot = *mut *mut ContextEH;

/// 真实 SDK 桥接
#[derive(Debug, Default)]
pub struct NativeBridge {
    host_errors: RefCell<HashMap<usize, BridgeError>>,
    next_host: Cell<usize>,
}

fn ctx_ptr(ctx: ContextHandle) -> *mut HContext {
    ctx.as_raw() as *mut HContext
}

fn block_ptr(block: BlockHandle) -> *mut HPBlock {
    block.as_raw() as *mut HPBlock
}

fn is_host(eh: ExceptionHandle) -> bool {
    eh.as_raw() & 1 == 1
}

impl NativeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// 执行一次 C 调用，把原生异常指针转入异常槽
    fn raw<T>(&self, eh: &mut ExceptionSlot, f: impl FnOnce(RawSlot) -> T) -> T {
        let mut raw: *mut ContextEH = ptr::null_mut();
        let out = f(&mut raw);
        if !raw.is_null() {
            *eh = ExceptionHandle::from_raw(raw as usize);
        }
        out
    }

    /// 合成一个本地异常
    fn host_error(&self, eh: &mut ExceptionSlot, code: u32, message: impl Into<String>) {
        let id = self.next_host.get() + 1;
        self.next_host.set(id);
        let raw = (id << 1) | 1;
        self.host_errors
            .borrow_mut()
            .insert(raw, BridgeError::new(code, message));
        *eh = ExceptionHandle::from_raw(raw);
    }

    fn c_string(&self, value: &str, code: u32, eh: &mut ExceptionSlot) -> Option<CString> {
        match CString::new(value) {
            Ok(s) => Some(s),
            Err(_) => {
                self.host_error(eh, code, "string contains an interior NUL byte");
                None
            }
        }
    }

    fn child(&self, ptr: *mut HContext) -> Option<ContextHandle> {
        ContextHandle::from_raw(ptr as usize)
    }
}

impl Bridge for NativeBridge {
    // ==================== 异常 ====================

    fn exception_code(&self, eh: ExceptionHandle) -> u32 {
        if is_host(eh) {
            return self
                .host_errors
                .borrow()
                .get(&eh.as_raw())
                .map_or(0, |e| e.code);
        }
        unsafe { TDVException_getErrorCode(eh.as_raw() as *mut ContextEH) }
    }

    fn exception_message(&self, eh: ExceptionHandle) -> String {
        if is_host(eh) {
            return self
                .host_errors
                .borrow()
                .get(&eh.as_raw())
                .map(|e| e.message.clone())
                .unwrap_or_default();
        }
        let message = unsafe { TDVException_getMessage(eh.as_raw() as *mut ContextEH) };
        if message.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }

    fn exception_release(&self, eh: ExceptionHandle) {
        if is_host(eh) {
            self.host_errors.borrow_mut().remove(&eh.as_raw());
            return;
        }
        unsafe { TDVException_deleteException(eh.as_raw() as *mut ContextEH) }
    }

    // ==================== 生命周期 ====================

    fn context_create(&self, eh: &mut ExceptionSlot) -> Option<ContextHandle> {
        let ptr = self.raw(eh, |raw| unsafe { TDVContext_create(raw) });
        self.child(ptr)
    }

    fn context_destroy(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) {
        self.raw(eh, |raw| unsafe { TDVContext_destroy(ctx_ptr(ctx), raw) })
    }

    fn context_clone(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> Option<ContextHandle> {
        let ptr = self.raw(eh, |raw| unsafe { TDVContext_clone(ctx_ptr(ctx), raw) });
        self.child(ptr)
    }

    fn context_copy(&self, src: ContextHandle, dst: ContextHandle, eh: &mut ExceptionSlot) {
        self.raw(eh, |raw| unsafe {
            TDVContext_copy(ctx_ptr(src), ctx_ptr(dst), raw)
        })
    }

    fn context_clear(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) {
        self.raw(eh, |raw| unsafe { TDVContext_clear(ctx_ptr(ctx), raw) })
    }

    // ==================== 导航 ====================

    fn context_get_by_index(
        &self,
        ctx: ContextHandle,
        index: u64,
        eh: &mut ExceptionSlot,
    ) -> Option<ContextHandle> {
        let Ok(index) = c_int::try_from(index) else {
            self.host_error(eh, codes::CONTEXT_GET_BY_INDEX, "index exceeds native int range");
            return None;
        };
        let ptr = self.raw(eh, |raw| unsafe {
            TDVContext_getByIndex(ctx_ptr(ctx), index, raw)
        });
        self.child(ptr)
    }

    fn context_get_by_key(
        &self,
        ctx: ContextHandle,
        key: &str,
        eh: &mut ExceptionSlot,
    ) -> Option<ContextHandle> {
        let key = self.c_string(key, codes::CONTEXT_GET_BY_KEY, eh)?;
        let ptr = self.raw(eh, |raw| unsafe {
            TDVContext_getByKey(ctx_ptr(ctx), key.as_ptr(), raw)
        });
        self.child(ptr)
    }

    fn context_get_or_insert_by_key(
        &self,
        ctx: ContextHandle,
        key: &str,
        eh: &mut ExceptionSlot,
    ) -> Option<ContextHandle> {
        let key = self.c_string(key, codes::CONTEXT_GET_OR_INSERT, eh)?;
        let ptr = self.raw(eh, |raw| unsafe {
            TDVContext_getOrInsertByKey(ctx_ptr(ctx), key.as_ptr(), raw)
        });
        self.child(ptr)
    }

    fn context_push_back(
        &self,
        ctx: ContextHandle,
        data: ContextHandle,
        copy: bool,
        eh: &mut ExceptionSlot,
    ) {
        self.raw(eh, |raw| unsafe {
            TDVContext_pushBack(ctx_ptr(ctx), ctx_ptr(data), copy, raw)
        })
    }

    fn context_get_length(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> u64 {
        let len = self.raw(eh, |raw| unsafe { TDVContext_getLength(ctx_ptr(ctx), raw) });
        len as u64
    }

    fn context_get_keys(
        &self,
        ctx: ContextHandle,
        length: u64,
        eh: &mut ExceptionSlot,
    ) -> Option<KeyBuffer> {
        let buff = self.raw(eh, |raw| unsafe {
            TDVContext_getKeys(ctx_ptr(ctx), length as c_ulong, raw)
        });
        let buffer = NativePtr::from_raw(buff as usize)?;
        let raised = eh.map(|h| self.exception_code(h));
        let filled = filled_key_entries(length, raised, || {
            let mut slot = None;
            let len = self.context_get_length(ctx, &mut slot);
            match slot {
                Some(h) => {
                    self.exception_release(h);
                    0
                }
                None => len,
            }
        });
        let entries = (0..filled as usize)
            .filter_map(|i| NativePtr::from_raw(unsafe { *buff.add(i) } as usize))
            .collect();
        Some(KeyBuffer { buffer, entries })
    }

    fn read_str(&self, ptr: NativePtr) -> String {
        unsafe { CStr::from_ptr(ptr.as_raw() as *const c_char) }
            .to_string_lossy()
            .into_owned()
    }

    fn free_ptr(&self, ptr: NativePtr) {
        unsafe { TDVContext_freePtr(ptr.as_raw() as *mut c_void) }
    }

    // ==================== 写入 ====================

    fn context_put_str(&self, ctx: ContextHandle, value: &str, eh: &mut ExceptionSlot) {
        let Some(value) = self.c_string(value, codes::PUT_STR, eh) else {
            return;
        };
        self.raw(eh, |raw| unsafe {
            TDVContext_putStr(ctx_ptr(ctx), value.as_ptr(), raw)
        })
    }

    fn context_put_long(&self, ctx: ContextHandle, value: i64, eh: &mut ExceptionSlot) {
        let Ok(value) = c_long::try_from(value) else {
            self.host_error(eh, codes::PUT_LONG, "value exceeds native long range");
            return;
        };
        self.raw(eh, |raw| unsafe { TDVContext_putLong(ctx_ptr(ctx), value, raw) })
    }

    /// C 接口没有无符号写入：可表示时写为 long，否则写为 double
    fn context_put_unsigned_long(&self, ctx: ContextHandle, value: u64, eh: &mut ExceptionSlot) {
        match c_long::try_from(value) {
            Ok(value) => self.raw(eh, |raw| unsafe {
                TDVContext_putLong(ctx_ptr(ctx), value, raw)
            }),
            Err(_) => {
                warn!(target: BRIDGE, value, "unsigned value stored as double");
                self.raw(eh, |raw| unsafe {
                    TDVContext_putDouble(ctx_ptr(ctx), value as f64, raw)
                })
            }
        }
    }

    fn context_put_double(&self, ctx: ContextHandle, value: f64, eh: &mut ExceptionSlot) {
        self.raw(eh, |raw| unsafe { TDVContext_putDouble(ctx_ptr(ctx), value, raw) })
    }

    fn context_put_bool(&self, ctx: ContextHandle, value: bool, eh: &mut ExceptionSlot) {
        self.raw(eh, |raw| unsafe { TDVContext_putBool(ctx_ptr(ctx), value, raw) })
    }

    fn context_put_data(&self, ctx: ContextHandle, value: &[u8], eh: &mut ExceptionSlot) {
        self.raw(eh, |raw| unsafe {
            TDVContext_putConstDataPtr(ctx_ptr(ctx), value.as_ptr(), value.len() as c_ulong, raw)
        });
    }

    // ==================== 读取 ====================

    fn context_get_str(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> String {
        // 传入空缓冲区时由原生侧分配拷贝，读取后释放
        let s = self.raw(eh, |raw| unsafe {
            TDVContext_getStr(ctx_ptr(ctx), ptr::null_mut(), raw)
        });
        if eh.is_some() || s.is_null() {
            return String::new();
        }
        let out = unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned();
        unsafe { TDVContext_freePtr(s as *mut c_void) };
        out
    }

    fn context_get_str_size(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> u64 {
        let size = self.raw(eh, |raw| unsafe { TDVContext_getStrSize(ctx_ptr(ctx), raw) });
        size as u64
    }

    fn context_get_long(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> i64 {
        let value = self.raw(eh, |raw| unsafe { TDVContext_getLong(ctx_ptr(ctx), raw) });
        value.into()
    }

    fn context_get_unsigned_long(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> u64 {
        self.raw(eh, |raw| unsafe { TDVContext_getUnsignedLong(ctx_ptr(ctx), raw) })
    }

    fn context_get_double(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> f64 {
        self.raw(eh, |raw| unsafe { TDVContext_getDouble(ctx_ptr(ctx), raw) })
    }

    fn context_get_bool(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> bool {
        self.raw(eh, |raw| unsafe { TDVContext_getBool(ctx_ptr(ctx), raw) })
    }

    /// C 接口不返回字节块长度，无法安全拷贝
    fn context_get_data(&self, _ctx: ContextHandle, eh: &mut ExceptionSlot) -> Vec<u8> {
        self.host_error(eh, codes::GET_DATA, "native SDK does not expose the blob length");
        Vec::new()
    }

    // ==================== 类型探测 ====================

    fn context_is(&self, ctx: ContextHandle, kind: Kind, eh: &mut ExceptionSlot) -> bool {
        let probe: unsafe extern "C" fn(*mut HContext, RawSlot) -> bool = match kind {
            Kind::None => TDVContext_isNone,
            Kind::Bool => TDVContext_isBool,
            Kind::Long => TDVContext_isLong,
            Kind::Double => TDVContext_isDouble,
            Kind::String => TDVContext_isString,
            Kind::Bytes => TDVContext_isDataPtr,
            Kind::Array => TDVContext_isArray,
            Kind::Object => TDVContext_isObject,
            Kind::UnsignedLong => TDVContext_isUnsignedLong,
        };
        self.raw(eh, |raw| unsafe { probe(ctx_ptr(ctx), raw) })
    }

    // ==================== 处理单元 ====================

    fn block_create(&self, config: ContextHandle, eh: &mut ExceptionSlot) -> Option<BlockHandle> {
        let ptr = self.raw(eh, |raw| unsafe {
            TDVProcessingBlock_createProcessingBlock(ctx_ptr(config), raw)
        });
        BlockHandle::from_raw(ptr as usize)
    }

    fn block_destroy(&self, block: BlockHandle, eh: &mut ExceptionSlot) {
        self.raw(eh, |raw| unsafe {
            TDVProcessingBlock_destroyBlock(block_ptr(block), raw)
        })
    }

    fn block_process(&self, block: BlockHandle, ctx: ContextHandle, eh: &mut ExceptionSlot) {
        self.raw(eh, |raw| unsafe {
            TDVProcessingBlock_processContext(block_ptr(block), ctx_ptr(ctx), raw)
        })
    }
}
