//! 原生 SDK 的 C 接口声明
//!
//! 库文件的定位由链接器搜索路径负责。

use std::ffi::{c_char, c_int, c_long, c_uchar, c_uint, c_ulong, c_void};

/// 不透明的值树节点
#[repr(C)]
pub struct HContext {
    _private: [u8; 0],
}

/// 不透明的处理单元
#[repr(C)]
pub struct HPBlock {
    _private: [u8; 0],
}

/// 不透明的异常句柄
#[repr(C)]
pub struct ContextEH {
    _private: [u8; 0],
}

#[link(name = "open-source-sdk")]
extern "C" {
    // ===== 生命周期 =====
    pub fn TDVContext_create(eh: *mut *mut ContextEH) -> *mut HContext;
    pub fn TDVContext_destroy(ctx: *mut HContext, eh: *mut *mut ContextEH);
    pub fn TDVContext_copy(src: *mut HContext, dst: *mut HContext, eh: *mut *mut ContextEH);
    pub fn TDVContext_clone(ctx: *mut HContext, eh: *mut *mut ContextEH) -> *mut HContext;
    pub fn TDVContext_clear(ctx: *mut HContext, eh: *mut *mut ContextEH);

    // ===== 导航 =====
    pub fn TDVContext_getByIndex(
        ctx: *mut HContext,
        index: c_int,
        eh: *mut *mut ContextEH,
    ) -> *mut HContext;
    pub fn TDVContext_getByKey(
        ctx: *mut HContext,
        key: *const c_char,
        eh: *mut *mut ContextEH,
    ) -> *mut HContext;
    pub fn TDVContext_getOrInsertByKey(
        ctx: *mut HContext,
        key: *const c_char,
        eh: *mut *mut ContextEH,
    ) -> *mut HContext;
    pub fn TDVContext_pushBack(
        ctx: *mut HContext,
        data: *mut HContext,
        copy: bool,
        eh: *mut *mut ContextEH,
    );
    pub fn TDVContext_getLength(ctx: *mut HContext, eh: *mut *mut ContextEH) -> c_ulong;
    pub fn TDVContext_getKeys(
        ctx: *mut HContext,
        length: c_ulong,
        eh: *mut *mut ContextEH,
    ) -> *mut *mut c_char;
    pub fn TDVContext_freePtr(ptr: *mut c_void);

    // ===== 写入 =====
    pub fn TDVContext_putStr(ctx: *mut HContext, value: *const c_char, eh: *mut *mut ContextEH);
    pub fn TDVContext_putLong(ctx: *mut HContext, value: c_long, eh: *mut *mut ContextEH);
    pub fn TDVContext_putDouble(ctx: *mut HContext, value: f64, eh: *mut *mut ContextEH);
    pub fn TDVContext_putBool(ctx: *mut HContext, value: bool, eh: *mut *mut ContextEH);
    pub fn TDVContext_putConstDataPtr(
        ctx: *mut HContext,
        value: *const c_uchar,
        copy_sz: c_ulong,
        eh: *mut *mut ContextEH,
    ) -> *mut c_uchar;

    // ===== 读取 =====
    pub fn TDVContext_getStr(
        ctx: *mut HContext,
        buff: *mut c_char,
        eh: *mut *mut ContextEH,
    ) -> *const c_char;
    pub fn TDVContext_getStrSize(ctx: *mut HContext, eh: *mut *mut ContextEH) -> c_ulong;
    pub fn TDVContext_getLong(ctx: *mut HContext, eh: *mut *mut ContextEH) -> c_long;
    pub fn TDVContext_getUnsignedLong(ctx: *mut HContext, eh: *mut *mut ContextEH) -> u64;
    pub fn TDVContext_getDouble(ctx: *mut HContext, eh: *mut *mut ContextEH) -> f64;
    pub fn TDVContext_getBool(ctx: *mut HContext, eh: *mut *mut ContextEH) -> bool;
    pub fn TDVContext_getDataPtr(ctx: *mut HContext, eh: *mut *mut ContextEH) -> *mut c_uchar;

    // ===== 类型探测 =====
    pub fn TDVContext_isNone(ctx: *mut HContext, eh: *mut *mut ContextEH) -> bool;
    pub fn TDVContext_isArray(ctx: *mut HContext, eh: *mut *mut ContextEH) -> bool;
    pub fn TDVContext_isObject(ctx: *mut HContext, eh: *mut *mut ContextEH) -> bool;
    pub fn TDVContext_isBool(ctx: *mut HContext, eh: *mut *mut ContextEH) -> bool;
    pub fn TDVContext_isLong(ctx: *mut HContext, eh: *mut *mut ContextEH) -> bool;
    pub fn TDVContext_isUnsignedLong(ctx: *mut HContext, eh: *mut *mut ContextEH) -> bool;
    pub fn TDVContext_isDouble(ctx: *mut HContext, eh: *mut *mut ContextEH) -> bool;
    pub fn TDVContext_isString(ctx: *mut HContext, eh: *mut *mut ContextEH) -> bool;
    pub fn TDVContext_isDataPtr(ctx: *mut HContext, eh: *mut *mut ContextEH) -> bool;

    // ===== 处理单元 =====
    pub fn TDVProcessingBlock_createProcessingBlock(
        config: *const HContext,
        eh: *mut *mut ContextEH,
    ) -> *mut HPBlock;
    pub fn TDVProcessingBlock_destroyBlock(block: *mut HPBlock, eh: *mut *mut ContextEH);
    pub fn TDVProcessingBlock_processContext(
        block: *mut HPBlock,
        ctx: *mut HContext,
        eh: *mut *mut ContextEH,
    );

    // ===== 异常 =====
    pub fn TDVException_getMessage(eh: *mut ContextEH) -> *const c_char;
    pub fn TDVException_getErrorCode(eh: *mut ContextEH) -> c_uint;
    pub fn TDVException_deleteException(eh: *mut ContextEH);
}
