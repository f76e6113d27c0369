//! 值树（Context）
//!
//! - [`Context`]：拥有所有权的根节点，只能移动，离开作用域时释放原生资源
//! - [`ContextRef`]：导航得到的弱视图，可随意复制，从不释放资源
//!
//! 每个视图都持有根节点状态的引用；根释放后，视图上的任何操作都返回
//! [`TdvError::UseAfterRelease`]，不会触达原生侧。

use crate::bridge::exception::{self, check_exception};
use crate::bridge::{Bridge, ContextHandle, ExceptionSlot, KeyBuffer};
use crate::error::{BridgeError, Result, TdvError};
use crate::log::CONTEXT;
use crate::value::{Kind, Value};
use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use tracing::{trace, warn};

/// 根节点状态，由根及其所有视图共享
struct RootState {
    bridge: Rc<dyn Bridge>,
    handle: ContextHandle,
    released: Cell<bool>,
}

/// 值树节点的弱视图
#[derive(Clone)]
pub struct ContextRef {
    root: Rc<RootState>,
    handle: ContextHandle,
}

/// 拥有所有权的值树根
pub struct Context {
    view: ContextRef,
}

fn null_handle(op: &str) -> TdvError {
    BridgeError::new(0, format!("{} returned a null context", op)).into()
}

fn same_bridge(a: &Rc<dyn Bridge>, b: &Rc<dyn Bridge>) -> bool {
    std::ptr::eq(
        Rc::as_ptr(a) as *const (),
        Rc::as_ptr(b) as *const (),
    )
}

impl ContextRef {
    pub fn handle(&self) -> ContextHandle {
        self.handle
    }

    /// 所属根节点的句柄
    pub fn root_handle(&self) -> ContextHandle {
        self.root.handle
    }

    pub fn is_root(&self) -> bool {
        self.handle == self.root.handle
    }

    /// 所属根是否已释放
    pub fn is_released(&self) -> bool {
        self.root.released.get()
    }

    pub fn bridge(&self) -> &Rc<dyn Bridge> {
        &self.root.bridge
    }

    pub(crate) fn shares_bridge(&self, bridge: &Rc<dyn Bridge>) -> bool {
        same_bridge(&self.root.bridge, bridge)
    }

    /// 检查根仍然存活
    pub(crate) fn live(&self) -> Result<ContextHandle> {
        if self.root.released.get() {
            return Err(TdvError::UseAfterRelease(format!(
                "context {:#x} (root {:#x})",
                self.handle.as_raw(),
                self.root.handle.as_raw()
            )));
        }
        Ok(self.handle)
    }

    /// 在当前节点上执行一次原生调用
    fn native<T>(
        &self,
        f: impl FnOnce(&dyn Bridge, ContextHandle, &mut ExceptionSlot) -> T,
    ) -> Result<T> {
        let handle = self.live()?;
        let bridge = &*self.root.bridge;
        Ok(exception::call(bridge, |eh| f(bridge, handle, eh))?)
    }

    fn child(&self, handle: Option<ContextHandle>, op: &str) -> Result<ContextRef> {
        let handle = handle.ok_or_else(|| null_handle(op))?;
        Ok(ContextRef {
            root: Rc::clone(&self.root),
            handle,
        })
    }

    fn check_peer(&self, other: &ContextRef) -> Result<ContextHandle> {
        if !same_bridge(&self.root.bridge, &other.root.bridge) {
            return Err(TdvError::UnsupportedValueType(
                "context belongs to a different bridge".to_string(),
            ));
        }
        other.live()
    }

    // ==================== 标量写入 ====================

    pub fn set_bool(&self, value: bool) -> Result<()> {
        self.native(|b, h, eh| b.context_put_bool(h, value, eh))
    }

    pub fn set_long(&self, value: i64) -> Result<()> {
        self.native(|b, h, eh| b.context_put_long(h, value, eh))
    }

    pub fn set_unsigned_long(&self, value: u64) -> Result<()> {
        self.native(|b, h, eh| b.context_put_unsigned_long(h, value, eh))
    }

    pub fn set_double(&self, value: f64) -> Result<()> {
        self.native(|b, h, eh| b.context_put_double(h, value, eh))
    }

    pub fn set_str(&self, value: &str) -> Result<()> {
        self.native(|b, h, eh| b.context_put_str(h, value, eh))
    }

    pub fn set_bytes(&self, value: &[u8]) -> Result<()> {
        self.native(|b, h, eh| b.context_put_data(h, value, eh))
    }

    /// 按标签写入标量；容器和 None 不是标量
    pub fn set_scalar(&self, value: &Value) -> Result<()> {
        match value {
            Value::Bool(b) => self.set_bool(*b),
            Value::Long(n) => self.set_long(*n),
            Value::UnsignedLong(n) => self.set_unsigned_long(*n),
            Value::Double(d) => self.set_double(*d),
            Value::String(s) => self.set_str(s),
            Value::Bytes(b) => self.set_bytes(b),
            other => Err(TdvError::UnsupportedValueType(format!(
                "{} is not a scalar",
                other.kind().as_str()
            ))),
        }
    }

    // ==================== 标量读取 ====================
    // 不做本地标签检查，类型不符由原生侧报错

    pub fn get_bool(&self) -> Result<bool> {
        self.native(|b, h, eh| b.context_get_bool(h, eh))
    }

    pub fn get_long(&self) -> Result<i64> {
        self.native(|b, h, eh| b.context_get_long(h, eh))
    }

    pub fn get_unsigned_long(&self) -> Result<u64> {
        self.native(|b, h, eh| b.context_get_unsigned_long(h, eh))
    }

    pub fn get_double(&self) -> Result<f64> {
        self.native(|b, h, eh| b.context_get_double(h, eh))
    }

    pub fn get_str(&self) -> Result<String> {
        self.native(|b, h, eh| b.context_get_str(h, eh))
    }

    /// 字符串字节长度
    pub fn get_str_size(&self) -> Result<u64> {
        self.native(|b, h, eh| b.context_get_str_size(h, eh))
    }

    pub fn get_bytes(&self) -> Result<Vec<u8>> {
        self.native(|b, h, eh| b.context_get_data(h, eh))
    }

    // ==================== 导航 ====================

    /// 取子节点，不存在时插入 None
    pub fn get_or_insert(&self, key: &str) -> Result<ContextRef> {
        let handle = self.native(|b, h, eh| b.context_get_or_insert_by_key(h, key, eh))?;
        self.child(handle, "get_or_insert")
    }

    /// 取子节点，不存在时报错
    pub fn get_by_key(&self, key: &str) -> Result<ContextRef> {
        let handle = self.native(|b, h, eh| b.context_get_by_key(h, key, eh))?;
        self.child(handle, "get_by_key")
    }

    pub fn get_by_index(&self, index: u64) -> Result<ContextRef> {
        let handle = self.native(|b, h, eh| b.context_get_by_index(h, index, eh))?;
        self.child(handle, "get_by_index")
    }

    /// 数组或对象的元素数
    pub fn len(&self) -> Result<u64> {
        self.native(|b, h, eh| b.context_get_length(h, eh))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// 追加 `data` 的拷贝；之后修改 `data` 不影响已追加的元素
    pub fn push_back(&self, data: &ContextRef) -> Result<()> {
        let data = self.check_peer(data)?;
        self.native(|b, h, eh| b.context_push_back(h, data, true, eh))
    }

    /// 把整棵树移入数组，随后释放原根
    pub fn push_back_owned(&self, data: Context) -> Result<()> {
        let handle = self.check_peer(&data)?;
        self.native(|b, h, eh| b.context_push_back(h, handle, false, eh))?;
        data.release()
    }

    /// 枚举对象的键
    ///
    /// 原生侧返回的缓冲区（每个条目及缓冲区本身）在返回前全部释放。
    pub fn keys(&self) -> Result<Vec<String>> {
        let length = self.len()?;
        let handle = self.live()?;
        let bridge = &*self.root.bridge;

        let mut slot: ExceptionSlot = None;
        let buffer = bridge
            .context_get_keys(handle, length, &mut slot)
            .map(|buffer| KeyBufferGuard { bridge, buffer });
        check_exception(bridge, slot)?;

        Ok(buffer.map(|guard| guard.copy_out()).unwrap_or_default())
    }

    // ==================== 类型探测 ====================

    fn probe(&self, kind: Kind) -> Result<bool> {
        self.native(|b, h, eh| b.context_is(h, kind, eh))
    }

    pub fn is_none(&self) -> Result<bool> {
        self.probe(Kind::None)
    }

    pub fn is_bool(&self) -> Result<bool> {
        self.probe(Kind::Bool)
    }

    pub fn is_long(&self) -> Result<bool> {
        self.probe(Kind::Long)
    }

    pub fn is_unsigned_long(&self) -> Result<bool> {
        self.probe(Kind::UnsignedLong)
    }

    pub fn is_double(&self) -> Result<bool> {
        self.probe(Kind::Double)
    }

    pub fn is_string(&self) -> Result<bool> {
        self.probe(Kind::String)
    }

    pub fn is_bytes(&self) -> Result<bool> {
        self.probe(Kind::Bytes)
    }

    pub fn is_array(&self) -> Result<bool> {
        self.probe(Kind::Array)
    }

    pub fn is_object(&self) -> Result<bool> {
        self.probe(Kind::Object)
    }

    /// 当前标签
    pub fn kind(&self) -> Result<Kind> {
        for kind in Kind::ALL {
            if self.probe(kind)? {
                return Ok(kind);
            }
        }
        Err(TdvError::UnsupportedValueType(format!(
            "context {:#x} has an unrecognised tag",
            self.handle.as_raw()
        )))
    }

    // ==================== 复制 ====================

    /// 深拷贝为独立的根
    pub fn deep_clone(&self) -> Result<Context> {
        let handle = self.native(|b, h, eh| b.context_clone(h, eh))?;
        let handle = handle.ok_or_else(|| null_handle("clone"))?;
        Ok(Context::adopt(Rc::clone(&self.root.bridge), handle))
    }

    /// 用当前节点的深拷贝覆盖 `dst`
    pub fn copy_to(&self, dst: &ContextRef) -> Result<()> {
        let dst = self.check_peer(dst)?;
        self.native(|b, h, eh| b.context_copy(h, dst, eh))
    }

    /// 重置为 None
    pub fn clear(&self) -> Result<()> {
        self.native(|b, h, eh| b.context_clear(h, eh))
    }
}

impl fmt::Debug for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRef")
            .field("handle", &self.handle.as_raw())
            .field("root", &self.root.handle.as_raw())
            .field("released", &self.root.released.get())
            .finish()
    }
}

/// 键缓冲区守卫：拷贝后逐一释放条目与缓冲区
struct KeyBufferGuard<'a> {
    bridge: &'a dyn Bridge,
    buffer: KeyBuffer,
}

impl KeyBufferGuard<'_> {
    fn copy_out(&self) -> Vec<String> {
        self.buffer
            .entries
            .iter()
            .map(|ptr| self.bridge.read_str(*ptr))
            .collect()
    }
}

impl Drop for KeyBufferGuard<'_> {
    fn drop(&mut self) {
        for ptr in &self.buffer.entries {
            self.bridge.free_ptr(*ptr);
        }
        self.bridge.free_ptr(self.buffer.buffer);
    }
}

// ==================== Context ====================

impl Context {
    /// 分配新的空根节点
    pub fn new(bridge: Rc<dyn Bridge>) -> Result<Context> {
        let handle = exception::call(&*bridge, |eh| bridge.context_create(eh))?;
        let handle = handle.ok_or_else(|| null_handle("create"))?;
        Ok(Self::adopt(bridge, handle))
    }

    fn adopt(bridge: Rc<dyn Bridge>, handle: ContextHandle) -> Context {
        trace!(target: CONTEXT, root = handle.as_raw(), "root acquired");
        Context {
            view: ContextRef {
                root: Rc::new(RootState {
                    bridge,
                    handle,
                    released: Cell::new(false),
                }),
                handle,
            },
        }
    }

    /// 根节点的视图
    pub fn view(&self) -> ContextRef {
        self.view.clone()
    }

    /// 立即释放，并报告原生侧的失败
    pub fn release(self) -> Result<()> {
        self.release_native()
    }

    fn release_native(&self) -> Result<()> {
        let root = &self.view.root;
        if root.released.get() {
            return Ok(());
        }
        // 销毁失败时树仍然存活，视图保持可用
        exception::call(&*root.bridge, |eh| {
            root.bridge.context_destroy(root.handle, eh)
        })?;
        root.released.set(true);
        trace!(target: CONTEXT, root = root.handle.as_raw(), "root released");
        Ok(())
    }
}

impl Deref for Context {
    type Target = ContextRef;

    fn deref(&self) -> &ContextRef {
        &self.view
    }
}

impl AsRef<ContextRef> for Context {
    fn as_ref(&self) -> &ContextRef {
        &self.view
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Err(e) = self.release_native() {
            warn!(target: CONTEXT, root = self.view.root.handle.as_raw(), error = %e, "failed to release context");
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("handle", &self.view.handle.as_raw())
            .field("released", &self.view.root.released.get())
            .finish()
    }
}
