//! 进程内参考引擎
//!
//! [`MemoryBridge`] 用 [`NodeHeap`] 实现 [`Bridge`] 的全部入口，
//! 语义与原生 SDK 保持一致（None 节点按需变为对象/数组、标量没有长度等），
//! 并统计异常与原生分配的申请/释放次数，便于测试验证资源恰好释放一次。

pub mod heap;
pub mod units;

use self::heap::{HeapError, Node, NodeHeap};
use self::units::{Unit, UnitError, UnitRegistry};
use super::codes;
use super::{
    Bridge, BlockHandle, ContextHandle, ExceptionHandle, ExceptionSlot, KeyBuffer, NativePtr,
};
use crate::error::BridgeError;
use crate::log::ENGINE;
use crate::value::{Kind, Map};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use tdv_config::LimitConfig;
use tracing::{trace, warn};

/// 引擎调用计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStats {
    pub exceptions_raised: u64,
    pub exceptions_released: u64,
    pub allocations: u64,
    pub frees: u64,
    pub roots_created: u64,
    pub roots_destroyed: u64,
    pub blocks_created: u64,
    pub blocks_destroyed: u64,
}

/// 原生侧分配的内存
enum Allocation {
    Str(String),
    KeyBuffer,
}

struct EngineState {
    heap: NodeHeap,
    registry: UnitRegistry,
    exceptions: HashMap<usize, BridgeError>,
    allocations: HashMap<usize, Allocation>,
    blocks: HashMap<usize, Box<dyn Unit>>,
    next_id: usize,
    stats: BridgeStats,
}

impl EngineState {
    fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn raise(&mut self, eh: &mut ExceptionSlot, code: u32, message: impl Into<String>) {
        let id = self.next_id();
        let error = BridgeError::new(code, message);
        trace!(target: ENGINE, id, %error, "raise");
        self.exceptions.insert(id, error);
        self.stats.exceptions_raised += 1;
        *eh = ExceptionHandle::from_raw(id);
    }

    fn alloc_ptr(&mut self, allocation: Allocation) -> Option<NativePtr> {
        let id = self.next_id();
        self.allocations.insert(id, allocation);
        self.stats.allocations += 1;
        NativePtr::from_raw(id)
    }
}

/// 进程内参考引擎
pub struct MemoryBridge {
    state: RefCell<EngineState>,
}

// 句柄携带槽位代数，槽位被回收复用后旧句柄解析失败
fn node(heap: &NodeHeap, ctx: ContextHandle) -> Result<usize, HeapError> {
    heap.resolve(ctx.as_raw())
}

fn handle(heap: &NodeHeap, node: usize) -> Option<ContextHandle> {
    ContextHandle::from_raw(heap.handle_of(node))
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::with_limits(&LimitConfig::default())
    }

    pub fn with_limits(limits: &LimitConfig) -> Self {
        Self {
            state: RefCell::new(EngineState {
                heap: NodeHeap::with_limits(limits),
                registry: UnitRegistry::with_builtins(),
                exceptions: HashMap::new(),
                allocations: HashMap::new(),
                blocks: HashMap::new(),
                next_id: 0,
                stats: BridgeStats::default(),
            }),
        }
    }

    /// 注册自定义处理单元
    pub fn register_unit<F>(&self, unit_type: &str, factory: F)
    where
        F: Fn(&Map) -> Result<Box<dyn Unit>, UnitError> + 'static,
    {
        self.state.borrow_mut().registry.register(unit_type, factory);
    }

    pub fn stats(&self) -> BridgeStats {
        self.state.borrow().stats
    }

    /// 活跃节点数（所有根的子树之和）
    pub fn live_nodes(&self) -> usize {
        self.state.borrow().heap.live_count()
    }

    pub fn live_roots(&self) -> usize {
        self.state.borrow().heap.root_count()
    }

    pub fn live_blocks(&self) -> usize {
        self.state.borrow().blocks.len()
    }

    /// 尚未释放的原生分配
    pub fn outstanding_allocations(&self) -> usize {
        self.state.borrow().allocations.len()
    }

    /// 尚未释放的异常句柄
    pub fn outstanding_exceptions(&self) -> usize {
        self.state.borrow().exceptions.len()
    }

    /// 执行一次堆操作，失败时填充异常槽并返回默认值
    fn with_heap<T: Default>(
        &self,
        code: u32,
        eh: &mut ExceptionSlot,
        f: impl FnOnce(&mut NodeHeap) -> Result<T, HeapError>,
    ) -> T {
        let mut state = self.state.borrow_mut();
        match f(&mut state.heap) {
            Ok(value) => value,
            Err(e) => {
                state.raise(eh, code, e.to_string());
                T::default()
            }
        }
    }
}

impl Default for MemoryBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryBridge")
            .field("live_nodes", &state.heap.live_count())
            .field("blocks", &state.blocks.len())
            .field("stats", &state.stats)
            .finish()
    }
}

impl Bridge for MemoryBridge {
    // ==================== 异常 ====================

    fn exception_code(&self, eh: ExceptionHandle) -> u32 {
        self.state
            .borrow()
            .exceptions
            .get(&eh.as_raw())
            .map_or(0, |e| e.code)
    }

    fn exception_message(&self, eh: ExceptionHandle) -> String {
        self.state
            .borrow()
            .exceptions
            .get(&eh.as_raw())
            .map(|e| e.message.clone())
            .unwrap_or_default()
    }

    fn exception_release(&self, eh: ExceptionHandle) {
        let mut state = self.state.borrow_mut();
        if state.exceptions.remove(&eh.as_raw()).is_some() {
            state.stats.exceptions_released += 1;
        } else {
            warn!(target: ENGINE, handle = eh.as_raw(), "release of unknown exception handle");
        }
    }

    // ==================== 生命周期 ====================

    fn context_create(&self, eh: &mut ExceptionSlot) -> Option<ContextHandle> {
        let root = self.with_heap(codes::CONTEXT_CREATE, eh, |heap| {
            let root = heap.alloc_root()?;
            Ok(handle(heap, root))
        });
        if root.is_some() {
            self.state.borrow_mut().stats.roots_created += 1;
        }
        root
    }

    fn context_destroy(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) {
        let mut state = self.state.borrow_mut();
        let destroyed = node(&state.heap, ctx).and_then(|n| state.heap.destroy_root(n));
        match destroyed {
            Ok(()) => {
                state.stats.roots_destroyed += 1;
                trace!(target: ENGINE, root = ctx.as_raw(), live = state.heap.live_count(), "destroy");
            }
            Err(e) => state.raise(eh, codes::CONTEXT_DESTROY, e.to_string()),
        }
    }

    fn context_clone(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> Option<ContextHandle> {
        let root = self.with_heap(codes::CONTEXT_CLONE, eh, |heap| {
            let src = node(heap, ctx)?;
            let root = heap.alloc_root()?;
            if let Err(e) = heap.copy_into(src, root) {
                heap.destroy_root(root)?;
                return Err(e);
            }
            Ok(handle(heap, root))
        });
        if root.is_some() {
            self.state.borrow_mut().stats.roots_created += 1;
        }
        root
    }

    fn context_copy(&self, src: ContextHandle, dst: ContextHandle, eh: &mut ExceptionSlot) {
        self.with_heap(codes::CONTEXT_COPY, eh, |heap| {
            let (src, dst) = (node(heap, src)?, node(heap, dst)?);
            heap.copy_into(src, dst)
        })
    }

    fn context_clear(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) {
        self.with_heap(codes::CONTEXT_CLEAR, eh, |heap| {
            let n = node(heap, ctx)?;
            heap.clear(n)
        })
    }

    // ==================== 导航 ====================

    fn context_get_by_index(
        &self,
        ctx: ContextHandle,
        index: u64,
        eh: &mut ExceptionSlot,
    ) -> Option<ContextHandle> {
        self.with_heap(codes::CONTEXT_GET_BY_INDEX, eh, |heap| {
            let n = node(heap, ctx)?;
            let child = heap.get_by_index(n, index)?;
            Ok(handle(heap, child))
        })
    }

    fn context_get_by_key(
        &self,
        ctx: ContextHandle,
        key: &str,
        eh: &mut ExceptionSlot,
    ) -> Option<ContextHandle> {
        self.with_heap(codes::CONTEXT_GET_BY_KEY, eh, |heap| {
            let n = node(heap, ctx)?;
            let child = heap.get_by_key(n, key)?;
            Ok(handle(heap, child))
        })
    }

    fn context_get_or_insert_by_key(
        &self,
        ctx: ContextHandle,
        key: &str,
        eh: &mut ExceptionSlot,
    ) -> Option<ContextHandle> {
        self.with_heap(codes::CONTEXT_GET_OR_INSERT, eh, |heap| {
            let n = node(heap, ctx)?;
            let child = heap.get_or_insert(n, key)?;
            Ok(handle(heap, child))
        })
    }

    fn context_push_back(
        &self,
        ctx: ContextHandle,
        data: ContextHandle,
        copy: bool,
        eh: &mut ExceptionSlot,
    ) {
        self.with_heap(codes::PUSH_BACK, eh, |heap| {
            let (n, data) = (node(heap, ctx)?, node(heap, data)?);
            heap.push_back(n, data, copy)
        })
    }

    fn context_get_length(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> u64 {
        self.with_heap(codes::GET_LENGTH, eh, |heap| {
            let n = node(heap, ctx)?;
            heap.length(n).map(|len| len as u64)
        })
    }

    fn context_get_keys(
        &self,
        ctx: ContextHandle,
        length: u64,
        eh: &mut ExceptionSlot,
    ) -> Option<KeyBuffer> {
        let mut state = self.state.borrow_mut();
        let keys = match node(&state.heap, ctx).and_then(|n| state.heap.keys(n)) {
            Ok(keys) => keys,
            Err(e) => {
                state.raise(eh, codes::GET_KEYS, e.to_string());
                return None;
            }
        };

        let buffer = state.alloc_ptr(Allocation::KeyBuffer)?;
        let wanted = usize::try_from(length).unwrap_or(usize::MAX);
        let entries: Vec<NativePtr> = keys
            .into_iter()
            .take(wanted)
            .filter_map(|key| state.alloc_ptr(Allocation::Str(key)))
            .collect();
        if (entries.len() as u64) < length {
            state.raise(eh, codes::KEYS_LENGTH_EXCEEDS, "length exceeds current size");
        }
        Some(KeyBuffer { buffer, entries })
    }

    fn read_str(&self, ptr: NativePtr) -> String {
        match self.state.borrow().allocations.get(&ptr.as_raw()) {
            Some(Allocation::Str(s)) => s.clone(),
            _ => {
                warn!(target: ENGINE, ptr = ptr.as_raw(), "read of non-string pointer");
                String::new()
            }
        }
    }

    fn free_ptr(&self, ptr: NativePtr) {
        let mut state = self.state.borrow_mut();
        if state.allocations.remove(&ptr.as_raw()).is_some() {
            state.stats.frees += 1;
        } else {
            warn!(target: ENGINE, ptr = ptr.as_raw(), "free of unknown pointer");
        }
    }

    // ==================== 写入 ====================

    fn context_put_str(&self, ctx: ContextHandle, value: &str, eh: &mut ExceptionSlot) {
        self.with_heap(codes::PUT_STR, eh, |heap| heap.set_str(node(heap, ctx)?, value))
    }

    fn context_put_long(&self, ctx: ContextHandle, value: i64, eh: &mut ExceptionSlot) {
        self.with_heap(codes::PUT_LONG, eh, |heap| {
            heap.replace(node(heap, ctx)?, Node::Long(value))
        })
    }

    fn context_put_unsigned_long(&self, ctx: ContextHandle, value: u64, eh: &mut ExceptionSlot) {
        self.with_heap(codes::PUT_UNSIGNED_LONG, eh, |heap| {
            heap.replace(node(heap, ctx)?, Node::UnsignedLong(value))
        })
    }

    fn context_put_double(&self, ctx: ContextHandle, value: f64, eh: &mut ExceptionSlot) {
        self.with_heap(codes::PUT_DOUBLE, eh, |heap| {
            heap.replace(node(heap, ctx)?, Node::Double(value))
        })
    }

    fn context_put_bool(&self, ctx: ContextHandle, value: bool, eh: &mut ExceptionSlot) {
        self.with_heap(codes::PUT_BOOL, eh, |heap| {
            heap.replace(node(heap, ctx)?, Node::Bool(value))
        })
    }

    fn context_put_data(&self, ctx: ContextHandle, value: &[u8], eh: &mut ExceptionSlot) {
        self.with_heap(codes::PUT_DATA, eh, |heap| {
            heap.replace(node(heap, ctx)?, Node::Data(value.to_vec()))
        })
    }

    // ==================== 读取 ====================

    fn context_get_str(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> String {
        self.with_heap(codes::GET_STR, eh, |heap| match heap.get(node(heap, ctx)?)? {
            Node::Str(s) => Ok(s.clone()),
            other => Err(mismatch(Kind::String, other)),
        })
    }

    fn context_get_str_size(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> u64 {
        self.with_heap(codes::GET_STR_SIZE, eh, |heap| match heap.get(node(heap, ctx)?)? {
            Node::Str(s) => Ok(s.len() as u64),
            other => Err(mismatch(Kind::String, other)),
        })
    }

    fn context_get_long(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> i64 {
        self.with_heap(codes::GET_LONG, eh, |heap| match heap.get(node(heap, ctx)?)? {
            Node::Long(n) => Ok(*n),
            other => Err(mismatch(Kind::Long, other)),
        })
    }

    fn context_get_unsigned_long(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> u64 {
        self.with_heap(codes::GET_UNSIGNED_LONG, eh, |heap| match heap.get(node(heap, ctx)?)? {
            Node::UnsignedLong(n) => Ok(*n),
            other => Err(mismatch(Kind::UnsignedLong, other)),
        })
    }

    fn context_get_double(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> f64 {
        self.with_heap(codes::GET_DOUBLE, eh, |heap| match heap.get(node(heap, ctx)?)? {
            Node::Double(d) => Ok(*d),
            other => Err(mismatch(Kind::Double, other)),
        })
    }

    fn context_get_bool(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> bool {
        self.with_heap(codes::GET_BOOL, eh, |heap| match heap.get(node(heap, ctx)?)? {
            Node::Bool(b) => Ok(*b),
            other => Err(mismatch(Kind::Bool, other)),
        })
    }

    fn context_get_data(&self, ctx: ContextHandle, eh: &mut ExceptionSlot) -> Vec<u8> {
        self.with_heap(codes::GET_DATA, eh, |heap| match heap.get(node(heap, ctx)?)? {
            Node::Data(d) => Ok(d.clone()),
            other => Err(mismatch(Kind::Bytes, other)),
        })
    }

    // ==================== 类型探测 ====================

    fn context_is(&self, ctx: ContextHandle, kind: Kind, eh: &mut ExceptionSlot) -> bool {
        self.with_heap(codes::probe_code(kind), eh, |heap| {
            heap.kind(node(heap, ctx)?).map(|k| k == kind)
        })
    }

    // ==================== 处理单元 ====================

    fn block_create(&self, config: ContextHandle, eh: &mut ExceptionSlot) -> Option<BlockHandle> {
        let mut state = self.state.borrow_mut();
        let unit = node(&state.heap, config)
            .and_then(|n| state.heap.read_value(n))
            .map_err(UnitError::from)
            .and_then(|value| match value.as_object() {
                Some(map) => state.registry.create(map),
                None => Err(UnitError::new("processing block config must be an object")),
            });

        match unit {
            Ok(unit) => {
                let id = state.next_id();
                trace!(target: ENGINE, block = id, unit_type = unit.unit_type(), "block created");
                state.blocks.insert(id, unit);
                state.stats.blocks_created += 1;
                BlockHandle::from_raw(id)
            }
            Err(e) => {
                state.raise(eh, codes::BLOCK_CREATE, e.0);
                None
            }
        }
    }

    fn block_destroy(&self, block: BlockHandle, eh: &mut ExceptionSlot) {
        let mut state = self.state.borrow_mut();
        if state.blocks.remove(&block.as_raw()).is_some() {
            state.stats.blocks_destroyed += 1;
        } else {
            state.raise(eh, codes::BLOCK_DESTROY, "invalid processing block handle");
        }
    }

    fn block_process(&self, block: BlockHandle, ctx: ContextHandle, eh: &mut ExceptionSlot) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let result = match state.blocks.get_mut(&block.as_raw()) {
            Some(unit) => {
                trace!(target: ENGINE, block = block.as_raw(), unit_type = unit.unit_type(), "process");
                match node(&state.heap, ctx) {
                    Ok(n) => unit.process(&mut state.heap, n),
                    Err(e) => Err(UnitError::from(e)),
                }
            }
            None => Err(UnitError::new("invalid processing block handle")),
        };
        if let Err(e) = result {
            state.raise(eh, codes::BLOCK_PROCESS, e.0);
        }
    }
}

fn mismatch(expected: Kind, found: &Node) -> HeapError {
    HeapError::TypeMismatch {
        expected,
        found: found.kind(),
    }
}
