//! 参考引擎的节点堆
//!
//! 所有值树节点放在同一个槽位表里，子节点以下标引用。
//! 释放后的槽位进入空闲列表复用；只有根节点可以被显式销毁，
//! 销毁时整棵子树一并回收。

use crate::value::{Kind, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tdv_config::LimitConfig;

/// 堆上存储的节点
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    #[default]
    None,
    Bool(bool),
    Long(i64),
    UnsignedLong(u64),
    Double(f64),
    Str(String),
    Data(Vec<u8>),
    Array(Vec<usize>),
    Object(BTreeMap<String, usize>),
}

impl Node {
    pub fn kind(&self) -> Kind {
        match self {
            Node::None => Kind::None,
            Node::Bool(_) => Kind::Bool,
            Node::Long(_) => Kind::Long,
            Node::UnsignedLong(_) => Kind::UnsignedLong,
            Node::Double(_) => Kind::Double,
            Node::Str(_) => Kind::String,
            Node::Data(_) => Kind::Bytes,
            Node::Array(_) => Kind::Array,
            Node::Object(_) => Kind::Object,
        }
    }

    fn children(&self) -> Vec<usize> {
        match self {
            Node::Array(items) => items.clone(),
            Node::Object(map) => map.values().copied().collect(),
            _ => Vec::new(),
        }
    }
}

/// 堆相关错误
#[derive(Debug, PartialEq, Clone)]
pub enum HeapError {
    NodeLimitExceeded(usize),            // 最大节点数
    InvalidPointer(usize),               // 已回收或越界
    NotRoot(usize),                      // 试图销毁非根节点
    TypeMismatch { expected: Kind, found: Kind },
    KeyNotFound(String),
    IndexOutOfRange { index: u64, len: usize },
    NotApplicable { op: &'static str, kind: Kind },
    StringTooLong { len: usize, max: usize },
    SelfInsertion,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::NodeLimitExceeded(max) => write!(f, "node limit exceeded (max {})", max),
            HeapError::InvalidPointer(ptr) => write!(f, "invalid context pointer {}", ptr),
            HeapError::NotRoot(ptr) => write!(f, "context {} is not a root", ptr),
            HeapError::TypeMismatch { expected, found } => write!(
                f,
                "type mismatch: expected {}, found {}",
                expected.as_str(),
                found.as_str()
            ),
            HeapError::KeyNotFound(key) => write!(f, "key not found: {}", key),
            HeapError::IndexOutOfRange { index, len } => {
                write!(f, "index {} out of range (length {})", index, len)
            }
            HeapError::NotApplicable { op, kind } => {
                write!(f, "{}() is not applicable for {}", op, kind.as_str())
            }
            HeapError::StringTooLong { len, max } => {
                write!(f, "string of {} bytes exceeds max size {}", len, max)
            }
            HeapError::SelfInsertion => write!(f, "cannot move a context into its own subtree"),
        }
    }
}

impl std::error::Error for HeapError {}

type HeapResult<T> = Result<T, HeapError>;

// 句柄布局：低半字为槽位 + 1，高半字为槽位的代数
const SLOT_BITS: u32 = usize::BITS / 2;
const SLOT_MASK: usize = (1 << SLOT_BITS) - 1;
const GENERATION_MASK: usize = usize::MAX >> SLOT_BITS;

/// 值树节点堆
#[derive(Debug, Default)]
pub struct NodeHeap {
    nodes: Vec<Node>,
    // 空闲槽位管理
    free_indices: Vec<usize>,
    is_free: Vec<bool>,
    is_root: Vec<bool>,
    // 槽位每回收一次代数加一，旧句柄随之失效
    generations: Vec<usize>,
    // 上限配置
    max_nodes: usize,
    max_str_len: usize,
}

impl NodeHeap {
    pub fn with_limits(limits: &LimitConfig) -> Self {
        Self {
            max_nodes: limits.max_nodes,
            max_str_len: limits.max_str_len,
            ..Default::default()
        }
    }

    /// 当前活跃节点数
    pub fn live_count(&self) -> usize {
        self.nodes.len() - self.free_indices.len()
    }

    /// 当前活跃根节点数
    pub fn root_count(&self) -> usize {
        self.is_root.iter().filter(|r| **r).count()
    }

    fn alloc(&mut self, node: Node) -> HeapResult<usize> {
        if self.live_count() + 1 > self.max_nodes {
            return Err(HeapError::NodeLimitExceeded(self.max_nodes));
        }
        let ptr = if let Some(idx) = self.free_indices.pop() {
            self.nodes[idx] = node;
            self.is_free[idx] = false;
            self.is_root[idx] = false;
            idx
        } else {
            if self.nodes.len() >= SLOT_MASK {
                return Err(HeapError::NodeLimitExceeded(SLOT_MASK));
            }
            self.nodes.push(node);
            self.is_free.push(false);
            self.is_root.push(false);
            self.generations.push(0);
            self.nodes.len() - 1
        };
        Ok(ptr)
    }

    /// 分配新的根节点
    pub fn alloc_root(&mut self) -> HeapResult<usize> {
        let ptr = self.alloc(Node::None)?;
        self.is_root[ptr] = true;
        Ok(ptr)
    }

    /// 槽位对应的外部句柄值（含代数）
    pub fn handle_of(&self, ptr: usize) -> usize {
        (self.generations[ptr] << SLOT_BITS) | (ptr + 1)
    }

    /// 把外部句柄值解析为槽位；槽位已回收或代数不符时报错
    pub fn resolve(&self, raw: usize) -> HeapResult<usize> {
        let ptr = (raw & SLOT_MASK)
            .checked_sub(1)
            .ok_or(HeapError::InvalidPointer(raw))?;
        self.get(ptr).map_err(|_| HeapError::InvalidPointer(raw))?;
        if self.generations[ptr] != raw >> SLOT_BITS {
            return Err(HeapError::InvalidPointer(raw));
        }
        Ok(ptr)
    }

    fn release_slot(&mut self, idx: usize) {
        self.is_free[idx] = true;
        self.is_root[idx] = false;
        self.generations[idx] = (self.generations[idx] + 1) & GENERATION_MASK;
        self.free_indices.push(idx);
    }

    pub fn get(&self, ptr: usize) -> HeapResult<&Node> {
        if ptr >= self.nodes.len() || self.is_free[ptr] {
            return Err(HeapError::InvalidPointer(ptr));
        }
        Ok(&self.nodes[ptr])
    }

    fn get_mut(&mut self, ptr: usize) -> HeapResult<&mut Node> {
        if ptr >= self.nodes.len() || self.is_free[ptr] {
            return Err(HeapError::InvalidPointer(ptr));
        }
        Ok(&mut self.nodes[ptr])
    }

    pub fn kind(&self, ptr: usize) -> HeapResult<Kind> {
        self.get(ptr).map(Node::kind)
    }

    /// 回收整棵子树（含自身）
    fn free_subtree(&mut self, ptr: usize) {
        let mut stack = vec![ptr];
        while let Some(idx) = stack.pop() {
            if idx >= self.nodes.len() || self.is_free[idx] {
                continue;
            }
            let node = std::mem::take(&mut self.nodes[idx]);
            stack.extend(node.children());
            self.release_slot(idx);
        }
    }

    /// 销毁根节点
    pub fn destroy_root(&mut self, ptr: usize) -> HeapResult<()> {
        self.get(ptr)?;
        if !self.is_root[ptr] {
            return Err(HeapError::NotRoot(ptr));
        }
        self.free_subtree(ptr);
        Ok(())
    }

    /// 覆盖节点内容，旧子树被回收
    pub fn replace(&mut self, ptr: usize, node: Node) -> HeapResult<()> {
        let old = std::mem::replace(self.get_mut(ptr)?, node);
        for child in old.children() {
            self.free_subtree(child);
        }
        Ok(())
    }

    pub fn set_str(&mut self, ptr: usize, value: &str) -> HeapResult<()> {
        if value.len() > self.max_str_len {
            return Err(HeapError::StringTooLong {
                len: value.len(),
                max: self.max_str_len,
            });
        }
        self.replace(ptr, Node::Str(value.to_string()))
    }

    /// 清空为 None
    pub fn clear(&mut self, ptr: usize) -> HeapResult<()> {
        self.replace(ptr, Node::None)
    }

    // ===== 导航 =====

    /// 取子节点，不存在则插入 None；None 节点先变为空对象
    pub fn get_or_insert(&mut self, ptr: usize, key: &str) -> HeapResult<usize> {
        match self.get(ptr)? {
            Node::None => self.replace(ptr, Node::Object(BTreeMap::new()))?,
            Node::Object(map) => {
                if let Some(&child) = map.get(key) {
                    return Ok(child);
                }
            }
            other => {
                return Err(HeapError::TypeMismatch {
                    expected: Kind::Object,
                    found: other.kind(),
                })
            }
        }
        let child = self.alloc(Node::None)?;
        if let Node::Object(map) = self.get_mut(ptr)? {
            map.insert(key.to_string(), child);
        }
        Ok(child)
    }

    pub fn get_by_key(&self, ptr: usize, key: &str) -> HeapResult<usize> {
        match self.get(ptr)? {
            Node::Object(map) => map
                .get(key)
                .copied()
                .ok_or_else(|| HeapError::KeyNotFound(key.to_string())),
            other => Err(HeapError::TypeMismatch {
                expected: Kind::Object,
                found: other.kind(),
            }),
        }
    }

    /// 对象中的键（None 节点视为空对象）
    pub fn object_entry(&self, ptr: usize, key: &str) -> HeapResult<Option<usize>> {
        match self.get(ptr)? {
            Node::None => Ok(None),
            Node::Object(map) => Ok(map.get(key).copied()),
            other => Err(HeapError::TypeMismatch {
                expected: Kind::Object,
                found: other.kind(),
            }),
        }
    }

    pub fn get_by_index(&self, ptr: usize, index: u64) -> HeapResult<usize> {
        match self.get(ptr)? {
            Node::Array(items) => usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i).copied())
                .ok_or(HeapError::IndexOutOfRange {
                    index,
                    len: items.len(),
                }),
            other => Err(HeapError::TypeMismatch {
                expected: Kind::Array,
                found: other.kind(),
            }),
        }
    }

    /// 元素数；None 为 0，标量不适用
    pub fn length(&self, ptr: usize) -> HeapResult<usize> {
        match self.get(ptr)? {
            Node::None => Ok(0),
            Node::Array(items) => Ok(items.len()),
            Node::Object(map) => Ok(map.len()),
            other => Err(HeapError::NotApplicable {
                op: "length",
                kind: other.kind(),
            }),
        }
    }

    /// 对象的键（按字典序）
    pub fn keys(&self, ptr: usize) -> HeapResult<Vec<String>> {
        match self.get(ptr)? {
            Node::None => Ok(Vec::new()),
            Node::Object(map) => Ok(map.keys().cloned().collect()),
            other => Err(HeapError::NotApplicable {
                op: "keys",
                kind: other.kind(),
            }),
        }
    }

    // ===== 复制与追加 =====

    /// 深拷贝子树，返回新的非根节点
    pub fn deep_copy(&mut self, ptr: usize) -> HeapResult<usize> {
        let node = match self.get(ptr)? {
            Node::Array(items) => {
                let items = items.clone();
                Node::Array(self.copy_all(&items)?)
            }
            Node::Object(map) => {
                let (keys, children): (Vec<String>, Vec<usize>) =
                    map.iter().map(|(k, v)| (k.clone(), *v)).unzip();
                let copies = self.copy_all(&children)?;
                Node::Object(keys.into_iter().zip(copies).collect())
            }
            scalar => scalar.clone(),
        };
        self.alloc_or_free(node)
    }

    // 失败时回收已拷贝的部分
    fn copy_all(&mut self, children: &[usize]) -> HeapResult<Vec<usize>> {
        let mut copies = Vec::with_capacity(children.len());
        for &child in children {
            match self.deep_copy(child) {
                Ok(copy) => copies.push(copy),
                Err(e) => {
                    for copy in copies {
                        self.free_subtree(copy);
                    }
                    return Err(e);
                }
            }
        }
        Ok(copies)
    }

    fn alloc_or_free(&mut self, node: Node) -> HeapResult<usize> {
        let children = node.children();
        match self.alloc(node) {
            Ok(ptr) => Ok(ptr),
            Err(e) => {
                for child in children {
                    self.free_subtree(child);
                }
                Err(e)
            }
        }
    }

    /// 用 `src` 的深拷贝覆盖 `dst`
    pub fn copy_into(&mut self, src: usize, dst: usize) -> HeapResult<()> {
        self.get(dst)?;
        let copy = self.deep_copy(src)?;
        let node = std::mem::take(&mut self.nodes[copy]);
        self.release_slot(copy);
        self.replace(dst, node)
    }

    /// 追加元素；None 节点先变为数组
    ///
    /// `copy` 为 false 时 `data` 的内容被移走，`data` 留下 None。
    pub fn push_back(&mut self, ptr: usize, data: usize, copy: bool) -> HeapResult<()> {
        match self.get(ptr)? {
            Node::None | Node::Array(_) => {}
            other => {
                return Err(HeapError::TypeMismatch {
                    expected: Kind::Array,
                    found: other.kind(),
                })
            }
        }
        self.get(data)?;

        let child = if copy {
            self.deep_copy(data)?
        } else {
            if self.contains(data, ptr) {
                return Err(HeapError::SelfInsertion);
            }
            // 先检查上限，保证移走后的分配不会失败
            if self.live_count() + 1 > self.max_nodes {
                return Err(HeapError::NodeLimitExceeded(self.max_nodes));
            }
            let node = std::mem::take(&mut self.nodes[data]);
            self.alloc(node)?
        };

        match self.get_mut(ptr)? {
            Node::Array(items) => items.push(child),
            slot => *slot = Node::Array(vec![child]),
        }
        Ok(())
    }

    /// `needle` 是否位于 `root` 的子树中（含自身）
    fn contains(&self, root: usize, needle: usize) -> bool {
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            if idx == needle {
                return true;
            }
            if let Ok(node) = self.get(idx) {
                stack.extend(node.children());
            }
        }
        false
    }

    // ===== 主机值读写（供处理单元使用） =====

    /// 读取子树为主机值
    pub fn read_value(&self, ptr: usize) -> HeapResult<Value> {
        Ok(match self.get(ptr)? {
            Node::None => Value::None,
            Node::Bool(b) => Value::Bool(*b),
            Node::Long(n) => Value::Long(*n),
            Node::UnsignedLong(n) => Value::UnsignedLong(*n),
            Node::Double(d) => Value::Double(*d),
            Node::Str(s) => Value::String(s.clone()),
            Node::Data(d) => Value::Bytes(d.clone()),
            Node::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|c| self.read_value(*c))
                    .collect::<HeapResult<_>>()?,
            ),
            Node::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, c)| Ok((k.clone(), self.read_value(*c)?)))
                    .collect::<HeapResult<Map>>()?,
            ),
        })
    }

    /// 用主机值覆盖节点
    pub fn write_value(&mut self, ptr: usize, value: &Value) -> HeapResult<()> {
        self.get(ptr)?;
        let node = self.build_node(value)?;
        self.replace(ptr, node)
    }

    fn build_node(&mut self, value: &Value) -> HeapResult<Node> {
        Ok(match value {
            Value::None => Node::None,
            Value::Bool(b) => Node::Bool(*b),
            Value::Long(n) => Node::Long(*n),
            Value::UnsignedLong(n) => Node::UnsignedLong(*n),
            Value::Double(d) => Node::Double(*d),
            Value::String(s) => {
                if s.len() > self.max_str_len {
                    return Err(HeapError::StringTooLong {
                        len: s.len(),
                        max: self.max_str_len,
                    });
                }
                Node::Str(s.clone())
            }
            Value::Bytes(b) => Node::Data(b.clone()),
            Value::Array(items) => {
                let mut children = Vec::with_capacity(items.len());
                for item in items {
                    match self.build_child(item) {
                        Ok(child) => children.push(child),
                        Err(e) => {
                            children.into_iter().for_each(|c| self.free_subtree(c));
                            return Err(e);
                        }
                    }
                }
                Node::Array(children)
            }
            Value::Object(map) => {
                let mut children = BTreeMap::new();
                for (key, item) in map {
                    match self.build_child(item) {
                        Ok(child) => {
                            children.insert(key.clone(), child);
                        }
                        Err(e) => {
                            children.into_values().for_each(|c| self.free_subtree(c));
                            return Err(e);
                        }
                    }
                }
                Node::Object(children)
            }
        })
    }

    fn build_child(&mut self, value: &Value) -> HeapResult<usize> {
        let node = self.build_node(value)?;
        self.alloc_or_free(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> NodeHeap {
        NodeHeap::with_limits(&LimitConfig::default())
    }

    #[test]
    fn test_alloc_root_and_destroy() {
        let mut heap = heap();
        let root = heap.alloc_root().unwrap();
        let child = heap.get_or_insert(root, "a").unwrap();
        heap.replace(child, Node::Long(1)).unwrap();
        assert_eq!(heap.live_count(), 2);

        heap.destroy_root(root).unwrap();
        assert_eq!(heap.live_count(), 0);
        assert_eq!(heap.get(child), Err(HeapError::InvalidPointer(child)));
    }

    #[test]
    fn test_destroy_non_root_fails() {
        let mut heap = heap();
        let root = heap.alloc_root().unwrap();
        let child = heap.get_or_insert(root, "a").unwrap();
        assert_eq!(heap.destroy_root(child), Err(HeapError::NotRoot(child)));
    }

    #[test]
    fn test_free_slots_are_reused() {
        let mut heap = heap();
        let first = heap.alloc_root().unwrap();
        heap.destroy_root(first).unwrap();
        let second = heap.alloc_root().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reused_slot_rejects_old_handle() {
        let mut heap = heap();
        let first = heap.alloc_root().unwrap();
        let old = heap.handle_of(first);
        assert_eq!(heap.resolve(old), Ok(first));

        heap.destroy_root(first).unwrap();
        assert_eq!(heap.resolve(old), Err(HeapError::InvalidPointer(old)));

        let second = heap.alloc_root().unwrap();
        assert_eq!(second, first);
        assert_ne!(heap.handle_of(second), old);
        assert_eq!(heap.resolve(old), Err(HeapError::InvalidPointer(old)));
        assert_eq!(heap.resolve(0), Err(HeapError::InvalidPointer(0)));
    }

    #[test]
    fn test_node_limit() {
        let mut heap = NodeHeap::with_limits(&LimitConfig {
            max_nodes: 2,
            ..LimitConfig::default()
        });
        let root = heap.alloc_root().unwrap();
        heap.get_or_insert(root, "a").unwrap();
        assert_eq!(
            heap.get_or_insert(root, "b"),
            Err(HeapError::NodeLimitExceeded(2))
        );
    }

    #[test]
    fn test_replace_frees_old_subtree() {
        let mut heap = heap();
        let root = heap.alloc_root().unwrap();
        heap.get_or_insert(root, "a").unwrap();
        heap.get_or_insert(root, "b").unwrap();
        assert_eq!(heap.live_count(), 3);
        heap.replace(root, Node::Bool(true)).unwrap();
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn test_length_rules() {
        let mut heap = heap();
        let root = heap.alloc_root().unwrap();
        assert_eq!(heap.length(root), Ok(0));
        heap.replace(root, Node::Double(1.0)).unwrap();
        assert!(matches!(
            heap.length(root),
            Err(HeapError::NotApplicable { op: "length", .. })
        ));
    }

    #[test]
    fn test_get_by_index_out_of_range() {
        let mut heap = heap();
        let root = heap.alloc_root().unwrap();
        let item = heap.alloc_root().unwrap();
        heap.push_back(root, item, true).unwrap();
        assert!(heap.get_by_index(root, 0).is_ok());
        assert_eq!(
            heap.get_by_index(root, 1),
            Err(HeapError::IndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn test_push_back_move_leaves_none() {
        let mut heap = heap();
        let arr = heap.alloc_root().unwrap();
        let data = heap.alloc_root().unwrap();
        heap.replace(data, Node::Str("x".into())).unwrap();
        heap.push_back(arr, data, false).unwrap();
        assert_eq!(heap.get(data), Ok(&Node::None));
        let elem = heap.get_by_index(arr, 0).unwrap();
        assert_eq!(heap.get(elem), Ok(&Node::Str("x".into())));
    }

    #[test]
    fn test_push_back_move_into_own_subtree() {
        let mut heap = heap();
        let root = heap.alloc_root().unwrap();
        let inner = heap.get_or_insert(root, "list").unwrap();
        assert_eq!(heap.push_back(inner, root, false), Err(HeapError::SelfInsertion));
    }

    #[test]
    fn test_copy_into_is_deep() {
        let mut heap = heap();
        let src = heap.alloc_root().unwrap();
        let dst = heap.alloc_root().unwrap();
        heap.write_value(src, &Value::from([("k", Value::from(1))])).unwrap();
        heap.copy_into(src, dst).unwrap();

        let src_k = heap.get_by_key(src, "k").unwrap();
        heap.replace(src_k, Node::Long(2)).unwrap();
        assert_eq!(
            heap.read_value(dst),
            Ok(Value::from([("k", Value::from(1))]))
        );
        assert_eq!(heap.live_count(), 4);
    }

    #[test]
    fn test_string_limit() {
        let mut heap = NodeHeap::with_limits(&LimitConfig {
            max_str_len: 3,
            ..LimitConfig::default()
        });
        let root = heap.alloc_root().unwrap();
        assert!(heap.set_str(root, "abc").is_ok());
        assert_eq!(
            heap.set_str(root, "abcd"),
            Err(HeapError::StringTooLong { len: 4, max: 3 })
        );
    }

    #[test]
    fn test_write_failure_frees_partial_nodes() {
        let mut heap = NodeHeap::with_limits(&LimitConfig {
            max_nodes: 3,
            ..LimitConfig::default()
        });
        let root = heap.alloc_root().unwrap();
        let value = Value::Array(vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert!(heap.write_value(root, &value).is_err());
        assert_eq!(heap.live_count(), 1);
    }
}
