//! 处理单元（ProcessingBlock）
//!
//! 由配置值树构造，在值树上原地执行原生变换。
//!
//! `invoke` 支持两种目标：
//! - 值树：直接透传给原生侧，不做差异计算
//! - 主机对象：转换为临时值树、执行、再把**新增的顶层键**拷回主机对象。
//!   已存在的键即使在值树中被修改也保持不变；差异只看键是否存在，只比较顶层。

use crate::bridge::exception;
use crate::bridge::{Bridge, BlockHandle};
use crate::context::{Context, ContextRef};
use crate::error::{BridgeError, Result, TdvError};
use crate::log::BLOCK;
use crate::value::{Map, Value};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// 处理单元
pub struct ProcessingBlock {
    bridge: Rc<dyn Bridge>,
    handle: BlockHandle,
    unit_type: String,
    released: bool,
}

impl ProcessingBlock {
    /// 由配置值树构造
    ///
    /// 配置必须是对象且带字符串 `unit_type`，否则返回 `UnsupportedValueType`；
    /// `unit_type` 无法识别或缺少必要选项时由原生侧报错。
    pub fn new(config: &ContextRef) -> Result<Self> {
        let unit_type = read_unit_type(config)?;
        let bridge = Rc::clone(config.bridge());
        let handle = config.live()?;
        let block = exception::call(&*bridge, |eh| bridge.block_create(handle, eh))?
            .ok_or_else(|| BridgeError::new(0, "create block returned a null handle"))?;

        info!(target: BLOCK, %unit_type, block = block.as_raw(), "processing block created");
        Ok(Self {
            bridge,
            handle: block,
            unit_type,
            released: false,
        })
    }

    /// 由主机对象构造；临时配置树在构造后释放
    pub fn from_value(bridge: Rc<dyn Bridge>, config: &Value) -> Result<Self> {
        let tree = Context::from_value(bridge, config)?;
        Self::new(&tree)
    }

    pub fn unit_type(&self) -> &str {
        &self.unit_type
    }

    pub fn handle(&self) -> BlockHandle {
        self.handle
    }

    pub fn bridge(&self) -> &Rc<dyn Bridge> {
        &self.bridge
    }

    /// 在值树上原地执行
    pub fn process(&self, ctx: &ContextRef) -> Result<()> {
        if !ctx.shares_bridge(&self.bridge) {
            return Err(TdvError::UnsupportedValueType(
                "context belongs to a different bridge".to_string(),
            ));
        }
        let handle = ctx.live()?;
        debug!(target: BLOCK, unit_type = %self.unit_type, context = handle.as_raw(), "process");
        exception::call(&*self.bridge, |eh| {
            self.bridge.block_process(self.handle, handle, eh)
        })?;
        Ok(())
    }

    /// 在主机对象上执行，只拷回新增的顶层键
    pub fn process_map(&self, target: &mut Map) -> Result<()> {
        let tree = Context::from_map(Rc::clone(&self.bridge), target)?;
        self.process(&tree)?;
        let added = merge_new_keys(&tree, target)?;
        debug!(target: BLOCK, unit_type = %self.unit_type, added, "merged new keys");
        Ok(())
    }

    /// 多态入口：值树透传，主机对象走差异协议
    pub fn invoke<T: InvokeTarget + ?Sized>(&self, target: &mut T) -> Result<()> {
        target.invoke_with(self)
    }

    /// 立即销毁，并报告原生侧的失败
    pub fn release(mut self) -> Result<()> {
        self.destroy()
    }

    fn destroy(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        exception::call(&*self.bridge, |eh| {
            self.bridge.block_destroy(self.handle, eh)
        })?;
        debug!(target: BLOCK, unit_type = %self.unit_type, "processing block destroyed");
        Ok(())
    }
}

impl Drop for ProcessingBlock {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            warn!(target: BLOCK, unit_type = %self.unit_type, error = %e, "failed to destroy processing block");
        }
    }
}

impl fmt::Debug for ProcessingBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingBlock")
            .field("unit_type", &self.unit_type)
            .field("handle", &self.handle.as_raw())
            .finish()
    }
}

fn read_unit_type(config: &ContextRef) -> Result<String> {
    if !config.is_object()? {
        return Err(TdvError::UnsupportedValueType(
            "processing block config must be an object".to_string(),
        ));
    }
    if !config.keys()?.iter().any(|k| k == "unit_type") {
        return Err(TdvError::UnsupportedValueType(
            "processing block config has no unit_type".to_string(),
        ));
    }
    let node = config.get_by_key("unit_type")?;
    if !node.is_string()? {
        return Err(TdvError::UnsupportedValueType(
            "unit_type must be a string".to_string(),
        ));
    }
    node.get_str()
}

/// 把 `tree` 顶层中 `target` 没有的键转换后写入 `target`，返回新增键数
pub fn merge_new_keys(tree: &ContextRef, target: &mut Map) -> Result<usize> {
    let new_keys: Vec<String> = tree
        .keys()?
        .into_iter()
        .filter(|key| !target.contains_key(key))
        .collect();
    for key in &new_keys {
        let value = tree.get_by_key(key)?.to_value()?;
        target.insert(key.clone(), value);
    }
    Ok(new_keys.len())
}

/// `invoke` 可接受的目标
pub trait InvokeTarget {
    fn invoke_with(&mut self, block: &ProcessingBlock) -> Result<()>;
}

impl InvokeTarget for ContextRef {
    fn invoke_with(&mut self, block: &ProcessingBlock) -> Result<()> {
        block.process(self)
    }
}

impl InvokeTarget for Context {
    fn invoke_with(&mut self, block: &ProcessingBlock) -> Result<()> {
        block.process(self)
    }
}

impl InvokeTarget for Map {
    fn invoke_with(&mut self, block: &ProcessingBlock) -> Result<()> {
        block.process_map(self)
    }
}
