//! 主机值与值树之间的批量转换
//!
//! 写入：标量直接写入对应标签；对象逐键 `get_or_insert` 后递归写入；
//! 数组的每个元素先写入临时根，再以拷贝方式 `push_back`。
//! `Value::None` 视为缺失，直接跳过。
//!
//! 读取：按节点标签深度优先还原，对象通过 `keys()` 遍历。

use crate::bridge::Bridge;
use crate::context::{Context, ContextRef};
use crate::error::Result;
use crate::value::{Kind, Map, Value};
use std::rc::Rc;

impl ContextRef {
    /// 把主机值写入当前节点
    pub fn fill(&self, value: &Value) -> Result<()> {
        match value {
            Value::None => Ok(()),
            Value::Array(items) => self.fill_array(items),
            Value::Object(map) => self.fill_map(map),
            scalar => self.set_scalar(scalar),
        }
    }

    /// 逐键写入对象
    pub fn fill_map(&self, map: &Map) -> Result<()> {
        for (key, value) in map {
            if value.is_none() {
                continue;
            }
            self.get_or_insert(key)?.fill(value)?;
        }
        Ok(())
    }

    fn fill_array(&self, items: &[Value]) -> Result<()> {
        for item in items {
            if item.is_none() {
                continue;
            }
            let element = Context::new(Rc::clone(self.bridge()))?;
            element.fill(item)?;
            self.push_back(&element)?;
        }
        Ok(())
    }

    /// 读取整棵子树
    pub fn to_value(&self) -> Result<Value> {
        Ok(match self.kind()? {
            Kind::None => Value::None,
            Kind::Bool => Value::Bool(self.get_bool()?),
            Kind::Long => Value::Long(self.get_long()?),
            Kind::UnsignedLong => Value::UnsignedLong(self.get_unsigned_long()?),
            Kind::Double => Value::Double(self.get_double()?),
            Kind::String => Value::String(self.get_str()?),
            Kind::Bytes => Value::Bytes(self.get_bytes()?),
            Kind::Array => {
                let len = self.len()?;
                let items = (0..len)
                    .map(|i| self.get_by_index(i)?.to_value())
                    .collect::<Result<Vec<_>>>()?;
                Value::Array(items)
            }
            Kind::Object => {
                let mut map = Map::new();
                for key in self.keys()? {
                    let value = self.get_by_key(&key)?.to_value()?;
                    map.insert(key, value);
                }
                Value::Object(map)
            }
        })
    }
}

impl Context {
    /// 由主机值构造新的根
    pub fn from_value(bridge: Rc<dyn Bridge>, value: &Value) -> Result<Context> {
        let ctx = Context::new(bridge)?;
        ctx.fill(value)?;
        Ok(ctx)
    }

    /// 由主机对象构造新的根
    pub fn from_map(bridge: Rc<dyn Bridge>, map: &Map) -> Result<Context> {
        let ctx = Context::new(bridge)?;
        ctx.fill_map(map)?;
        Ok(ctx)
    }
}
