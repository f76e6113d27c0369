//! 参考引擎的处理单元
//!
//! 单元按 `unit_type` 注册在 [`UnitRegistry`] 中，由配置对象构造。
//! 内置单元：
//! - `IDENTITY`：不做任何修改
//! - `ASSIGN`：把配置中 `assign` 对象的每一项写入值树顶层
//! - `IMAGE_INFO`：校验 `image` NDARRAY 并写入 `image_info`

use super::heap::{HeapError, NodeHeap};
use crate::value::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// 单元执行错误
#[derive(Debug, Clone, PartialEq)]
pub struct UnitError(pub String);

impl UnitError {
    pub fn new(message: impl Into<String>) -> Self {
        UnitError(message.into())
    }
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<HeapError> for UnitError {
    fn from(e: HeapError) -> Self {
        UnitError(e.to_string())
    }
}

/// 处理单元：在值树根节点上原地执行变换
pub trait Unit {
    fn unit_type(&self) -> &str;
    fn process(&mut self, heap: &mut NodeHeap, root: usize) -> Result<(), UnitError>;
}

/// 由配置对象构造单元
pub type UnitFactory = Box<dyn Fn(&Map) -> Result<Box<dyn Unit>, UnitError>>;

/// 单元注册表
pub struct UnitRegistry {
    factories: BTreeMap<String, UnitFactory>,
}

impl UnitRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// 带内置单元的注册表
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Identity::UNIT_TYPE, |_| {
            Ok(Box::new(Identity) as Box<dyn Unit>)
        });
        registry.register(Assign::UNIT_TYPE, |config| {
            Assign::from_config(config).map(|u| Box::new(u) as Box<dyn Unit>)
        });
        registry.register(ImageInfo::UNIT_TYPE, |_| {
            Ok(Box::new(ImageInfo) as Box<dyn Unit>)
        });
        registry
    }

    /// 注册（或覆盖）一个单元类型
    pub fn register<F>(&mut self, unit_type: &str, factory: F)
    where
        F: Fn(&Map) -> Result<Box<dyn Unit>, UnitError> + 'static,
    {
        self.factories
            .insert(unit_type.to_string(), Box::new(factory));
    }

    pub fn contains(&self, unit_type: &str) -> bool {
        self.factories.contains_key(unit_type)
    }

    pub fn unit_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// 按配置中的 `unit_type` 构造单元
    pub fn create(&self, config: &Map) -> Result<Box<dyn Unit>, UnitError> {
        let unit_type = config
            .get("unit_type")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| UnitError::new("not unit_type"))?;
        let factory = self
            .factories
            .get(unit_type)
            .ok_or_else(|| UnitError::new(format!("not correct unit_type: {}", unit_type)))?;
        factory(config)
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ==================== 内置单元 ====================

/// 空操作
pub struct Identity;

impl Identity {
    pub const UNIT_TYPE: &'static str = "IDENTITY";
}

impl Unit for Identity {
    fn unit_type(&self) -> &str {
        Self::UNIT_TYPE
    }

    fn process(&mut self, heap: &mut NodeHeap, root: usize) -> Result<(), UnitError> {
        heap.get(root)?;
        Ok(())
    }
}

/// 写入固定的顶层键值（覆盖已有键）
pub struct Assign {
    entries: Map,
}

impl Assign {
    pub const UNIT_TYPE: &'static str = "ASSIGN";

    pub fn from_config(config: &Map) -> Result<Self, UnitError> {
        let entries = config
            .get("assign")
            .and_then(Value::as_object)
            .ok_or_else(|| UnitError::new("ASSIGN requires an `assign` object"))?;
        Ok(Self {
            entries: entries.clone(),
        })
    }
}

impl Unit for Assign {
    fn unit_type(&self) -> &str {
        Self::UNIT_TYPE
    }

    fn process(&mut self, heap: &mut NodeHeap, root: usize) -> Result<(), UnitError> {
        for (key, value) in &self.entries {
            let child = heap.get_or_insert(root, key)?;
            heap.write_value(child, value)?;
        }
        Ok(())
    }
}

/// 图像尺寸信息
pub struct ImageInfo;

impl ImageInfo {
    pub const UNIT_TYPE: &'static str = "IMAGE_INFO";
}

impl Unit for ImageInfo {
    fn unit_type(&self) -> &str {
        Self::UNIT_TYPE
    }

    fn process(&mut self, heap: &mut NodeHeap, root: usize) -> Result<(), UnitError> {
        let image = heap
            .object_entry(root, "image")?
            .ok_or_else(|| UnitError::new("no image in context"))?;
        let image = heap.read_value(image)?;

        if image.get("format").and_then(Value::as_str) != Some("NDARRAY") {
            return Err(UnitError::new("image format must be NDARRAY"));
        }
        if image.get("dtype").and_then(Value::as_str) != Some("uint8_t") {
            return Err(UnitError::new("image dtype must be uint8_t"));
        }
        let shape: Vec<u64> = image
            .get("shape")
            .and_then(Value::as_array)
            .map(|dims| dims.iter().filter_map(Value::as_u64).collect())
            .unwrap_or_default();
        let &[height, width, channels] = shape.as_slice() else {
            return Err(UnitError::new("image shape must be [height, width, channels]"));
        };
        let blob = image
            .get("blob")
            .and_then(Value::as_bytes)
            .ok_or_else(|| UnitError::new("image blob is missing"))?;
        let expected = height
            .checked_mul(width)
            .and_then(|n| n.checked_mul(channels))
            .ok_or_else(|| UnitError::new("image shape overflows"))?;
        if blob.len() as u64 != expected {
            return Err(UnitError::new(format!(
                "image blob has {} bytes, shape requires {}",
                blob.len(),
                expected
            )));
        }

        let info = Value::from([
            ("height", Value::UnsignedLong(height)),
            ("width", Value::UnsignedLong(width)),
            ("channels", Value::UnsignedLong(channels)),
        ]);
        let slot = heap.get_or_insert(root, "image_info")?;
        heap.write_value(slot, &info)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tdv_config::LimitConfig;

    fn config(unit_type: &str) -> Map {
        let mut map = Map::new();
        map.insert("unit_type".into(), Value::from(unit_type));
        map
    }

    fn image(height: i64, width: i64, bytes: usize) -> Value {
        Value::from([
            ("format", Value::from("NDARRAY")),
            ("dtype", Value::from("uint8_t")),
            (
                "shape",
                Value::Array(vec![Value::Long(height), Value::Long(width), Value::Long(3)]),
            ),
            ("blob", Value::bytes(vec![0u8; bytes])),
        ])
    }

    #[test]
    fn test_missing_unit_type() {
        let registry = UnitRegistry::with_builtins();
        let err = registry.create(&Map::new()).err().unwrap();
        assert_eq!(err.0, "not unit_type");
    }

    #[test]
    fn test_unknown_unit_type() {
        let registry = UnitRegistry::with_builtins();
        let err = registry.create(&config("FACE_DETECTOR")).err().unwrap();
        assert!(err.0.starts_with("not correct unit_type"));
    }

    #[test]
    fn test_builtins_registered() {
        let registry = UnitRegistry::with_builtins();
        let names: Vec<_> = registry.unit_types().collect();
        assert_eq!(names, vec!["ASSIGN", "IDENTITY", "IMAGE_INFO"]);
        assert!(registry.contains("IDENTITY"));
    }

    #[test]
    fn test_assign_requires_object() {
        let registry = UnitRegistry::with_builtins();
        assert!(registry.create(&config("ASSIGN")).is_err());
    }

    #[test]
    fn test_assign_overwrites_top_level() {
        let registry = UnitRegistry::with_builtins();
        let mut cfg = config("ASSIGN");
        cfg.insert(
            "assign".into(),
            Value::from([("a", Value::from(2)), ("b", Value::from(3))]),
        );
        let mut unit = registry.create(&cfg).unwrap();

        let mut heap = NodeHeap::with_limits(&LimitConfig::default());
        let root = heap.alloc_root().unwrap();
        heap.write_value(root, &Value::from([("a", Value::from(1))])).unwrap();
        unit.process(&mut heap, root).unwrap();

        assert_eq!(
            heap.read_value(root).unwrap(),
            Value::from([("a", Value::from(2)), ("b", Value::from(3))])
        );
    }

    #[test]
    fn test_image_info() {
        let mut heap = NodeHeap::with_limits(&LimitConfig::default());
        let root = heap.alloc_root().unwrap();
        heap.write_value(root, &Value::from([("image", image(2, 4, 24))]))
            .unwrap();
        ImageInfo.process(&mut heap, root).unwrap();

        let info = heap.read_value(root).unwrap();
        let info = info.get("image_info").unwrap();
        assert_eq!(info.get("height"), Some(&Value::UnsignedLong(2)));
        assert_eq!(info.get("width"), Some(&Value::UnsignedLong(4)));
        assert_eq!(info.get("channels"), Some(&Value::UnsignedLong(3)));
    }

    #[test]
    fn test_image_info_rejects_short_blob() {
        let mut heap = NodeHeap::with_limits(&LimitConfig::default());
        let root = heap.alloc_root().unwrap();
        heap.write_value(root, &Value::from([("image", image(2, 4, 10))]))
            .unwrap();
        let err = ImageInfo.process(&mut heap, root).unwrap_err();
        assert!(err.0.contains("10 bytes"));
    }

    #[test]
    fn test_image_info_without_image() {
        let mut heap = NodeHeap::with_limits(&LimitConfig::default());
        let root = heap.alloc_root().unwrap();
        let err = ImageInfo.process(&mut heap, root).unwrap_err();
        assert_eq!(err.0, "no image in context");
    }
}
