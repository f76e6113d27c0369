//! 测试辅助工具
//!
//! 提供参考引擎和常用的值树构造

#![allow(dead_code)]

use std::rc::Rc;
use tdv_core::{Bridge, Map, MemoryBridge, Value};

/// 同一个参考引擎的两种视角：具体类型用于检查计数，trait 对象交给包装层
pub fn setup() -> (Rc<MemoryBridge>, Rc<dyn Bridge>) {
    let memory = Rc::new(MemoryBridge::new());
    let bridge: Rc<dyn Bridge> = memory.clone();
    (memory, bridge)
}

/// 由键值对构造主机对象
pub fn map<const N: usize>(entries: [(&str, Value); N]) -> Map {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// 形状为 [height, width, 3] 的 NDARRAY 图像
pub fn ndarray_image(height: u64, width: u64) -> Value {
    let len = (height * width * 3) as usize;
    Value::from([
        ("format", Value::from("NDARRAY")),
        ("dtype", Value::from("uint8_t")),
        (
            "shape",
            Value::Array(vec![
                Value::UnsignedLong(height),
                Value::UnsignedLong(width),
                Value::UnsignedLong(3),
            ]),
        ),
        ("blob", Value::bytes(vec![0x7f; len])),
    ])
}

/// ASSIGN 单元配置
pub fn assign_config(entries: Map) -> Value {
    Value::from([
        ("unit_type", Value::from("ASSIGN")),
        ("assign", Value::Object(entries)),
    ])
}
