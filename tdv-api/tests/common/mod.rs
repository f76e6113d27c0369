//! 测试辅助工具

#![allow(dead_code)]

use tdv_api::{Map, Service, TdvConfig, Value};

pub fn service() -> Service {
    Service::in_memory(&TdvConfig::default())
}

/// 只含 unit_type 的单元配置
pub fn unit(unit_type: &str) -> Map {
    let mut map = Map::new();
    map.insert("unit_type".into(), Value::from(unit_type));
    map
}

/// 形状为 [height, width, 3] 的 NDARRAY 图像
pub fn ndarray_image(height: i64, width: i64) -> Value {
    let len = (height * width * 3) as usize;
    Value::from([
        ("format", Value::from("NDARRAY")),
        ("dtype", Value::from("uint8_t")),
        (
            "shape",
            Value::Array(vec![Value::from(height), Value::from(width), Value::from(3)]),
        ),
        ("blob", Value::bytes(vec![0u8; len])),
    ])
}
