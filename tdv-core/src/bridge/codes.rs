//! 原生错误码
//!
//! 每个入口各有一个固定错误码，参考引擎沿用同一套编号，
//! 便于在日志里区分失败发生在哪个入口。

use crate::value::Kind;

pub const CONTEXT_CREATE: u32 = 0x56234801;
pub const CONTEXT_DESTROY: u32 = 0x2dc17586;
pub const CONTEXT_GET_BY_INDEX: u32 = 0x6ba98764;
pub const CONTEXT_GET_OR_INSERT: u32 = 0xcb1ec66f;
pub const CONTEXT_GET_BY_KEY: u32 = 0xb2a4ab43;
pub const CONTEXT_CLONE: u32 = 0xf52416f4;
/// copy 与 clear 共用
pub const CONTEXT_COPY: u32 = 0x06e0b1ce;
pub const CONTEXT_CLEAR: u32 = 0x06e0b1ce;

pub const PUT_STR: u32 = 0xaa600d43;
pub const PUT_LONG: u32 = 0x88df0572;
pub const PUT_UNSIGNED_LONG: u32 = 0x88df0573;
pub const PUT_DOUBLE: u32 = 0x75a049e2;
pub const PUT_BOOL: u32 = 0xccc7e754;
pub const PUT_DATA: u32 = 0x4c551e44;

pub const GET_LENGTH: u32 = 0xd45f61aa;
pub const GET_KEYS: u32 = 0xd48f61aa;
/// 请求的键数量超过实际数量
pub const KEYS_LENGTH_EXCEEDS: u32 = 0xdada331a;

pub const IS_NONE: u32 = 0x96fac41a;
pub const IS_ARRAY: u32 = 0x96fac41b;
pub const IS_OBJECT: u32 = 0x96fac41c;
pub const IS_BOOL: u32 = 0x96fac42c;
pub const IS_LONG: u32 = 0x96fac43c;
pub const IS_DOUBLE: u32 = 0x96fac44c;
pub const IS_STRING: u32 = 0x96fac45c;
pub const IS_DATA: u32 = 0x96fac46c;
pub const IS_UNSIGNED_LONG: u32 = 0x96fac43d;

pub const GET_STR: u32 = 0x9097d24a;
pub const GET_STR_SIZE: u32 = 0x8fc91369;
pub const GET_LONG: u32 = 0x2353ead7;
pub const GET_UNSIGNED_LONG: u32 = 0x2353ead8;
pub const GET_DOUBLE: u32 = 0xd4fbd56c;
pub const GET_BOOL: u32 = 0xfe8d07c6;
pub const GET_DATA: u32 = 0x51228370;

pub const PUSH_BACK: u32 = 0x6b8d124a;

pub const BLOCK_CREATE: u32 = 0x10d504a0;
pub const BLOCK_DESTROY: u32 = 0xfa7b73ff;
pub const BLOCK_PROCESS: u32 = 0x9398017a;

/// 类型探测入口对应的错误码
pub fn probe_code(kind: Kind) -> u32 {
    match kind {
        Kind::None => IS_NONE,
        Kind::Bool => IS_BOOL,
        Kind::Long => IS_LONG,
        Kind::UnsignedLong => IS_UNSIGNED_LONG,
        Kind::Double => IS_DOUBLE,
        Kind::String => IS_STRING,
        Kind::Bytes => IS_DATA,
        Kind::Array => IS_ARRAY,
        Kind::Object => IS_OBJECT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_check_codes_are_distinct() {
        let kinds = [
            Kind::None,
            Kind::Bool,
            Kind::Long,
            Kind::UnsignedLong,
            Kind::Double,
            Kind::String,
            Kind::Bytes,
            Kind::Array,
            Kind::Object,
        ];
        let mut seen: Vec<u32> = kinds.iter().map(|&k| probe_code(k)).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), kinds.len());
    }

    #[test]
    fn test_unsigned_long_code() {
        assert_eq!(probe_code(Kind::UnsignedLong), 0x96fac43d);
        assert_eq!(GET_UNSIGNED_LONG, 0x2353ead8);
    }
}
