//! TDV Core - 值树、错误通道与处理单元
//!
//! 主机侧数据经由 [`Context`] 值树与不透明的原生引擎交换，
//! [`ProcessingBlock`] 在值树上原地执行变换。
//!
//! 所有原生调用都经过 [`bridge::Bridge`] 抽象：
//! - [`bridge::MemoryBridge`]：进程内参考引擎（测试、演示）
//! - `bridge::NativeBridge`：真实 SDK（`native` feature）

pub mod block;
pub mod bridge;
pub mod context;
pub mod convert;
pub mod error;
pub mod log;
pub mod value;

pub use block::{merge_new_keys, InvokeTarget, ProcessingBlock};
pub use bridge::{Bridge, MemoryBridge};
pub use context::{Context, ContextRef};
pub use error::{BridgeError, ErrorReport, Result, TdvError};
pub use value::{Kind, Map, Value};
