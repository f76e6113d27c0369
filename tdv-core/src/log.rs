//! 日志目标
//!
//! 取自 `tdv_config::Target`，CLI 据此按层过滤。

use tdv_config::Target;

pub const CONTEXT: &str = Target::Context.target();
pub const BRIDGE: &str = Target::Bridge.target();
pub const BLOCK: &str = Target::Block.target();
pub const ENGINE: &str = Target::Engine.target();
