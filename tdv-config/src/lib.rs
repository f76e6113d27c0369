//! TDV Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all TDV crates.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default upper bound for a single string node, in bytes.
pub const MAX_STR_SIZE: usize = 65535;

/// Limits enforced by the in-memory reference engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum number of live tree nodes across all roots
    pub max_nodes: usize,
    /// Maximum accepted string length, in bytes
    pub max_str_len: usize,
}

/// Configuration for the processing service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// SDK root, injected into every unit config as `@sdk_path`
    pub sdk_path: String,
    /// Directory holding the native binaries; used to derive the ONNX runtime location
    pub binaries_path: Option<PathBuf>,
    /// Explicit ONNX runtime library directory (wins over the derived one)
    pub onnx_runtime_library_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Resolve the ONNX runtime library directory.
    ///
    /// An explicit path wins; otherwise the platform-specific install dir under
    /// `binaries_path` is used. `None` when neither is known.
    pub fn onnx_runtime_dir(&self) -> Option<PathBuf> {
        if let Some(path) = &self.onnx_runtime_library_path {
            return Some(path.clone());
        }
        self.binaries_path
            .as_deref()
            .map(|bin| bin.join(onnx_runtime_install_dir()))
    }

    /// Set the SDK root
    pub fn with_sdk_path(mut self, path: impl AsRef<Path>) -> Self {
        self.sdk_path = path.as_ref().to_string_lossy().into_owned();
        self
    }
}

fn onnx_runtime_install_dir() -> &'static str {
    if cfg!(windows) {
        "onnxruntime-windows-x86-64-shared-install-dir"
    } else {
        "onnxruntime-linux-x86-64-shared-install-dir"
    }
}

/// Whole-workspace configuration, loadable from JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TdvConfig {
    pub limits: LimitConfig,
    pub service: ServiceConfig,
}

impl TdvConfig {
    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Log target enum for layer-specific configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    Context,
    Bridge,
    Block,
    Engine,
    Service,
    Cli,
}

impl Target {
    /// Every target, in declaration order
    pub const ALL: [Target; 6] = [
        Target::Context,
        Target::Bridge,
        Target::Block,
        Target::Engine,
        Target::Service,
        Target::Cli,
    ];

    /// Get the string name of the target
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Context => "context",
            Target::Bridge => "bridge",
            Target::Block => "block",
            Target::Engine => "engine",
            Target::Service => "service",
            Target::Cli => "cli",
        }
    }

    /// Get the tracing target name (`tdv::<name>`)
    pub const fn target(&self) -> &'static str {
        match self {
            Target::Context => "tdv::context",
            Target::Bridge => "tdv::bridge",
            Target::Block => "tdv::block",
            Target::Engine => "tdv::engine",
            Target::Service => "tdv::service",
            Target::Cli => "tdv::cli",
        }
    }

    /// Parse a short name (`"context"`, `"block"`, ...)
    pub fn from_name(name: &str) -> Option<Target> {
        Target::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_nodes: 1_000_000,
            max_str_len: MAX_STR_SIZE,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            sdk_path: ".".to_string(),
            binaries_path: None,
            onnx_runtime_library_path: None,
        }
    }
}
