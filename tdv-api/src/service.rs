//! Service entry points
//!
//! A [`Service`] owns the bridge and the SDK-wide defaults. Every block it
//! creates gets `@sdk_path` and, unless the caller supplied one, an
//! `ONNXRuntime.library_path` pointing into the installed binaries.

use std::rc::Rc;
use tdv_config::{ServiceConfig, Target, TdvConfig};
use tdv_core::{Bridge, Context, Map, MemoryBridge, ProcessingBlock, Result, TdvError, Value};
use tracing::{debug, info};

pub(crate) const TARGET: &str = Target::Service.target();

/// Key injected with the SDK root
pub const SDK_PATH_KEY: &str = "@sdk_path";
/// Key holding the ONNX runtime options
pub const ONNX_RUNTIME_KEY: &str = "ONNXRuntime";

pub struct Service {
    bridge: Rc<dyn Bridge>,
    config: ServiceConfig,
}

impl Service {
    pub fn new(bridge: Rc<dyn Bridge>, config: ServiceConfig) -> Self {
        info!(target: TARGET, sdk_path = %config.sdk_path, "service created");
        Self { bridge, config }
    }

    /// Service over the in-process reference engine
    pub fn in_memory(config: &TdvConfig) -> Self {
        let bridge: Rc<dyn Bridge> = Rc::new(MemoryBridge::with_limits(&config.limits));
        Self::new(bridge, config.service.clone())
    }

    /// Service over the native SDK
    #[cfg(feature = "native")]
    pub fn native(config: ServiceConfig) -> Self {
        Self::new(Rc::new(tdv_core::bridge::NativeBridge::new()), config)
    }

    pub fn bridge(&self) -> &Rc<dyn Bridge> {
        &self.bridge
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Create a processing block from a unit config
    ///
    /// `unit_type` must be present and a string. `@sdk_path` is always
    /// overwritten; `ONNXRuntime` is only added when absent.
    pub fn create_processing_block(&self, config: Map) -> Result<ProcessingBlock> {
        let config = self.block_config(config)?;
        ProcessingBlock::from_value(Rc::clone(&self.bridge), &Value::Object(config))
    }

    /// Validate a unit config and add the SDK defaults
    fn block_config(&self, mut config: Map) -> Result<Map> {
        let unit_type = match config.get("unit_type") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(TdvError::UnsupportedValueType(format!(
                    "unit_type must be a string, got {}",
                    other.kind().as_str()
                )))
            }
            None => {
                return Err(TdvError::UnsupportedValueType(
                    "processing block config has no unit_type".to_string(),
                ))
            }
        };

        config.insert(
            SDK_PATH_KEY.to_string(),
            Value::from(self.config.sdk_path.as_str()),
        );
        if !config.contains_key(ONNX_RUNTIME_KEY) {
            if let Some(dir) = self.config.onnx_runtime_dir() {
                let library_path = dir.to_string_lossy().into_owned();
                debug!(target: TARGET, %unit_type, %library_path, "inject onnx runtime path");
                config.insert(
                    ONNX_RUNTIME_KEY.to_string(),
                    Value::from([("library_path", Value::from(library_path))]),
                );
            }
        }
        Ok(config)
    }

    /// Create a context filled from a host value
    pub fn create_context(&self, value: &Value) -> Result<Context> {
        Context::from_value(Rc::clone(&self.bridge), value)
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unit(unit_type: &str) -> Map {
        let mut map = Map::new();
        map.insert("unit_type".into(), Value::from(unit_type));
        map
    }

    #[test]
    fn test_log_target_comes_from_config() {
        assert_eq!(TARGET, "tdv::service");
        assert_eq!(Some(Target::Service), Target::from_name("service"));
    }

    #[test]
    fn test_missing_unit_type() {
        let service = Service::in_memory(&TdvConfig::default());
        let err = service.create_processing_block(Map::new()).unwrap_err();
        assert!(matches!(err, TdvError::UnsupportedValueType(_)));
    }

    #[test]
    fn test_non_string_unit_type() {
        let service = Service::in_memory(&TdvConfig::default());
        let mut config = Map::new();
        config.insert("unit_type".into(), Value::from(1));
        let err = service.create_processing_block(config).unwrap_err();
        assert!(err.to_string().contains("long"));
    }

    #[test]
    fn test_create_identity_block() {
        let service = Service::in_memory(&TdvConfig::default());
        let block = service.create_processing_block(unit("IDENTITY")).unwrap();
        assert_eq!(block.unit_type(), "IDENTITY");
    }

    #[test]
    fn test_sdk_defaults_are_injected() {
        let mut config = TdvConfig::default();
        config.service = ServiceConfig::default().with_sdk_path("/opt/tdv");
        config.service.onnx_runtime_library_path = Some(PathBuf::from("/opt/onnx"));
        let service = Service::in_memory(&config);

        let mut unit_config = unit("IDENTITY");
        unit_config.insert(SDK_PATH_KEY.into(), Value::from("stale"));
        let prepared = service.block_config(unit_config).unwrap();

        assert_eq!(prepared.get(SDK_PATH_KEY), Some(&Value::from("/opt/tdv")));
        assert_eq!(
            prepared.get(ONNX_RUNTIME_KEY),
            Some(&Value::from([("library_path", Value::from("/opt/onnx"))]))
        );
    }

    #[test]
    fn test_caller_onnx_runtime_is_kept() {
        let mut config = TdvConfig::default();
        config.service.binaries_path = Some(PathBuf::from("/opt/tdv/bin"));
        let service = Service::in_memory(&config);

        let mut unit_config = unit("IDENTITY");
        let custom = Value::from([("library_path", Value::from("/custom"))]);
        unit_config.insert(ONNX_RUNTIME_KEY.into(), custom.clone());
        let prepared = service.block_config(unit_config).unwrap();

        assert_eq!(prepared.get(ONNX_RUNTIME_KEY), Some(&custom));
    }

    #[test]
    fn test_no_onnx_runtime_without_paths() {
        let service = Service::in_memory(&TdvConfig::default());
        let prepared = service.block_config(unit("IDENTITY")).unwrap();
        assert!(!prepared.contains_key(ONNX_RUNTIME_KEY));
        assert_eq!(prepared.get(SDK_PATH_KEY), Some(&Value::from(".")));
    }

    #[test]
    fn test_create_context() {
        let service = Service::in_memory(&TdvConfig::default());
        let ctx = service
            .create_context(&Value::from([("k", Value::from("v"))]))
            .unwrap();
        assert_eq!(ctx.get_by_key("k").unwrap().get_str().unwrap(), "v");
    }
}
