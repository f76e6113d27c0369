//! pipeline.json 项目文件
//!
//! ```json
//! {
//!   "input": "input.json",
//!   "units": [{ "unit_type": "IDENTITY" }],
//!   "sdk_path": "/opt/tdv",
//!   "log_level": "info",
//!   "log": { "block": "debug" },
//!   "log_format": "compact",
//!   "log_file": "tdv.log",
//!   "output": "out.json"
//! }
//! ```
//! 相对路径以项目文件所在目录为基准。

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tdv_config::{LimitConfig, TdvConfig};
use tdv_core::{Map, Value};

/// pipeline.json 结构
#[derive(Debug, Deserialize)]
pub struct ProjectFile {
    /// 输入文档（JSON 对象）路径
    pub input: String,
    /// 按顺序执行的处理单元配置
    #[serde(default)]
    pub units: Vec<serde_json::Value>,
    /// SDK 根目录
    pub sdk_path: Option<String>,
    /// 原生二进制目录，用于推导 ONNX runtime 位置
    pub binaries_path: Option<String>,
    /// 参考引擎的限制
    pub limits: Option<LimitConfig>,
    /// 日志级别: "silent", "error", "warn", "info", "debug", "trace"
    pub log_level: Option<String>,
    /// 按目标覆盖的日志级别
    #[serde(default)]
    pub log: HashMap<String, String>,
    /// 日志格式: "pretty", "compact", "json"
    pub log_format: Option<String>,
    /// 日志文件（追加）
    pub log_file: Option<String>,
    /// 结果文档路径；缺省时打印到 stdout
    pub output: Option<String>,
}

/// 读取后的项目：项目文件及其所在目录
#[derive(Debug)]
pub struct Project {
    pub file: ProjectFile,
    pub base_dir: PathBuf,
}

impl Project {
    /// Read and parse pipeline.json
    pub fn load(path: &Path) -> Result<Project, String> {
        if !path.exists() {
            return Err(format!(
                "未找到 '{}'\n\n提示: 创建 '{}' 文件并指定 'input' 与 'units' 字段",
                path.display(),
                path.display()
            ));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("无法读取 '{}': {}", path.display(), e))?;
        let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        Project::parse(&content, base_dir).map_err(|e| format!("'{}': {}", path.display(), e))
    }

    pub fn parse(content: &str, base_dir: PathBuf) -> Result<Project, String> {
        let file: ProjectFile =
            serde_json::from_str(content).map_err(|e| format!("解析失败: {}", e))?;
        if file.input.is_empty() {
            return Err("'input' 字段不能为空".to_string());
        }
        Ok(Project { file, base_dir })
    }

    /// Resolve a path relative to the project directory
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }

    /// Build the workspace configuration
    pub fn tdv_config(&self) -> TdvConfig {
        let mut config = TdvConfig::default();
        if let Some(limits) = &self.file.limits {
            config.limits = limits.clone();
        }
        if let Some(sdk_path) = &self.file.sdk_path {
            config.service.sdk_path = sdk_path.clone();
        }
        config.service.binaries_path = self.file.binaries_path.as_deref().map(PathBuf::from);
        config
    }

    /// 处理单元配置，必须都是对象
    pub fn unit_configs(&self) -> Result<Vec<Map>, String> {
        self.file
            .units
            .iter()
            .enumerate()
            .map(|(index, unit)| match Value::from(unit.clone()) {
                Value::Object(map) => Ok(map),
                other => Err(format!(
                    "units[{}] 必须是对象，实际为 {}",
                    index,
                    other.kind().as_str()
                )),
            })
            .collect()
    }

    /// 读取输入文档，必须是 JSON 对象
    pub fn read_input(&self) -> Result<Map, String> {
        let path = self.resolve(&self.file.input);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("无法读取输入 '{}': {}", path.display(), e))?;
        parse_input(&content).map_err(|e| format!("'{}': {}", path.display(), e))
    }
}

/// 解析输入文档
pub fn parse_input(content: &str) -> Result<Map, String> {
    match Value::from_json_str(content).map_err(|e| format!("解析失败: {}", e))? {
        Value::Object(map) => Ok(map),
        other => Err(format!("输入必须是 JSON 对象，实际为 {}", other.kind().as_str())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_project() {
        let project = Project::parse(r#"{"input": "in.json"}"#, PathBuf::from("/p")).unwrap();
        assert!(project.file.units.is_empty());
        assert_eq!(project.resolve("in.json"), PathBuf::from("/p/in.json"));

        let config = project.tdv_config();
        assert_eq!(config.service.sdk_path, ".");
        assert!(config.service.binaries_path.is_none());
    }

    #[test]
    fn test_project_overrides_config() {
        let project = Project::parse(
            r#"{
                "input": "in.json",
                "sdk_path": "/opt/tdv",
                "binaries_path": "/opt/tdv/bin",
                "limits": { "max_nodes": 10 },
                "log": { "engine": "trace" }
            }"#,
            PathBuf::from("."),
        )
        .unwrap();
        let config = project.tdv_config();
        assert_eq!(config.service.sdk_path, "/opt/tdv");
        assert_eq!(config.limits.max_nodes, 10);
        assert_eq!(config.limits.max_str_len, tdv_config::MAX_STR_SIZE);
        assert_eq!(project.file.log.get("engine").map(String::as_str), Some("trace"));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(Project::parse(r#"{"input": ""}"#, PathBuf::from(".")).is_err());
        assert!(Project::parse(r#"{"units": []}"#, PathBuf::from(".")).is_err());
    }

    #[test]
    fn test_unit_configs_must_be_objects() {
        let project = Project::parse(
            r#"{"input": "in.json", "units": [{"unit_type": "IDENTITY"}, 3]}"#,
            PathBuf::from("."),
        )
        .unwrap();
        let err = project.unit_configs().unwrap_err();
        assert!(err.contains("units[1]"));
    }

    #[test]
    fn test_parse_input() {
        let map = parse_input(r#"{"a": 1, "b": [true, "x"]}"#).unwrap();
        assert_eq!(map.get("a"), Some(&Value::Long(1)));
        assert!(parse_input("[1, 2]").is_err());
    }
}
