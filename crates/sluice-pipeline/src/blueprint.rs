//! Pipeline 蓝图：以 TOML 声明一条链路。
//!
//! # 教案式说明
//! - **意图（Why）**：链路结构属于部署配置，运维应能在不重新编译的情况下调整 Valve 顺序与参数；
//! - **逻辑（How）**：`serde` 反序列化为 [`PipelineBlueprint`]，未知字段直接报错，避免拼写错误被静默忽略；
//! - **契约（What）**：
//!   ```toml
//!   [[valves]]
//!   kind = "access-log"
//!   name = "host.access"
//!   [valves.params]
//!   level = "info"
//!
//!   [basic]
//!   kind = "app.dispatch"
//!   ```
//!   `valves` 的声明顺序即链路顺序；`basic` 可省略，由调用方另行设置。

use std::path::Path;

use serde::Deserialize;
use toml::{Table, Value};

use crate::error::BlueprintError;

/// 整条链路的声明。
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineBlueprint {
    #[serde(default)]
    pub valves: Vec<ValveSpec>,
    #[serde(default)]
    pub basic: Option<ValveSpec>,
}

impl PipelineBlueprint {
    pub fn from_toml_str(source: &str) -> Result<Self, BlueprintError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BlueprintError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| BlueprintError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

/// 单个 Valve 的声明。
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ValveSpec {
    /// 目录中注册的种类。
    pub kind: String,
    /// 实例名称，缺省时由工厂决定。
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub params: Table,
}

impl ValveSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            params: Table::new(),
        }
    }

    /// 实例名称，缺省为种类名。
    pub fn name_or_kind(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }

    pub fn str_param(&self, param: &str) -> Result<Option<&str>, BlueprintError> {
        match self.params.get(param) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.as_str())),
            Some(other) => Err(self.type_mismatch(param, "string", other)),
        }
    }

    pub fn int_param(&self, param: &str) -> Result<Option<i64>, BlueprintError> {
        match self.params.get(param) {
            None => Ok(None),
            Some(Value::Integer(value)) => Ok(Some(*value)),
            Some(other) => Err(self.type_mismatch(param, "integer", other)),
        }
    }

    /// 字符串数组参数；缺省为空。
    pub fn str_list_param(&self, param: &str) -> Result<Vec<String>, BlueprintError> {
        match self.params.get(param) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(value) => Ok(value.clone()),
                    other => Err(self.type_mismatch(param, "array of strings", other)),
                })
                .collect(),
            Some(other) => Err(self.type_mismatch(param, "array of strings", other)),
        }
    }

    fn type_mismatch(&self, param: &str, expected: &str, found: &Value) -> BlueprintError {
        BlueprintError::invalid_param(
            &self.kind,
            param,
            format!("expected {expected}, found {}", found.type_str()),
        )
    }
}
