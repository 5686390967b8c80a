//! 装配期错误。
//!
//! # 教案式说明
//! - **意图（Why）**：声明式装配涉及文件读取、TOML 解析、Valve 构造与链路绑定四个阶段，调用方需要
//!   区分“配置写错了”与“运行环境有问题”；
//! - **契约（What）**：每个变体提供稳定错误码（`blueprint.<语义>`），绑定失败保留底层 [`BindError`]。

use std::path::PathBuf;

use sluice_core::BindError;
use thiserror::Error;

/// 稳定错误码。
pub mod codes {
    pub const IO: &str = "blueprint.io";
    pub const PARSE: &str = "blueprint.parse";
    pub const UNKNOWN_KIND: &str = "blueprint.unknown_kind";
    pub const INVALID_PARAM: &str = "blueprint.invalid_param";
    pub const BIND: &str = "blueprint.bind";
}

/// 声明式装配过程中的错误。
#[derive(Debug, Error)]
pub enum BlueprintError {
    /// 读取蓝图文件失败。
    #[error("failed to read pipeline blueprint `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML 语法或结构错误。
    #[error("invalid pipeline blueprint: {0}")]
    Parse(#[from] toml::de::Error),

    /// 目录中没有注册该种类的 Valve。
    #[error("unknown valve kind `{kind}`")]
    UnknownKind { kind: String },

    /// Valve 参数不合法。
    #[error("invalid parameter `{param}` for valve kind `{kind}`: {reason}")]
    InvalidParam {
        kind: String,
        param: String,
        reason: String,
    },

    /// Valve 构造成功，但加入链路时被拒绝。
    #[error(transparent)]
    Bind(#[from] BindError),
}

impl BlueprintError {
    pub fn code(&self) -> &'static str {
        match self {
            BlueprintError::Io { .. } => codes::IO,
            BlueprintError::Parse(_) => codes::PARSE,
            BlueprintError::UnknownKind { .. } => codes::UNKNOWN_KIND,
            BlueprintError::InvalidParam { .. } => codes::INVALID_PARAM,
            BlueprintError::Bind(_) => codes::BIND,
        }
    }

    pub(crate) fn invalid_param(
        kind: &str,
        param: &str,
        reason: impl Into<String>,
    ) -> BlueprintError {
        BlueprintError::InvalidParam {
            kind: kind.to_owned(),
            param: param.to_owned(),
            reason: reason.into(),
        }
    }
}
