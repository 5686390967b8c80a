//! 访问日志 Valve。
//!
//! # 教案式说明
//! - **意图（Why）**：访问日志是最常见的横切 Valve，需要在后续链路处理完毕后记录状态码与耗时；
//! - **逻辑（How）**：先把请求交给 `next`，返回后读取响应状态并以 `tracing` 事件输出；
//!   后续 Valve 返回错误时同样记录，错误随后原样传播；
//! - **契约（What）**：本 Valve 不修改请求或响应，因此声明支持异步。

use std::time::Instant;

use sluice_core::{Next, Request, Response, Valve, ValveDescriptor, ValveError};

use crate::blueprint::ValveSpec;
use crate::error::BlueprintError;

/// 访问日志的输出级别。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccessLogLevel {
    #[default]
    Info,
    Debug,
}

impl AccessLogLevel {
    fn parse(kind: &str, value: &str) -> Result<Self, BlueprintError> {
        match value {
            "info" => Ok(AccessLogLevel::Info),
            "debug" => Ok(AccessLogLevel::Debug),
            other => Err(BlueprintError::invalid_param(
                kind,
                "level",
                format!("expected `info` or `debug`, found `{other}`"),
            )),
        }
    }
}

/// 请求完成后输出 `access` 事件的 Valve。
#[derive(Debug)]
pub struct AccessLogValve {
    name: String,
    level: AccessLogLevel,
}

impl AccessLogValve {
    pub const KIND: &'static str = "access-log";

    pub fn new(name: impl Into<String>, level: AccessLogLevel) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }

    /// 由蓝图构造；支持参数 `level`（`info` | `debug`，默认 `info`）。
    pub fn from_spec(spec: &ValveSpec) -> Result<Self, BlueprintError> {
        let level = spec
            .str_param("level")?
            .map(|value| AccessLogLevel::parse(&spec.kind, value))
            .transpose()?
            .unwrap_or_default();
        Ok(Self::new(spec.name_or_kind(), level))
    }

    pub fn level(&self) -> AccessLogLevel {
        self.level
    }
}

impl Valve for AccessLogValve {
    fn descriptor(&self) -> ValveDescriptor {
        ValveDescriptor::new(
            self.name.clone(),
            "observability",
            "records method, path, status and latency of each request",
        )
    }

    fn is_async_supported(&self) -> bool {
        true
    }

    fn invoke(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> Result<(), ValveError> {
        let started = Instant::now();
        let result = next.invoke(request, response);
        let elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        let outcome = if result.is_ok() { "ok" } else { "error" };

        match self.level {
            AccessLogLevel::Info => tracing::info!(
                valve = %self.name,
                method = %request.method(),
                path = %request.path(),
                status = response.status(),
                elapsed_us,
                outcome,
                "access"
            ),
            AccessLogLevel::Debug => tracing::debug!(
                valve = %self.name,
                method = %request.method(),
                path = %request.path(),
                status = response.status(),
                elapsed_us,
                outcome,
                "access"
            ),
        }
        result
    }
}
