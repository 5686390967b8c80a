//! 全局 `tracing` 订阅者安装入口。
//!
//! # 教案式说明
//! - **意图（Why）**：链路变更、绑定拒绝与访问日志都通过 `tracing` 输出，宿主进程只需在启动时调用一次
//!   [`install`] 即可看到这些事件；
//! - **逻辑（How）**：组装 `fmt` Layer 与 `EnvFilter`（优先读取 `RUST_LOG`，否则使用调用方给出的默认指令），
//!   设置为全局订阅者；
//! - **契约（What）**：重复调用返回 [`TelemetryError::AlreadyInstalled`]；外部已设置全局订阅者时返回
//!   [`TelemetryError::SubscriberAlreadySet`]。

use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

static INSTALLED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// `install` 已被调用过。
    #[error("sluice telemetry is already installed")]
    AlreadyInstalled,

    /// 外部提前设置了全局订阅者。
    #[error("a global tracing subscriber has already been set")]
    SubscriberAlreadySet,

    /// 设置全局订阅者失败。
    #[error("failed to set the global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] dispatcher::SetGlobalDefaultError),
}

/// 安装 `fmt + EnvFilter` 订阅者；`default_directive` 形如 `"info"` 或 `"sluice_core=debug"`。
pub fn install(default_directive: &str) -> Result<(), TelemetryError> {
    if INSTALLED.get().is_some() {
        return Err(TelemetryError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(TelemetryError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter(default_directive))
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    INSTALLED
        .set(())
        .map_err(|_| TelemetryError::AlreadyInstalled)
}

fn build_env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}
