//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义 Pipeline 在“装配期”与“调用期”两类路径上的错误语义；
//! - 装配期错误（[`BindError`]）同步返回给变更操作的调用者，调用期错误（[`ValveError`]）
//!   原样传播到发起遍历的入口，Pipeline 自身不做重试或吞没。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error`，与 `std::error::Error` 生态兼容；
//! - 每个变体提供稳定的 `<领域>.<语义>` 错误码（见 [`codes`]），便于日志与告警聚合；
//! - “移除不存在的 Valve”不是错误，因此没有对应变体。

use std::borrow::Cow;

use thiserror::Error;

/// 稳定错误码集合。
///
/// 错误码遵循 `<领域>.<语义>` 命名约定，调用方可据此区分可恢复与编程错误。
pub mod codes {
    /// Valve 拒绝与给定容器建立关联。
    pub const BINDING_REFUSED: &str = "pipeline.binding_refused";
    /// Valve 仍绑定在其他容器上。
    pub const ALREADY_BOUND: &str = "pipeline.already_bound";
    /// Valve 已经是当前链路的成员。
    pub const ALREADY_IN_CHAIN: &str = "pipeline.already_in_chain";
    /// Valve 在 `invoke` 期间失败。
    pub const INVOCATION_FAILED: &str = "pipeline.invocation_failed";
    /// 请求在未获授权时尝试进入异步模式。
    pub const ASYNC_UNSUPPORTED: &str = "pipeline.async_unsupported";
    /// 对完全为空的链路发起调用。
    pub const EMPTY_CHAIN: &str = "pipeline.empty_chain";
}

/// 装配期绑定错误。
///
/// # 教案式说明
/// - **意图 (Why)**：`add_valve`/`set_basic` 在 Valve 进入链路前执行绑定检查，失败时链路保持原状，
///   调用方可立即得知拒绝原因。
/// - **契约 (What)**：
///   - `Refused`：可恢复，调用方可换用其他容器或 Valve 重试；
///   - `AlreadyBound`：编程错误，Valve 尚未从旧容器的链路中移除；
///   - `AlreadyInChain`：同一 Valve 重复加入同一条链路。
/// - **设计权衡 (Trade-offs)**：以 `String` 保存名称上下文，牺牲少量分配换取可读的日志。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BindError {
    /// Valve 的绑定检查拒绝了该容器。
    #[error("valve `{valve}` refused to bind to container `{container}`: {reason}")]
    Refused {
        valve: String,
        container: String,
        reason: Cow<'static, str>,
    },

    /// Valve 已绑定到其他容器。
    #[error("valve `{valve}` is already bound to container `{current}`, cannot bind to `{requested}`")]
    AlreadyBound {
        valve: String,
        current: String,
        requested: String,
    },

    /// Valve 已经位于当前链路中。
    #[error("valve `{valve}` is already part of the pipeline of `{container}`")]
    AlreadyInChain { valve: String, container: String },
}

impl BindError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            BindError::Refused { .. } => codes::BINDING_REFUSED,
            BindError::AlreadyBound { .. } => codes::ALREADY_BOUND,
            BindError::AlreadyInChain { .. } => codes::ALREADY_IN_CHAIN,
        }
    }

    /// 涉事 Valve 的名称。
    pub fn valve(&self) -> &str {
        match self {
            BindError::Refused { valve, .. }
            | BindError::AlreadyBound { valve, .. }
            | BindError::AlreadyInChain { valve, .. } => valve,
        }
    }
}

/// 调用期错误：Valve 执行 `invoke` 时产生。
///
/// # 教案式说明
/// - **意图 (Why)**：Pipeline 是纯结构/派发组件，不持有任何恢复策略；错误需携带足够上下文交由
///   容器或服务器处理。
/// - **契约 (What)**：`Failed` 可附带底层原因，通过 `std::error::Error::source` 暴露；
///   `AsyncUnsupported` 表示链路聚合能力未授予异步挂起；`EmptyChain` 表示层级尚未完成装配。
#[derive(Debug, Error)]
pub enum ValveError {
    /// Valve 处理失败。
    #[error("valve `{valve}` failed: {message}")]
    Failed {
        valve: String,
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// 请求未获得异步授权。
    #[error("valve `{valve}` requested async processing, but the pipeline does not support it")]
    AsyncUnsupported { valve: String },

    /// 链路中既没有普通 Valve 也没有 basic Valve。
    #[error("pipeline has no valves to invoke")]
    EmptyChain,
}

impl ValveError {
    /// 构造不带底层原因的失败。
    pub fn failed(valve: impl Into<String>, message: impl Into<Cow<'static, str>>) -> Self {
        ValveError::Failed {
            valve: valve.into(),
            message: message.into(),
            source: None,
        }
    }

    /// 构造携带底层原因的失败。
    pub fn with_source<E>(
        valve: impl Into<String>,
        message: impl Into<Cow<'static, str>>,
        source: E,
    ) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ValveError::Failed {
            valve: valve.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ValveError::Failed { .. } => codes::INVOCATION_FAILED,
            ValveError::AsyncUnsupported { .. } => codes::ASYNC_UNSUPPORTED,
            ValveError::EmptyChain => codes::EMPTY_CHAIN,
        }
    }
}
