//! Valve：链路中的单个处理单元。
//!
//! # 设计背景（Why）
//! - 每个层级容器的 Pipeline 由若干 Valve 组成，请求依次流经这些 Valve，最后由 basic Valve
//!   完成本层处理或派发到子层级；
//! - 与“每个 Valve 持有可变 next 指针”的做法不同，这里把后继关系收敛到不可变快照上的游标
//!   [`Next`]，Valve 自身不再持有跨线程共享的可变状态。
//!
//! # 契约说明（What）
//! - [`Valve::invoke`] 若希望继续处理，必须显式调用 `next.invoke(..)`；不调用即终止链路；
//! - [`Valve::is_async_supported`] 为静态能力，绑定期间不得变化；
//! - 可选的绑定能力通过 [`Valve::as_contained`] 显式暴露，Pipeline 在结构上查询，不做运行期类型探测。

mod binding;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::ValveError;
use crate::exchange::{Request, Response};
use crate::sealed::Sealed;

pub use binding::{BindingState, Contained, ContainerBinding};

/// 描述 Valve 的元数据，辅助链路 introspection 与可观测性。
///
/// # 契约说明（What）
/// - `name`：稳定标识，建议使用 `vendor.component` 命名；`find_non_async_valves` 汇报的即是该名称；
/// - `category`：可选分类（如 `security`、`observability`、`dispatch`）；
/// - `summary`：人类可读描述。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValveDescriptor {
    name: Cow<'static, str>,
    category: Cow<'static, str>,
    summary: Cow<'static, str>,
}

impl ValveDescriptor {
    /// 构造新的描述对象。
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        category: impl Into<Cow<'static, str>>,
        summary: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            summary: summary.into(),
        }
    }

    /// 构造匿名描述，常用于测试或快速原型。
    pub fn anonymous(name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        Self {
            summary: Cow::Owned(format!("auto-generated descriptor for {name}")),
            name,
            category: Cow::Borrowed("unspecified"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }
}

impl fmt::Display for ValveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Valve 合约：请求处理链中的一个环节。
///
/// # 契约维度速览
/// - **语义**：`invoke` 对响应产生副作用，和/或通过 [`Next`] 显式转发给后续 Valve；
/// - **错误**：`invoke` 返回的错误不会被 Pipeline 捕获或重试，原样传播给链路入口；
/// - **并发**：同一 Valve 实例会被多个请求线程并发调用，内部状态需自行保证线程安全；
/// - **异步**：`is_async_supported` 参与整条链路的能力聚合；声明支持异步的 Valve 负责自身的
///   超时/取消语义，并保证在每条退出路径上最终转发或完成响应；
/// - **绑定**：实现 [`Contained`] 的 Valve 通过 `as_contained` 暴露绑定能力，Pipeline 在成员变更时
///   调用绑定/解绑。
///
/// # 风险提示（Trade-offs）
/// - `descriptor` 每次调用返回新值，热路径上应避免频繁调用；Pipeline 只在变更与汇报时读取。
pub trait Valve: Send + Sync + 'static + Sealed {
    /// 返回 Valve 的静态描述。
    fn descriptor(&self) -> ValveDescriptor;

    /// 是否支持异步挂起，默认不支持。
    fn is_async_supported(&self) -> bool {
        false
    }

    /// 处理请求。
    fn invoke(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> Result<(), ValveError>;

    /// 暴露可选的容器绑定能力。
    fn as_contained(&self) -> Option<&dyn Contained> {
        None
    }

    /// 周期性后台任务钩子，由容器的后台线程驱动。
    fn background_process(&self) {}
}

/// 指向链路剩余部分的游标。
///
/// # 教案式说明
/// - **意图（Why）**：以“不可变序列 + 显式游标”替代每个 Valve 上的可变 next 字段，
///   遍历期间链路结构不可能被并发修改撕裂；
/// - **逻辑（How）**：游标借用的是本次遍历开始时加载的快照切片，`invoke` 取出首个 Valve 并把
///   剩余切片作为新的游标传入；
/// - **契约（What）**：游标耗尽时 `invoke` 为无操作并返回 `Ok(())`，basic Valve 收到的游标总是耗尽的。
#[derive(Clone, Copy)]
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Valve>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(remaining: &'a [Arc<dyn Valve>]) -> Self {
        Self { remaining }
    }

    /// 把请求交给下一个 Valve。
    pub fn invoke(self, request: &mut Request, response: &mut Response) -> Result<(), ValveError> {
        match self.remaining.split_first() {
            Some((head, rest)) => head.invoke(request, response, Next::new(rest)),
            None => Ok(()),
        }
    }

    /// 查看下一个 Valve，但不调用。
    pub fn peek(&self) -> Option<&'a Arc<dyn Valve>> {
        self.remaining.first()
    }

    /// 剩余 Valve 数量。
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// 是否已到链路末端。
    pub fn is_terminal(&self) -> bool {
        self.remaining.is_empty()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.remaining.iter().map(|valve| valve.descriptor()))
            .finish()
    }
}

/// 以闭包实现的 Valve，便于快速组装或测试。
///
/// 闭包签名与 [`Valve::invoke`] 一致；默认不声明异步支持。
pub struct FnValve<F> {
    descriptor: ValveDescriptor,
    async_supported: bool,
    handler: F,
}

impl<F> FnValve<F> {
    /// 以描述与闭包构造 Valve。
    pub fn new(descriptor: ValveDescriptor, handler: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, Next<'_>) -> Result<(), ValveError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            descriptor,
            async_supported: false,
            handler,
        }
    }

    /// 声明异步能力。
    pub fn with_async_supported(mut self, supported: bool) -> Self {
        self.async_supported = supported;
        self
    }
}

impl<F> Valve for FnValve<F>
where
    F: Fn(&mut Request, &mut Response, Next<'_>) -> Result<(), ValveError> + Send + Sync + 'static,
{
    fn descriptor(&self) -> ValveDescriptor {
        self.descriptor.clone()
    }

    fn is_async_supported(&self) -> bool {
        self.async_supported
    }

    fn invoke(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> Result<(), ValveError> {
        (self.handler)(request, response, next)
    }
}

impl<F> fmt::Debug for FnValve<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValve")
            .field("descriptor", &self.descriptor)
            .field("async_supported", &self.async_supported)
            .finish()
    }
}
