//! 子容器派发：层级之间的 basic Valve。
//!
//! # 教案式说明
//! - **意图（Why）**：每一层的 basic Valve 要么自己完成处理，要么把请求交给子层级的链路头部；
//!   后者在每一层都相同，只有“选哪个子容器”不同；
//! - **逻辑（How）**：[`ChildSelector`] 从请求中计算子容器名称，[`ChildDispatchValve`] 查找子容器后
//!   调用 [`ValveChain::dispatch`](crate::pipeline::ValveChain::dispatch)，在进入子层级前按子链路能力
//!   收窄异步许可；
//! - **契约（What）**：未命中时以 404 结束响应且不返回错误；所属容器已释放时返回 `ValveError::Failed`。

use std::fmt;
use std::sync::{Arc, Weak};

use super::{Container, ContainerKind, StandardContainer};
use crate::error::ValveError;
use crate::exchange::{Request, Response};
use crate::pipeline::Pipeline;
use crate::valve::{Contained, ContainerBinding, Next, Valve, ValveDescriptor};

const DISPATCH_VALVE: &str = "sluice.dispatch.child";

/// 根据请求选择子容器名称。
pub trait ChildSelector: Send + Sync + 'static {
    fn select(&self, request: &Request) -> Option<String>;
}

impl<F> ChildSelector for F
where
    F: Fn(&Request) -> Option<String> + Send + Sync + 'static,
{
    fn select(&self, request: &Request) -> Option<String> {
        self(request)
    }
}

/// 按 `Host` 头选择（忽略端口），用于 Engine → Host。
pub fn by_host_header() -> impl ChildSelector {
    |request: &Request| {
        request
            .header("host")
            .and_then(|host| host.split(':').next())
            .filter(|host| !host.is_empty())
            .map(str::to_ascii_lowercase)
    }
}

/// 按路径第一段选择，用于 Host → Context。
pub fn by_first_path_segment() -> impl ChildSelector {
    |request: &Request| {
        request
            .path()
            .trim_start_matches('/')
            .split('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned)
    }
}

/// 把请求派发到子容器链路的 basic Valve。
pub struct ChildDispatchValve {
    owner: Weak<StandardContainer>,
    selector: Box<dyn ChildSelector>,
    binding: ContainerBinding,
}

impl ChildDispatchValve {
    /// 为 `owner` 构造派发 Valve，仅可绑定到 `owner` 同种类的容器上。
    pub fn new(owner: &Arc<StandardContainer>, selector: impl ChildSelector) -> Self {
        Self::with_kinds(owner, selector, [owner.kind()])
    }

    /// 显式指定可接受的容器种类。
    pub fn with_kinds(
        owner: &Arc<StandardContainer>,
        selector: impl ChildSelector,
        kinds: impl IntoIterator<Item = ContainerKind>,
    ) -> Self {
        Self {
            owner: Arc::downgrade(owner),
            selector: Box::new(selector),
            binding: ContainerBinding::new(DISPATCH_VALVE).restricted_to(kinds),
        }
    }
}

impl Valve for ChildDispatchValve {
    fn descriptor(&self) -> ValveDescriptor {
        ValveDescriptor::new(
            DISPATCH_VALVE,
            "dispatch",
            "routes the request into the pipeline of a child container",
        )
    }

    fn is_async_supported(&self) -> bool {
        true
    }

    fn invoke(
        &self,
        request: &mut Request,
        response: &mut Response,
        _next: Next<'_>,
    ) -> Result<(), ValveError> {
        let owner = self
            .owner
            .upgrade()
            .ok_or_else(|| ValveError::failed(DISPATCH_VALVE, "owning container was dropped"))?;
        let Some(child) = self
            .selector
            .select(request)
            .and_then(|name| owner.find_child(&name))
        else {
            tracing::debug!(
                pipeline.container = %owner.name(),
                path = %request.path(),
                "dispatch.child not found"
            );
            response.send_error(404, "no matching child container");
            return Ok(());
        };
        child.pipeline().chain().dispatch(request, response)
    }

    fn as_contained(&self) -> Option<&dyn Contained> {
        Some(&self.binding)
    }
}

impl fmt::Debug for ChildDispatchValve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildDispatchValve")
            .field("owner", &self.owner.upgrade().map(|owner| owner.id()))
            .field("binding", &self.binding)
            .finish()
    }
}
