#![deny(unsafe_code)]
#![allow(private_bounds)]
#![doc = "sluice-core: 分层容器请求处理链（Pipeline/Valve）的核心契约与写时复制实现。"]
#![doc = ""]
#![doc = "== 分层模型 =="]
#![doc = "服务端由 Engine → Host → Context → Wrapper 等层级容器组成，每一层持有一条 Pipeline；"]
#![doc = "Pipeline 内的 Valve 按插入顺序执行，最后一个为 basic Valve，负责本层真正的处理或向子层级派发。"]
#![doc = ""]
#![doc = "== 并发纪律 =="]
#![doc = "链路变更在互斥锁下构建新快照并通过 `ArcSwap` 原子发布；请求遍历始终只观察到一个完整快照。"]

mod sealed;

pub mod container;
pub mod error;
pub mod exchange;
pub mod observability;
pub mod pipeline;
pub mod valve;

pub use container::{
    ChildDispatchValve, ChildSelector, Container, ContainerEvent, ContainerEventKind, ContainerId,
    ContainerKind, ContainerListener, ContainerListeners, StandardContainer,
};
pub use error::{BindError, ValveError};
pub use exchange::{AsyncContext, Request, Response};
pub use pipeline::{Pipeline, StandardPipeline, ValveChain};
pub use valve::{
    BindingState, Contained, ContainerBinding, FnValve, Next, Valve, ValveDescriptor,
};

/// 统一的结果别名，默认错误类型为 [`ValveError`]。
pub type Result<T, E = ValveError> = core::result::Result<T, E>;
