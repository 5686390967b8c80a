//! Pipeline：单个层级上的有序 Valve 链。
//!
//! # 设计背景（Why）
//! - 每个层级容器持有一条 Pipeline；请求从 `first()` 开始依次经过普通 Valve，最后到达 basic Valve；
//! - 配置变更（增删 Valve、替换 basic）与请求遍历并发发生，遍历必须观察到一个完整一致的链路。
//!
//! # 逻辑解析（How）
//! - 链路以不可变的 [`ValveChain`] 快照表示，写路径构建新快照并原子发布；
//! - 读路径（`first`、`valves`、`is_async_supported`、遍历）全部基于同一个快照计算，
//!   因此永远不会看到半个变更。
//!
//! # 契约说明（What）
//! - basic Valve 若存在，总是链路的逻辑尾部；
//! - 普通 Valve 保持插入顺序，`add_valve` 总是插入在 basic 之前；
//! - 同一 Valve 在一条链路中至多出现一次；实现 [`Contained`](crate::valve::Contained) 的 Valve
//!   借助绑定状态机保证至多属于一个容器的链路。
//! - 跨链路的唯一性只对“实现 `Contained` 且 Pipeline 已关联容器”的 Valve 成立：未实现 `Contained`
//!   的同一个 `Arc`，或加入未关联容器的 Pipeline 的 Valve，可以同时出现在多条链路中。

mod internal;
mod standard;

use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::error::{BindError, ValveError};
use crate::exchange::{Request, Response};
use crate::sealed::Sealed;
use crate::valve::{Next, Valve};

pub use standard::StandardPipeline;

/// Pipeline 合约。
///
/// # 契约维度速览
/// - **语义**：管理一条 Valve 链的结构与只读视图；Pipeline 从不主动调用 `invoke`，
///   由调用方（服务器或父层级的 basic Valve）通过 [`ValveChain::invoke`] 驱动；
/// - **错误**：装配期错误以 [`BindError`] 同步返回，失败的变更不会产生任何结构修改；
///   移除不存在的 Valve 是无操作；
/// - **唯一性**：跨链路互斥依赖 [`Contained`](crate::valve::Contained) 绑定，未实现该能力的 Valve
///   或未关联容器的 Pipeline 不做跨链路检查；
/// - **并发**：所有方法均可在多线程下同时调用；读方法无锁；
/// - **观测**：每次发布新快照都会推进 `epoch`。
///
/// 读方法默认基于 [`Self::chain`] 的同一快照实现。
pub trait Pipeline: Send + Sync + 'static + Sealed {
    /// 设置 basic Valve，替换旧值；旧 basic 从加入时绑定的容器解绑。
    fn set_basic(&self, valve: Arc<dyn Valve>) -> Result<(), BindError>;

    /// 在 basic 之前追加普通 Valve，成功后广播 `ValveAdded`。
    fn add_valve(&self, valve: Arc<dyn Valve>) -> Result<(), BindError>;

    /// 移除 Valve；命中时解绑并广播 `ValveRemoved`，返回是否命中。
    fn remove_valve(&self, valve: &Arc<dyn Valve>) -> bool;

    /// 当前关联的容器。
    fn container(&self) -> Option<Arc<dyn Container>>;

    /// 重新关联容器，仅影响之后的绑定检查；传入 `None` 表示脱离容器。
    fn set_container(&self, container: Option<&Arc<dyn Container>>);

    /// 当前发布的链路快照。
    fn chain(&self) -> ValveChain;

    /// 当前逻辑纪元。
    fn epoch(&self) -> u64;

    fn basic(&self) -> Option<Arc<dyn Valve>> {
        self.chain().basic().cloned()
    }

    /// 时间点快照，包含 basic（若存在且位于末尾）。
    fn valves(&self) -> Vec<Arc<dyn Valve>> {
        self.chain().valves().to_vec()
    }

    fn first(&self) -> Option<Arc<dyn Valve>> {
        self.chain().first().cloned()
    }

    /// 链路上所有 Valve 是否都支持异步；空链路为真。
    fn is_async_supported(&self) -> bool {
        self.chain().is_async_supported()
    }

    /// 按链路顺序追加不支持异步的 Valve 名称。
    fn find_non_async_valves(&self, result: &mut Vec<String>) {
        self.chain().find_non_async_valves(result);
    }
}

/// 不可变链路快照。
///
/// # 教案式说明
/// - **意图（Why）**：一次请求遍历、一次 introspection、一次异步能力判断都应基于同一份结构，
///   快照把这些视图绑定在一起；
/// - **逻辑（How）**：内部为 `Arc`，克隆只增加引用计数；异步能力在构建时预先计算；
/// - **契约（What）**：`valves()` 中 basic（若存在）总在末尾；快照一经发布不再改变。
#[derive(Clone)]
pub struct ValveChain {
    snapshot: Arc<ChainSnapshot>,
}

pub(crate) struct ChainSnapshot {
    valves: Vec<Arc<dyn Valve>>,
    has_basic: bool,
    async_supported: bool,
    epoch: u64,
}

impl ChainSnapshot {
    pub(crate) fn empty() -> Self {
        Self {
            valves: Vec::new(),
            has_basic: false,
            async_supported: true,
            epoch: 0,
        }
    }

    pub(crate) fn build(
        mut valves: Vec<Arc<dyn Valve>>,
        basic: Option<Arc<dyn Valve>>,
        epoch: u64,
    ) -> Self {
        let has_basic = basic.is_some();
        valves.extend(basic);
        let async_supported = valves.iter().all(|valve| valve.is_async_supported());
        Self {
            valves,
            has_basic,
            async_supported,
            epoch,
        }
    }

    pub(crate) fn non_basic(&self) -> &[Arc<dyn Valve>] {
        if self.has_basic {
            &self.valves[..self.valves.len() - 1]
        } else {
            &self.valves
        }
    }

    pub(crate) fn basic(&self) -> Option<&Arc<dyn Valve>> {
        if self.has_basic {
            self.valves.last()
        } else {
            None
        }
    }

    pub(crate) fn valves(&self) -> &[Arc<dyn Valve>] {
        &self.valves
    }

    pub(crate) fn position(&self, valve: &Arc<dyn Valve>) -> Option<usize> {
        self.valves
            .iter()
            .position(|existing| Arc::ptr_eq(existing, valve))
    }
}

impl ValveChain {
    pub(crate) fn from_snapshot(snapshot: Arc<ChainSnapshot>) -> Self {
        Self { snapshot }
    }

    /// 链路头部：最早插入的普通 Valve，否则为 basic，空链路为 `None`。
    pub fn first(&self) -> Option<&Arc<dyn Valve>> {
        self.snapshot.valves.first()
    }

    pub fn basic(&self) -> Option<&Arc<dyn Valve>> {
        self.snapshot.basic()
    }

    pub fn valves(&self) -> &[Arc<dyn Valve>] {
        self.snapshot.valves()
    }

    pub fn len(&self) -> usize {
        self.snapshot.valves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.valves.is_empty()
    }

    pub fn contains(&self, valve: &Arc<dyn Valve>) -> bool {
        self.snapshot.position(valve).is_some()
    }

    pub fn is_async_supported(&self) -> bool {
        self.snapshot.async_supported
    }

    pub fn find_non_async_valves(&self, result: &mut Vec<String>) {
        result.extend(
            self.snapshot
                .valves
                .iter()
                .filter(|valve| !valve.is_async_supported())
                .map(|valve| valve.descriptor().name().to_owned()),
        );
    }

    /// 发布该快照时的纪元。
    pub fn epoch(&self) -> u64 {
        self.snapshot.epoch
    }

    /// 从链路头部开始处理请求。
    ///
    /// 错误原样返回，不做重试；完全为空的链路返回 [`ValveError::EmptyChain`]。
    pub fn invoke(&self, request: &mut Request, response: &mut Response) -> Result<(), ValveError> {
        match self.snapshot.valves.split_first() {
            Some((head, rest)) => head.invoke(request, response, Next::new(rest)),
            None => Err(ValveError::EmptyChain),
        }
    }

    /// 以调用方身份进入本层链路：先按链路异步能力收窄请求的异步许可，再调用 [`Self::invoke`]。
    ///
    /// 已被上层收回的许可不会在此重新授予。
    pub fn dispatch(
        &self,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<(), ValveError> {
        if request.is_async_supported() && !self.is_async_supported() {
            request.set_async_supported(false);
        }
        self.invoke(request, response)
    }
}

impl fmt::Debug for ValveChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValveChain")
            .field(
                "valves",
                &self
                    .snapshot
                    .valves
                    .iter()
                    .map(|valve| valve.descriptor())
                    .collect::<Vec<_>>(),
            )
            .field("has_basic", &self.snapshot.has_basic)
            .field("async_supported", &self.snapshot.async_supported)
            .field("epoch", &self.snapshot.epoch)
            .finish()
    }
}
