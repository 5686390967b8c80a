//! 层级容器（Pipeline 的所有者）契约。
//!
//! # 设计背景（Why）
//! - 容器层级（Engine → Host → Context → Wrapper）本身的装配属于外部协作方；
//!   Pipeline 只需要容器提供身份、种类以及“Valve 增删”事件通道；
//! - 事件通知以显式观察者列表实现：变更成功后同步、按注册顺序调用，不经由隐式旁路。
//!
//! # 契约说明（What）
//! - [`Container`]：身份、名称、种类与事件广播入口；
//! - [`ContainerListeners`]：写时复制的监听器列表，广播期间允许监听器增删自身；
//! - [`StandardContainer`]：参考实现，持有一条 [`StandardPipeline`](crate::pipeline::StandardPipeline)
//!   与若干命名子容器。

mod dispatch;
mod standard;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use spin::Mutex;

use crate::sealed::Sealed;
use crate::valve::{Valve, ValveDescriptor};

pub use dispatch::{
    ChildDispatchValve, ChildSelector, by_first_path_segment, by_host_header,
};
pub use standard::StandardContainer;

/// 容器的进程内唯一标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(u64);

impl ContainerId {
    /// 分配一个新的标识，单调递增且从不复用。
    pub fn next() -> Self {
        static SEQUENCE: AtomicU64 = AtomicU64::new(1);
        Self(SEQUENCE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container#{}", self.0)
    }
}

/// 容器在层级中的位置，绑定检查可据此接受或拒绝。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ContainerKind {
    Engine,
    Host,
    Context,
    Wrapper,
}

/// 容器事件类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContainerEventKind {
    /// Valve 已加入链路。
    ValveAdded,
    /// Valve 已从链路移除。
    ValveRemoved,
}

impl ContainerEventKind {
    /// 事件的稳定标签。
    pub fn as_label(self) -> &'static str {
        match self {
            ContainerEventKind::ValveAdded => "valve.added",
            ContainerEventKind::ValveRemoved => "valve.removed",
        }
    }
}

/// 链路结构变更事件。
///
/// `epoch` 为使该变更可见的快照纪元，监听器可据此与 `Pipeline::epoch` 对账。
#[derive(Clone)]
pub struct ContainerEvent {
    kind: ContainerEventKind,
    valve: Arc<dyn Valve>,
    descriptor: ValveDescriptor,
    epoch: u64,
}

impl ContainerEvent {
    pub(crate) fn new(kind: ContainerEventKind, valve: Arc<dyn Valve>, epoch: u64) -> Self {
        let descriptor = valve.descriptor();
        Self {
            kind,
            valve,
            descriptor,
            epoch,
        }
    }

    pub fn kind(&self) -> ContainerEventKind {
        self.kind
    }

    pub fn valve(&self) -> &Arc<dyn Valve> {
        &self.valve
    }

    pub fn descriptor(&self) -> &ValveDescriptor {
        &self.descriptor
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl fmt::Debug for ContainerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerEvent")
            .field("kind", &self.kind)
            .field("valve", &self.descriptor.name())
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// 容器事件监听器。
pub trait ContainerListener: Send + Sync + 'static {
    fn container_event(&self, container: &dyn Container, event: &ContainerEvent);
}

impl<F> ContainerListener for F
where
    F: Fn(&dyn Container, &ContainerEvent) + Send + Sync + 'static,
{
    fn container_event(&self, container: &dyn Container, event: &ContainerEvent) {
        self(container, event)
    }
}

/// 层级容器契约。
///
/// # 契约维度速览
/// - **身份**：`id` 在进程内唯一，绑定状态机以此判断“是否同一容器”；
/// - **种类**：`kind` 供 Valve 的绑定检查决定是否接受；
/// - **事件**：`fire_container_event` 由 Pipeline 在结构变更成功后同步调用，调用时不持有任何链路锁。
pub trait Container: Send + Sync + 'static + Sealed {
    fn id(&self) -> ContainerId;

    fn name(&self) -> &str;

    fn kind(&self) -> ContainerKind;

    fn fire_container_event(&self, event: &ContainerEvent);
}

impl fmt::Debug for dyn Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// 写时复制的监听器列表。
///
/// # 教案式说明
/// - **意图（Why）**：广播路径读多写少，且监听器可能在回调中增删自身；若广播时持有锁会造成自锁。
/// - **逻辑（How）**：与 Pipeline 相同，写路径在 `Mutex` 下复制向量并 `ArcSwap::store`，
///   广播路径 `load_full` 后遍历快照。
/// - **契约（What）**：广播顺序即注册顺序；广播期间新增的监听器从下一次广播开始生效。
pub struct ContainerListeners {
    listeners: ArcSwap<Vec<Arc<dyn ContainerListener>>>,
    mutation: Mutex<()>,
}

impl ContainerListeners {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
            mutation: Mutex::new(()),
        }
    }

    pub fn add(&self, listener: Arc<dyn ContainerListener>) {
        let _guard = self.mutation.lock();
        let mut next: Vec<_> = self.listeners.load().iter().cloned().collect();
        next.push(listener);
        self.listeners.store(Arc::new(next));
    }

    /// 按指针身份移除监听器，返回是否命中。
    pub fn remove(&self, listener: &Arc<dyn ContainerListener>) -> bool {
        let _guard = self.mutation.lock();
        let current = self.listeners.load_full();
        let Some(position) = current
            .iter()
            .position(|existing| Arc::ptr_eq(existing, listener))
        else {
            return false;
        };
        let mut next: Vec<_> = current.iter().cloned().collect();
        next.remove(position);
        self.listeners.store(Arc::new(next));
        true
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 依注册顺序同步广播。
    pub fn fire(&self, container: &dyn Container, event: &ContainerEvent) {
        let snapshot = self.listeners.load_full();
        for listener in snapshot.iter() {
            listener.container_event(container, event);
        }
    }
}

impl Default for ContainerListeners {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContainerListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerListeners")
            .field("len", &self.len())
            .finish()
    }
}
