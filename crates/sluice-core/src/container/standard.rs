//! 参考容器实现。
//!
//! # 教案式说明
//! - **意图（Why）**：Pipeline 需要一个真实的所有者才能验证绑定与事件语义；层级装配本身属于外部，
//!   因此这里只提供最小的命名子容器树；
//! - **逻辑（How）**：通过 `Arc::new_cyclic` 构造，使 Pipeline 在构造时即可持有指向容器的弱引用；
//!   子容器表以 `ArcSwap<BTreeMap>` 写时复制保存；
//! - **契约（What）**：子容器名称在同一父容器内唯一；`teardown` 先拆除子容器再拆除自身链路。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use spin::Mutex;

use super::{
    Container, ContainerEvent, ContainerId, ContainerKind, ContainerListener, ContainerListeners,
};
use crate::error::ValveError;
use crate::exchange::{Request, Response};
use crate::pipeline::{Pipeline, StandardPipeline};

/// 持有一条 [`StandardPipeline`] 与若干命名子容器的层级容器。
pub struct StandardContainer {
    id: ContainerId,
    name: String,
    kind: ContainerKind,
    pipeline: StandardPipeline,
    listeners: ContainerListeners,
    children: ArcSwap<BTreeMap<String, Arc<StandardContainer>>>,
    children_mutation: Mutex<()>,
}

impl StandardContainer {
    /// 构造容器，其 Pipeline 已关联到自身。
    pub fn new(name: impl Into<String>, kind: ContainerKind) -> Arc<Self> {
        let name = name.into();
        let id = ContainerId::next();
        Arc::new_cyclic(|weak_self: &Weak<Self>| {
            let owner: Weak<dyn Container> = weak_self.clone();
            Self {
                id,
                pipeline: StandardPipeline::for_owner(id, &name, owner),
                name,
                kind,
                listeners: ContainerListeners::new(),
                children: ArcSwap::from_pointee(BTreeMap::new()),
                children_mutation: Mutex::new(()),
            }
        })
    }

    pub fn pipeline(&self) -> &StandardPipeline {
        &self.pipeline
    }

    pub fn add_container_listener(&self, listener: Arc<dyn ContainerListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_container_listener(&self, listener: &Arc<dyn ContainerListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// 挂载子容器；同名子容器已存在时返回 `false` 且不做替换。
    pub fn add_child(&self, child: Arc<StandardContainer>) -> bool {
        let _guard = self.children_mutation.lock();
        let current = self.children.load_full();
        if current.contains_key(child.name()) {
            return false;
        }
        let mut next = (*current).clone();
        tracing::debug!(
            pipeline.container = %self.name,
            child = %child.name(),
            "container.child added"
        );
        next.insert(child.name().to_owned(), child);
        self.children.store(Arc::new(next));
        true
    }

    pub fn find_child(&self, name: &str) -> Option<Arc<StandardContainer>> {
        self.children.load().get(name).cloned()
    }

    pub fn remove_child(&self, name: &str) -> Option<Arc<StandardContainer>> {
        let _guard = self.children_mutation.lock();
        let current = self.children.load_full();
        let mut next = (*current).clone();
        let removed = next.remove(name)?;
        self.children.store(Arc::new(next));
        Some(removed)
    }

    /// 按名称排序的子容器快照。
    pub fn children(&self) -> Vec<Arc<StandardContainer>> {
        self.children.load().values().cloned().collect()
    }

    /// 先执行自身链路的后台任务，再递归子容器。
    pub fn background_process(&self) {
        self.pipeline.background_process();
        for child in self.children.load().values() {
            child.background_process();
        }
    }

    /// 先拆除子容器，再拆除自身链路；拆除后所有 Valve 均已解绑。
    pub fn teardown(&self) {
        for child in self.children.load().values() {
            child.teardown();
        }
        self.pipeline.teardown();
    }

    /// 以当前快照处理请求，并按链路异步能力收窄请求的异步许可。
    pub fn dispatch(
        &self,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<(), ValveError> {
        self.pipeline.chain().dispatch(request, response)
    }
}

impl Container for StandardContainer {
    fn id(&self) -> ContainerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ContainerKind {
        self.kind
    }

    fn fire_container_event(&self, event: &ContainerEvent) {
        self.listeners.fire(self, event);
    }
}

impl fmt::Debug for StandardContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardContainer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("valves", &self.pipeline.valves().len())
            .field(
                "children",
                &self.children.load().keys().cloned().collect::<Vec<_>>(),
            )
            .finish()
    }
}
