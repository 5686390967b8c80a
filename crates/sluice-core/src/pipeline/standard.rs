//! 写时复制的标准 Pipeline 实现。
//!
//! # 设计背景（Why）
//! - 管理路径（增删 Valve、替换 basic）与请求遍历同时发生，要求遍历永远看到完整链路；
//! - 读多写少：每个请求都会读取链路，而配置变更只在部署或运维时发生。
//!
//! # 逻辑解析（How）
//! - 写路径在 `spin::Mutex` 保护下复制当前快照中的 Valve 向量，执行绑定检查后构建新的
//!   [`ChainSnapshot`]，通过 [`ValveEpochBuffer`] 原子发布并推进 epoch；
//! - 读路径直接 `load` 快照，无锁；
//! - 容器事件在发布之后、释放变更锁之后同步广播，监听器可以安全地回读或再次修改 Pipeline。
//!
//! # 风险提示（Trade-offs）
//! - 每次变更复制 O(n) 个 `Arc` 指针；链路通常只有个位数 Valve，换取的是零锁遍历；
//! - 变更锁内会调用 Valve 的绑定回调，自定义 [`Contained`](crate::valve::Contained) 实现不得在回调中
//!   反向修改同一条 Pipeline。

use std::fmt;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use spin::Mutex;

use super::internal::ValveEpochBuffer;
use super::{ChainSnapshot, Pipeline, ValveChain};
use crate::container::{Container, ContainerEvent, ContainerEventKind, ContainerId};
use crate::error::BindError;
use crate::observability::{PipelineMutationKind, keys};
use crate::valve::Valve;

/// Pipeline 对所属容器的弱引用记录。
struct OwnerRef {
    id: ContainerId,
    name: String,
    container: Weak<dyn Container>,
}

/// 本 Pipeline 为链路成员建立过的绑定。
///
/// 解绑以绑定当时的容器为准；`set_container` 之后移除旧成员，仍能把它交还给原容器。
struct BoundMember {
    valve: Arc<dyn Valve>,
    owner: Weak<dyn Container>,
}

/// 标准 Pipeline。
///
/// # 教案式说明
/// - **意图（Why）**：为每个层级容器提供可热更新的 Valve 链；
/// - **逻辑（How）**：链路快照存放在 `ValveEpochBuffer` 中，所属容器以 `ArcSwapOption` 保存弱引用，
///   避免“容器 → Pipeline → 容器”引用环；
/// - **契约（What）**：
///   - 未关联容器时（detached）不执行绑定检查，也不广播事件；
///   - 所属容器已释放时按 detached 处理；
///   - 任意失败的变更不会发布新快照，`epoch` 保持不变；
///   - 移除或替换下来的 Valve 从加入时绑定的容器解绑，与之后的 `set_container` 无关。
pub struct StandardPipeline {
    chain: ValveEpochBuffer<ChainSnapshot>,
    owner: ArcSwapOption<OwnerRef>,
    /// 变更锁，同时守护绑定记录。
    mutation: Mutex<Vec<BoundMember>>,
}

impl StandardPipeline {
    /// 创建未关联容器的空 Pipeline。
    pub fn new() -> Self {
        Self {
            chain: ValveEpochBuffer::new(ChainSnapshot::empty()),
            owner: ArcSwapOption::empty(),
            mutation: Mutex::new(Vec::new()),
        }
    }

    /// 创建关联到 `container` 的空 Pipeline。
    pub fn with_container(container: &Arc<dyn Container>) -> Self {
        let pipeline = Self::new();
        pipeline.set_container(Some(container));
        pipeline
    }

    /// 供容器在 `Arc::new_cyclic` 构造期间使用：此时只能拿到自身的弱引用。
    pub(crate) fn for_owner(id: ContainerId, name: &str, container: Weak<dyn Container>) -> Self {
        let pipeline = Self::new();
        pipeline.owner.store(Some(Arc::new(OwnerRef {
            id,
            name: name.to_owned(),
            container,
        })));
        pipeline
    }

    /// 对当前快照中的每个 Valve 依链路顺序执行后台任务。
    pub fn background_process(&self) {
        let snapshot = self.chain.load();
        for valve in snapshot.valves() {
            valve.background_process();
        }
    }

    /// 依链路顺序移除全部 Valve（普通 Valve 在前，basic 最后），逐个解绑并广播 `ValveRemoved`。
    pub fn teardown(&self) {
        let snapshot = self.chain.load();
        for valve in snapshot.valves() {
            self.remove_valve(valve);
        }
    }

    fn owner(&self) -> Option<Arc<dyn Container>> {
        self.owner
            .load_full()
            .and_then(|owner| owner.container.upgrade())
    }

    fn owner_name(&self) -> String {
        self.owner
            .load_full()
            .map_or_else(|| keys::DETACHED.to_owned(), |owner| owner.name.clone())
    }

    fn already_in_chain(&self, valve: &Arc<dyn Valve>) -> BindError {
        BindError::AlreadyInChain {
            valve: valve.descriptor().name().to_owned(),
            container: self.owner_name(),
        }
    }

    fn bind(
        &self,
        members: &mut Vec<BoundMember>,
        valve: &Arc<dyn Valve>,
        owner: Option<&Arc<dyn Container>>,
    ) -> Result<(), BindError> {
        let (Some(contained), Some(owner)) = (valve.as_contained(), owner) else {
            return Ok(());
        };
        contained.bind_container(owner).inspect_err(|err| {
            tracing::warn!(
                pipeline.container = %owner.name(),
                pipeline.valve = %err.valve(),
                error.code = err.code(),
                "pipeline.binding refused: {err}"
            );
        })?;
        members.push(BoundMember {
            valve: Arc::clone(valve),
            owner: Arc::downgrade(owner),
        });
        Ok(())
    }

    /// 从加入链路时绑定的容器解绑；已释放的容器本就视为未绑定。
    fn unbind(members: &mut Vec<BoundMember>, valve: &Arc<dyn Valve>) {
        let Some(index) = members
            .iter()
            .position(|member| Arc::ptr_eq(&member.valve, valve))
        else {
            return;
        };
        let member = members.swap_remove(index);
        if let (Some(contained), Some(owner)) = (valve.as_contained(), member.owner.upgrade()) {
            contained.unbind_container(owner.as_ref());
        }
    }

    /// 构建并发布新快照，返回新的 epoch。调用方必须持有变更锁。
    fn commit(
        &self,
        valves: Vec<Arc<dyn Valve>>,
        basic: Option<Arc<dyn Valve>>,
        mutation: PipelineMutationKind,
        subject: &Arc<dyn Valve>,
    ) -> u64 {
        let next_epoch = self.chain.epoch() + 1;
        self.chain
            .store(Arc::new(ChainSnapshot::build(valves, basic, next_epoch)));
        let epoch = self.chain.bump_epoch();
        tracing::debug!(
            pipeline.container = %self.owner_name(),
            pipeline.op = mutation.as_label(),
            pipeline.valve = %subject.descriptor(),
            pipeline.epoch = epoch,
            "pipeline.mutation applied"
        );
        epoch
    }

    fn notify(
        owner: Option<Arc<dyn Container>>,
        kind: ContainerEventKind,
        valve: Arc<dyn Valve>,
        epoch: u64,
    ) {
        if let Some(owner) = owner {
            owner.fire_container_event(&ContainerEvent::new(kind, valve, epoch));
        }
    }
}

impl Default for StandardPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline for StandardPipeline {
    fn set_basic(&self, valve: Arc<dyn Valve>) -> Result<(), BindError> {
        let mut members = self.mutation.lock();
        let current = self.chain.load();
        let previous = current.basic().cloned();
        if previous
            .as_ref()
            .is_some_and(|basic| Arc::ptr_eq(basic, &valve))
        {
            return Ok(());
        }
        if current.position(&valve).is_some() {
            return Err(self.already_in_chain(&valve));
        }

        let owner = self.owner();
        self.bind(&mut members, &valve, owner.as_ref())?;
        if let Some(previous) = previous.as_ref() {
            Self::unbind(&mut members, previous);
        }
        self.commit(
            current.non_basic().to_vec(),
            Some(Arc::clone(&valve)),
            PipelineMutationKind::SetBasic,
            &valve,
        );
        Ok(())
    }

    fn add_valve(&self, valve: Arc<dyn Valve>) -> Result<(), BindError> {
        let (owner, epoch) = {
            let mut members = self.mutation.lock();
            let current = self.chain.load();
            if current.position(&valve).is_some() {
                return Err(self.already_in_chain(&valve));
            }

            let owner = self.owner();
            self.bind(&mut members, &valve, owner.as_ref())?;
            let mut valves = current.non_basic().to_vec();
            valves.push(Arc::clone(&valve));
            let epoch = self.commit(
                valves,
                current.basic().cloned(),
                PipelineMutationKind::Add,
                &valve,
            );
            (owner, epoch)
        };
        Self::notify(owner, ContainerEventKind::ValveAdded, valve, epoch);
        Ok(())
    }

    fn remove_valve(&self, valve: &Arc<dyn Valve>) -> bool {
        let (owner, epoch) = {
            let mut members = self.mutation.lock();
            let current = self.chain.load();
            let Some(position) = current.position(valve) else {
                tracing::trace!(
                    pipeline.container = %self.owner_name(),
                    pipeline.op = keys::OP_REMOVE,
                    pipeline.valve = %valve.descriptor(),
                    "pipeline.remove ignored: valve is not a member"
                );
                return false;
            };

            let is_basic = current
                .basic()
                .is_some_and(|basic| Arc::ptr_eq(basic, valve));
            let mut valves = current.non_basic().to_vec();
            let basic = if is_basic {
                None
            } else {
                valves.remove(position);
                current.basic().cloned()
            };

            Self::unbind(&mut members, valve);
            let owner = self.owner();
            let epoch = self.commit(valves, basic, PipelineMutationKind::Remove, valve);
            (owner, epoch)
        };
        Self::notify(
            owner,
            ContainerEventKind::ValveRemoved,
            Arc::clone(valve),
            epoch,
        );
        true
    }

    fn container(&self) -> Option<Arc<dyn Container>> {
        self.owner()
    }

    fn set_container(&self, container: Option<&Arc<dyn Container>>) {
        let _guard = self.mutation.lock();
        self.owner.store(container.map(|container| {
            Arc::new(OwnerRef {
                id: container.id(),
                name: container.name().to_owned(),
                container: Arc::downgrade(container),
            })
        }));
    }

    fn chain(&self) -> ValveChain {
        ValveChain::from_snapshot(self.chain.load())
    }

    fn epoch(&self) -> u64 {
        self.chain.epoch()
    }
}

impl fmt::Debug for StandardPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owner = self.owner.load_full();
        f.debug_struct("StandardPipeline")
            .field("owner", &owner.map(|owner| owner.id))
            .field("chain", &self.chain())
            .finish()
    }
}
