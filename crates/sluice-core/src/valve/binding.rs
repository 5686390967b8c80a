//! Valve 与容器之间的绑定状态机。
//!
//! # 设计背景（Why）
//! - 一个 Valve 同一时刻最多属于一个容器的链路；Pipeline 在 Valve 进入链路前调用绑定，
//!   移除时调用解绑，由 Valve 自身决定是否接受给定容器；
//! - 绑定关系以弱引用保存，避免 “容器 → Pipeline → Valve → 容器” 形成引用环。
//!
//! # 状态机（What）
//! ```text
//! Unbound ──bind(owner)──▶ Bound(owner)
//! Bound(owner) ──unbind(owner)──▶ Unbound
//! Bound(owner) ──bind(other)──▶ 拒绝：AlreadyBound
//! ```
//! - 对同一容器重复绑定视为成功（幂等）；
//! - 容器已被释放时视为 `Unbound`。

use std::borrow::Cow;
use std::sync::{Arc, Weak};

use spin::Mutex;

use crate::container::{Container, ContainerId, ContainerKind};
use crate::error::BindError;

/// 可选的容器绑定能力。
///
/// # 契约说明（What）
/// - `bind_container`：在 Valve 成为链路成员之前调用；返回错误时 Pipeline 不做任何结构变更；
/// - `unbind_container`：仅当当前绑定的正是 `owner` 时解除绑定，返回是否发生了状态切换；
/// - `container`：返回当前仍存活的绑定容器。
pub trait Contained: Send + Sync {
    fn container(&self) -> Option<Arc<dyn Container>>;

    fn bind_container(&self, owner: &Arc<dyn Container>) -> Result<(), BindError>;

    fn unbind_container(&self, owner: &dyn Container) -> bool;
}

/// 绑定状态的只读视图。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    Bound(ContainerId),
}

struct BoundOwner {
    id: ContainerId,
    name: String,
    owner: Weak<dyn Container>,
}

impl BoundOwner {
    fn is_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

/// 可复用的绑定状态机实现。
///
/// # 教案式说明
/// - **意图（Why）**：大多数 Valve 的绑定逻辑完全相同，只在“接受哪些容器”上有差异；
///   将状态机抽成独立结构，Valve 只需持有一个字段并在 `as_contained` 中返回它。
/// - **逻辑（How）**：内部以 `spin::Mutex<Option<BoundOwner>>` 记录绑定对象；接受策略为可选的
///   [`ContainerKind`] 白名单，不在名单内的容器以 [`BindError::Refused`] 拒绝。
/// - **契约（What）**：`valve` 名称仅用于错误上下文；状态切换在锁内完成，多个 Pipeline 并发争抢
///   同一 Valve 时只有一个能成功。
pub struct ContainerBinding {
    valve: Cow<'static, str>,
    allowed_kinds: Option<Vec<ContainerKind>>,
    slot: Mutex<Option<BoundOwner>>,
}

impl ContainerBinding {
    /// 构造接受任意容器的绑定状态机。
    pub fn new(valve: impl Into<Cow<'static, str>>) -> Self {
        Self {
            valve: valve.into(),
            allowed_kinds: None,
            slot: Mutex::new(None),
        }
    }

    /// 只接受给定种类的容器。
    pub fn restricted_to(mut self, kinds: impl IntoIterator<Item = ContainerKind>) -> Self {
        self.allowed_kinds = Some(kinds.into_iter().collect());
        self
    }

    /// 当前状态；绑定的容器已释放时返回 `Unbound`。
    pub fn state(&self) -> BindingState {
        match self.slot.lock().as_ref() {
            Some(bound) if bound.is_alive() => BindingState::Bound(bound.id),
            _ => BindingState::Unbound,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state(), BindingState::Bound(_))
    }

    /// 检查容器是否在接受范围内。
    pub fn accepts(&self, owner: &dyn Container) -> bool {
        self.allowed_kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&owner.kind()))
    }

    /// 绑定到 `owner`。
    pub fn bind(&self, owner: &Arc<dyn Container>) -> Result<(), BindError> {
        if !self.accepts(owner.as_ref()) {
            return Err(BindError::Refused {
                valve: self.valve.to_string(),
                container: owner.name().to_owned(),
                reason: Cow::Owned(format!(
                    "container kind {:?} is not accepted",
                    owner.kind()
                )),
            });
        }

        let mut slot = self.slot.lock();
        if let Some(bound) = slot.as_ref()
            && bound.is_alive()
        {
            if bound.id == owner.id() {
                return Ok(());
            }
            return Err(BindError::AlreadyBound {
                valve: self.valve.to_string(),
                current: bound.name.clone(),
                requested: owner.name().to_owned(),
            });
        }

        *slot = Some(BoundOwner {
            id: owner.id(),
            name: owner.name().to_owned(),
            owner: Arc::downgrade(owner),
        });
        Ok(())
    }

    /// 解除与 `owner` 的绑定；绑定对象不是 `owner` 时不做任何事。
    pub fn unbind(&self, owner: &dyn Container) -> bool {
        let mut slot = self.slot.lock();
        let owned = slot.as_ref().is_some_and(|bound| bound.id == owner.id());
        if owned {
            *slot = None;
        }
        owned
    }

    /// 当前仍存活的绑定容器。
    pub fn container(&self) -> Option<Arc<dyn Container>> {
        self.slot
            .lock()
            .as_ref()
            .and_then(|bound| bound.owner.upgrade())
    }
}

impl Contained for ContainerBinding {
    fn container(&self) -> Option<Arc<dyn Container>> {
        ContainerBinding::container(self)
    }

    fn bind_container(&self, owner: &Arc<dyn Container>) -> Result<(), BindError> {
        self.bind(owner)
    }

    fn unbind_container(&self, owner: &dyn Container) -> bool {
        self.unbind(owner)
    }
}

impl std::fmt::Debug for ContainerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerBinding")
            .field("valve", &self.valve)
            .field("allowed_kinds", &self.allowed_kinds)
            .field("state", &self.state())
            .finish()
    }
}
