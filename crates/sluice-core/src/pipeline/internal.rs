//! Pipeline 内部写时复制存储组件。
//!
//! # 设计背景（Why）
//! - **热更新安全切换**：在流量持续进入的同时增删 Valve，需要一个无锁读取、同步写入的共享结构，
//!   读线程始终看到稳定的链路快照；本模块基于 [`ArcSwap`] 提供“读零拷贝、写原子替换”的行为。
//! - **Epoch 栅栏语义**：写入方完成快照替换后通过 `bump_epoch` 推进逻辑时钟，观察者比较前后纪元即可
//!   判断变更是否已发布。
//!
//! # 契约说明（What）
//! - `load` 返回的 `Arc` 可长期保存，旧快照在无人引用后自动释放；
//! - 写入步骤（构建快照、`store`、`bump_epoch`）的线性化由调用方的互斥锁保证。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;

/// 原子快照 + epoch 计数的缓冲区。
pub(crate) struct ValveEpochBuffer<T: Send + Sync + 'static> {
    snapshot: ArcSwap<T>,
    epoch: AtomicU64,
}

impl<T: Send + Sync + 'static> ValveEpochBuffer<T> {
    /// 以初始快照创建缓冲区，初始 epoch 为 0。
    pub(crate) fn new(initial: T) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(initial),
            epoch: AtomicU64::new(0),
        }
    }

    /// 获取当前快照。
    #[inline]
    pub(crate) fn load(&self) -> Arc<T> {
        self.snapshot.load_full()
    }

    /// 原子替换快照。
    #[inline]
    pub(crate) fn store(&self, snapshot: Arc<T>) {
        self.snapshot.store(snapshot);
    }

    /// 返回当前逻辑 epoch。
    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// 在完成快照切换后自增 epoch，返回更新后的值。
    #[inline]
    pub(crate) fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }
}
