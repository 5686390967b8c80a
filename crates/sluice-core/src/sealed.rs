//! 内部 sealed 模块用于控制外部扩展边界。
//!
//! # 设计背景（Why）
//! - `sluice-core` 对外暴露 `Valve`、`Container`、`Pipeline` 等可实现的 Trait，需要在 SemVer 框架下保留演进空间。
//! - 通过统一的 `Sealed` 标记，可以在不破坏公开 API 的情况下为 Trait 增加默认方法或强化约束。
//!
//! # 契约说明（What）
//! - `Sealed` 对所有类型提供 blanket 实现，调用方无需显式实现；
//! - 若未来需要限制实现者集合，只需在此收紧 blanket 条件。
pub(crate) trait Sealed {}

impl<T: ?Sized> Sealed for T {}
