//! Pipeline 可观测性的稳定标签。
//!
//! # 教案式说明
//! - **意图（Why）**：链路变更、绑定拒绝等事件需要以统一字段写入日志，SRE 才能按容器、操作类型与
//!   纪元聚合检索；集中定义可防止在各处散落裸字符串导致命名漂移。
//! - **契约（What）**：日志字段统一使用 `pipeline.container`、`pipeline.op`、`pipeline.valve`、
//!   `pipeline.epoch` 四个键；操作标签为低基数取值，禁止注入请求级标识。

/// 操作标签。
pub mod keys {
    /// 追加普通 Valve。
    pub const OP_ADD: &str = "add";
    /// 移除 Valve。
    pub const OP_REMOVE: &str = "remove";
    /// 替换 basic Valve。
    pub const OP_SET_BASIC: &str = "set_basic";

    /// 尚未关联容器时使用的占位名称。
    pub const DETACHED: &str = "<detached>";
}

/// 描述 Pipeline 内部触发的变更操作类型。
///
/// 若未来扩展新的变更类型，应同步新增分支并更新 [`keys`] 中的标签。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineMutationKind {
    Add,
    Remove,
    SetBasic,
}

impl PipelineMutationKind {
    /// 将枚举值映射为观测标签。
    pub fn as_label(self) -> &'static str {
        match self {
            PipelineMutationKind::Add => keys::OP_ADD,
            PipelineMutationKind::Remove => keys::OP_REMOVE,
            PipelineMutationKind::SetBasic => keys::OP_SET_BASIC,
        }
    }
}
