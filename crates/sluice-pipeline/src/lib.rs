//! `sluice-pipeline` 在 `sluice-core` 之上提供声明式装配与常用 Valve。
//!
//! # 教案式说明
//! - **意图（Why）**：核心 crate 只负责链路契约与并发语义；部署时常见的“从配置文件组装链路”
//!   “访问日志”“路径过滤”等能力放在这里，避免核心依赖 `serde`/`toml` 等配置栈；
//! - **逻辑（How）**：
//!   - [`PipelineBlueprint`] 描述链路，[`ValveCatalog`] 按种类构造 Valve，[`PipelineAssembler`]
//!     把两者落到任意 [`Pipeline`](sluice_core::Pipeline) 上；
//!   - [`telemetry::install`] 安装 `tracing-subscriber`，使核心 crate 的结构化事件可见；
//! - **契约（What）**：装配器先构造全部 Valve 再修改链路，未知种类或非法参数不会留下半装配状态。

mod blueprint;
mod error;
mod factory;
pub mod telemetry;
pub mod valves;

pub use blueprint::{PipelineBlueprint, ValveSpec};
pub use error::{BlueprintError, codes};
pub use factory::{FnValveFactory, PipelineAssembler, ValveCatalog, ValveFactory};
pub use telemetry::TelemetryError;
pub use valves::{AccessLogLevel, AccessLogValve, RequestFilterValve};
