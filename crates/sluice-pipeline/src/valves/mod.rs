//! 可复用的内置 Valve。
//!
//! - [`AccessLogValve`]：请求完成后输出一条结构化访问日志；
//! - [`RequestFilterValve`]：按路径前缀放行或拒绝请求。

mod access_log;
mod request_filter;

pub use access_log::{AccessLogLevel, AccessLogValve};
pub use request_filter::RequestFilterValve;
