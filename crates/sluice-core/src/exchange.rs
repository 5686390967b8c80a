//! 请求/响应交换对象。
//!
//! # 教案式说明
//! - **意图（Why）**：Pipeline 只关心“谁在什么时候处理请求”，具体 I/O 语义属于连接器；
//!   这里提供最小的具体类型，使 Valve 契约可以被编写、组合与测试。
//! - **契约（What）**：
//!   - 一次 `invoke` 期间，调用线程独占 [`Request`]/[`Response`]；Valve 不得在处理结束后保留引用；
//!   - 需要跨线程继续处理时，只能通过 [`Request::start_async`] 拿到 [`AsyncContext`] 显式移交，
//!     且前提是调用方已根据整条链路的异步能力授予许可（见 `ValveChain::dispatch`）。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};

use crate::error::ValveError;

/// 入站请求。
#[derive(Debug)]
pub struct Request {
    method: String,
    path: String,
    headers: BTreeMap<String, String>,
    attributes: BTreeMap<String, String>,
    async_supported: bool,
    async_context: Option<AsyncContext>,
}

impl Request {
    /// 构造请求；异步许可默认由调用方授予，进入各层链路时再逐级收窄。
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: BTreeMap::new(),
            attributes: BTreeMap::new(),
            async_supported: true,
            async_context: None,
        }
    }

    /// 以构建器方式追加请求头，名称不区分大小写。
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// 读取请求级属性，Valve 之间可借此传递处理结果。
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// 当前请求是否被允许进入异步模式。
    pub fn is_async_supported(&self) -> bool {
        self.async_supported
    }

    /// 设置异步许可；层级派发时由 `ValveChain::dispatch` 调用以收窄许可。
    pub fn set_async_supported(&mut self, supported: bool) {
        self.async_supported = supported;
    }

    /// 请求挂起当前线程，稍后由其他线程完成响应。
    ///
    /// # 契约（What）
    /// - `valve`：发起挂起的 Valve 名称，用于错误上下文；
    /// - 未获许可时返回 [`ValveError::AsyncUnsupported`]；
    /// - 重复调用返回同一个 [`AsyncContext`] 的克隆。
    pub fn start_async(&mut self, valve: &str) -> Result<AsyncContext, ValveError> {
        if !self.async_supported {
            return Err(ValveError::AsyncUnsupported {
                valve: valve.to_owned(),
            });
        }
        let context = self
            .async_context
            .get_or_insert_with(|| AsyncContext::new(valve));
        Ok(context.clone())
    }

    pub fn is_async_started(&self) -> bool {
        self.async_context.is_some()
    }

    pub fn async_context(&self) -> Option<&AsyncContext> {
        self.async_context.as_ref()
    }
}

/// 出站响应。
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: BTreeMap<String, String>,
    body: BytesMut,
    committed: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: BytesMut::new(),
            committed: false,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// 追加响应体字节。
    pub fn write_body(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// 取出已写入的响应体，内部缓冲随之清空。
    pub fn take_body(&mut self) -> Bytes {
        self.body.split().freeze()
    }

    /// 标记响应已提交，后续 Valve 不应再修改状态码与头部。
    pub fn commit(&mut self) {
        self.committed = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// 以错误状态结束响应，常用于拒绝或未命中场景。
    pub fn send_error(&mut self, status: u16, message: &str) {
        self.status = status;
        self.body.clear();
        self.body.extend_from_slice(message.as_bytes());
        self.commit();
    }
}

/// 异步处理的移交句柄。
///
/// 克隆共享同一完成标记，可安全移动到其他线程；完成后不可回退。
#[derive(Clone, Debug)]
pub struct AsyncContext {
    inner: Arc<AsyncState>,
}

#[derive(Debug)]
struct AsyncState {
    started_by: String,
    completed: AtomicBool,
}

impl AsyncContext {
    fn new(valve: &str) -> Self {
        Self {
            inner: Arc::new(AsyncState {
                started_by: valve.to_owned(),
                completed: AtomicBool::new(false),
            }),
        }
    }

    /// 发起挂起的 Valve 名称。
    pub fn started_by(&self) -> &str {
        &self.inner.started_by
    }

    /// 标记异步处理完成；返回 `true` 表示本次调用完成了状态切换。
    pub fn complete(&self) -> bool {
        !self.inner.completed.swap(true, Ordering::AcqRel)
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }
}
