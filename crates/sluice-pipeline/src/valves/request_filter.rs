//! 按路径前缀放行或拒绝请求的 Valve。
//!
//! 判定顺序：命中 `deny` 即拒绝；否则 `allow` 为空或命中 `allow` 即放行；其余拒绝。
//! 被拒绝的请求以配置的状态码结束，不再转发。

use sluice_core::{Next, Request, Response, Valve, ValveDescriptor, ValveError};

use crate::blueprint::ValveSpec;
use crate::error::BlueprintError;

const DEFAULT_DENY_STATUS: u16 = 403;

#[derive(Debug)]
pub struct RequestFilterValve {
    name: String,
    allow: Vec<String>,
    deny: Vec<String>,
    deny_status: u16,
}

impl RequestFilterValve {
    pub const KIND: &'static str = "request-filter";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow: Vec::new(),
            deny: Vec::new(),
            deny_status: DEFAULT_DENY_STATUS,
        }
    }

    pub fn allow(mut self, prefix: impl Into<String>) -> Self {
        self.allow.push(prefix.into());
        self
    }

    pub fn deny(mut self, prefix: impl Into<String>) -> Self {
        self.deny.push(prefix.into());
        self
    }

    pub fn with_deny_status(mut self, status: u16) -> Self {
        self.deny_status = status;
        self
    }

    /// 由蓝图构造；参数 `allow`/`deny` 为路径前缀数组，`status` 为拒绝时的状态码（100..=599）。
    pub fn from_spec(spec: &ValveSpec) -> Result<Self, BlueprintError> {
        let deny_status = match spec.int_param("status")? {
            None => DEFAULT_DENY_STATUS,
            Some(status) => u16::try_from(status)
                .ok()
                .filter(|status| (100..=599).contains(status))
                .ok_or_else(|| {
                    BlueprintError::invalid_param(
                        &spec.kind,
                        "status",
                        format!("{status} is not a valid HTTP status"),
                    )
                })?,
        };
        Ok(Self {
            name: spec.name_or_kind().to_owned(),
            allow: spec.str_list_param("allow")?,
            deny: spec.str_list_param("deny")?,
            deny_status,
        })
    }

    /// 判断路径是否放行。
    pub fn permits(&self, path: &str) -> bool {
        let matches = |prefixes: &[String]| {
            prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
        };
        if matches(&self.deny) {
            return false;
        }
        self.allow.is_empty() || matches(&self.allow)
    }
}

impl Valve for RequestFilterValve {
    fn descriptor(&self) -> ValveDescriptor {
        ValveDescriptor::new(
            self.name.clone(),
            "security",
            "rejects requests whose path matches a denied prefix",
        )
    }

    fn is_async_supported(&self) -> bool {
        true
    }

    fn invoke(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> Result<(), ValveError> {
        if self.permits(request.path()) {
            return next.invoke(request, response);
        }
        tracing::debug!(
            valve = %self.name,
            path = %request.path(),
            status = self.deny_status,
            "request.filter denied"
        );
        response.send_error(self.deny_status, "Forbidden");
        Ok(())
    }
}
