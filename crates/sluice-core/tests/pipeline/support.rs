//! 测试共享的 Valve 与断言辅助。

use std::sync::{Arc, Mutex};

use sluice_core::{
    BindingState, Contained, ContainerBinding, FnValve, Next, Pipeline, Request, Response, Valve,
    ValveDescriptor, ValveError,
};

/// 记录经过顺序的日志。
pub type Trail = Arc<Mutex<Vec<String>>>;

pub fn trail() -> Trail {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(trail: &Trail) -> Vec<String> {
    trail.lock().expect("trail lock").clone()
}

/// 直接转发的 Valve。
pub fn passthrough(name: &'static str, async_supported: bool) -> Arc<dyn Valve> {
    Arc::new(
        FnValve::new(
            ValveDescriptor::anonymous(name),
            |request: &mut Request, response: &mut Response, next: Next<'_>| {
                next.invoke(request, response)
            },
        )
        .with_async_supported(async_supported),
    )
}

/// 记录名称后转发的 Valve。
pub fn recording(name: &'static str, async_supported: bool, trail: &Trail) -> Arc<dyn Valve> {
    let trail = Arc::clone(trail);
    Arc::new(
        FnValve::new(
            ValveDescriptor::anonymous(name),
            move |request: &mut Request, response: &mut Response, next: Next<'_>| {
                trail.lock().expect("trail lock").push(name.to_owned());
                next.invoke(request, response)
            },
        )
        .with_async_supported(async_supported),
    )
}

/// 把经过的 Valve 名称追加到请求属性 `trail` 中，供并发测试在线程内收集遍历结果。
pub fn stamping(name: &'static str) -> Arc<dyn Valve> {
    Arc::new(FnValve::new(
        ValveDescriptor::anonymous(name),
        move |request: &mut Request, response: &mut Response, next: Next<'_>| {
            let stamped = match request.attribute("trail") {
                Some(previous) => format!("{previous},{name}"),
                None => name.to_owned(),
            };
            request.set_attribute("trail", stamped);
            next.invoke(request, response)
        },
    ))
}

/// 带绑定状态机的 Valve。
pub struct BoundValve {
    name: &'static str,
    async_supported: bool,
    binding: ContainerBinding,
}

impl BoundValve {
    pub fn new(name: &'static str, async_supported: bool) -> Arc<Self> {
        Self::with_binding(name, async_supported, ContainerBinding::new(name))
    }

    pub fn with_binding(
        name: &'static str,
        async_supported: bool,
        binding: ContainerBinding,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            async_supported,
            binding,
        })
    }

    pub fn state(&self) -> BindingState {
        self.binding.state()
    }
}

impl Valve for BoundValve {
    fn descriptor(&self) -> ValveDescriptor {
        ValveDescriptor::anonymous(self.name)
    }

    fn is_async_supported(&self) -> bool {
        self.async_supported
    }

    fn invoke(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> Result<(), ValveError> {
        next.invoke(request, response)
    }

    fn as_contained(&self) -> Option<&dyn Contained> {
        Some(&self.binding)
    }
}

/// `valves()` 中的名称序列。
pub fn names(pipeline: &dyn Pipeline) -> Vec<String> {
    pipeline
        .valves()
        .iter()
        .map(|valve| valve.descriptor().name().to_owned())
        .collect()
}

/// 以 `Arc<dyn Valve>` 视角返回同一实例。
pub fn erase<V: Valve>(valve: &Arc<V>) -> Arc<dyn Valve> {
    valve.clone()
}
