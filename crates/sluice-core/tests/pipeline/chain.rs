//! 链路结构性质：顺序、basic 尾部、移除、异步聚合与调用。

use std::sync::Arc;

use sluice_core::{
    ContainerKind, Pipeline, Request, Response, StandardContainer, StandardPipeline, ValveError,
};

use super::support::{entries, names, passthrough, recording, trail};

#[test]
fn add_valve_preserves_insertion_order_before_basic() {
    let pipeline = StandardPipeline::new();
    pipeline
        .set_basic(passthrough("basic", true))
        .expect("设置 basic 应成功");
    for name in ["a", "b", "c"] {
        pipeline
            .add_valve(passthrough(name, true))
            .expect("追加应成功");
    }
    assert_eq!(names(&pipeline), ["a", "b", "c", "basic"]);
}

#[test]
fn set_basic_always_becomes_the_tail() {
    let pipeline = StandardPipeline::new();
    pipeline
        .add_valve(passthrough("a", true))
        .expect("追加应成功");
    let basic = passthrough("basic", true);
    pipeline.set_basic(Arc::clone(&basic)).expect("设置 basic 应成功");

    let valves = pipeline.valves();
    assert!(
        pipeline.basic().is_some_and(|current| Arc::ptr_eq(&current, &basic)),
        "basic() 应返回刚设置的 Valve"
    );
    assert!(
        valves.last().is_some_and(|last| Arc::ptr_eq(last, &basic)),
        "basic 必须位于链路末尾"
    );
}

#[test]
fn removing_absent_valve_is_a_silent_noop() {
    let pipeline = StandardPipeline::new();
    pipeline
        .add_valve(passthrough("a", true))
        .expect("追加应成功");
    let before = names(&pipeline);
    assert!(!pipeline.remove_valve(&passthrough("ghost", true)));
    assert_eq!(names(&pipeline), before);
}

#[test]
fn removing_head_and_middle_relinks_the_chain() {
    let pipeline = StandardPipeline::new();
    let a = passthrough("a", true);
    let b = passthrough("b", true);
    pipeline.add_valve(Arc::clone(&a)).expect("追加应成功");
    pipeline.add_valve(Arc::clone(&b)).expect("追加应成功");
    pipeline
        .add_valve(passthrough("c", true))
        .expect("追加应成功");
    pipeline
        .set_basic(passthrough("basic", true))
        .expect("设置 basic 应成功");

    assert!(pipeline.remove_valve(&b));
    assert_eq!(names(&pipeline), ["a", "c", "basic"]);
    assert!(pipeline.remove_valve(&a));
    assert_eq!(
        pipeline
            .first()
            .map(|valve| valve.descriptor().name().to_owned()),
        Some("c".to_owned())
    );
}

#[test]
fn async_support_flips_with_membership() {
    let pipeline = StandardPipeline::new();
    assert!(pipeline.is_async_supported(), "空链路应视为支持异步");

    let blocking = passthrough("blocking", false);
    pipeline
        .add_valve(Arc::clone(&blocking))
        .expect("追加应成功");
    assert!(!pipeline.is_async_supported());

    assert!(pipeline.remove_valve(&blocking));
    assert!(pipeline.is_async_supported());
}

#[test]
fn find_non_async_valves_reports_chain_order() {
    let pipeline = StandardPipeline::new();
    pipeline
        .add_valve(passthrough("x", false))
        .expect("追加应成功");
    pipeline
        .add_valve(passthrough("y", true))
        .expect("追加应成功");
    pipeline
        .add_valve(passthrough("z", false))
        .expect("追加应成功");
    pipeline
        .set_basic(passthrough("basic", false))
        .expect("设置 basic 应成功");

    let mut result = vec!["preexisting".to_owned()];
    pipeline.find_non_async_valves(&mut result);
    assert_eq!(result, ["preexisting", "x", "z", "basic"], "应追加而非覆盖");
}

#[test]
fn mixed_async_scenario() {
    let pipeline = StandardPipeline::new();
    pipeline
        .add_valve(passthrough("A", true))
        .expect("追加应成功");
    pipeline
        .add_valve(passthrough("B", false))
        .expect("追加应成功");
    pipeline
        .set_basic(passthrough("C", true))
        .expect("设置 basic 应成功");

    assert_eq!(names(&pipeline), ["A", "B", "C"]);
    assert_eq!(
        pipeline
            .first()
            .map(|valve| valve.descriptor().name().to_owned()),
        Some("A".to_owned())
    );
    assert!(!pipeline.is_async_supported());
    let mut non_async = Vec::new();
    pipeline.find_non_async_valves(&mut non_async);
    assert_eq!(non_async, ["B"]);
}

#[test]
fn basic_only_scenario() {
    let pipeline = StandardPipeline::new();
    assert!(pipeline.first().is_none());
    assert!(pipeline.valves().is_empty());

    pipeline
        .set_basic(passthrough("C", true))
        .expect("设置 basic 应成功");
    assert_eq!(names(&pipeline), ["C"]);
    assert_eq!(
        pipeline
            .first()
            .map(|valve| valve.descriptor().name().to_owned()),
        Some("C".to_owned())
    );
}

#[test]
fn invoke_walks_every_valve_and_ends_at_basic() {
    let trail = trail();
    let pipeline = StandardPipeline::new();
    pipeline
        .add_valve(recording("a", true, &trail))
        .expect("追加应成功");
    pipeline
        .add_valve(recording("b", true, &trail))
        .expect("追加应成功");
    pipeline
        .set_basic(recording("basic", true, &trail))
        .expect("设置 basic 应成功");

    let mut request = Request::new("GET", "/");
    let mut response = Response::new();
    pipeline
        .chain()
        .invoke(&mut request, &mut response)
        .expect("链路不应失败");
    assert_eq!(entries(&trail), ["a", "b", "basic"]);
}

#[test]
fn empty_chain_invoke_reports_error() {
    let pipeline = StandardPipeline::new();
    let mut request = Request::new("GET", "/");
    let mut response = Response::new();
    let err = pipeline
        .chain()
        .invoke(&mut request, &mut response)
        .expect_err("空链路不可调用");
    assert!(matches!(err, ValveError::EmptyChain));
}

#[test]
fn valve_errors_propagate_unchanged() {
    let trail = trail();
    let pipeline = StandardPipeline::new();
    pipeline
        .add_valve(Arc::new(sluice_core::FnValve::new(
            sluice_core::ValveDescriptor::anonymous("boom"),
            |_request: &mut Request, _response: &mut Response, _next: sluice_core::Next<'_>| {
                Err(ValveError::failed("boom", "exploded"))
            },
        )))
        .expect("追加应成功");
    pipeline
        .set_basic(recording("basic", true, &trail))
        .expect("设置 basic 应成功");

    let mut request = Request::new("GET", "/");
    let mut response = Response::new();
    let err = pipeline
        .chain()
        .invoke(&mut request, &mut response)
        .expect_err("错误应原样传播");
    assert_eq!(err.to_string(), "valve `boom` failed: exploded");
    assert!(entries(&trail).is_empty(), "出错后不应继续执行后续 Valve");
}

#[test]
fn in_flight_snapshot_is_not_affected_by_later_mutation() {
    let pipeline = StandardPipeline::new();
    let a = passthrough("a", true);
    pipeline.add_valve(Arc::clone(&a)).expect("追加应成功");
    let snapshot = pipeline.chain();

    pipeline
        .add_valve(passthrough("b", true))
        .expect("追加应成功");
    assert!(pipeline.remove_valve(&a));

    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains(&a));
    assert_eq!(names(&pipeline), ["b"]);
    assert!(pipeline.epoch() > snapshot.epoch());
}

#[test]
fn background_process_and_teardown_cover_the_whole_chain() {
    let host = StandardContainer::new("localhost", ContainerKind::Host);
    let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    struct Ticking(Arc<std::sync::atomic::AtomicUsize>);
    impl sluice_core::Valve for Ticking {
        fn descriptor(&self) -> sluice_core::ValveDescriptor {
            sluice_core::ValveDescriptor::anonymous("ticking")
        }

        fn invoke(
            &self,
            request: &mut Request,
            response: &mut Response,
            next: sluice_core::Next<'_>,
        ) -> Result<(), ValveError> {
            next.invoke(request, response)
        }

        fn background_process(&self) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    host.pipeline()
        .add_valve(Arc::new(Ticking(Arc::clone(&ticks))))
        .expect("追加应成功");
    host.pipeline()
        .set_basic(Arc::new(Ticking(Arc::clone(&ticks))))
        .expect("设置 basic 应成功");
    host.background_process();
    assert_eq!(ticks.load(std::sync::atomic::Ordering::SeqCst), 2);

    host.teardown();
    assert!(host.pipeline().valves().is_empty());
    assert!(host.pipeline().basic().is_none());
}
