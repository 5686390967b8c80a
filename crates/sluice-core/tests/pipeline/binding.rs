//! 绑定状态机在 Pipeline 增删中的迁移。

use std::sync::Arc;

use sluice_core::error::codes;
use sluice_core::{
    BindError, BindingState, Container, ContainerBinding, ContainerKind, Pipeline,
    StandardContainer,
};

use super::support::{BoundValve, erase, names, passthrough};

#[test]
fn add_then_remove_restores_state_and_unbinds() {
    let host = StandardContainer::new("localhost", ContainerKind::Host);
    let pipeline = host.pipeline();
    pipeline
        .set_basic(erase(&BoundValve::new("basic", true)))
        .expect("设置 basic 应成功");
    let before = names(pipeline);

    let valve = BoundValve::new("audit", true);
    pipeline.add_valve(erase(&valve)).expect("追加应成功");
    assert_eq!(valve.state(), BindingState::Bound(host.id()));

    assert!(pipeline.remove_valve(&erase(&valve)));
    assert_eq!(names(pipeline), before);
    assert_eq!(valve.state(), BindingState::Unbound, "移除后应回到未绑定状态");
}

#[test]
fn valve_cannot_join_two_containers() {
    let first = StandardContainer::new("first", ContainerKind::Host);
    let second = StandardContainer::new("second", ContainerKind::Host);
    let valve = BoundValve::new("shared", true);

    first
        .pipeline()
        .add_valve(erase(&valve))
        .expect("首次加入应成功");
    let err = second
        .pipeline()
        .add_valve(erase(&valve))
        .expect_err("已绑定的 Valve 不应加入其他容器");
    assert_eq!(err.code(), codes::ALREADY_BOUND);
    assert!(second.pipeline().valves().is_empty(), "失败的变更不得修改链路");
    assert_eq!(second.pipeline().epoch(), 0);

    assert!(first.pipeline().remove_valve(&erase(&valve)));
    second
        .pipeline()
        .add_valve(erase(&valve))
        .expect("从旧容器移除后可加入新容器");
    assert_eq!(valve.state(), BindingState::Bound(second.id()));
}

#[test]
fn refused_binding_leaves_chain_untouched() {
    let engine = StandardContainer::new("catalina", ContainerKind::Engine);
    let picky = BoundValve::with_binding(
        "host-only",
        true,
        ContainerBinding::new("host-only").restricted_to([ContainerKind::Host]),
    );

    let err = engine
        .pipeline()
        .add_valve(erase(&picky))
        .expect_err("Engine 不在白名单内");
    assert!(matches!(
        err,
        BindError::Refused { ref container, .. } if container == "catalina"
    ));
    assert!(engine.pipeline().valves().is_empty());

    let err = engine
        .pipeline()
        .set_basic(erase(&picky))
        .expect_err("basic 同样受绑定检查约束");
    assert_eq!(err.code(), codes::BINDING_REFUSED);
    assert!(engine.pipeline().basic().is_none());
}

#[test]
fn replacing_basic_unbinds_the_previous_one() {
    let host = StandardContainer::new("localhost", ContainerKind::Host);
    let old_basic = BoundValve::new("old", true);
    let new_basic = BoundValve::new("new", true);

    host.pipeline()
        .set_basic(erase(&old_basic))
        .expect("设置 basic 应成功");
    host.pipeline()
        .set_basic(erase(&new_basic))
        .expect("替换 basic 应成功");

    assert_eq!(old_basic.state(), BindingState::Unbound);
    assert_eq!(new_basic.state(), BindingState::Bound(host.id()));
    assert_eq!(names(host.pipeline()), ["new"]);
}

#[test]
fn failed_basic_replacement_keeps_previous_binding() {
    let host = StandardContainer::new("localhost", ContainerKind::Host);
    let other = StandardContainer::new("other", ContainerKind::Host);
    let current = BoundValve::new("current", true);
    let taken = BoundValve::new("taken", true);

    host.pipeline()
        .set_basic(erase(&current))
        .expect("设置 basic 应成功");
    other
        .pipeline()
        .set_basic(erase(&taken))
        .expect("设置 basic 应成功");

    host.pipeline()
        .set_basic(erase(&taken))
        .expect_err("已绑定到其他容器的 Valve 不能成为 basic");
    assert_eq!(current.state(), BindingState::Bound(host.id()));
    assert_eq!(names(host.pipeline()), ["current"]);
}

#[test]
fn detached_pipeline_skips_binding_until_container_is_set() {
    let pipeline = sluice_core::StandardPipeline::new();
    let valve = BoundValve::new("probe", true);
    pipeline.add_valve(erase(&valve)).expect("追加应成功");
    assert_eq!(valve.state(), BindingState::Unbound, "未关联容器时不做绑定");
    assert!(pipeline.remove_valve(&erase(&valve)));

    let host = StandardContainer::new("localhost", ContainerKind::Host);
    let owner: Arc<dyn Container> = host.clone();
    pipeline.set_container(Some(&owner));
    pipeline.add_valve(erase(&valve)).expect("追加应成功");
    assert_eq!(valve.state(), BindingState::Bound(host.id()));
}

#[test]
fn teardown_unbinds_every_valve() {
    let host = StandardContainer::new("localhost", ContainerKind::Host);
    let a = BoundValve::new("a", true);
    let basic = BoundValve::new("basic", true);
    host.pipeline().add_valve(erase(&a)).expect("追加应成功");
    host.pipeline()
        .set_basic(erase(&basic))
        .expect("设置 basic 应成功");

    host.teardown();
    assert_eq!(a.state(), BindingState::Unbound);
    assert_eq!(basic.state(), BindingState::Unbound);
}

#[test]
fn removal_after_detaching_returns_valve_to_unbound() {
    let host = StandardContainer::new("localhost", ContainerKind::Host);
    let other = StandardContainer::new("other", ContainerKind::Host);
    let owner: Arc<dyn Container> = host.clone();
    let pipeline = sluice_core::StandardPipeline::with_container(&owner);
    let valve = BoundValve::new("audit", true);
    pipeline.add_valve(erase(&valve)).expect("追加应成功");
    assert_eq!(valve.state(), BindingState::Bound(host.id()));

    pipeline.set_container(None);
    assert!(pipeline.remove_valve(&erase(&valve)));
    assert_eq!(valve.state(), BindingState::Unbound, "解绑以加入时的容器为准");
    other
        .pipeline()
        .add_valve(erase(&valve))
        .expect("移除后可加入其他容器");
}

#[test]
fn removal_after_repointing_unbinds_from_the_original_container() {
    let first = StandardContainer::new("first", ContainerKind::Host);
    let second = StandardContainer::new("second", ContainerKind::Host);
    let first_dyn: Arc<dyn Container> = first.clone();
    let second_dyn: Arc<dyn Container> = second.clone();
    let pipeline = sluice_core::StandardPipeline::with_container(&first_dyn);
    let valve = BoundValve::new("audit", true);
    let old_basic = BoundValve::new("old", true);
    pipeline.add_valve(erase(&valve)).expect("追加应成功");
    pipeline
        .set_basic(erase(&old_basic))
        .expect("设置 basic 应成功");

    pipeline.set_container(Some(&second_dyn));
    assert!(pipeline.remove_valve(&erase(&valve)));
    assert_eq!(valve.state(), BindingState::Unbound);

    let new_basic = BoundValve::new("new", true);
    pipeline
        .set_basic(erase(&new_basic))
        .expect("替换 basic 应成功");
    assert_eq!(old_basic.state(), BindingState::Unbound, "被替换的 basic 也应解绑");
    assert_eq!(new_basic.state(), BindingState::Bound(second.id()));
    assert_eq!(names(&pipeline), ["new"]);
}

#[test]
fn plain_valve_is_not_checked_across_pipelines() {
    let first = StandardContainer::new("first", ContainerKind::Host);
    let second = StandardContainer::new("second", ContainerKind::Host);
    let shared = passthrough("shared", true);

    first
        .pipeline()
        .add_valve(Arc::clone(&shared))
        .expect("首次加入应成功");
    second
        .pipeline()
        .add_valve(Arc::clone(&shared))
        .expect("未实现绑定能力的 Valve 不做跨链路检查");
    assert_eq!(names(first.pipeline()), ["shared"]);
    assert_eq!(names(second.pipeline()), ["shared"]);

    let err = first
        .pipeline()
        .add_valve(shared)
        .expect_err("同一链路内仍然唯一");
    assert_eq!(err.code(), codes::ALREADY_IN_CHAIN);
}
