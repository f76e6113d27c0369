//! 集成测试 - 值树所有权、拷贝语义与错误通道

mod common;

use common::{map, setup};
use tdv_core::bridge::codes;
use tdv_core::{Context, Kind, TdvError, Value};

#[test]
fn test_round_trip_object() {
    let (_, bridge) = setup();
    let value = Value::Object(map([
        ("name", Value::from("probe")),
        ("count", Value::from(3)),
        ("ratio", Value::from(0.5)),
        ("flags", Value::Array(vec![Value::from(true), Value::from(false)])),
    ]));
    let ctx = Context::from_value(bridge, &value).unwrap();
    assert_eq!(ctx.kind().unwrap(), Kind::Object);
    assert_eq!(ctx.to_value().unwrap(), value);
}

#[test]
fn test_view_after_root_drop_is_use_after_release() {
    let (memory, bridge) = setup();
    let ctx = Context::new(bridge).unwrap();
    let child = ctx.get_or_insert("a").unwrap();
    child.set_long(1).unwrap();
    drop(ctx);

    assert!(child.is_released());
    assert!(matches!(child.get_long(), Err(TdvError::UseAfterRelease(_))));
    assert_eq!(memory.live_nodes(), 0);
    assert_eq!(memory.stats().exceptions_raised, 0);
}

#[test]
fn test_view_after_explicit_release() {
    let (_, bridge) = setup();
    let ctx = Context::new(bridge).unwrap();
    let view = ctx.view();
    ctx.release().unwrap();
    assert!(matches!(view.keys(), Err(TdvError::UseAfterRelease(_))));
    assert!(matches!(view.deep_clone(), Err(TdvError::UseAfterRelease(_))));
}

#[test]
fn test_push_back_copies_by_value() {
    let (_, bridge) = setup();
    let list = Context::new(bridge.clone()).unwrap();
    let item = Context::new(bridge).unwrap();
    item.set_long(1).unwrap();

    list.push_back(&item).unwrap();
    item.set_long(2).unwrap();

    assert_eq!(list.len().unwrap(), 1);
    assert_eq!(list.get_by_index(0).unwrap().get_long().unwrap(), 1);
    assert_eq!(item.get_long().unwrap(), 2);
}

#[test]
fn test_push_back_owned_moves_tree() {
    let (memory, bridge) = setup();
    let list = Context::new(bridge.clone()).unwrap();
    let item = Context::from_value(bridge, &Value::from([("k", Value::from("v"))])).unwrap();
    list.push_back_owned(item).unwrap();

    assert_eq!(memory.live_roots(), 1);
    assert_eq!(
        list.get_by_index(0).unwrap().to_value().unwrap(),
        Value::from([("k", Value::from("v"))])
    );
}

#[test]
fn test_keys_frees_native_buffers() {
    let (memory, bridge) = setup();
    let ctx = Context::from_value(
        bridge,
        &Value::from([("x", Value::from(1)), ("y", Value::from(2)), ("z", Value::from(3))]),
    )
    .unwrap();

    for _ in 0..3 {
        assert_eq!(ctx.keys().unwrap(), vec!["x", "y", "z"]);
        assert_eq!(memory.outstanding_allocations(), 0);
    }
    assert!(memory.stats().allocations > 0);
    assert_eq!(memory.stats().allocations, memory.stats().frees);
}

#[test]
fn test_absent_key_releases_exception_once() {
    let (memory, bridge) = setup();
    let ctx = Context::from_value(bridge, &Value::from([("a", Value::from(1))])).unwrap();

    let err = ctx.get_by_key("missing").unwrap_err();
    assert!(matches!(err, TdvError::Bridge(_)));
    assert_eq!(err.code(), Some(codes::CONTEXT_GET_BY_KEY));

    let stats = memory.stats();
    assert_eq!(stats.exceptions_raised, 1);
    assert_eq!(stats.exceptions_released, 1);
    assert_eq!(memory.outstanding_exceptions(), 0);
}

#[test]
fn test_deep_clone_is_independent() {
    let (memory, bridge) = setup();
    let ctx = Context::from_value(bridge, &Value::from([("a", Value::from(1))])).unwrap();
    let copy = ctx.deep_clone().unwrap();
    copy.get_by_key("a").unwrap().set_long(9).unwrap();

    assert_eq!(ctx.get_by_key("a").unwrap().get_long().unwrap(), 1);
    assert_eq!(copy.get_by_key("a").unwrap().get_long().unwrap(), 9);
    assert_eq!(memory.live_roots(), 2);
}

#[test]
fn test_copy_to_overwrites_destination() {
    let (_, bridge) = setup();
    let src = Context::from_value(bridge.clone(), &Value::from([("s", Value::from("src"))])).unwrap();
    let dst = Context::from_value(bridge, &Value::from(42)).unwrap();

    src.copy_to(&dst).unwrap();
    assert_eq!(dst.to_value().unwrap(), src.to_value().unwrap());
}

#[test]
fn test_clear_resets_to_none() {
    let (memory, bridge) = setup();
    let ctx = Context::from_value(bridge, &Value::from([("a", Value::from(1))])).unwrap();
    ctx.clear().unwrap();

    assert!(ctx.is_none().unwrap());
    assert!(ctx.keys().unwrap().is_empty());
    assert_eq!(memory.live_nodes(), 1);
}

#[test]
fn test_contexts_from_other_bridge_are_rejected() {
    let (_, first) = setup();
    let (_, second) = setup();
    let list = Context::new(first).unwrap();
    let item = Context::from_value(second, &Value::from(1)).unwrap();

    assert!(matches!(
        list.push_back(&item),
        Err(TdvError::UnsupportedValueType(_))
    ));
}

#[test]
fn test_stale_child_view_cannot_reach_reused_slot() {
    let (memory, bridge) = setup();
    let a = Context::from_value(bridge.clone(), &Value::from([("k", Value::from(1))])).unwrap();
    let child = a.get_by_key("k").unwrap();

    // 覆盖父节点，原子节点的槽位被回收
    a.set_long(5).unwrap();
    let b = Context::new(bridge).unwrap();

    let err = child.set_long(99).unwrap_err();
    assert_eq!(err.kind(), "bridge");
    assert_eq!(err.code(), Some(codes::PUT_LONG));
    assert!(b.is_none().unwrap());
    assert_eq!(b.to_value().unwrap(), Value::None);
    assert_eq!(a.get_long().unwrap(), 5);
    assert_eq!(memory.outstanding_exceptions(), 0);
}
