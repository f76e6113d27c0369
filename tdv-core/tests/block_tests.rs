//! 集成测试 - 处理单元与顶层键差异协议

mod common;

use common::{assign_config, map, ndarray_image, setup};
use tdv_core::bridge::codes;
use tdv_core::{Context, Map, ProcessingBlock, TdvError, Value};

#[test]
fn test_map_invoke_keeps_existing_keys() {
    let (_, bridge) = setup();
    let block = ProcessingBlock::from_value(
        bridge,
        &assign_config(map([("a", Value::from(2)), ("b", Value::from(3))])),
    )
    .unwrap();

    let mut target = map([("a", Value::from(1))]);
    block.invoke(&mut target).unwrap();

    assert_eq!(target, map([("a", Value::from(1)), ("b", Value::from(3))]));
}

#[test]
fn test_tree_invoke_sees_every_change() {
    let (_, bridge) = setup();
    let block = ProcessingBlock::from_value(
        bridge.clone(),
        &assign_config(map([("a", Value::from(2)), ("b", Value::from(3))])),
    )
    .unwrap();

    let mut ctx = Context::from_value(bridge, &Value::from([("a", Value::from(1))])).unwrap();
    block.invoke(&mut ctx).unwrap();

    assert_eq!(ctx.get_by_key("a").unwrap().get_long().unwrap(), 2);
    assert_eq!(ctx.get_by_key("b").unwrap().get_long().unwrap(), 3);
}

#[test]
fn test_identity_on_image_tree_adds_no_keys() {
    let (_, bridge) = setup();
    let block = ProcessingBlock::from_value(
        bridge.clone(),
        &Value::from([("unit_type", Value::from("IDENTITY"))]),
    )
    .unwrap();

    let input = Value::from([("image", ndarray_image(2, 2))]);
    let mut ctx = Context::from_value(bridge, &input).unwrap();
    let mut view = ctx.view();
    block.invoke(&mut view).unwrap();
    block.invoke(&mut ctx).unwrap();

    assert_eq!(ctx.keys().unwrap(), vec!["image"]);
    assert_eq!(ctx.to_value().unwrap(), input);
}

#[test]
fn test_identity_on_image_map_leaves_map_unchanged() {
    let (memory, bridge) = setup();
    let block = ProcessingBlock::from_value(
        bridge,
        &Value::from([("unit_type", Value::from("IDENTITY"))]),
    )
    .unwrap();

    let mut target = map([("image", ndarray_image(4, 3))]);
    let before = target.clone();
    block.invoke(&mut target).unwrap();

    assert_eq!(target, before);
    // 临时值树已释放
    assert_eq!(memory.live_roots(), 0);
}

#[test]
fn test_image_info_adds_new_key() {
    let (_, bridge) = setup();
    let block = ProcessingBlock::from_value(
        bridge,
        &Value::from([("unit_type", Value::from("IMAGE_INFO"))]),
    )
    .unwrap();

    let mut target = map([("image", ndarray_image(4, 3))]);
    block.invoke(&mut target).unwrap();

    let info = target.get("image_info").unwrap();
    assert_eq!(info.get("height"), Some(&Value::UnsignedLong(4)));
    assert_eq!(info.get("width"), Some(&Value::UnsignedLong(3)));
    assert_eq!(info.get("channels"), Some(&Value::UnsignedLong(3)));
    assert_eq!(target.len(), 2);
}

#[test]
fn test_process_failure_surfaces_as_bridge_error() {
    let (memory, bridge) = setup();
    let block = ProcessingBlock::from_value(
        bridge,
        &Value::from([("unit_type", Value::from("IMAGE_INFO"))]),
    )
    .unwrap();

    let mut target = Map::new();
    target.insert("other".into(), Value::from(1));
    let err = block.invoke(&mut target).unwrap_err();

    assert!(matches!(err, TdvError::Bridge(_)));
    assert_eq!(err.code(), Some(codes::BLOCK_PROCESS));
    assert!(err.to_string().contains("no image in context"));
    assert_eq!(target.len(), 1);
    assert_eq!(memory.outstanding_exceptions(), 0);
}

#[test]
fn test_assign_without_options_fails_natively() {
    let (_, bridge) = setup();
    let err = ProcessingBlock::from_value(bridge, &Value::from([("unit_type", Value::from("ASSIGN"))]))
        .unwrap_err();
    assert_eq!(err.code(), Some(codes::BLOCK_CREATE));
}

#[test]
fn test_block_release_and_drop() {
    let (memory, bridge) = setup();
    let config = Value::from([("unit_type", Value::from("IDENTITY"))]);

    let first = ProcessingBlock::from_value(bridge.clone(), &config).unwrap();
    first.release().unwrap();
    {
        let _second = ProcessingBlock::from_value(bridge, &config).unwrap();
        assert_eq!(memory.live_blocks(), 1);
    }

    let stats = memory.stats();
    assert_eq!(stats.blocks_created, 2);
    assert_eq!(stats.blocks_destroyed, 2);
    assert_eq!(memory.live_blocks(), 0);
}

#[test]
fn test_process_on_released_context() {
    let (_, bridge) = setup();
    let block = ProcessingBlock::from_value(
        bridge.clone(),
        &Value::from([("unit_type", Value::from("IDENTITY"))]),
    )
    .unwrap();
    let ctx = Context::new(bridge).unwrap();
    let view = ctx.view();
    ctx.release().unwrap();

    assert!(matches!(block.process(&view), Err(TdvError::UseAfterRelease(_))));
}
