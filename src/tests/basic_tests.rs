/// 基础测试模块
/// 测试单元的写入、读取、退休和释放的核心行为
use super::Tracked;
use crate::{BatchCoordinator, ManagedValue, ManualScheduler, Retired, ValueKind, realtime_value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn manual_cell<T: Send + Sync + 'static>() -> (ManagedValue<T>, ManualScheduler) {
    let coordinator = BatchCoordinator::new();
    let driver = ManualScheduler::new();
    let value = ManagedValue::builder(&coordinator)
        .scheduler(driver.clone())
        .build();
    (value, driver)
}

/// 记录释放顺序的单元
fn recording_cell() -> (ManagedValue<u32>, ManualScheduler, Arc<Mutex<Vec<u32>>>) {
    let coordinator = BatchCoordinator::new();
    let driver = ManualScheduler::new();
    let released = Arc::new(Mutex::new(Vec::new()));
    let sink = released.clone();
    let value = ManagedValue::builder(&coordinator)
        .scheduler(driver.clone())
        .release_with(move |retired: Retired<u32>| sink.lock().unwrap().push(*retired))
        .build();
    (value, driver, released)
}

/// 测试1: 新建的单元为空
#[test]
fn test_new_cell_is_empty() {
    let (value, driver) = manual_cell::<u32>();
    let reader = value.reader();

    assert_eq!(value.get(), None);
    assert!(reader.get().is_none());
    assert_eq!(value.kind(), ValueKind::Unset);
    assert_eq!(value.pending_count(), 0);
    assert!(!value.is_driver_active());
    assert!(!driver.is_running());
}

/// 测试2: 写入后立即读取
#[test]
fn test_set_then_get() {
    let (mut value, driver) = manual_cell::<u32>();
    let reader = value.reader();

    value.set_raw(Box::new(7));

    assert_eq!(value.get(), Some(&7));
    assert_eq!(unsafe { reader.get_ref() }, Some(&7));
    assert_eq!(value.kind(), ValueKind::Raw);
    // 第一次写入没有旧值，不需要驱动器
    assert_eq!(value.pending_count(), 0);
    assert!(!driver.is_running());
}

/// 测试3: 完整的替换-读取-回收流程
#[test]
fn test_replace_read_tick_releases_old_value() {
    let (mut value, driver, released) = recording_cell();
    let reader = value.reader();

    value.set_raw(Box::new(1));
    assert_eq!(value.get(), Some(&1));
    assert_eq!(value.pending_count(), 0);

    value.set_raw(Box::new(2));
    assert_eq!(value.get(), Some(&2));
    assert_eq!(value.pending_count(), 1);
    assert!(value.is_driver_active());
    assert!(driver.is_running());

    // 实时读取把旧值移入释放队列
    assert_eq!(unsafe { reader.get_ref() }, Some(&2));
    assert!(released.lock().unwrap().is_empty());

    assert!(driver.tick());
    assert_eq!(*released.lock().unwrap(), vec![1]);
    assert_eq!(value.pending_count(), 0);
    assert!(!value.is_driver_active());
    assert!(!driver.is_running());
}

/// 测试4: 替换不会同步释放旧值
#[test]
fn test_set_never_releases_synchronously() {
    let drops = Arc::new(AtomicUsize::new(0));
    let (mut value, _driver) = manual_cell::<Tracked>();
    let reader = value.reader();

    value.set_raw(Box::new(Tracked::new(1, &drops)));
    value.set_raw(Box::new(Tracked::new(2, &drops)));
    value.set_raw(Box::new(Tracked::new(3, &drops)));
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    let _ = reader.get();
    assert_eq!(drops.load(Ordering::SeqCst), 0);
}

/// 测试5: 没有读取者的静止点时节拍不释放任何值
#[test]
fn test_tick_without_reader_read_releases_nothing() {
    let (mut value, driver, released) = recording_cell();

    value.set_raw(Box::new(1));
    value.set_raw(Box::new(2));

    assert!(driver.tick());
    assert!(driver.tick());
    assert!(released.lock().unwrap().is_empty());
    assert_eq!(value.pending_count(), 1);
    assert!(driver.is_running());
}

/// 测试6: 读取之前退休的值才可回收，之后退休的值仍需等待
#[test]
fn test_only_values_before_read_become_eligible() {
    let (mut value, driver, released) = recording_cell();
    let reader = value.reader();

    value.set_raw(Box::new(1));
    value.set_raw(Box::new(2));
    let _ = reader.get();
    value.set_raw(Box::new(3));

    driver.tick();
    assert_eq!(*released.lock().unwrap(), vec![1]);
    assert_eq!(value.pending_count(), 1);
    assert!(driver.is_running());

    let _ = reader.get();
    driver.tick();
    assert_eq!(*released.lock().unwrap(), vec![1, 2]);
    assert_eq!(value.pending_count(), 0);
    assert!(!driver.is_running());
}

/// 测试7: N 次顺序写入，N-1 个值被释放，最后一个值在 drop 时释放
#[test]
fn test_n_sequential_sets_release_each_once() {
    let (mut value, driver, released) = recording_cell();
    let reader = value.reader();

    for i in 0..10 {
        value.set_raw(Box::new(i));
    }
    let _ = reader.get();
    driver.tick();
    assert_eq!(*released.lock().unwrap(), (0..9).collect::<Vec<_>>());

    drop(value);
    assert_eq!(*released.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

/// 测试8: 空释放队列上的节拍不做任何事并停止驱动器
#[test]
fn test_tick_on_empty_queue_stops_driver() {
    let (mut value, driver, released) = recording_cell();
    let reader = value.reader();

    value.set_raw(Box::new(1));
    value.set_raw(Box::new(2));
    let _ = reader.get();
    driver.tick();
    assert_eq!(released.lock().unwrap().len(), 1);

    // 驱动器已停止，再次节拍不会运行
    assert!(!driver.tick());
    assert_eq!(released.lock().unwrap().len(), 1);

    // 重新启动后照常工作
    value.set_raw(Box::new(3));
    assert!(driver.is_running());
    let _ = reader.get();
    driver.tick();
    assert_eq!(*released.lock().unwrap(), vec![1, 2]);
}

/// 测试9: 托管对象只释放单元持有的那个引用
#[test]
fn test_managed_values_release_one_reference() {
    let (mut value, driver) = manual_cell::<String>();
    let reader = value.reader();

    let first = Arc::new("first".to_string());
    value.set_managed(first.clone());
    assert_eq!(Arc::strong_count(&first), 2);
    assert_eq!(value.kind(), ValueKind::Managed);

    value.set_managed(Arc::new("second".to_string()));
    assert_eq!(Arc::strong_count(&first), 2);

    assert_eq!(unsafe { reader.get_ref() }.map(String::as_str), Some("second"));
    driver.tick();
    assert_eq!(Arc::strong_count(&first), 1);
}

/// 测试10: 默认释放策略 drop Box
#[test]
fn test_default_policy_drops_boxes() {
    let drops = Arc::new(AtomicUsize::new(0));
    let (mut value, driver) = manual_cell::<Tracked>();
    let reader = value.reader();

    value.set_raw(Box::new(Tracked::new(1, &drops)));
    value.set_raw(Box::new(Tracked::new(2, &drops)));
    let _ = reader.get();
    driver.tick();

    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(value.get().map(|t| t.id), Some(2));
}

/// 测试11: 自定义释放策略接收到正确的类型
#[test]
fn test_custom_policy_sees_kind() {
    let coordinator = BatchCoordinator::new();
    let driver = ManualScheduler::new();
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = kinds.clone();
    let mut value = ManagedValue::<u8>::builder(&coordinator)
        .scheduler(driver.clone())
        .release_with(move |retired| sink.lock().unwrap().push(retired.kind()))
        .build();

    value.set_managed(Arc::new(1));
    value.set_managed(Arc::new(2));
    let _ = value.reader().get();
    driver.tick();

    assert_eq!(*kinds.lock().unwrap(), vec![ValueKind::Managed]);
}

/// 测试12: 混用 raw 和 managed 写入会 panic
#[test]
#[should_panic(expected = "BUG")]
fn test_mixing_kinds_panics() {
    let (mut value, _driver) = manual_cell::<u32>();
    value.set_raw(Box::new(1));
    value.set_managed(Arc::new(2));
}

/// 测试13: clear 退休当前值并使单元为空
#[test]
fn test_clear_retires_current_value() {
    let (mut value, driver, released) = recording_cell();
    let reader = value.reader();

    value.set_raw(Box::new(5));
    value.clear();

    assert_eq!(value.get(), None);
    assert!(reader.get().is_none());
    assert_eq!(value.kind(), ValueKind::Raw);
    assert_eq!(value.pending_count(), 1);

    driver.tick();
    assert_eq!(*released.lock().unwrap(), vec![5]);

    // 空单元上 clear 不做任何事
    value.clear();
    assert_eq!(value.pending_count(), 0);
}

/// 测试14: 自由函数形式的实时读取
#[test]
fn test_realtime_value_free_function() {
    let (mut value, _driver) = manual_cell::<u64>();
    let reader = value.reader();
    value.set_raw(Box::new(99));

    let ptr = realtime_value(&reader).unwrap();
    assert_eq!(unsafe { *ptr.as_ptr() }, 99);
}

/// 测试15: 驱动器使用配置的间隔启动
#[test]
fn test_driver_started_with_configured_interval() {
    let coordinator = BatchCoordinator::new();
    let driver = ManualScheduler::new();
    let mut value = ManagedValue::<u32>::builder(&coordinator)
        .interval(std::time::Duration::from_millis(40))
        .scheduler(driver.clone())
        .build();

    value.set_raw(Box::new(1));
    value.set_raw(Box::new(2));
    assert_eq!(driver.interval(), std::time::Duration::from_millis(40));
}
