//! 边界情况测试模块
//! 测试构造参数校验、轮转边界和垃圾队列行为

use crate::{BoundedList, ConfigError, MemoryUsage, ResourceManager};

struct Item {
    value: u64,
    bytes: usize,
}

impl Item {
    fn new(value: u64, bytes: usize) -> Self {
        Item { value, bytes }
    }
}

impl MemoryUsage for Item {
    fn memory_usage(&self) -> usize {
        self.bytes
    }
}

/// 测试1: 阈值为 0 的构造被拒绝
#[test]
fn test_zero_threshold_rejected() {
    let result: Result<BoundedList<Item>, _> = BoundedList::new(0, 3);
    assert_eq!(result.err(), Some(ConfigError::ZeroMemoryThreshold));
}

/// 测试2: 历史环长度不足的构造被拒绝
#[test]
fn test_short_history_rejected() {
    let result: Result<BoundedList<Item>, _> = BoundedList::new(1000, 1);
    assert_eq!(result.err(), Some(ConfigError::HistoryTooShort { got: 1 }));

    let result: Result<BoundedList<Item>, _> = BoundedList::new(1000, 0);
    assert_eq!(result.err(), Some(ConfigError::HistoryTooShort { got: 0 }));
}

/// 测试3: 最小合法历史环长度
#[test]
fn test_minimal_history_accepted() {
    let list: BoundedList<Item> = BoundedList::new(1, 2).unwrap();
    assert_eq!(list.max_history(), 2);
}

/// 测试4: 错误信息可读
#[test]
fn test_config_error_display() {
    assert_eq!(
        ConfigError::ZeroMemoryThreshold.to_string(),
        "memory threshold must be greater than zero"
    );
    assert_eq!(
        ConfigError::HistoryTooShort { got: 1 }.to_string(),
        "max history must be at least 2, got 1"
    );
}

/// 测试5: 单个项就达到阈值时立即轮转
#[test]
fn test_single_item_reaching_threshold_rotates() {
    let list = BoundedList::new(1000, 3).unwrap();

    list.prepend(Item::new(1, 1000));
    assert_eq!(list.history_segments(), 1);

    // 被轮转的项仍然可达
    let mut visited = Vec::new();
    list.for_items(|item| visited.push(item.value));
    assert_eq!(visited, vec![1]);
    assert_eq!(list.trash_len(), 0);
}

/// 测试6: 35 个 100 字节的项在阈值 1000 下恰好轮转 3 次
#[test]
fn test_rotation_count_and_order() {
    let list = BoundedList::new(1000, 3).unwrap();

    for i in 0..35u64 {
        list.prepend(Item::new(i, 100));
    }

    // 3 次轮转：历史环 3 段，尚无驱逐
    assert_eq!(list.history_segments(), 3);
    assert_eq!(list.trash_len(), 0);

    // 所有 35 个项从最新到最旧可见
    let mut visited = Vec::new();
    list.for_items(|item| visited.push(item.value));
    let expected: Vec<u64> = (0..35).rev().collect();
    assert_eq!(visited, expected);
}

/// 测试7: 超出历史环容量的段进入垃圾队列
#[test]
fn test_overflow_eviction_into_trash() {
    let list = BoundedList::new(1000, 3).unwrap();

    for i in 0..400u64 {
        list.prepend(Item::new(i, 100));
    }

    // 40 次轮转，环里 3 段，其余 37 段被驱逐
    assert_eq!(list.history_segments(), 3);
    assert_eq!(list.trash_len(), 37);

    // 只有最后 3 个历史段加当前段中的项可见
    let mut visited = Vec::new();
    list.for_items(|item| visited.push(item.value));
    let expected: Vec<u64> = (370..400).rev().collect();
    assert_eq!(visited, expected);

    assert_eq!(list.clear_trash(), 37);
    assert_eq!(list.clear_trash(), 0);
    assert_eq!(list.trash_len(), 0);
}

/// 测试8: 空垃圾队列上 clear_trash 幂等
#[test]
fn test_clear_trash_idempotent_on_empty() {
    let list: BoundedList<Item> = BoundedList::new(1000, 3).unwrap();
    assert_eq!(list.clear_trash(), 0);
    assert_eq!(list.clear_trash(), 0);
}

/// 测试9: 零字节的项不触发轮转
#[test]
fn test_zero_sized_items_never_rotate() {
    let list = BoundedList::new(1000, 3).unwrap();

    for i in 0..1000u64 {
        list.prepend(Item::new(i, 0));
    }

    assert_eq!(list.history_segments(), 0);
    assert_eq!(list.trash_len(), 0);

    let mut visited = 0;
    list.for_items(|_| visited += 1);
    assert_eq!(visited, 1000);
}

/// 测试10: 纪元从 1 开始
#[test]
fn test_epochs_start_at_one() {
    let manager = ResourceManager::new(0i32);
    let retired = manager.update(Some(Box::new(1)));
    assert_eq!(retired.epoch(), 1);
}

/// 测试11: can_reclaim 对旧纪元保持为真
#[test]
fn test_can_reclaim_stays_true() {
    let manager = ResourceManager::new(0i32);

    let first = manager.update(Some(Box::new(1)));
    let epoch = first.epoch();
    drop(first);
    assert!(manager.can_reclaim(epoch));

    // 后续读取公告的是更新的纪元，不会阻塞旧纪元的回收
    let _ = manager.read(|v| *v);
    assert!(manager.can_reclaim(epoch));

    let second = manager.update(Some(Box::new(2)));
    drop(second);
    assert!(manager.can_reclaim(epoch));
}
