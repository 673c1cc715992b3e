use crate::sync::{spin_loop, AtomicU64, Ordering};

/// Number of epoch announcement slots shared by all reader threads.
/// 所有读者线程共享的纪元公告槽数量。
#[cfg(not(feature = "loom"))]
pub(crate) const EPOCH_SLOTS: usize = 128;
/// Shrunk under loom so the reclaim scan stays model-checkable.
/// 在 loom 下缩小，使回收扫描可以被模型检查。
#[cfg(feature = "loom")]
pub(crate) const EPOCH_SLOTS: usize = 4;

/// Marker for a slot with no in-progress read. Epochs start at 1, so 0 is free.
/// 表示槽中没有进行中读取的标记。纪元从 1 开始，所以 0 表示空闲。
pub(crate) const SLOT_FREE: u64 = 0;

/// One epoch announcement location.
///
/// Cache-aligned to prevent false sharing between readers on adjacent slots.
///
/// 一个纪元公告位置。
/// 缓存对齐以防止相邻槽上读者之间的伪共享。
#[repr(align(64))]
pub(crate) struct EpochSlot {
    /// `SLOT_FREE`, or the epoch announced by the reader occupying the slot.
    /// `SLOT_FREE`，或占用该槽的读者公告的纪元。
    epoch: AtomicU64,
}

/// Fixed-size table of epoch slots.
///
/// Readers claim a slot for the duration of one read; the writer only ever
/// scans. Only the claiming reader transitions a slot back to free.
///
/// 固定大小的纪元槽表。
/// 读者在一次读取期间占用一个槽；写入者只进行扫描。
/// 只有占用槽的读者会将槽转换回空闲状态。
pub(crate) struct SlotTable {
    slots: Box<[EpochSlot]>,
}

impl SlotTable {
    pub(crate) fn new() -> Self {
        let slots = (0..EPOCH_SLOTS)
            .map(|_| EpochSlot {
                epoch: AtomicU64::new(SLOT_FREE),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        SlotTable { slots }
    }

    /// Claim a slot for a read announced at `epoch`, starting at the caller's
    /// preferred index and linearly probing forward (wrapping) while slots are
    /// busy. Returns the claimed index.
    ///
    /// The 0 -> epoch transition must be SeqCst: it orders the announcement
    /// before the subsequent resource load, against the writer's exchange and
    /// epoch advance. Weakening it is unsound.
    ///
    /// 为在 `epoch` 公告的读取占用一个槽，从调用者首选的索引开始，
    /// 槽忙时线性向前探测（回绕）。返回占用的索引。
    /// 0 -> epoch 的转换必须是 SeqCst：它使公告先于随后的资源加载，
    /// 与写入者的交换和纪元推进形成全序。放宽它是不可靠的。
    pub(crate) fn claim(&self, start: usize, epoch: u64) -> usize {
        debug_assert_ne!(epoch, SLOT_FREE);
        let mut idx = start % EPOCH_SLOTS;
        loop {
            match self.slots[idx].epoch.compare_exchange(
                SLOT_FREE,
                epoch,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return idx,
                Err(_) => {
                    idx = (idx + 1) % EPOCH_SLOTS;
                    spin_loop();
                }
            }
        }
    }

    /// Release a previously claimed slot.
    /// 释放先前占用的槽。
    #[inline]
    pub(crate) fn release(&self, idx: usize) {
        self.slots[idx].epoch.store(SLOT_FREE, Ordering::Release);
    }

    /// True once no announced read could still reference a resource retired at
    /// `epoch`: every slot is free or holds a strictly newer epoch.
    ///
    /// 一旦没有已公告的读取仍可能引用在 `epoch` 退休的资源，即为真：
    /// 每个槽要么空闲，要么持有严格更新的纪元。
    pub(crate) fn can_reclaim(&self, epoch: u64) -> bool {
        for slot in self.slots.iter() {
            let announced = slot.epoch.load(Ordering::SeqCst);
            if announced != SLOT_FREE && announced <= epoch {
                return false;
            }
        }
        true
    }
}
