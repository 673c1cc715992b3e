use crate::error::ConfigError;
use crate::list::AtomicList;
use crate::sync::{AtomicBool, AtomicUsize, Mutex, Ordering};
use arc_swap::ArcSwap;
use crossbeam_queue::SegQueue;
use std::sync::Arc;

/// Types stored in a [`BoundedList`] report their own memory footprint,
/// including substructures, in bytes. The estimate should be positive but
/// this is intentionally not enforced.
///
/// 存入 [`BoundedList`] 的类型自行报告其内存占用（包括子结构），单位为字节。
/// 估计值应为正数，但有意不做强制。
pub trait MemoryUsage {
    /// Estimated memory usage of this value in bytes.
    /// 该值的估计内存占用（字节）。
    fn memory_usage(&self) -> usize;
}

/// Default parameters for [`BoundedListBuilder`].
/// [`BoundedListBuilder`] 的默认参数。
pub(crate) const DEFAULT_MEMORY_THRESHOLD: usize = 1024 * 1024;
pub(crate) const DEFAULT_MAX_HISTORY: usize = 10;

/// Prepend-side byte accounting, kept on its own cache line so the hot
/// fetch-add does not contend with the rotation state.
/// 头插侧的字节计数，放在独立缓存行上，使热路径的 fetch-add
/// 不与轮转状态争用。
#[repr(align(64))]
struct UsageCounter {
    bytes: AtomicUsize,
}

/// Ring of historic segments. Protected by the structure mutex; `pos` is the
/// next index to overwrite.
/// 历史段的环。由结构互斥锁保护；`pos` 是下一个要覆盖的索引。
struct HistoryRing<T> {
    segments: Vec<Option<Arc<AtomicList<T>>>>,
    pos: usize,
}

/// A memory-bounded, append-only, nearly lock-free log.
///
/// Items are prepended to a current [`AtomicList`] segment; prepending is
/// normally two atomic operations. Once the bytes accounted to the current
/// segment reach the memory threshold, the segment is rotated into a ring of
/// historic segments and a fresh one takes its place. A segment evicted from
/// the ring is queued as trash; an external cleaner frees trash at its own
/// cadence via [`clear_trash`](BoundedList::clear_trash). The effective memory
/// bound is roughly `memory_threshold * max_history`, with occasional
/// transient overshoot.
///
/// [`for_items`](BoundedList::for_items) visits all retained items from newest
/// to oldest and is safe to call from any number of threads concurrently with
/// prepends.
///
/// 一个内存受限、只能追加、几乎无锁的日志。
/// 项被头插到当前 [`AtomicList`] 段；头插通常只需两次原子操作。
/// 当计入当前段的字节数达到内存阈值时，该段被轮转进历史段环，
/// 由一个新段取而代之。被逐出环的段进入垃圾队列；
/// 外部清理者通过 [`clear_trash`](BoundedList::clear_trash) 按自己的节奏释放。
/// 有效内存上界约为 `memory_threshold * max_history`，偶有短暂超出。
/// [`for_items`](BoundedList::for_items) 从最新到最旧访问所有保留的项，
/// 可以与头插并发地从任意多个线程调用。
pub struct BoundedList<T> {
    /// The active segment, published like `atomic<shared_ptr>`: prependers
    /// acquire-load it, the rotation winner release-stores a fresh one.
    current: ArcSwap<AtomicList<T>>,
    usage: UsageCounter,
    /// At most one thread rotates a given incarnation of `current`.
    rotating: AtomicBool,
    ring: Mutex<HistoryRing<T>>,
    trash: SegQueue<Arc<AtomicList<T>>>,
    memory_threshold: usize,
    max_history: usize,
}

impl<T: MemoryUsage> BoundedList<T> {
    /// Create a bounded list. Fails if `memory_threshold` is zero or
    /// `max_history` is less than 2.
    /// 创建一个有界链表。`memory_threshold` 为零或 `max_history` 小于 2 时失败。
    pub fn new(memory_threshold: usize, max_history: usize) -> Result<Self, ConfigError> {
        if memory_threshold == 0 {
            return Err(ConfigError::ZeroMemoryThreshold);
        }
        if max_history < 2 {
            return Err(ConfigError::HistoryTooShort { got: max_history });
        }
        Ok(BoundedList {
            current: ArcSwap::from_pointee(AtomicList::new()),
            usage: UsageCounter {
                bytes: AtomicUsize::new(0),
            },
            rotating: AtomicBool::new(false),
            ring: Mutex::new(HistoryRing {
                segments: vec![None; max_history],
                pos: 0,
            }),
            trash: SegQueue::new(),
            memory_threshold,
            max_history,
        })
    }

    /// Prepend a value.
    ///
    /// The value's [`memory_usage`](MemoryUsage::memory_usage) is added to the
    /// current segment's accounting with a relaxed fetch-add; when the running
    /// sum reaches the threshold, this thread attempts a rotation with the
    /// segment it prepended to as the expected victim. Threads that lose the
    /// rotation race may still land their item on the just-rotated segment;
    /// the item stays reachable in history and only causes bounded overshoot.
    ///
    /// 头插一个值。
    /// 该值的 [`memory_usage`](MemoryUsage::memory_usage) 以 relaxed fetch-add
    /// 计入当前段；累计和达到阈值时，本线程以它头插过的段作为预期受害者
    /// 尝试轮转。输掉轮转竞争的线程仍可能把项落在刚被轮转的段上；
    /// 该项在历史中仍然可达，只造成有界的超出。
    pub fn prepend(&self, value: T) {
        let bytes = value.memory_usage();

        // Acquire-load pairs with the release store of a fresh segment in
        // try_rotate; holding the Arc keeps the segment alive across a
        // concurrent rotation.
        let current = self.current.load_full();
        current.prepend(value);

        let new_usage = self.usage.bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if new_usage >= self.memory_threshold {
            self.try_rotate(&current);
        }
    }

    /// Rotate `expected` out of `current` if it still is the current segment.
    ///
    /// For one incarnation of the current segment only one thread performs the
    /// rotation: threshold racers first race on the `rotating` flag, and the
    /// winner re-checks that `current` is still the segment it expects. The
    /// flag is released on every exit path.
    ///
    /// 如果 `expected` 仍是当前段，则将其从 `current` 轮转出去。
    /// 对当前段的一个化身，只有一个线程执行轮转：达到阈值的竞争者先在
    /// `rotating` 标志上竞争，胜者再确认 `current` 仍是它预期的段。
    /// 标志在每条退出路径上都会被释放。
    fn try_rotate(&self, expected: &Arc<AtomicList<T>>) {
        if self
            .rotating
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            // Another thread is already handling rotation.
            return;
        }

        // We may have been delayed; only rotate if our segment is still the
        // current one, otherwise this threshold event was already served.
        let still_current = Arc::ptr_eq(&*self.current.load(), expected);
        if !still_current {
            self.rotating.store(false, Ordering::Release);
            return;
        }

        // Reset the accounting first to debounce further rotation triggers.
        self.usage.bytes.store(0, Ordering::Relaxed);

        // Publish a fresh segment. From here on prependers see the new list.
        self.current.store(Arc::new(AtomicList::new()));

        {
            // The mutex protects the ring against concurrent structural reads
            // in for_items; other rotators are excluded by the flag.
            let mut ring = self.ring.lock();
            let pos = ring.pos;
            let evicted = ring.segments[pos].replace(Arc::clone(expected));
            ring.pos = (pos + 1) % self.max_history;
            if let Some(segment) = evicted {
                self.trash.push(segment);
            }
        }

        self.rotating.store(false, Ordering::Release);
    }

    /// Invoke `callback` on every retained item, newest to oldest: the current
    /// segment first, then the historic segments from newest to oldest.
    ///
    /// The mutex is held only while the segment snapshot is assembled; the
    /// node chains are walked lock-free against concurrent prependers.
    /// Prepends racing with the call may or may not appear in the snapshot.
    ///
    /// 对每个保留的项调用 `callback`，从最新到最旧：先当前段，
    /// 然后历史段从新到旧。
    /// 互斥锁只在组装段快照期间持有；节点链的遍历相对并发头插是无锁的。
    /// 与调用竞争的头插可能出现也可能不出现在快照中。
    pub fn for_items<F>(&self, mut callback: F)
    where
        F: FnMut(&T),
    {
        let snapshots = {
            let ring = self.ring.lock();
            let mut segments = Vec::with_capacity(self.max_history + 1);
            segments.push(self.current.load_full());
            for i in 0..self.max_history {
                let pos = (ring.pos + self.max_history - 1 - i) % self.max_history;
                if let Some(segment) = &ring.segments[pos] {
                    segments.push(Arc::clone(segment));
                }
            }
            segments
        };

        for segment in &snapshots {
            for item in segment.iter() {
                callback(item);
            }
        }
    }

    /// Drop all segments queued as trash and return how many were freed.
    /// Idempotent: returns 0 when there is nothing to free. Meant to be called
    /// by an external cleaner at its own cadence; trash grows without bound
    /// until someone does.
    ///
    /// 丢弃垃圾队列中的所有段并返回释放的数量。
    /// 幂等：没有可释放的段时返回 0。应由外部清理者按自己的节奏调用；
    /// 在有人调用之前垃圾会无界增长。
    pub fn clear_trash(&self) -> usize {
        let mut freed = 0;
        while self.trash.pop().is_some() {
            freed += 1;
        }
        freed
    }

    /// The configured per-segment memory threshold in bytes.
    /// 配置的每段内存阈值（字节）。
    pub fn memory_threshold(&self) -> usize {
        self.memory_threshold
    }

    /// The configured length of the history ring.
    /// 配置的历史环长度。
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Number of evicted segments currently awaiting [`clear_trash`](BoundedList::clear_trash).
    /// 当前等待 [`clear_trash`](BoundedList::clear_trash) 的被逐出段数量。
    pub fn trash_len(&self) -> usize {
        self.trash.len()
    }

    /// Number of occupied history slots.
    #[cfg(test)]
    pub(crate) fn history_segments(&self) -> usize {
        self.ring.lock().segments.iter().flatten().count()
    }
}

/// Builder for configuring a [`BoundedList`].
///
/// # Example
/// ```
/// use swmr_reclaim::{BoundedList, BoundedListBuilder, MemoryUsage};
///
/// struct Sample(u64);
/// impl MemoryUsage for Sample {
///     fn memory_usage(&self) -> usize {
///         std::mem::size_of::<Self>()
///     }
/// }
///
/// let list: BoundedList<Sample> = BoundedListBuilder::new()
///     .memory_threshold(64 * 1024)
///     .max_history(4)
///     .build()
///     .unwrap();
/// list.prepend(Sample(1));
/// ```
///
/// 用于配置 [`BoundedList`] 的构建器。
pub struct BoundedListBuilder {
    memory_threshold: usize,
    max_history: usize,
}

impl BoundedListBuilder {
    /// Create a new builder with default settings.
    /// 创建一个带有默认设置的新构建器。
    pub fn new() -> Self {
        BoundedListBuilder {
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    /// Set the per-segment memory threshold in bytes. Must be positive.
    ///
    /// Default: 1 MiB.
    ///
    /// 设置每段内存阈值（字节）。必须为正。默认：1 MiB。
    pub fn memory_threshold(mut self, bytes: usize) -> Self {
        self.memory_threshold = bytes;
        self
    }

    /// Set the length of the history ring. Must be at least 2.
    ///
    /// Default: 10.
    ///
    /// 设置历史环的长度。必须至少为 2。默认：10。
    pub fn max_history(mut self, segments: usize) -> Self {
        self.max_history = segments;
        self
    }

    /// Build the [`BoundedList`] with the configured settings.
    /// 使用配置的设置构建 [`BoundedList`]。
    pub fn build<T: MemoryUsage>(self) -> Result<BoundedList<T>, ConfigError> {
        BoundedList::new(self.memory_threshold, self.max_history)
    }
}

impl Default for BoundedListBuilder {
    fn default() -> Self {
        Self::new()
    }
}
