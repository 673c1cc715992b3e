#[cfg(not(feature = "loom"))]
use crate::slot::EPOCH_SLOTS;
use crate::slot::SlotTable;
use crate::sync::{yield_now, AtomicPtr, AtomicU64, Mutex, Ordering};
use std::cell::Cell;
use std::mem;
use std::ptr;
use thread_local::ThreadLocal;

#[cfg(not(feature = "loom"))]
use rand::Rng;

/// Epochs start here; 0 is reserved for "slot not reading".
/// 纪元从这里开始；0 保留表示"槽未在读取"。
const FIRST_EPOCH: u64 = 1;

/// Uniform random initial slot, so concurrent readers rarely start their
/// probe at the same index.
/// 均匀随机的初始槽，使并发读者很少从同一索引开始探测。
#[cfg(not(feature = "loom"))]
fn initial_slot() -> usize {
    rand::thread_rng().gen_range(0..EPOCH_SLOTS)
}

/// Deterministic under loom: model executions must not diverge between runs,
/// and starting every thread at slot 0 exercises the probe path.
#[cfg(feature = "loom")]
fn initial_slot() -> usize {
    0
}

/// A single-writer/many-reader atomic handle to an owned resource.
///
/// Readers access the current resource lock-free through
/// [`read`](ResourceManager::read), announcing their epoch in one of 128
/// cache-line-padded slots. [`update`](ResourceManager::update) publishes a
/// replacement with a single atomic exchange and hands the displaced resource
/// back as a [`Retired`] value; the displaced resource may only be destroyed
/// once every announced reader has moved past its retire epoch, which
/// [`Retired`] enforces.
///
/// **Typical Usage**:
/// ```
/// use swmr_reclaim::ResourceManager;
///
/// let manager = ResourceManager::new(String::from("initial"));
///
/// // Reader threads:
/// let len = manager.read(|s| s.len());
/// assert_eq!(len, 7);
///
/// // Writer thread:
/// let retired = manager.update(Some(Box::new(String::from("updated"))));
/// assert_eq!(retired.get().map(String::as_str), Some("initial"));
/// // Dropping `retired` waits until no reader can still see "initial".
/// ```
///
/// 一个单写多读的资源原子句柄。
/// 读者通过 [`read`](ResourceManager::read) 无锁访问当前资源，
/// 在 128 个缓存行对齐的槽之一中公告自己的纪元。
/// [`update`](ResourceManager::update) 用一次原子交换发布替代品，
/// 并把被换下的资源作为 [`Retired`] 值交还；
/// 只有当每个已公告的读者都越过其退休纪元后才能销毁它，
/// 这由 [`Retired`] 强制保证。
pub struct ResourceManager<T> {
    /// Null, or a resource exclusively owned by the manager.
    current: AtomicPtr<T>,
    /// Monotonically non-decreasing publish counter, starts at 1.
    global_epoch: AtomicU64,
    /// Serializes update callers. `update` acquires it itself; there is no
    /// external locking discipline.
    writer: Mutex<()>,
    slots: SlotTable,
    /// Per-thread preferred slot index, lazily seeded at random.
    slot_hint: ThreadLocal<Cell<usize>>,
}

// The manager owns and eventually drops a T (Send); readers obtain &T from
// &self (Sync).
unsafe impl<T: Send> Send for ResourceManager<T> {}
unsafe impl<T: Send + Sync> Sync for ResourceManager<T> {}

impl<T> ResourceManager<T> {
    /// Create a manager owning `initial`.
    /// 创建一个拥有 `initial` 的管理器。
    pub fn new(initial: T) -> Self {
        Self::from_boxed(Some(Box::new(initial)))
    }

    /// Create a manager from an optional boxed resource. With `None`, reads
    /// return the callback result type's default until the first non-null
    /// [`update`](ResourceManager::update).
    ///
    /// 从一个可选的装箱资源创建管理器。传入 `None` 时，在第一次非空
    /// [`update`](ResourceManager::update) 之前，读取返回回调结果类型的默认值。
    pub fn from_boxed(initial: Option<Box<T>>) -> Self {
        ResourceManager {
            current: AtomicPtr::new(initial.map_or(ptr::null_mut(), Box::into_raw)),
            global_epoch: AtomicU64::new(FIRST_EPOCH),
            writer: Mutex::new(()),
            slots: SlotTable::new(),
            slot_hint: ThreadLocal::new(),
        }
    }

    /// Run `reader` against the current resource and return its result.
    ///
    /// The calling thread announces the current global epoch in its preferred
    /// slot (linearly probing forward while slots are busy), then loads the
    /// resource. The announcement CAS is SeqCst on purpose: it forbids the
    /// slot store from being reordered past the resource load, which is what
    /// makes an update that advances the epoch afterwards observe the
    /// announcement and hold off reclamation. The slot is freed when the
    /// callback returns, or on unwind if it panics.
    ///
    /// If the current resource is null the callback is not invoked and
    /// `R::default()` is returned; callers of a manager with a non-null
    /// invariant should not rely on this.
    ///
    /// Readers must not resolve a [`Retired`] value from inside the callback;
    /// waiting for one's own announced epoch cannot terminate.
    ///
    /// 对当前资源运行 `reader` 并返回其结果。
    /// 调用线程在其首选槽中公告当前全局纪元（槽忙时线性向前探测），
    /// 然后加载资源。公告 CAS 特意使用 SeqCst：它禁止槽存储被重排到
    /// 资源加载之后，正因如此，之后推进纪元的更新会观察到公告并推迟回收。
    /// 回调返回时槽被释放；回调 panic 时在栈展开中释放。
    /// 若当前资源为空，则不调用回调而返回 `R::default()`；
    /// 持有非空不变式的管理器的调用者不应依赖这一点。
    /// 读者不得在回调内部解决 [`Retired`] 值；等待自己公告的纪元无法终止。
    pub fn read<R, F>(&self, reader: F) -> R
    where
        F: FnOnce(&T) -> R,
        R: Default,
    {
        let hint = self.slot_hint.get_or(|| Cell::new(initial_slot()));

        let epoch = self.global_epoch.load(Ordering::Acquire);
        let idx = self.slots.claim(hint.get(), epoch);
        let _release = SlotRelease {
            slots: &self.slots,
            idx,
        };

        let resource = self.current.load(Ordering::Acquire);
        if resource.is_null() {
            R::default()
        } else {
            // Claimed slot with epoch <= any future retire epoch of this
            // pointer keeps it alive for the duration of the callback.
            reader(unsafe { &*resource })
        }
    }

    /// Publish `new` as the current resource and retire the displaced one.
    ///
    /// Serialized against other updates by the writer mutex. The exchange of
    /// the current pointer is SeqCst and the epoch advance is Release, so a
    /// reader that announced before the advance reads a resource whose retire
    /// epoch is at least its announced epoch. The pre-increment epoch value is
    /// the retire epoch carried by the returned [`Retired`].
    ///
    /// 将 `new` 发布为当前资源并退休被换下的资源。
    /// 写互斥锁使更新彼此串行。当前指针的交换为 SeqCst，纪元推进为 Release，
    /// 因此在推进之前公告的读者读到的资源，其退休纪元不小于它公告的纪元。
    /// 自增前的纪元值就是返回的 [`Retired`] 携带的退休纪元。
    #[must_use = "dropping the Retired value blocks until reclamation is safe"]
    pub fn update(&self, new: Option<Box<T>>) -> Retired<'_, T> {
        let _writer = self.writer.lock();

        let new_ptr = new.map_or(ptr::null_mut(), Box::into_raw);
        let old_ptr = self.current.swap(new_ptr, Ordering::SeqCst);
        let retire_epoch = self.global_epoch.fetch_add(1, Ordering::Release);

        Retired {
            manager: self,
            resource: old_ptr,
            epoch: retire_epoch,
        }
    }

    /// True once no announced reader could still reference a resource retired
    /// at `epoch`. Once true it stays true, provided no reader announces an
    /// epoch at or below `epoch` again, which the monotonic global epoch
    /// rules out for completed updates.
    ///
    /// 一旦没有已公告的读者仍可能引用在 `epoch` 退休的资源即为真。
    /// 一旦为真就保持为真，只要没有读者再次公告不大于 `epoch` 的纪元，
    /// 对已完成的更新而言，单调的全局纪元排除了这种情况。
    pub fn can_reclaim(&self, epoch: u64) -> bool {
        self.slots.can_reclaim(epoch)
    }

    /// Spin, yielding the CPU between attempts, until
    /// [`can_reclaim`](ResourceManager::can_reclaim) holds for `epoch`.
    /// Stalls for as long as some reader callback runs; clients must keep
    /// reader callbacks short.
    ///
    /// 自旋等待（每次尝试之间让出 CPU），直到
    /// [`can_reclaim`](ResourceManager::can_reclaim) 对 `epoch` 成立。
    /// 只要有读者回调在运行就会停顿；客户端必须保证读者回调足够短。
    pub fn wait_reclaim(&self, epoch: u64) {
        while !self.can_reclaim(epoch) {
            yield_now();
        }
    }
}

impl<T> Drop for ResourceManager<T> {
    /// With `&mut self` no reference obtained through `read` can still be
    /// alive, so the final resource is taken back and dropped directly.
    ///
    /// 有了 `&mut self`，通过 `read` 获得的引用都不可能仍然存活，
    /// 因此直接取回并丢弃最后的资源。
    fn drop(&mut self) {
        let resource = self.current.load(Ordering::Relaxed);
        if !resource.is_null() {
            unsafe {
                drop(Box::from_raw(resource));
            }
        }
    }
}

/// Releases a claimed epoch slot, also on unwind out of the reader callback.
struct SlotRelease<'a> {
    slots: &'a SlotTable,
    idx: usize,
}

impl Drop for SlotRelease<'_> {
    #[inline]
    fn drop(&mut self) {
        self.slots.release(self.idx);
    }
}

/// A resource displaced by [`ResourceManager::update`], together with its
/// retire epoch.
///
/// The caller owns the displaced resource, but it may only be destroyed once
/// every reader announced at or before the retire epoch has finished. Both
/// [`into_inner`](Retired::into_inner) and the drop glue wait for that point,
/// so the contract cannot be broken in safe code. Shared access through
/// [`get`](Retired::get) is allowed at any time; concurrent readers hold the
/// value as `&T` too.
///
/// 被 [`ResourceManager::update`] 换下的资源及其退休纪元。
/// 调用者拥有被换下的资源，但只有当所有在退休纪元或之前公告的读者
/// 都结束后才能销毁它。[`into_inner`](Retired::into_inner) 和 drop
/// 都会等待这一时刻，因此在安全代码中无法违反该契约。
/// 通过 [`get`](Retired::get) 的共享访问随时允许；并发读者同样以 `&T`
/// 持有该值。
#[must_use = "dropping the Retired value blocks until reclamation is safe"]
pub struct Retired<'m, T> {
    manager: &'m ResourceManager<T>,
    resource: *mut T,
    epoch: u64,
}

unsafe impl<T: Send + Sync> Send for Retired<'_, T> {}

impl<'m, T> Retired<'m, T> {
    /// The epoch at which the resource was retired. Consecutive updates
    /// retire at consecutive epochs.
    /// 资源退休时的纪元。相继的更新在相继的纪元退休。
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Shared access to the retired resource, or `None` if the update
    /// displaced a null resource.
    /// 对退休资源的共享访问；若更新换下的是空资源则为 `None`。
    pub fn get(&self) -> Option<&T> {
        unsafe { self.resource.as_ref() }
    }

    /// True if an actual resource was displaced.
    /// 若确实换下了一个资源则为真。
    pub fn is_some(&self) -> bool {
        !self.resource.is_null()
    }

    /// Wait until reclamation is safe, then take ownership of the resource.
    /// 等待回收变得安全，然后取得资源的所有权。
    pub fn into_inner(mut self) -> Option<Box<T>> {
        let resource = mem::replace(&mut self.resource, ptr::null_mut());
        if resource.is_null() {
            return None;
        }
        self.manager.wait_reclaim(self.epoch);
        Some(unsafe { Box::from_raw(resource) })
    }
}

impl<T> Drop for Retired<'_, T> {
    fn drop(&mut self) {
        if self.resource.is_null() {
            return;
        }
        self.manager.wait_reclaim(self.epoch);
        unsafe {
            drop(Box::from_raw(self.resource));
        }
    }
}
