use crate::sync::{AtomicPtr, Ordering};
use std::alloc::{alloc, dealloc, Layout};
use std::marker::PhantomData;
use std::ptr;

/// A node owned by an [`AtomicList`]. Nodes use bare pointers because the
/// list guards the allocation of the whole chain.
/// 由 [`AtomicList`] 拥有的节点。节点使用裸指针，因为链表守护整条链的分配。
struct Node<T> {
    data: T,
    next: *mut Node<T>,
}

/// A lock-free prepend-only singly linked list.
///
/// One can only prepend new items and iterate over a snapshot taken at the
/// moment [`iter`](AtomicList::iter) is called. The head and every `next`
/// pointer form an acyclic chain ending at null; once a node is linked its
/// `next` is never mutated again. All reachable nodes are owned exclusively
/// by the list and freed when it is dropped. Dropping takes `&mut self`, so
/// the compiler enforces that no other thread is still prepending or holding
/// a snapshot.
///
/// 一个无锁的只能头插的单向链表。
/// 只能头插新项，并遍历调用 [`iter`](AtomicList::iter) 那一刻的快照。
/// 头指针和每个 `next` 指针构成一条以 null 结尾的无环链；
/// 节点一旦被链接，其 `next` 就不再改变。
/// 所有可达节点都由链表独占拥有，并在 drop 时释放。
/// drop 需要 `&mut self`，因此编译器保证没有其他线程仍在头插或持有快照。
pub struct AtomicList<T> {
    head: AtomicPtr<Node<T>>,
}

// &self prepend moves T values in; &self iter hands out &T.
unsafe impl<T: Send> Send for AtomicList<T> {}
unsafe impl<T: Send + Sync> Sync for AtomicList<T> {}

impl<T> AtomicList<T> {
    /// Create an empty list.
    /// 创建一个空链表。
    pub fn new() -> Self {
        AtomicList {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Prepend a value. Non-blocking and infallible: on allocation failure the
    /// item is silently dropped.
    ///
    /// The successful CAS on the head uses Release and pairs with the Acquire
    /// load in [`iter`](AtomicList::iter), so a snapshot that reaches a node
    /// also observes the stores that initialized it. The failure path reloads
    /// with Acquire to synchronize with a CAS that published another node.
    ///
    /// 头插一个值。非阻塞且不会失败：分配失败时该项被静默丢弃。
    /// 头指针上成功的 CAS 使用 Release，与 [`iter`](AtomicList::iter) 中的
    /// Acquire 加载配对，因此到达某节点的快照也能观察到初始化它的存储。
    /// 失败路径用 Acquire 重新加载，以与发布了其他节点的 CAS 同步。
    pub fn prepend(&self, value: T) {
        let layout = Layout::new::<Node<T>>();
        // Raw allocation with a null check instead of Box: prepend must not
        // abort on out-of-memory, it drops the item instead.
        let node = unsafe { alloc(layout) } as *mut Node<T>;
        if node.is_null() {
            return;
        }
        unsafe {
            ptr::write(
                node,
                Node {
                    data: value,
                    next: ptr::null_mut(),
                },
            );
        }

        let mut old_head = self.head.load(Ordering::Acquire);
        loop {
            unsafe {
                (*node).next = old_head;
            }
            match self
                .head
                .compare_exchange_weak(old_head, node, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(current) => old_head = current,
            }
        }
    }

    /// Iterate over a snapshot of the list, newest to oldest.
    ///
    /// The head is captured with Acquire when the iterator is created; items
    /// prepended afterwards are not visited. The returned references live as
    /// long as the borrow of the list.
    ///
    /// 遍历链表的快照，从最新到最旧。
    /// 创建迭代器时用 Acquire 捕获头指针；之后头插的项不会被访问。
    /// 返回的引用与链表的借用同寿。
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            node: self.head.load(Ordering::Acquire),
            _list: PhantomData,
        }
    }

    /// True if the list held no items at the moment of the call.
    /// 调用时刻链表不含任何项则为真。
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<T> Default for AtomicList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AtomicList<T> {
    fn drop(&mut self) {
        let mut node = self.head.load(Ordering::Relaxed);
        let layout = Layout::new::<Node<T>>();
        while !node.is_null() {
            unsafe {
                let next = (*node).next;
                ptr::drop_in_place(node);
                dealloc(node as *mut u8, layout);
                node = next;
            }
        }
    }
}

/// Snapshot iterator over an [`AtomicList`].
/// [`AtomicList`] 的快照迭代器。
pub struct Iter<'a, T> {
    node: *mut Node<T>,
    _list: PhantomData<&'a AtomicList<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.node.is_null() {
            return None;
        }
        // Nodes reachable from a snapshot stay allocated while the list is
        // borrowed, and next pointers are immutable after linking.
        let node = unsafe { &*self.node };
        self.node = node.next;
        Some(&node.data)
    }
}
