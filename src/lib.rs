//! Single-writer/many-reader primitives with epoch-based reclamation.
//! 基于纪元回收的单写多读原语。
//!
//! Two independent components share one philosophy: publish a new version
//! with a single atomic swap, and defer destruction of the old version until
//! readers provably cannot reach it.
//!
//! - [`ResourceManager`]: an atomic handle to one owned resource. Reads are
//!   lock-free and announce an epoch in a fixed slot table; updates exchange
//!   the resource pointer and hand the displaced version back as a
//!   [`Retired`] value that can only be destroyed once it is safe.
//! - [`BoundedList`]: a memory-bounded append-only log built from lock-free
//!   [`AtomicList`] segments, rotating the active segment into a ring of
//!   historic segments when a byte threshold is reached.
//!
//! 两个独立组件共享同一哲学：用一次原子交换发布新版本，
//! 并将旧版本的销毁推迟到读者确定无法到达它之后。

mod bounded;
mod error;
mod list;
mod manager;
mod slot;
mod sync;

pub use bounded::{BoundedList, BoundedListBuilder, MemoryUsage};
pub use error::ConfigError;
pub use list::{AtomicList, Iter};
pub use manager::{ResourceManager, Retired};

// The unit tests drive real std threads; they are compiled out under the
// loom feature, which has its own model tests in tests/loom_tests.rs.
#[cfg(all(test, not(feature = "loom")))]
mod tests;
