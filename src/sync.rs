#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};
#[cfg(not(feature = "loom"))]
pub use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

#[cfg(feature = "loom")]
pub use loom::thread::yield_now;
#[cfg(not(feature = "loom"))]
pub use std::thread::yield_now;

#[cfg(feature = "loom")]
pub use loom::hint::spin_loop;
#[cfg(not(feature = "loom"))]
pub use std::hint::spin_loop;

#[cfg(not(feature = "loom"))]
pub use antidote::Mutex;

#[cfg(feature = "loom")]
#[derive(Debug, Default)]
pub struct Mutex<T>(loom::sync::Mutex<T>);

#[cfg(feature = "loom")]
impl<T> Mutex<T> {
    pub fn new(t: T) -> Self {
        Self(loom::sync::Mutex::new(t))
    }

    pub fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
        self.0.lock().unwrap()
    }
}
