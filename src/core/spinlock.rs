//! # Spinlock
//!
//! Spinlock implementation in no_std environment
//! The lock itself is atomic and may be held across CPUs, but it does not keep
//! interrupts off while held. Pair it with `SplGuard` when that matters.
//! ---
//! Change log:
//!   - 2024/03/15: File created.
//!   - 2024/05/02: Guards the coremap.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, Ordering};
use core::cell::UnsafeCell;
use core::hint;
use core::ops::{Deref, DerefMut};

pub struct Spinlock<T> {
    lock: AtomicBool,
    data: UnsafeCell<T>,
    _marker: PhantomData<T>, // Tell compiler we work as T
}

pub struct SpinlockGuard<'a, T: 'a> {
    lock: &'a Spinlock<T>,
}

impl<T> Spinlock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            lock: AtomicBool::new(false),
            data: UnsafeCell::new(data),
            _marker: PhantomData,
        }
    }

    pub fn lock(&self) -> SpinlockGuard<T> {
        while self.lock.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed).is_err() {
            hint::spin_loop();
        }
        SpinlockGuard::new(self)
    }

    fn unlock(&self) {
        self.lock.store(false, Ordering::Release);
    }
}

// Mark our Spinlock is Send + Sync
unsafe impl<T: Send> Sync for Spinlock<T> {}

unsafe impl<T: Send> Send for Spinlock<T> {}

impl<'a, T> SpinlockGuard<'a, T> {
    fn new(lock: &'a Spinlock<T>) -> Self {
        Self {
            lock
        }
    }
}

impl<'a, T> Deref for SpinlockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinlockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinlockGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use super::{Ordering, Spinlock};

    #[test]
    fn guard_releases_on_drop() {
        let lock = Spinlock::new(0usize);
        {
            let mut guard = lock.lock();
            *guard = 7;
        }
        assert_eq!(*lock.lock(), 7);
        assert!(!lock.lock.load(Ordering::Relaxed));
    }

    #[test]
    fn counts_across_threads() {
        let lock = Arc::new(Spinlock::new(0usize));
        let workers: Vec<_> = (0..4).map(|_| {
            let lock = lock.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    *lock.lock() += 1;
                }
            })
        }).collect();
        workers.into_iter().for_each(|w| w.join().unwrap());
        assert_eq!(*lock.lock(), 4000);
    }
}
