use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

/// The cell already held a value when [`SetOnce::set`] ran.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AlreadySet;

/// A cell that can be written exactly once and read freely afterwards.
///
/// Publication is a release store; readers acquire. The intended discipline
/// is single-writer-then-broadcast: the boot core calls [`SetOnce::set`]
/// before secondary cores are released, so readers in practice never observe
/// the in-between state. A racing second writer loses and gets
/// [`AlreadySet`] back.
pub struct SetOnce<T> {
    state: AtomicU8,
    slot: UnsafeCell<MaybeUninit<T>>,
}

impl<T> SetOnce<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            slot: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Publish `value`. Fails if a value was already published (or is being
    /// published on another core right now).
    pub fn set(&self, value: T) -> Result<(), AlreadySet> {
        if self
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(AlreadySet);
        }
        unsafe {
            (*self.slot.get()).write(value);
        }
        self.state.store(READY, Ordering::Release);
        Ok(())
    }

    /// The published value, if any.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // SAFETY: READY is only stored after the slot was written.
            Some(unsafe { (*self.slot.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// The published value, publishing `init()`'s result first if the cell
    /// is still empty. Spins if another core is mid-publication.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        if let Some(v) = self.get() {
            return v;
        }
        if self.set(init()).is_ok() {
            // SAFETY: we just published.
            return unsafe { (*self.slot.get()).assume_init_ref() };
        }
        loop {
            if let Some(v) = self.get() {
                return v;
            }
            spin_loop();
        }
    }
}

impl<T> Default for SetOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for SetOnce<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            // SAFETY: READY implies the slot holds an initialised value.
            unsafe { (*self.slot.get()).assume_init_drop() }
        }
    }
}

// SAFETY: shared access only hands out &T after the release/acquire pair;
// initialisation is single-writer.
unsafe impl<T: Sync> Sync for SetOnce<T> {}
unsafe impl<T: Send> Send for SetOnce<T> {}
