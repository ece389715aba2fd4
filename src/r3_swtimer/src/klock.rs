//! Kernel state locking mechanism
use core::{cell::UnsafeCell, fmt, ops};

use crate::port::PortThreading;

/// Cell type that can only be accessed through [`CpuLockGuard`] (which can be
/// obtained by [`lock_cpu`]).
pub(crate) struct CpuLockCell<T: ?Sized>(UnsafeCell<T>);

// Safety: The contents are only accessible while CPU Lock is active, which
//         excludes every other context (this is upheld by `PortThreading`'s
//         implementor). Thus, sharing `CpuLockCell` is equivalent to sending
//         `T` to whichever context acquires CPU Lock next.
unsafe impl<T: ?Sized + Send> Sync for CpuLockCell<T> {}

impl<T> CpuLockCell<T> {
    pub(crate) const fn new(x: T) -> Self {
        Self(UnsafeCell::new(x))
    }
}

impl<T: ?Sized> fmt::Debug for CpuLockCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Acquiring CPU Lock here could deadlock if the caller already holds
        // it, so don't print the contents
        f.write_str("CpuLockCell(< opaque >)")
    }
}

/// Enter a CPU Lock state and get an RAII guard for `cell`.
///
/// This may spin until the other context leaves the CPU Lock state.
///
/// # Panics
///
/// Panics if the current context is already in a CPU Lock state, e.g., if a
/// port's [`PortDispatch::try_send`] calls back into the service.
///
/// [`PortDispatch::try_send`]: crate::port::PortDispatch::try_send
pub(crate) fn lock_cpu<'a, Port: PortThreading + ?Sized, T: ?Sized>(
    port: &'a Port,
    cell: &'a CpuLockCell<T>,
) -> CpuLockGuard<'a, Port, T> {
    if port.is_cpu_lock_active() {
        cpu_lock_reentered();
    }

    // Safety: `enter_cpu_lock` is only meant to be called by the kernel, and
    //         we pair it with `leave_cpu_lock` in `CpuLockGuard::drop`. We
    //         just checked that we aren't in a CPU Lock state.
    unsafe { port.enter_cpu_lock() };
    debug_assert!(port.is_cpu_lock_active());

    CpuLockGuard { port, cell }
}

#[cold]
fn cpu_lock_reentered() -> ! {
    panic!("CPU Lock is already active");
}

/// RAII guard for a CPU Lock state. Dereferences to the contents of the
/// [`CpuLockCell`] it was created for.
pub(crate) struct CpuLockGuard<'a, Port: PortThreading + ?Sized, T: ?Sized> {
    port: &'a Port,
    cell: &'a CpuLockCell<T>,
}

impl<Port: PortThreading + ?Sized, T: ?Sized> Drop for CpuLockGuard<'_, Port, T> {
    #[inline]
    fn drop(&mut self) {
        // Safety: CPU Lock is currently active, and it's us (the kernel) who
        // are currently controlling the CPU Lock state
        unsafe { self.port.leave_cpu_lock() };
    }
}

impl<Port: PortThreading + ?Sized, T: ?Sized> ops::Deref for CpuLockGuard<'_, Port, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // Safety: CPU Lock is active, so no other context can access the
        //         contents. The returned borrow can't outlive `self`.
        unsafe { &*self.cell.0.get() }
    }
}

impl<Port: PortThreading + ?Sized, T: ?Sized> ops::DerefMut for CpuLockGuard<'_, Port, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: See `deref`. `&mut self` guarantees uniqueness within the
        //         current context.
        unsafe { &mut *self.cell.0.get() }
    }
}
