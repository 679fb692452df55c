//! Register window access.
//!
//! Every driver in this crate talks to hardware through [`RegisterIo`], so the
//! same clock and flash logic runs against a mapped MMIO window on the board
//! and against an in-memory register file in tests.

use core::ptr::NonNull;

/// Spin budget for hardware ready/busy bits.
pub const BUSY_WAIT_RETRIES: u32 = 0x2000;

#[inline]
pub const fn bit(n: u32) -> u32 {
    1 << n
}

/// Mask with the low `width` bits set.
#[inline]
pub const fn genmask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

#[inline]
pub const fn field_get(value: u32, shift: u32, mask: u32) -> u32 {
    (value >> shift) & mask
}

/// Replaces the field at `shift`/`mask` in `value` with `field`.
#[inline]
pub const fn field_set(value: u32, shift: u32, mask: u32, field: u32) -> u32 {
    (value & !(mask << shift)) | ((field & mask) << shift)
}

/// 32-bit register access relative to a window base.
pub trait RegisterIo: Send + Sync {
    fn read(&self, offset: u32) -> u32;

    fn write(&self, offset: u32, value: u32);

    /// Read-modify-write: clears `clear`, then sets `set`.
    ///
    /// A field update passes the field mask as `clear` and the new value as
    /// `set`.
    fn modify(&self, offset: u32, set: u32, clear: u32) {
        let value = self.read(offset);
        self.write(offset, (value & !clear) | set);
    }

    fn set_bits(&self, offset: u32, bits: u32) {
        self.modify(offset, bits, 0);
    }

    fn clear_bits(&self, offset: u32, bits: u32) {
        self.modify(offset, 0, bits);
    }

    fn test_bits(&self, offset: u32, bits: u32) -> bool {
        self.read(offset) & bits != 0
    }

    /// Polls `offset` until `cond` holds, giving up after `retries` reads.
    ///
    /// Returns `true` if the condition was met.
    fn poll<F>(&self, offset: u32, retries: u32, cond: F) -> bool
    where
        F: Fn(u32) -> bool,
        Self: Sized,
    {
        for _ in 0..retries {
            if cond(self.read(offset)) {
                return true;
            }
            core::hint::spin_loop();
        }
        false
    }
}

/// A mapped MMIO register window.
#[derive(Debug, Clone, Copy)]
pub struct Mmio {
    base: NonNull<u8>,
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must point to a mapped device window that stays valid for the
    /// lifetime of the returned value and covers every offset accessed
    /// through it.
    pub const unsafe fn new(base: NonNull<u8>) -> Self {
        Self { base }
    }

    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    #[inline]
    fn reg(&self, offset: u32) -> *mut u32 {
        // SAFETY: the window covers `offset` per the contract of `new`.
        unsafe { self.base.as_ptr().add(offset as usize).cast::<u32>() }
    }
}

unsafe impl Send for Mmio {}
unsafe impl Sync for Mmio {}

impl RegisterIo for Mmio {
    #[inline]
    fn read(&self, offset: u32) -> u32 {
        unsafe { self.reg(offset).read_volatile() }
    }

    #[inline]
    fn write(&self, offset: u32, value: u32) {
        unsafe { self.reg(offset).write_volatile(value) }
    }
}
