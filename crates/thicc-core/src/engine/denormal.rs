//! Scoped denormal suppression
//!
//! Filter and DC-blocker feedback paths decay towards zero through the
//! subnormal range, where arithmetic can be orders of magnitude slower.
//! [`ScopedFlushDenormals`] switches the FPU to flush-to-zero for the
//! lifetime of the guard (one processed block) and restores the previous
//! mode on drop.
//!
//! Supported on x86_64 (MXCSR FTZ + DAZ) and aarch64 (FPCR.FZ); a no-op on
//! other targets.

/// RAII guard enabling flush-to-zero on the current thread
pub struct ScopedFlushDenormals {
    previous: u64,
}

impl ScopedFlushDenormals {
    pub fn new() -> Self {
        let previous = arch::read_mode();
        arch::write_mode(previous | arch::FLUSH_BITS);
        Self { previous }
    }
}

impl Default for ScopedFlushDenormals {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScopedFlushDenormals {
    fn drop(&mut self) {
        arch::write_mode(self.previous);
    }
}

#[cfg(target_arch = "x86_64")]
mod arch {
    use std::arch::asm;

    /// FTZ (bit 15) | DAZ (bit 6)
    pub const FLUSH_BITS: u64 = 0x8040;

    #[inline]
    pub fn read_mode() -> u64 {
        let mut csr: u32 = 0;
        // SAFETY: stmxcsr only stores the control register to the given address
        unsafe {
            asm!("stmxcsr dword ptr [{}]", in(reg) &mut csr, options(nostack, preserves_flags));
        }
        csr as u64
    }

    #[inline]
    pub fn write_mode(mode: u64) {
        let csr = mode as u32;
        // SAFETY: only FTZ/DAZ differ from the value read by read_mode
        unsafe {
            asm!("ldmxcsr dword ptr [{}]", in(reg) &csr, options(nostack, readonly, preserves_flags));
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    use std::arch::asm;

    /// FPCR.FZ (bit 24)
    pub const FLUSH_BITS: u64 = 1 << 24;

    #[inline]
    pub fn read_mode() -> u64 {
        let fpcr: u64;
        // SAFETY: reading FPCR has no side effects
        unsafe {
            asm!("mrs {}, fpcr", out(reg) fpcr, options(nomem, nostack, preserves_flags));
        }
        fpcr
    }

    #[inline]
    pub fn write_mode(mode: u64) {
        // SAFETY: only FZ differs from the value read by read_mode
        unsafe {
            asm!("msr fpcr, {}", in(reg) mode, options(nomem, nostack, preserves_flags));
        }
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod arch {
    pub const FLUSH_BITS: u64 = 0;

    #[inline]
    pub fn read_mode() -> u64 {
        0
    }

    #[inline]
    pub fn write_mode(_mode: u64) {}
}
