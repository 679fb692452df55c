//! Platform hooks the drivers need from the surrounding kernel.

/// Direction of a DMA buffer handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    ToDevice,
    FromDevice,
}

pub trait Kernel: Send + Sync {
    /// Sleeps (or spins) for at least `us` microseconds.
    fn sleep(&self, us: u64);

    /// Translates a CPU address into the address the device sees.
    ///
    /// The default strips the MIPS KSEG0/KSEG1 segment bits, which is correct
    /// for unmapped kernel memory.
    fn virt_to_phys(&self, vaddr: usize) -> usize {
        vaddr & 0x1fff_ffff
    }

    /// Makes `len` bytes at `vaddr` coherent for a DMA transfer.
    fn dma_sync(&self, _vaddr: usize, _len: usize, _dir: DmaDirection) {}
}
