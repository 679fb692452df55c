//! Ingenic X1000 board glue.
//!
//! Registers two rdrive drivers: the CPM clock provider
//! (`ingenic,x1000-cgu`) and the serial flash controller (`ingenic,sfc`),
//! which takes its clock from the provider. Register windows are mapped
//! through the [`Platform`] installed with [`init_platform`].
#![no_std]

extern crate alloc;

pub mod clk;
pub mod config;
pub mod sfc;

use alloc::string::String;
use core::ptr::NonNull;

use bsp_ingenic::{DmaDirection, Kernel};
use rdrive::probe::OnProbeError;
use spin::Once;

pub use clk::{BoardClk, attach_cgu};
pub use sfc::{BoardSfc, SfcDriver, attach_sfc, publish_sfc, sfc, sfc_irq_handler};

/// What the surrounding kernel provides to the board.
pub trait Platform: Kernel {
    /// Maps `size` bytes of device memory at physical `paddr`.
    fn iomap(&self, paddr: usize, size: usize) -> Option<NonNull<u8>>;
}

static PLATFORM: Once<&'static dyn Platform> = Once::new();

/// Installs the platform hooks. Must run before rdrive starts the drivers.
pub fn init_platform(platform: &'static dyn Platform) {
    PLATFORM.call_once(|| platform);
}

fn platform() -> Result<&'static dyn Platform, OnProbeError> {
    PLATFORM
        .get()
        .copied()
        .ok_or(OnProbeError::other(String::from("platform hooks not installed")))
}

/// Maps a register window, reporting failure against `name`.
fn iomap(
    platform: &dyn Platform,
    name: &str,
    paddr: usize,
    size: usize,
) -> Result<NonNull<u8>, OnProbeError> {
    platform.iomap(paddr, size).ok_or(OnProbeError::other(alloc::format!(
        "[{}] failed to iomap {:#x}",
        name,
        paddr
    )))
}

/// [`Kernel`] hooks of a board-wide [`Platform`].
#[derive(Clone, Copy)]
pub struct PlatformKernel(&'static dyn Platform);

impl PlatformKernel {
    pub fn new(platform: &'static dyn Platform) -> Self {
        Self(platform)
    }
}

impl Kernel for PlatformKernel {
    fn sleep(&self, us: u64) {
        self.0.sleep(us)
    }

    fn virt_to_phys(&self, vaddr: usize) -> usize {
        self.0.virt_to_phys(vaddr)
    }

    fn dma_sync(&self, vaddr: usize, len: usize, dir: DmaDirection) {
        self.0.dma_sync(vaddr, len, dir)
    }
}
