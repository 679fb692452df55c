//! Board support for the Ingenic X1000 (xburst) SoC.
//!
//! [`clk`] models the CPM clock tree: PLLs, CPCCR bus dividers, CGU
//! peripheral clocks and CLKGR gates, behind one registry indexed by
//! [`clk::ClockId`]. [`sfc`] drives the serial flash controller, sequencing
//! multi-phase SPI transactions through its FIFO.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod clk;
pub mod kernel;
pub mod regs;
pub mod sfc;

pub use kernel::{DmaDirection, Kernel};
pub use regs::{Mmio, RegisterIo};
