use std::ptr::NonNull;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use axbsp_ingenic_x1000::{
    BoardClk, Platform, attach_cgu, attach_sfc, config, publish_sfc, sfc, sfc_irq_handler,
};
use bsp_ingenic::clk::x1000::*;
use bsp_ingenic::sfc::regs::*;
use bsp_ingenic::sfc::{IrqReturn, SfcMessage, SfcTransfer};
use bsp_ingenic::{Kernel, Mmio, RegisterIo};
use rdif_clk::Interface as _;

const MHZ: u64 = 1_000_000;
const CPM_BASE: usize = 0x1000_0000;
const SFC_BASE: usize = 0x1344_0000;

/// Register windows backed by leaked RAM.
struct RamBoard {
    cpm: Option<usize>,
    sfc: Option<usize>,
}

fn ram_window(size: usize) -> usize {
    let words = vec![0u32; size.div_ceil(4)].into_boxed_slice();
    Box::leak(words).as_mut_ptr() as usize
}

impl RamBoard {
    fn new() -> &'static Self {
        let board = Box::leak(Box::new(RamBoard {
            cpm: Some(ram_window(config::CPM_SIZE)),
            sfc: Some(ram_window(config::SFC_SIZE)),
        }));
        board.seed_cpm();
        board
    }

    fn without_sfc() -> &'static Self {
        let board = Box::leak(Box::new(RamBoard {
            cpm: Some(ram_window(config::CPM_SIZE)),
            sfc: None,
        }));
        board.seed_cpm();
        board
    }

    fn window(base: Option<usize>) -> Mmio {
        let base = NonNull::new(base.unwrap() as *mut u8).unwrap();
        unsafe { Mmio::new(base) }
    }

    fn cpm(&self) -> Mmio {
        Self::window(self.cpm)
    }

    fn sfc(&self) -> Mmio {
        Self::window(self.sfc)
    }

    /// APLL 1008 MHz, MPLL 600 MHz, everything gated.
    fn seed_cpm(&self) {
        let cpm = self.cpm();
        cpm.write(CPM_CPAPCR, (41 << 24) | (1 << 8) | (1 << 10));
        cpm.write(CPM_CPMPCR, (24 << 24) | (1 << 7) | 1);
        cpm.write(
            CPM_CPCCR,
            (2 << 30) | (1 << 28) | (1 << 26) | (1 << 24) | (9 << 16) | (4 << 12) | (4 << 8) | (1 << 4),
        );
        cpm.write(CPM_CLKGR, u32::MAX);
        cpm.write(CPM_SFCCDR, 1 << 27);
    }

    /// Waits for the controller to be started, then raises `status`.
    fn complete_with(&self, status: u32) -> IrqReturn {
        let regs = self.sfc();
        while regs.read(SFC_TRIG) & TRIG_START == 0 {
            thread::yield_now();
        }
        regs.write(SFC_TRIG, 0);
        regs.write(SFC_SR, status);
        sfc_irq_handler()
    }

    /// Raises END on a controller that is already running.
    fn complete_with_end(&self) -> IrqReturn {
        self.sfc().write(SFC_SR, INT_END);
        sfc_irq_handler()
    }
}

fn cgu(board: &RamBoard) -> BoardClk {
    let Ok(clk) = attach_cgu(board, CPM_BASE, config::CPM_SIZE) else {
        panic!("cpm window not mapped");
    };
    clk
}

impl Kernel for RamBoard {
    fn sleep(&self, us: u64) {
        thread::sleep(Duration::from_micros(us));
    }
}

impl Platform for RamBoard {
    fn iomap(&self, paddr: usize, _size: usize) -> Option<NonNull<u8>> {
        let base = match paddr {
            CPM_BASE => self.cpm,
            SFC_BASE => self.sfc,
            _ => None,
        }?;
        NonNull::new(base as *mut u8)
    }
}

#[test]
fn cgu_attach_reports_boot_rates() {
    let board = RamBoard::new();
    let clk = cgu(board);
    let tree = clk.tree();
    assert_eq!(tree.get_rate(CLK_PLL_APLL), Ok(1008 * MHZ));
    assert_eq!(tree.get_rate(CLK_PLL_MPLL), Ok(600 * MHZ));
    assert_eq!(bus_rates_mhz(tree), [1008, 504, 201, 201, 100]);
    assert_eq!(clk.get_rate(CLK_EXT.index().into()).unwrap(), config::EXT_RATE);
    // The OPCR gates share the CPM window.
    assert!(tree.get(CLK_GATE_USBPHY).is_some());
}

#[test]
fn sfc_attach_clocks_the_controller() {
    let board = RamBoard::new();
    let mut clk = cgu(board);
    let Ok(sfc) = attach_sfc(board, &mut clk, SFC_BASE, config::SFC_SIZE) else {
        panic!("sfc attach failed");
    };

    // 1008 MHz / 7, the fastest rate not above the board maximum.
    let src_clk = clk.tree().get_rate(CLK_CGU_SFC).unwrap();
    assert_eq!(src_clk, 144 * MHZ);
    assert_eq!(sfc.config().src_clk, src_clk);
    assert_eq!(sfc.config().threshold, config::SFC_THRESHOLD);
    assert!(clk.tree().is_enabled(CLK_GATE_SFC).unwrap());
    assert_eq!(board.cpm().read(CPM_CLKGR) & (1 << 2), 0);

    let regs = board.sfc();
    assert_eq!(regs.read(SFC_CGE), 0);
    let conf = regs.read(SFC_DEV_CONF);
    assert_eq!(conf & DEV_CONF_SMP_DELAY_MSK, 1 << DEV_CONF_SMP_DELAY_OFFSET);
    assert_eq!(conf & (DEV_CONF_CPHA | DEV_CONF_CPOL), 0);
}

#[test]
fn missing_window_fails_attach() {
    let board = RamBoard::without_sfc();
    assert!(attach_cgu(board, SFC_BASE, config::CPM_SIZE).is_err());

    let mut clk = cgu(board);
    assert!(attach_sfc(board, &mut clk, SFC_BASE, config::SFC_SIZE).is_err());
    // Nothing was clocked for the unmapped controller.
    assert!(!clk.tree().is_enabled(CLK_GATE_SFC).unwrap());
    assert_eq!(clk.tree().prepare_count(CLK_CGU_SFC), Ok(0));
}

#[test]
fn published_board_runs_a_flash_read() {
    let board = RamBoard::new();
    assert!(sfc().is_none());
    assert_eq!(sfc_irq_handler(), IrqReturn::None);

    let mut clk = cgu(board);
    let Ok(attached) = attach_sfc(board, &mut clk, SFC_BASE, config::SFC_SIZE) else {
        panic!("sfc attach failed");
    };
    let flash = publish_sfc(attached);
    assert!(Arc::ptr_eq(&flash, sfc().unwrap()));

    // RAM hands back the same word for every FIFO read.
    board.sfc().write(SFC_RM_DR, 0x4433_2211);
    let mut msg = SfcMessage::new();
    msg.add_tail(SfcTransfer::read(0x03, 6).with_addr(0x8000, 3));

    let done = thread::scope(|s| {
        let worker = s.spawn(|| flash.sync(&mut msg));
        assert_eq!(board.complete_with(INT_RREQ), IrqReturn::Handled);
        assert_eq!(board.complete_with_end(), IrqReturn::Handled);
        worker.join().unwrap()
    })
    .unwrap();

    assert_eq!(done[0].buf, [0x11, 0x22, 0x33, 0x44, 0x11, 0x22]);
    assert_eq!(msg.actual_length, 6);
    assert_eq!(board.sfc().read(sfc_dev_addr(0)), 0x8000);

    // A second controller does not take over the interrupt.
    let Ok(other) = attach_sfc(board, &mut clk, SFC_BASE, config::SFC_SIZE) else {
        panic!("sfc attach failed");
    };
    let other = publish_sfc(other);
    assert!(!Arc::ptr_eq(&other, sfc().unwrap()));
    assert!(Arc::ptr_eq(&flash, sfc().unwrap()));
}
