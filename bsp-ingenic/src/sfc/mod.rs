//! Serial flash controller.
//!
//! A flash operation is an [`SfcMessage`]: up to six phases (command,
//! address, dummy, data, or a status poll the controller repeats by itself)
//! issued as one hardware transaction. [`Sfc::sync`] programs the phases,
//! starts the controller and waits for the interrupt handler,
//! [`Sfc::handle_irq`], to pump the FIFO and report completion.

mod fifo;
pub mod regs;
mod transfer;

use alloc::vec::Vec;
use core::fmt;
use core::mem;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use log::{debug, error, info, warn};
use spin::Mutex;

pub use fifo::{read_rxfifo, write_txfifo};
pub use transfer::{CmdInfo, Direction, OpsMode, PhaseFormat, SfcMessage, SfcTransfer, TransferMode};

use self::regs::*;
use crate::kernel::{DmaDirection, Kernel};
use crate::regs::RegisterIo;

/// How long `sync` waits for the controller, in milliseconds.
pub const SFC_TRANSFER_TIMEOUT: u64 = 3000;

/// Completion poll step while waiting, in microseconds.
const WAIT_STEP_US: u64 = 100;

/// Source clocks at or above this rate need the half-cycle sample delay.
const SMP_DELAY_MIN_CLK: u64 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SfcError {
    /// `sync` on a message with no phases.
    EmptyMessage,
    /// More phases than the controller has slots.
    TooManyPhases(usize),
    /// Another transaction is in flight on this controller.
    Busy,
    /// No END/OVER/UNDER interrupt within [`SFC_TRANSFER_TIMEOUT`].
    Timeout,
    FifoOverrun,
    FifoUnderrun,
    /// The source clock rate cannot be used for timing.
    InvalidClock(u64),
    /// A quad phase on a controller wired without WP/HOLD as data lines.
    QuadUnavailable,
}

impl fmt::Display for SfcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SfcError::EmptyMessage => write!(f, "message has no transfers"),
            SfcError::TooManyPhases(n) => {
                write!(f, "{} phases, controller supports {}", n, MAX_PHASES)
            }
            SfcError::Busy => write!(f, "transfer already in flight"),
            SfcError::Timeout => write!(f, "timeout for ACK from SFC device"),
            SfcError::FifoOverrun => write!(f, "FIFO overrun"),
            SfcError::FifoUnderrun => write!(f, "FIFO underrun"),
            SfcError::InvalidClock(rate) => write!(f, "invalid source clock {} Hz", rate),
            SfcError::QuadUnavailable => write!(f, "quad transfer without quad mode"),
        }
    }
}

impl core::error::Error for SfcError {}

/// Attach-time description of a controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SfcConfig {
    /// Source clock rate in Hz.
    pub src_clk: u64,
    /// FIFO request threshold in words.
    pub threshold: u32,
    /// WP/HOLD are wired as IO2/IO3. Quad phases are rejected without it.
    pub quad_mode: bool,
}

impl Default for SfcConfig {
    fn default() -> Self {
        Self {
            src_clk: 0,
            threshold: THRESHOLD,
            quad_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    Handled,
    /// Status not recognised; the waiter is not released.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Idle = 0,
    Running = 1,
    Done = 2,
    Overrun = 3,
    Underrun = 4,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => State::Running,
            2 => State::Done,
            3 => State::Overrun,
            4 => State::Underrun,
            _ => State::Idle,
        }
    }
}

/// Buffer of the PIO data phase, handed to the interrupt handler.
struct PioCursor {
    buf: Vec<u8>,
    cur_len: usize,
    direction: Direction,
}

/// Clears the in-flight flag when `sync` returns.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SfcError> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| Self(flag))
            .map_err(|_| SfcError::Busy)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Sfc<R, K> {
    regs: R,
    kernel: K,
    config: SfcConfig,
    in_flight: AtomicBool,
    state: AtomicU8,
    pio: Mutex<Option<PioCursor>>,
}

impl<R: RegisterIo, K: Kernel> Sfc<R, K> {
    /// Takes over the controller at `regs` and puts it in its idle setup.
    pub fn new(regs: R, kernel: K, config: SfcConfig) -> Self {
        let sfc = Self {
            regs,
            kernel,
            config,
            in_flight: AtomicBool::new(false),
            state: AtomicU8::new(State::Idle as u8),
            pio: Mutex::new(None),
        };
        sfc.init_setup();
        info!(
            "sfc: src_clk {} Hz, threshold {}, quad {}",
            config.src_clk, config.threshold, config.quad_mode
        );
        sfc
    }

    pub fn config(&self) -> &SfcConfig {
        &self.config
    }

    pub fn regs(&self) -> &R {
        &self.regs
    }

    fn init_setup(&self) {
        self.regs.write(SFC_TRIG, TRIG_STOP);
        self.regs.write(SFC_DEV_CONF, 0);
        // X1000 requires clock gating off.
        self.regs.write(SFC_CGE, 0);

        let glb = self.regs.read(SFC_GLB) & !GLB_THRESHOLD_MSK;
        self.regs.write(
            SFC_GLB,
            glb | ((self.config.threshold << GLB_THRESHOLD_OFFSET) & GLB_THRESHOLD_MSK),
        );

        // Mode 0, CE/HOLD/WP idle high.
        self.regs.modify(
            SFC_DEV_CONF,
            DEV_CONF_CEDL | DEV_CONF_HOLDDL | DEV_CONF_WPDL,
            DEV_CONF_CPHA | DEV_CONF_CPOL,
        );

        self.regs.clear_bits(SFC_GLB, GLB_OP_MODE);

        if self.config.src_clk >= SMP_DELAY_MIN_CLK {
            self.regs.modify(
                SFC_DEV_CONF,
                DEV_CONF_HALF_CYCLE_DELAY << DEV_CONF_SMP_DELAY_OFFSET,
                DEV_CONF_SMP_DELAY_MSK,
            );
        }
    }

    /// Programs the chip-select timings, given in nanoseconds, as cycle
    /// counts of the source clock.
    pub fn set_flash_timing(
        &self,
        t_hold: u32,
        t_setup: u32,
        t_shslrd: u32,
        t_shslwr: u32,
    ) -> Result<(), SfcError> {
        let src_clk = self.config.src_clk;
        let cycle_ns = 1_000_000_000u64.checked_div(src_clk).unwrap_or(0);
        if cycle_ns == 0 {
            return Err(SfcError::InvalidClock(src_clk));
        }
        let cycles = |t_ns: u32| (t_ns as u64 / cycle_ns).saturating_sub(1) as u32;

        let c_hold = cycles(t_hold);
        let c_setup = cycles(t_setup);
        let c_in = cycles(t_shslrd.max(t_shslwr));
        debug!("sfc: timing hold {} setup {} shsl {} cycles", c_hold, c_setup, c_in);

        self.regs.modify(
            SFC_DEV_CONF,
            ((c_hold << DEV_CONF_THOLD_OFFSET) & DEV_CONF_THOLD_MSK)
                | ((c_setup << DEV_CONF_TSETUP_OFFSET) & DEV_CONF_TSETUP_MSK)
                | ((c_in << DEV_CONF_TSH_OFFSET) & DEV_CONF_TSH_MSK),
            DEV_CONF_THOLD_MSK | DEV_CONF_TSETUP_MSK | DEV_CONF_TSH_MSK,
        );
        Ok(())
    }

    /// Device status captured by the last polled phase.
    pub fn sta_rt(&self) -> u32 {
        self.regs.read(SFC_DEV_STA_RT)
    }

    pub fn dump_regs(&self) {
        for (name, off) in DUMP_REGS {
            debug!("{:<16}:{:08x}", name, self.regs.read(off));
        }
        for phase in 0..MAX_PHASES {
            debug!("SFC_TRAN_CONF({}) :{:08x}", phase, self.regs.read(sfc_tran_conf(phase)));
        }
        for phase in 0..MAX_PHASES {
            debug!("SFC_DEV_ADDR({})  :{:08x}", phase, self.regs.read(sfc_dev_addr(phase)));
        }
    }

    fn set_tran_config(&self, xfer: &SfcTransfer, phase: usize) {
        let cmd = &xfer.cmd_info;
        let mut conf = ((xfer.sfc_mode as u32 & TRAN_CONF_TRAN_MODE_MSK) << TRAN_CONF_TRAN_MODE_OFFSET)
            | ((xfer.addr_len & TRAN_CONF_ADDR_WIDTH_MSK) << TRAN_CONF_ADDR_WIDTH_OFFSET)
            | TRAN_CONF_CMDEN
            | ((xfer.data_dummy_bits & TRAN_CONF_DMYBITS_MSK) << TRAN_CONF_DMYBITS_OFFSET)
            | (cmd.cmd as u32 & TRAN_CONF_CMD_MSK);
        if xfer.phase_format == PhaseFormat::CmdDummyAddr {
            conf |= TRAN_CONF_FMAT;
        }
        if cmd.dataen {
            conf |= TRAN_CONF_DATEEN;
        }
        if xfer.is_poll() {
            conf |= TRAN_CONF_POLLEN;
        }
        self.regs.write(sfc_tran_conf(phase), conf);
    }

    fn load_phase(&self, xfer: &SfcTransfer, phase: usize) {
        self.regs.write(sfc_dev_addr(phase), xfer.addr);
        self.regs.write(sfc_dev_addr_plus(phase), xfer.addr_plus);
        self.set_tran_config(xfer, phase);
        if xfer.is_poll() {
            self.regs.write(SFC_DEV_STA_EXP, xfer.cmd_info.sta_exp);
            self.regs.write(SFC_DEV_STA_MSK, xfer.cmd_info.sta_msk);
        } else {
            self.regs.write(SFC_DEV_STA_EXP, 0);
            self.regs.write(SFC_DEV_STA_MSK, 0);
        }
    }

    fn load_data(&self, xfer: &SfcTransfer) {
        self.regs.write(SFC_TRAN_LEN, xfer.len() as u32);
        match xfer.ops_mode {
            OpsMode::Dma => {
                let vaddr = xfer.buf.as_ptr() as usize;
                let dir = match xfer.direction {
                    Direction::Read => DmaDirection::FromDevice,
                    Direction::Write => DmaDirection::ToDevice,
                };
                self.kernel.dma_sync(vaddr, xfer.len(), dir);
                self.regs.write(SFC_MEM_ADDR, self.kernel.virt_to_phys(vaddr) as u32);
            }
            OpsMode::Cpu => self.regs.write(SFC_MEM_ADDR, 0),
        }

        let mut glb = self.regs.read(SFC_GLB);
        match xfer.direction {
            Direction::Read => glb &= !GLB_TRAN_DIR,
            Direction::Write => glb |= GLB_TRAN_DIR,
        }
        match xfer.ops_mode {
            OpsMode::Dma => glb |= GLB_OP_MODE,
            OpsMode::Cpu => glb &= !GLB_OP_MODE,
        }
        self.regs.write(SFC_GLB, glb);
    }

    /// Issues `message` as one transaction and waits for it to finish.
    ///
    /// On success the phases are unlinked from the message and returned,
    /// read buffers filled. On failure they stay in the message and
    /// `message.status` holds the error.
    pub fn sync(&self, message: &mut SfcMessage) -> Result<Vec<SfcTransfer>, SfcError> {
        let phases = message.transfers.len();
        if phases == 0 {
            return Err(SfcError::EmptyMessage);
        }
        if phases > MAX_PHASES {
            return Err(SfcError::TooManyPhases(phases));
        }
        if !self.config.quad_mode && message.transfers.iter().any(|x| x.sfc_mode.is_quad()) {
            return Err(SfcError::QuadUnavailable);
        }
        let _in_flight = InFlight::acquire(&self.in_flight)?;

        let mut transfers = mem::take(&mut message.transfers);
        message.actual_length = 0;
        self.regs.write(SFC_TRIG, TRIG_FLUSH);
        self.regs.write(SFC_TRAN_LEN, 0);

        let mut data_phase = None;
        for (phase, xfer) in transfers.iter().enumerate() {
            self.load_phase(xfer, phase);
            if xfer.has_data() {
                self.load_data(xfer);
                message.actual_length += xfer.len();
                data_phase = Some(phase);
            }
        }

        // Only the last data phase is serviced by the FIFO pump.
        let pio_phase = data_phase.filter(|&p| transfers[p].ops_mode == OpsMode::Cpu);
        if let Some(p) = pio_phase {
            let xfer = &mut transfers[p];
            *self.pio.lock() = Some(PioCursor {
                buf: mem::take(&mut xfer.buf),
                cur_len: 0,
                direction: xfer.direction,
            });
        }

        let glb = self.regs.read(SFC_GLB) & !GLB_PHASE_NUM_MSK;
        self.regs.write(SFC_GLB, glb | ((phases as u32) << GLB_PHASE_NUM_OFFSET));

        let outcome = self.start_transfer();

        if let Some(p) = pio_phase {
            if let Some(cursor) = self.pio.lock().take() {
                transfers[p].buf = cursor.buf;
                transfers[p].cur_len = cursor.cur_len;
            }
        } else if let Some(p) = data_phase {
            transfers[p].cur_len = transfers[p].len();
        }

        match outcome {
            Ok(()) => {
                message.status = None;
                Ok(transfers)
            }
            Err(e) => {
                message.transfers = transfers;
                message.status = Some(e);
                Err(e)
            }
        }
    }

    fn start_transfer(&self) -> Result<(), SfcError> {
        self.state.store(State::Running as u8, Ordering::Release);
        self.regs.write(SFC_SCR, INT_ALL);
        self.regs.write(SFC_INTC, 0);
        self.regs.write(SFC_TRIG, TRIG_START);

        let state = self.wait_for_completion();
        // Masked before the PIO cursor is reclaimed, whatever the outcome.
        self.regs.write(SFC_INTC, INT_ALL);
        match state {
            State::Done => Ok(()),
            State::Overrun => Err(SfcError::FifoOverrun),
            State::Underrun => Err(SfcError::FifoUnderrun),
            State::Idle | State::Running => {
                self.regs.write(SFC_SCR, INT_ALL);
                error!("sfc: timeout for ACK from SFC device");
                Err(SfcError::Timeout)
            }
        }
    }

    fn wait_for_completion(&self) -> State {
        let budget_us = SFC_TRANSFER_TIMEOUT * 1000;
        let mut waited_us = 0;
        loop {
            let state = State::from_u8(self.state.load(Ordering::Acquire));
            if state != State::Running {
                self.state.store(State::Idle as u8, Ordering::Release);
                return state;
            }
            if waited_us >= budget_us {
                break;
            }
            self.kernel.sleep(WAIT_STEP_US);
            waited_us += WAIT_STEP_US;
        }
        // A completion racing the deadline still counts.
        match self.state.compare_exchange(
            State::Running as u8,
            State::Idle as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => State::Running,
            Err(done) => {
                self.state.store(State::Idle as u8, Ordering::Release);
                State::from_u8(done)
            }
        }
    }

    fn complete(&self, state: State) {
        let _ = self.state.compare_exchange(
            State::Running as u8,
            state as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn pump(&self, direction: Direction) {
        let mut pio = self.pio.lock();
        let Some(cursor) = pio.as_mut().filter(|c| c.direction == direction) else {
            warn!("sfc: FIFO request with no {:?} buffer", direction);
            return;
        };
        let threshold = self.config.threshold;
        match direction {
            Direction::Read => read_rxfifo(&self.regs, &mut cursor.buf, &mut cursor.cur_len, threshold),
            Direction::Write => write_txfifo(&self.regs, &cursor.buf, &mut cursor.cur_len, threshold),
        }
    }

    /// Interrupt handler body.
    pub fn handle_irq(&self) -> IrqReturn {
        let status = self.regs.read(SFC_SR) & INT_ALL;
        match status {
            INT_RREQ => {
                self.regs.write(SFC_SCR, INT_RREQ);
                self.pump(Direction::Read);
            }
            INT_TREQ => {
                self.regs.write(SFC_SCR, INT_TREQ);
                self.pump(Direction::Write);
            }
            INT_END => {
                self.regs.write(SFC_INTC, INT_ALL);
                self.regs.write(SFC_SCR, INT_END);
                self.complete(State::Done);
            }
            INT_OVER => {
                self.regs.write(SFC_SCR, INT_OVER);
                error!("sfc OVER !");
                self.complete(State::Overrun);
            }
            INT_UNDER => {
                self.regs.write(SFC_SCR, INT_UNDER);
                error!("sfc UNDR !");
                self.complete(State::Underrun);
            }
            _ => {
                warn!(
                    "sfc: status {:#x} not supported (SR {:#x})",
                    status,
                    self.regs.read(SFC_SR)
                );
                return IrqReturn::None;
            }
        }
        IrqReturn::Handled
    }
}
