//! Transfer phases and messages.

use alloc::vec;
use alloc::vec::Vec;

use super::SfcError;

/// Command half of a phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CmdInfo {
    pub cmd: u16,
    /// The phase carries a data stage.
    pub dataen: bool,
    /// Status value the controller polls for. Only used with `sta_msk != 0`.
    pub sta_exp: u32,
    pub sta_msk: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Read,
    Write,
}

/// Who moves the data stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpsMode {
    /// The CPU pumps the FIFO from the interrupt handler.
    #[default]
    Cpu,
    /// The controller masters the bus itself.
    Dma,
}

/// SPI line usage, as encoded in TRAN_CONF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum TransferMode {
    #[default]
    Standard = 0,
    DualData = 1,
    DualIo = 2,
    FullDualIo = 3,
    QuadData = 5,
    QuadIo = 6,
    FullQuadIo = 7,
}

impl TransferMode {
    /// Drives the WP/HOLD pins as data lines.
    pub const fn is_quad(self) -> bool {
        matches!(self, TransferMode::QuadData | TransferMode::QuadIo | TransferMode::FullQuadIo)
    }
}

/// Order of the address and dummy stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PhaseFormat {
    #[default]
    CmdAddrDummy,
    CmdDummyAddr,
}

/// One phase of a flash transaction.
#[derive(Debug, Clone, Default)]
pub struct SfcTransfer {
    pub cmd_info: CmdInfo,
    pub addr: u32,
    /// Address width in bytes.
    pub addr_len: u32,
    pub addr_plus: u32,
    pub data_dummy_bits: u32,
    /// Data to send, or room for the data to receive.
    pub buf: Vec<u8>,
    /// Bytes of `buf` moved so far.
    pub cur_len: usize,
    pub direction: Direction,
    pub ops_mode: OpsMode,
    pub sfc_mode: TransferMode,
    pub phase_format: PhaseFormat,
}

impl SfcTransfer {
    /// A bare command phase.
    pub fn command(cmd: u16) -> Self {
        Self {
            cmd_info: CmdInfo {
                cmd,
                ..CmdInfo::default()
            },
            ..Self::default()
        }
    }

    /// A command whose data stage reads `len` bytes.
    pub fn read(cmd: u16, len: usize) -> Self {
        Self {
            cmd_info: CmdInfo {
                cmd,
                dataen: true,
                ..CmdInfo::default()
            },
            buf: vec![0; len],
            direction: Direction::Read,
            ..Self::default()
        }
    }

    /// A command whose data stage writes `data`.
    pub fn write(cmd: u16, data: Vec<u8>) -> Self {
        Self {
            cmd_info: CmdInfo {
                cmd,
                dataen: true,
                ..CmdInfo::default()
            },
            buf: data,
            direction: Direction::Write,
            ..Self::default()
        }
    }

    /// A status phase the controller repeats until
    /// `status & sta_msk == sta_exp`.
    pub fn poll(cmd: u16, sta_exp: u32, sta_msk: u32) -> Self {
        Self {
            cmd_info: CmdInfo {
                cmd,
                dataen: false,
                sta_exp,
                sta_msk,
            },
            ..Self::default()
        }
    }

    pub fn with_addr(mut self, addr: u32, addr_len: u32) -> Self {
        self.addr = addr;
        self.addr_len = addr_len;
        self
    }

    pub fn with_addr_plus(mut self, addr_plus: u32) -> Self {
        self.addr_plus = addr_plus;
        self
    }

    pub fn with_dummy_bits(mut self, bits: u32) -> Self {
        self.data_dummy_bits = bits;
        self
    }

    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.sfc_mode = mode;
        self
    }

    pub fn with_ops_mode(mut self, ops_mode: OpsMode) -> Self {
        self.ops_mode = ops_mode;
        self
    }

    pub fn with_phase_format(mut self, format: PhaseFormat) -> Self {
        self.phase_format = format;
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_poll(&self) -> bool {
        self.cmd_info.sta_msk != 0
    }

    pub fn has_data(&self) -> bool {
        self.cmd_info.dataen && !self.buf.is_empty()
    }
}

/// An ordered list of phases issued as one transaction.
#[derive(Debug, Default)]
pub struct SfcMessage {
    pub(crate) transfers: Vec<SfcTransfer>,
    /// Data bytes programmed by the last `sync`.
    pub actual_length: usize,
    /// Outcome of the last `sync`, `None` on success.
    pub status: Option<SfcError>,
}

impl SfcMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tail(&mut self, transfer: SfcTransfer) {
        self.transfers.push(transfer);
    }

    /// Unlinks the phase at `index`.
    pub fn transfer_del(&mut self, index: usize) -> Option<SfcTransfer> {
        (index < self.transfers.len()).then(|| self.transfers.remove(index))
    }

    pub fn transfers(&self) -> &[SfcTransfer] {
        &self.transfers
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}
