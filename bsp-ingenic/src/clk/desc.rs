//! Static hardware descriptions of the clock nodes.

use bitflags::bitflags;

use super::ClockId;

bitflags! {
    /// What a node can do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Caps: u8 {
        const MUX = 1 << 0;
        const DIV = 1 << 1;
        const GATE = 1 << 2;
        const PLL = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClkFlags: u8 {
        /// Stop the clock before switching its source.
        const SET_PARENT_GATE = 1 << 0;
        /// Stop the clock before changing its divider.
        const SET_RATE_GATE = 1 << 1;
        /// Left running by `disable_unused`.
        const IGNORE_UNUSED = 1 << 2;
    }
}

/// A parent table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Clock(ClockId),
    /// Slot intentionally unconnected: selecting it stops the clock.
    DummyStop,
    /// Slot with no known source.
    DummyUnknown,
}

impl Parent {
    pub const fn id(self) -> Option<ClockId> {
        match self {
            Parent::Clock(id) => Some(id),
            _ => None,
        }
    }
}

/// Which lock serializes a node's register sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// The process-wide CPM lock.
    Shared,
    /// Read-only nodes that never write.
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PllDesc {
    pub regoff: u32,
    pub m_shift: u32,
    pub m_width: u32,
    pub n_shift: u32,
    pub n_width: u32,
    pub od_shift: u32,
    pub od_width: u32,
    pub en_bit: u32,
    pub on_bit: u32,
    pub bs_bit: u32,
    /// Raw OD field value to divisor; 0 marks an unsupported encoding.
    pub od_encode: &'static [u32],
    pub div_step: u32,
}

/// A read-only field in CPCCR: either a mux select or a bus divider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpccrDesc {
    pub regoff: u32,
    pub shift: u32,
    pub mask: u32,
}

/// Mux select field. It may live in another clock's register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxField {
    pub regoff: u32,
    pub shift: u32,
    pub mask: u32,
    pub writable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivField {
    pub shift: u32,
    pub mask: u32,
}

/// A CGU peripheral clock: source select, divider and stop gate in one
/// register, handshaked through the change-enable and busy bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CguDesc {
    pub regoff: u32,
    pub mux: Option<MuxField>,
    /// Select value that routes EXCLK straight through, bypassing the divider.
    pub cs_exclk: Option<u32>,
    pub ce_bit: u32,
    pub busy_bit: u32,
    pub stop_bit: u32,
    pub div: DivField,
    pub div_step: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CguAccess {
    Full,
    /// Enable/disable and rate readback only.
    ReadOnly,
}

/// The SSI clock: a one-bit source select that also halves the rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SsiDesc {
    pub regoff: u32,
    pub bit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDesc {
    pub regoff: u32,
    pub bit: u32,
    /// Set the bit to run the clock instead of clearing it.
    pub invert: bool,
    /// Access through the PM regmap window instead of the CPM window.
    pub use_regmap: bool,
    /// Gate that must be held on while this one is on.
    pub assoc: Option<ClockId>,
    /// Forward prepare/unprepare to the associated gate too.
    pub prepare: bool,
}

impl GateDesc {
    pub const fn new(regoff: u32, bit: u32) -> Self {
        Self {
            regoff,
            bit,
            invert: false,
            use_regmap: false,
            assoc: None,
            prepare: false,
        }
    }

    pub const fn regmap(regoff: u32, bit: u32) -> Self {
        Self {
            use_regmap: true,
            ..Self::new(regoff, bit)
        }
    }

    pub const fn with_assoc(self, assoc: ClockId, prepare: bool) -> Self {
        Self {
            assoc: Some(assoc),
            prepare,
            ..self
        }
    }

    pub const fn inverted(self) -> Self {
        Self {
            invert: true,
            ..self
        }
    }
}

/// Node kinds, each carrying its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClkKind {
    /// External oscillator with a board supplied rate.
    Fixed { rate: u64 },
    Pll(&'static PllDesc),
    CpccrMux(&'static CpccrDesc),
    CpccrDiv(&'static CpccrDesc),
    Cgu {
        desc: &'static CguDesc,
        access: CguAccess,
    },
    Ssi(&'static SsiDesc),
    /// I2S/PCM: CGU source select with a fixed 24 MHz output.
    Audio(&'static MuxField),
    Gate(&'static GateDesc),
}

impl ClkKind {
    pub fn caps(&self) -> Caps {
        match self {
            ClkKind::Fixed { .. } => Caps::empty(),
            ClkKind::Pll(_) => Caps::PLL,
            ClkKind::CpccrMux(_) => Caps::MUX,
            ClkKind::CpccrDiv(_) => Caps::DIV,
            ClkKind::Cgu { desc, .. } => {
                let caps = Caps::DIV | Caps::GATE;
                if desc.mux.is_some() {
                    caps | Caps::MUX
                } else {
                    caps
                }
            }
            ClkKind::Ssi(_) | ClkKind::Audio(_) => Caps::MUX,
            ClkKind::Gate(_) => Caps::GATE,
        }
    }
}

/// One row of a clock table.
#[derive(Debug, Clone, Copy)]
pub struct ClkInit {
    pub id: ClockId,
    pub name: &'static str,
    pub parents: &'static [Parent],
    pub kind: ClkKind,
    pub flags: ClkFlags,
    pub lock: LockKind,
}
