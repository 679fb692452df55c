//! Per-node hardware operations.
//!
//! Each operation dispatches on [`ClkKind`] and runs its register sequence
//! under the node's lock. Framework bookkeeping (usage counts, parent
//! propagation) lives in the tree.

use core::fmt;
use core::sync::atomic::AtomicU32;

use log::{debug, error, trace};
use spin::Mutex;

use super::desc::{CguAccess, CguDesc, ClkFlags, ClkInit, ClkKind, GateDesc, LockKind, Parent, PllDesc};
use super::{Caps, ClkError, ClockId, MHZ};
use crate::regs::{BUSY_WAIT_RETRIES, RegisterIo, bit, field_get, field_set, genmask};

/// Serializes read-modify-write sequences of every [`LockKind::Shared`] node.
static CPM_LOCK: Mutex<()> = Mutex::new(());

/// Fixed output of the audio clocks.
const AUDIO_RATE: u64 = 24 * MHZ;

/// Register windows a node may touch.
pub(crate) struct Hw<R> {
    pub regs: R,
    pub regmap: Option<R>,
}

#[derive(Debug, Default)]
pub(crate) struct Usage {
    pub prepare: u32,
    pub enable: u32,
}

pub struct ClkNode {
    id: ClockId,
    name: &'static str,
    parents: &'static [Parent],
    kind: ClkKind,
    flags: ClkFlags,
    lock: LockKind,
    pub(crate) usage: Mutex<Usage>,
    pub(crate) assoc: Option<ClockId>,
    /// Enables forwarded to `assoc` and not yet undone.
    pub(crate) assoc_enable: AtomicU32,
    /// Prepares forwarded to `assoc` and not yet undone.
    pub(crate) assoc_prepare: AtomicU32,
}

impl fmt::Debug for ClkNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClkNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .finish()
    }
}

impl ClkNode {
    pub(crate) fn new(init: &ClkInit) -> Self {
        Self {
            id: init.id,
            name: init.name,
            parents: init.parents,
            kind: init.kind,
            flags: init.flags,
            lock: init.lock,
            usage: Mutex::new(Usage::default()),
            assoc: None,
            assoc_enable: AtomicU32::new(0),
            assoc_prepare: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> ClockId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parents(&self) -> &'static [Parent] {
        self.parents
    }

    pub fn kind(&self) -> &ClkKind {
        &self.kind
    }

    pub fn flags(&self) -> ClkFlags {
        self.flags
    }

    pub fn caps(&self) -> Caps {
        self.kind.caps()
    }

    pub fn assoc(&self) -> Option<ClockId> {
        self.assoc
    }

    pub(crate) fn gate_desc(&self) -> Option<&'static GateDesc> {
        match self.kind {
            ClkKind::Gate(desc) => Some(desc),
            _ => None,
        }
    }

    fn locked<T>(&self, f: impl FnOnce() -> T) -> T {
        match self.lock {
            LockKind::Shared => {
                let _guard = CPM_LOCK.lock();
                f()
            }
            LockKind::Unlocked => f(),
        }
    }

    pub(crate) fn can_set_parent(&self) -> bool {
        match self.kind {
            ClkKind::Cgu {
                desc,
                access: CguAccess::Full,
            } => desc.mux.is_some_and(|mux| mux.writable),
            ClkKind::Ssi(_) => true,
            ClkKind::Audio(mux) => mux.writable,
            _ => false,
        }
    }

    pub(crate) fn can_set_rate(&self) -> bool {
        matches!(
            self.kind,
            ClkKind::Cgu {
                access: CguAccess::Full,
                ..
            } | ClkKind::Audio(_)
        )
    }

    pub(crate) fn can_gate(&self) -> bool {
        matches!(self.kind, ClkKind::Cgu { .. } | ClkKind::Gate(_))
    }

    /// Index of the active parent in the parent table.
    pub(crate) fn get_parent<R: RegisterIo>(&self, hw: &Hw<R>) -> usize {
        match self.kind {
            ClkKind::CpccrMux(desc) => {
                let value = hw.regs.read(desc.regoff);
                field_get(value, desc.shift, desc.mask) as usize
            }
            ClkKind::Cgu { desc, .. } => match desc.mux {
                Some(mux) => self.locked(|| field_get(hw.regs.read(mux.regoff), mux.shift, mux.mask)) as usize,
                None => 0,
            },
            ClkKind::Ssi(desc) => self.locked(|| hw.regs.test_bits(desc.regoff, bit(desc.bit))) as usize,
            ClkKind::Audio(mux) => {
                self.locked(|| field_get(hw.regs.read(mux.regoff), mux.shift, mux.mask)) as usize
            }
            _ => 0,
        }
    }

    /// Switches the mux to `index`. `rate` is the node's current rate and
    /// `parent_rate` the rate of the new parent; CGU dividers are reprogrammed
    /// to keep `rate` across the switch.
    pub(crate) fn set_parent<R: RegisterIo>(
        &self,
        hw: &Hw<R>,
        index: usize,
        rate: u64,
        parent_rate: u64,
    ) -> Result<(), ClkError> {
        if index >= self.parents.len() {
            return Err(ClkError::InvalidParent(index));
        }
        let index = index as u32;
        match self.kind {
            ClkKind::Cgu { desc, .. } => {
                if !desc.mux.is_some_and(|mux| mux.writable) {
                    return Err(ClkError::NotSupported);
                }
                self.locked(|| cgu_set_parent(&hw.regs, desc, self.flags, index, rate, parent_rate));
                debug!("{}: switched to parent {}", self.name, index);
                Ok(())
            }
            ClkKind::Ssi(desc) => {
                self.locked(|| {
                    let value = hw.regs.read(desc.regoff) & !bit(desc.bit);
                    hw.regs.write(desc.regoff, value | (index << desc.bit));
                });
                Ok(())
            }
            ClkKind::Audio(mux) => {
                self.locked(|| {
                    let value = hw.regs.read(mux.regoff);
                    hw.regs.write(mux.regoff, field_set(value, mux.shift, mux.mask, index));
                });
                Ok(())
            }
            _ => Err(ClkError::NotSupported),
        }
    }

    pub(crate) fn recalc_rate<R: RegisterIo>(&self, hw: &Hw<R>, parent_rate: u64) -> u64 {
        match self.kind {
            ClkKind::Fixed { rate } => rate,
            ClkKind::Pll(desc) => pll_recalc(hw.regs.read(desc.regoff), desc, parent_rate),
            ClkKind::CpccrDiv(desc) => {
                let div = field_get(hw.regs.read(desc.regoff), desc.shift, desc.mask) as u64;
                parent_rate / (div + 1)
            }
            ClkKind::Cgu { desc, .. } => {
                let xcdr = self.locked(|| hw.regs.read(desc.regoff));
                cgu_recalc(xcdr, desc, parent_rate)
            }
            ClkKind::Ssi(desc) => {
                if self.locked(|| hw.regs.test_bits(desc.regoff, bit(desc.bit))) {
                    parent_rate / 2
                } else {
                    parent_rate
                }
            }
            ClkKind::Audio(_) => AUDIO_RATE,
            ClkKind::CpccrMux(_) | ClkKind::Gate(_) => parent_rate,
        }
    }

    /// Rate the node would run at if asked for `rate`, or `None` when the
    /// node cannot change its rate.
    pub(crate) fn round_rate(&self, rate: u64, parent_rate: u64) -> Result<Option<u64>, ClkError> {
        match self.kind {
            ClkKind::Cgu {
                desc,
                access: CguAccess::Full,
            } => {
                if rate == 0 {
                    return Err(ClkError::InvalidRate(rate));
                }
                Ok(Some(cgu_round(desc, rate, parent_rate)))
            }
            ClkKind::Audio(_) => Ok(Some(AUDIO_RATE)),
            _ => Ok(None),
        }
    }

    pub(crate) fn set_rate<R: RegisterIo>(
        &self,
        hw: &Hw<R>,
        rate: u64,
        parent_rate: u64,
    ) -> Result<(), ClkError> {
        match self.kind {
            ClkKind::Cgu {
                desc,
                access: CguAccess::Full,
            } => {
                if rate == 0 {
                    return Err(ClkError::InvalidRate(rate));
                }
                self.locked(|| cgu_set_rate(&hw.regs, desc, self.flags, rate, parent_rate));
                Ok(())
            }
            ClkKind::Audio(_) => Ok(()),
            _ => Err(ClkError::NotSupported),
        }
    }

    /// Register half of enable. Gate associations are forwarded by the tree.
    pub(crate) fn enable<R: RegisterIo>(&self, hw: &Hw<R>) -> Result<(), ClkError> {
        match self.kind {
            ClkKind::Cgu { desc, .. } => {
                let res = self.locked(|| cgu_enable(&hw.regs, desc));
                if res.is_err() {
                    error!("{}: busy bit stuck, giving up", self.name);
                }
                res
            }
            ClkKind::Gate(desc) => {
                let io = gate_io(hw, desc)?;
                self.locked(|| gate_update(io, desc, true));
                trace!("{}: gate bit {} @ {:#x} on", self.name, desc.bit, desc.regoff);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn disable<R: RegisterIo>(&self, hw: &Hw<R>) {
        match self.kind {
            ClkKind::Cgu { desc, .. } => self.locked(|| cgu_disable(&hw.regs, desc)),
            ClkKind::Gate(desc) => match gate_io(hw, desc) {
                Ok(io) => {
                    self.locked(|| gate_update(io, desc, false));
                    trace!("{}: gate bit {} @ {:#x} off", self.name, desc.bit, desc.regoff);
                }
                Err(_) => error!("{}: no regmap, cannot gate", self.name),
            },
            _ => {}
        }
    }

    /// Hardware enable state, `None` for nodes without a gate.
    pub(crate) fn is_enabled<R: RegisterIo>(&self, hw: &Hw<R>) -> Option<bool> {
        match self.kind {
            ClkKind::Cgu { desc, .. } => {
                let xcdr = self.locked(|| hw.regs.read(desc.regoff));
                Some(cgu_is_exclk(xcdr, desc) || xcdr & bit(desc.stop_bit) == 0)
            }
            ClkKind::Gate(desc) => {
                let io = gate_io(hw, desc).ok()?;
                let on = io.test_bits(desc.regoff, bit(desc.bit));
                Some(on == desc.invert)
            }
            _ => None,
        }
    }

    /// Writes the PLL descriptor and live register for debugging.
    pub(crate) fn dump_pll<R: RegisterIo>(&self, hw: &Hw<R>, out: &mut dyn fmt::Write) -> Result<(), ClkError> {
        use core::fmt::Write as _;

        let ClkKind::Pll(desc) = self.kind else {
            return Err(ClkError::NotSupported);
        };
        let field = |shift: u32, width: u32| genmask(width) << shift;
        let lines: [(&str, u32); 6] = [
            ("regoff", desc.regoff),
            ("m_msk", field(desc.m_shift, desc.m_width)),
            ("n_msk", field(desc.n_shift, desc.n_width)),
            ("od_msk", field(desc.od_shift, desc.od_width)),
            ("bit_on", desc.on_bit),
            ("bit_en", desc.en_bit),
        ];
        let mut dump = || -> fmt::Result {
            writeln!(out, "{} hardware description:", self.name)?;
            writeln!(out, "lock    [{:?}]", self.lock)?;
            for (name, value) in lines {
                writeln!(out, "{:<8}[{:#010x}]", name, value)?;
            }
            writeln!(out, "bit_bs  [{}]", desc.bs_bit)?;
            writeln!(out, "regval  [{:#010x}]", hw.regs.read(desc.regoff))?;
            for raw in 0..=genmask(desc.od_width) {
                match desc.od_encode.get(raw as usize).copied().filter(|&od| od > 0) {
                    Some(od) => writeln!(out, "od {}: [{}]", raw, od)?,
                    None => writeln!(out, "od {}: [unsupported]", raw)?,
                }
            }
            Ok(())
        };
        dump().map_err(|_| ClkError::NotSupported)
    }
}

fn gate_io<'a, R: RegisterIo>(hw: &'a Hw<R>, desc: &GateDesc) -> Result<&'a R, ClkError> {
    if desc.use_regmap {
        hw.regmap.as_ref().ok_or(ClkError::MissingRegmap)
    } else {
        Ok(&hw.regs)
    }
}

/// Opens or closes a gate bit, writing only when the value changes.
fn gate_update<R: RegisterIo>(io: &R, desc: &GateDesc, on: bool) {
    let old = io.read(desc.regoff);
    let value = if on == desc.invert {
        old | bit(desc.bit)
    } else {
        old & !bit(desc.bit)
    };
    if value != old {
        io.write(desc.regoff, value);
    }
}

fn pll_recalc(value: u32, desc: &PllDesc, parent_rate: u64) -> u64 {
    if value & bit(desc.on_bit) == 0 {
        return 0;
    }
    let m = field_get(value, desc.m_shift, genmask(desc.m_width)) as u64 + 1;
    let n = field_get(value, desc.n_shift, genmask(desc.n_width)) as u64 + 1;
    let raw_od = field_get(value, desc.od_shift, genmask(desc.od_width)) as usize;
    let od = desc.od_encode.get(raw_od).copied().unwrap_or(0) as u64;
    if od == 0 {
        return 0;
    }
    parent_rate * m * desc.div_step as u64 / (n * od)
}

fn cgu_is_exclk(xcdr: u32, desc: &CguDesc) -> bool {
    match (desc.cs_exclk, desc.mux) {
        (Some(exclk), Some(mux)) if mux.regoff == desc.regoff => {
            field_get(xcdr, mux.shift, mux.mask) == exclk
        }
        _ => false,
    }
}

fn cgu_recalc(xcdr: u32, desc: &CguDesc, parent_rate: u64) -> u64 {
    if cgu_is_exclk(xcdr, desc) {
        return parent_rate;
    }
    let div = (field_get(xcdr, desc.div.shift, desc.div.mask) as u64 + 1) * desc.div_step as u64;
    parent_rate.div_ceil(div)
}

/// Divider field value that runs the clock at or below `rate`, saturating
/// at the slowest setting the field holds.
fn cgu_cdr(desc: &CguDesc, rate: u64, parent_rate: u64) -> u32 {
    let step = rate.saturating_mul(desc.div_step as u64).max(1);
    let cdr = parent_rate.div_ceil(step).saturating_sub(1);
    cdr.min(desc.div.mask as u64) as u32
}

fn cgu_round(desc: &CguDesc, rate: u64, parent_rate: u64) -> u64 {
    let step = desc.div_step as u64;
    let div = parent_rate
        .div_ceil(rate.saturating_mul(step).max(1))
        .clamp(1, desc.div.mask as u64 + 1);
    parent_rate.div_ceil(div * step)
}

fn cgu_set_parent<R: RegisterIo>(
    io: &R,
    desc: &CguDesc,
    flags: ClkFlags,
    index: u32,
    rate: u64,
    parent_rate: u64,
) {
    let Some(mux) = desc.mux else { return };
    let mut xcdr = io.read(desc.regoff);
    if flags.contains(ClkFlags::SET_PARENT_GATE) && xcdr & bit(desc.stop_bit) == 0 {
        xcdr |= bit(desc.stop_bit);
        io.write(desc.regoff, xcdr | bit(desc.ce_bit));
    }
    if rate != 0 {
        let cdr = cgu_cdr(desc, rate, parent_rate);
        xcdr = field_set(xcdr, desc.div.shift, desc.div.mask, cdr);
    }
    xcdr &= !bit(desc.ce_bit);
    if mux.regoff == desc.regoff {
        io.write(desc.regoff, field_set(xcdr, mux.shift, mux.mask, index));
    } else {
        io.write(desc.regoff, xcdr);
        let sel = io.read(mux.regoff);
        io.write(mux.regoff, field_set(sel, mux.shift, mux.mask, index));
    }
}

fn cgu_set_rate<R: RegisterIo>(io: &R, desc: &CguDesc, flags: ClkFlags, rate: u64, parent_rate: u64) {
    let mut xcdr = io.read(desc.regoff);
    let mut gated = false;
    if flags.contains(ClkFlags::SET_RATE_GATE) && xcdr & bit(desc.stop_bit) == 0 {
        xcdr |= bit(desc.stop_bit);
        io.write(desc.regoff, xcdr | bit(desc.ce_bit));
        gated = true;
    }

    if cgu_is_exclk(xcdr, desc) {
        // Divider bypassed: only drop the change enable left by gating.
        if gated {
            io.write(desc.regoff, xcdr);
        }
        return;
    }

    let cdr = cgu_cdr(desc, rate, parent_rate);
    if cdr == field_get(xcdr, desc.div.shift, desc.div.mask) && !gated {
        return;
    }
    xcdr = field_set(xcdr, desc.div.shift, desc.div.mask, cdr) & !bit(desc.ce_bit);
    io.write(desc.regoff, xcdr);
}

fn cgu_enable<R: RegisterIo>(io: &R, desc: &CguDesc) -> Result<(), ClkError> {
    let stop = bit(desc.stop_bit);
    let ce = bit(desc.ce_bit);
    let mut xcdr = io.read(desc.regoff);

    if cgu_is_exclk(xcdr, desc) {
        // EXCLK passthrough: keep the divider stopped to save power.
        if xcdr & stop == 0 {
            xcdr |= stop;
            io.write(desc.regoff, xcdr | ce);
            io.write(desc.regoff, xcdr);
        }
        return Ok(());
    }

    // Left running by the bootloader.
    if xcdr & (stop | ce) == 0 {
        return Ok(());
    }

    xcdr = (xcdr & !stop) | ce;
    io.write(desc.regoff, xcdr);
    let settled = io.poll(desc.regoff, BUSY_WAIT_RETRIES, |v| v & bit(desc.busy_bit) == 0);
    io.write(desc.regoff, xcdr & !ce);
    if settled { Ok(()) } else { Err(ClkError::Timeout) }
}

fn cgu_disable<R: RegisterIo>(io: &R, desc: &CguDesc) {
    let stop = bit(desc.stop_bit);
    let ce = bit(desc.ce_bit);
    let xcdr = io.read(desc.regoff);
    if xcdr & stop != 0 {
        return;
    }
    io.write(desc.regoff, xcdr | ce | stop);
    io.write(desc.regoff, (xcdr | stop) & !ce);
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use super::*;
    use crate::clk::desc::{DivField, MuxField};
    use crate::regs::fake::FakeRegs;

    const REG: u32 = 0x74;

    const SFC_LIKE: CguDesc = CguDesc {
        regoff: REG,
        mux: Some(MuxField {
            regoff: REG,
            shift: 31,
            mask: 0x1,
            writable: true,
        }),
        cs_exclk: None,
        ce_bit: 29,
        busy_bit: 28,
        stop_bit: 27,
        div: DivField { shift: 0, mask: 0xff },
        div_step: 1,
    };

    static USB_LIKE: CguDesc = CguDesc {
        regoff: 0x50,
        mux: Some(MuxField {
            regoff: 0x50,
            shift: 30,
            mask: 0x3,
            writable: true,
        }),
        cs_exclk: Some(0),
        ce_bit: 29,
        busy_bit: 28,
        stop_bit: 27,
        div: DivField { shift: 0, mask: 0xff },
        div_step: 1,
    };

    /// Divider field away from bit 0, where a right-shifted write would land
    /// in the wrong place.
    static SHIFTED_DIV: CguDesc = CguDesc {
        div: DivField { shift: 4, mask: 0xf },
        ..SFC_LIKE
    };

    static MSC_LIKE: CguDesc = CguDesc {
        regoff: 0x68,
        mux: Some(MuxField {
            regoff: 0x68,
            shift: 31,
            mask: 0x1,
            writable: true,
        }),
        div_step: 2,
        ..SFC_LIKE
    };

    static APLL: PllDesc = PllDesc {
        regoff: 0x10,
        m_shift: 24,
        m_width: 7,
        n_shift: 18,
        n_width: 5,
        od_shift: 16,
        od_width: 2,
        en_bit: 8,
        on_bit: 10,
        bs_bit: 31,
        od_encode: &[1, 2, 4, 8],
        div_step: 1,
    };

    static PARENTS: [Parent; 2] = [
        Parent::Clock(ClockId::new(0)),
        Parent::Clock(ClockId::new(1)),
    ];

    fn hw() -> Hw<FakeRegs> {
        Hw {
            regs: FakeRegs::new(),
            regmap: None,
        }
    }

    fn cgu(desc: &'static CguDesc, flags: ClkFlags) -> ClkNode {
        ClkNode::new(&ClkInit {
            id: ClockId::new(7),
            name: "cgu_test",
            parents: &PARENTS,
            kind: ClkKind::Cgu {
                desc,
                access: CguAccess::Full,
            },
            flags,
            lock: LockKind::Shared,
        })
    }

    #[test]
    fn pll_rate_follows_fields() {
        let hw = hw();
        let node = ClkNode::new(&ClkInit {
            id: ClockId::new(2),
            name: "apll",
            parents: &PARENTS[..1],
            kind: ClkKind::Pll(&APLL),
            flags: ClkFlags::IGNORE_UNUSED,
            lock: LockKind::Unlocked,
        });
        // M = 41 + 1, N = 0 + 1, OD raw 0 -> 1: 24 MHz * 42 = 1008 MHz
        hw.regs.set(0x10, (41 << 24) | bit(10));
        assert_eq!(node.recalc_rate(&hw, 24 * MHZ), 1008 * MHZ);
        // OD raw 1 -> 2, N raw 1 -> 2
        hw.regs.set(0x10, (41 << 24) | (1 << 18) | (1 << 16) | bit(10));
        assert_eq!(node.recalc_rate(&hw, 24 * MHZ), 252 * MHZ);
        hw.regs.set(0x10, 41 << 24);
        assert_eq!(node.recalc_rate(&hw, 24 * MHZ), 0);
    }

    #[test]
    fn pll_dump_lists_od_table() {
        let hw = hw();
        let node = ClkNode::new(&ClkInit {
            id: ClockId::new(2),
            name: "apll",
            parents: &PARENTS[..1],
            kind: ClkKind::Pll(&APLL),
            flags: ClkFlags::empty(),
            lock: LockKind::Unlocked,
        });
        hw.regs.set(0x10, 0x2900_0400);
        let mut out = String::new();
        node.dump_pll(&hw, &mut out).unwrap();
        assert!(out.starts_with("apll hardware description:"));
        assert!(out.contains("regval  [0x29000400]"));
        assert!(out.contains("od 3: [8]"));
    }

    #[test]
    fn set_parent_round_trips_every_index() {
        let hw = hw();
        let node = cgu(&SFC_LIKE, ClkFlags::SET_PARENT_GATE);
        for idx in 0..PARENTS.len() {
            node.set_parent(&hw, idx, 0, 0).unwrap();
            assert_eq!(node.get_parent(&hw), idx);
        }
    }

    #[test]
    fn set_parent_rejects_index_before_writing() {
        let hw = hw();
        let node = cgu(&SFC_LIKE, ClkFlags::SET_PARENT_GATE);
        assert_eq!(node.set_parent(&hw, 2, 0, 0), Err(ClkError::InvalidParent(2)));
        assert_eq!(hw.regs.write_count(), 0);
    }

    #[test]
    fn set_parent_gates_running_clock_first() {
        let hw = hw();
        let node = cgu(&SFC_LIKE, ClkFlags::SET_PARENT_GATE);
        hw.regs.set(REG, 3);
        node.set_parent(&hw, 1, 100 * MHZ, 600 * MHZ).unwrap();
        let writes = hw.regs.writes_to(REG);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], 3 | bit(27) | bit(29));
        // cdr = ceil(600 / 100) - 1 = 5, CE dropped, new source selected
        assert_eq!(writes[1], 5 | bit(27) | bit(31));
    }

    #[test]
    fn set_rate_then_recalc_stays_in_band() {
        let hw = hw();
        for desc in [&SFC_LIKE, &MSC_LIKE] {
            let node = cgu(desc, ClkFlags::empty());
            for parent_rate in [24 * MHZ, 600 * MHZ, 1008 * MHZ] {
                for rate in [3_000_000, 12_345_678, 50 * MHZ, 24 * MHZ] {
                    let step = desc.div_step as u64;
                    if parent_rate < rate * step {
                        continue;
                    }
                    node.set_rate(&hw, rate, parent_rate).unwrap();
                    let got = node.recalc_rate(&hw, parent_rate);
                    let slowest = parent_rate.div_ceil((desc.div.mask as u64 + 1) * step);
                    if rate >= slowest {
                        assert!(got <= rate, "{} > {}", got, rate);
                        assert!(got > rate / 2, "{} <= {}/2", got, rate);
                    } else {
                        assert_eq!(got, slowest);
                    }
                }
            }
        }
    }

    #[test]
    fn set_rate_saturates_at_slowest_divider() {
        let hw = hw();
        let node = cgu(&SFC_LIKE, ClkFlags::empty());
        let parent_rate = 1008 * MHZ;
        // 1008 MHz / 256 = 3.9375 MHz is the slowest the 8-bit field reaches.
        let bound = parent_rate / 256;
        node.set_rate(&hw, bound, parent_rate).unwrap();
        assert_eq!(hw.regs.get(REG) & 0xff, 0xff);
        assert!(node.recalc_rate(&hw, parent_rate) <= bound);

        for rate in [bound - 1, 3 * MHZ, 1 * MHZ, 1] {
            node.set_rate(&hw, rate, parent_rate).unwrap();
            assert_eq!(hw.regs.get(REG) & 0xff, 0xff);
            assert_eq!(node.recalc_rate(&hw, parent_rate), bound);
            assert_eq!(node.round_rate(rate, parent_rate), Ok(Some(bound)));
        }

        let msc = cgu(&MSC_LIKE, ClkFlags::empty());
        msc.set_rate(&hw, 1 * MHZ, parent_rate).unwrap();
        assert_eq!(hw.regs.get(0x68) & 0xff, 0xff);
        assert_eq!(msc.recalc_rate(&hw, parent_rate), parent_rate.div_ceil(512));
    }

    #[test]
    fn huge_rate_requests_do_not_overflow() {
        let hw = hw();
        let node = cgu(&MSC_LIKE, ClkFlags::empty());
        assert_eq!(node.round_rate(u64::MAX, 600 * MHZ), Ok(Some(300 * MHZ)));
        node.set_rate(&hw, u64::MAX, 600 * MHZ).unwrap();
        assert_eq!(node.recalc_rate(&hw, 600 * MHZ), 300 * MHZ);
    }

    #[test]
    fn set_rate_skips_unchanged_divider() {
        let hw = hw();
        let node = cgu(&SFC_LIKE, ClkFlags::empty());
        hw.regs.set(REG, 5);
        node.set_rate(&hw, 100 * MHZ, 600 * MHZ).unwrap();
        assert_eq!(hw.regs.write_count(), 0);
        node.set_rate(&hw, 50 * MHZ, 600 * MHZ).unwrap();
        assert_eq!(hw.regs.get(REG), 11);
    }

    #[test]
    fn set_rate_gate_rewrites_even_when_unchanged() {
        let hw = hw();
        let node = cgu(&SFC_LIKE, ClkFlags::SET_RATE_GATE);
        hw.regs.set(REG, 5);
        node.set_rate(&hw, 100 * MHZ, 600 * MHZ).unwrap();
        let writes = hw.regs.writes_to(REG);
        assert_eq!(writes, [5 | bit(27) | bit(29), 5 | bit(27)]);
    }

    #[test]
    fn divider_write_shifts_field_left() {
        // The divider is written as (cdr & mask) << shift, mirroring how it is
        // read back. A right shift would only agree with this when the field
        // sits at bit 0, as every X1000 CGU divider does.
        let hw = hw();
        let node = cgu(&SHIFTED_DIV, ClkFlags::empty());
        node.set_rate(&hw, 100 * MHZ, 600 * MHZ).unwrap();
        assert_eq!(hw.regs.get(REG), 5 << 4);
        assert_eq!(node.recalc_rate(&hw, 600 * MHZ), 100 * MHZ);
    }

    #[test]
    fn round_rate_matches_programmed_rate() {
        let node = cgu(&MSC_LIKE, ClkFlags::empty());
        let hw = hw();
        let rounded = node.round_rate(50 * MHZ, 600 * MHZ).unwrap().unwrap();
        node.set_rate(&hw, rounded, 600 * MHZ).unwrap();
        assert_eq!(node.recalc_rate(&hw, 600 * MHZ), rounded);
        assert_eq!(node.round_rate(0, 600 * MHZ), Err(ClkError::InvalidRate(0)));
    }

    #[test]
    fn enable_waits_for_busy_and_drops_ce() {
        let hw = hw();
        let node = cgu(&SFC_LIKE, ClkFlags::empty());
        hw.regs.set(REG, bit(27) | 5);
        node.enable(&hw).unwrap();
        assert_eq!(hw.regs.writes_to(REG), [5 | bit(29), 5]);
        assert_eq!(node.is_enabled(&hw), Some(true));
    }

    #[test]
    fn enable_times_out_on_stuck_busy() {
        let hw = hw();
        let node = cgu(&SFC_LIKE, ClkFlags::empty());
        hw.regs.set(REG, bit(27));
        hw.regs.force_bits(REG, bit(28));
        assert_eq!(node.enable(&hw), Err(ClkError::Timeout));
        assert_eq!(hw.regs.get(REG) & bit(29), 0);
    }

    #[test]
    fn disable_sets_stop_through_ce() {
        let hw = hw();
        let node = cgu(&SFC_LIKE, ClkFlags::empty());
        hw.regs.set(REG, 5);
        node.disable(&hw);
        assert_eq!(hw.regs.writes_to(REG), [5 | bit(27) | bit(29), 5 | bit(27)]);
        assert_eq!(node.is_enabled(&hw), Some(false));
        node.disable(&hw);
        assert_eq!(hw.regs.writes_to(REG).len(), 2);
    }

    #[test]
    fn exclk_passthrough_is_always_enabled() {
        let hw = hw();
        let node = cgu(&USB_LIKE, ClkFlags::empty());
        hw.regs.set(0x50, bit(27) | 7);
        assert_eq!(node.is_enabled(&hw), Some(true));
        assert_eq!(node.recalc_rate(&hw, 24 * MHZ), 24 * MHZ);

        // Enable never touches the busy handshake.
        hw.regs.force_bits(0x50, bit(28));
        node.enable(&hw).unwrap();
        assert_eq!(hw.regs.write_count(), 0);

        // Nor does set_rate rewrite the divider.
        node.set_rate(&hw, MHZ, 24 * MHZ).unwrap();
        assert_eq!(hw.regs.write_count(), 0);
        assert_eq!(hw.regs.get(0x50) & 0xff, 7);
    }

    #[test]
    fn exclk_enable_stops_running_divider() {
        let hw = hw();
        let node = cgu(&USB_LIKE, ClkFlags::empty());
        hw.regs.set(0x50, 7);
        node.enable(&hw).unwrap();
        assert_eq!(hw.regs.writes_to(0x50), [7 | bit(27) | bit(29), 7 | bit(27)]);
    }

    #[test]
    fn gate_polarity() {
        static NORMAL: GateDesc = GateDesc::new(0x20, 2);
        static INVERTED: GateDesc = GateDesc::new(0x20, 5).inverted();
        let hw = hw();
        let mk = |desc: &'static GateDesc| {
            ClkNode::new(&ClkInit {
                id: ClockId::new(9),
                name: "gate",
                parents: &PARENTS[..1],
                kind: ClkKind::Gate(desc),
                flags: ClkFlags::empty(),
                lock: LockKind::Shared,
            })
        };
        let normal = mk(&NORMAL);
        let inverted = mk(&INVERTED);
        hw.regs.set(0x20, bit(2));
        assert_eq!(normal.is_enabled(&hw), Some(false));
        assert_eq!(inverted.is_enabled(&hw), Some(false));
        normal.enable(&hw).unwrap();
        inverted.enable(&hw).unwrap();
        assert_eq!(hw.regs.get(0x20), bit(5));
        assert_eq!(normal.is_enabled(&hw), Some(true));
        assert_eq!(inverted.is_enabled(&hw), Some(true));
        // Already open: no write.
        let before = hw.regs.write_count();
        normal.enable(&hw).unwrap();
        assert_eq!(hw.regs.write_count(), before);
    }

    #[test]
    fn regmap_gate_without_regmap_fails() {
        static OPCR_GATE: GateDesc = GateDesc::regmap(0x24, 23);
        let hw = hw();
        let node = ClkNode::new(&ClkInit {
            id: ClockId::new(9),
            name: "gate_usbphy",
            parents: &PARENTS[..1],
            kind: ClkKind::Gate(&OPCR_GATE),
            flags: ClkFlags::empty(),
            lock: LockKind::Shared,
        });
        assert_eq!(node.enable(&hw), Err(ClkError::MissingRegmap));
        assert_eq!(node.is_enabled(&hw), None);
    }
}
