//! The clock registry.
//!
//! Nodes are built from a static table in two passes: every node is first
//! registered under its ID (parents must already be registered), then gate
//! associations are bound as indices into the same arena. After that the
//! tree is only read; per-node state sits behind the node's own locks, so a
//! shared `&ClkTree` serves every consumer.
//!
//! Usage counting follows the usual provider framework rules: the first
//! prepare/enable of a node propagates to its active parent before touching
//! the hardware, and the last unprepare/disable propagates after it.

use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use log::{debug, error, info, warn};

use super::desc::{ClkFlags, ClkInit, ClkKind, LockKind, Parent};
use super::node::{ClkNode, Hw};
use super::{ClkError, ClockId};
use crate::regs::RegisterIo;

const DUMMY_STOP_NAME: &str = "dummy_stop";
const DUMMY_UNKNOWN_NAME: &str = "dummy_unknown";

/// A root clock whose rate comes from the board.
#[derive(Debug, Clone, Copy)]
pub struct FixedClk {
    pub id: ClockId,
    pub name: &'static str,
    pub rate: u64,
}

pub struct ClkTree<R> {
    hw: Hw<R>,
    nodes: Vec<Option<ClkNode>>,
}

impl<R: RegisterIo> ClkTree<R> {
    /// An empty tree with room for `nr_clks` IDs.
    ///
    /// `regmap` is the PM register window used by regmap gates.
    pub fn new(regs: R, regmap: Option<R>, nr_clks: usize) -> Self {
        let mut nodes = Vec::with_capacity(nr_clks);
        nodes.resize_with(nr_clks, || None);
        Self {
            hw: Hw { regs, regmap },
            nodes,
        }
    }

    /// Builds a complete tree: fixed roots, then `table` in order, then gate
    /// associations. Nodes that fail to register are logged and left out.
    pub fn build(
        regs: R,
        regmap: Option<R>,
        nr_clks: usize,
        fixed: &[FixedClk],
        table: &[ClkInit],
    ) -> Self {
        let mut tree = Self::new(regs, regmap, nr_clks);
        for clk in fixed {
            if let Err(e) = tree.register_fixed(clk) {
                error!("{}: no external clock: {}", clk.name, e);
            }
        }
        tree.register_all(table);
        tree.bind_associations();
        tree
    }

    pub fn register_fixed(&mut self, clk: &FixedClk) -> Result<(), ClkError> {
        self.register(&ClkInit {
            id: clk.id,
            name: clk.name,
            parents: &[],
            kind: ClkKind::Fixed { rate: clk.rate },
            flags: ClkFlags::IGNORE_UNUSED,
            lock: LockKind::Unlocked,
        })
    }

    /// Registers one node. Every real parent must already be registered.
    pub fn register(&mut self, init: &ClkInit) -> Result<(), ClkError> {
        let slot = init.id.index();
        match self.nodes.get(slot) {
            None => {
                warn!("clk id {} is beyond {} clocks", init.id, self.nodes.len());
                return Err(ClkError::InvalidId(init.id));
            }
            Some(Some(_)) => return Err(ClkError::InvalidId(init.id)),
            Some(None) => {}
        }
        for parent in init.parents.iter().filter_map(|p| p.id()) {
            if self.get(parent).is_none() {
                return Err(ClkError::UnknownParent(parent));
            }
        }
        if let ClkKind::Gate(desc) = init.kind {
            if desc.use_regmap && self.hw.regmap.is_none() {
                return Err(ClkError::MissingRegmap);
            }
        }
        self.nodes[slot] = Some(ClkNode::new(init));
        debug!("registered clk {} [{}]", init.name, init.id);
        Ok(())
    }

    pub fn register_all(&mut self, table: &[ClkInit]) {
        for init in table {
            if let Err(e) = self.register(init) {
                error!("{} clk register failed: {}", init.name, e);
            }
        }
    }

    /// Second pass: resolves each gate's association to a live gate.
    ///
    /// A binding is dropped (and logged) if the target is not a registered
    /// gate, is the gate itself, or could lead back to the gate.
    pub fn bind_associations(&mut self) {
        for slot in 0..self.nodes.len() {
            let Some(node) = self.nodes[slot].as_ref() else {
                continue;
            };
            let Some(target) = node.gate_desc().and_then(|desc| desc.assoc) else {
                continue;
            };
            if let Err(e) = self.check_association(node.id(), target) {
                error!("{}: {}", node.name(), e);
                continue;
            }
            if let Some(node) = self.nodes[slot].as_mut() {
                node.assoc = Some(target);
            }
        }
    }

    fn check_association(&self, source: ClockId, target: ClockId) -> Result<(), ClkError> {
        let is_gate = self.get(target).is_some_and(|t| t.gate_desc().is_some());
        if target == source || !is_gate || self.reaches(target, source) {
            return Err(ClkError::BadAssociation(target));
        }
        Ok(())
    }

    /// Whether `to` is reachable from `from` through parents or bound
    /// associations.
    fn reaches(&self, from: ClockId, to: ClockId) -> bool {
        let mut seen = alloc::vec![false; self.nodes.len()];
        let mut stack = alloc::vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            let Some(node) = self.get(id) else { continue };
            if core::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            stack.extend(node.parents().iter().filter_map(|p| p.id()));
            stack.extend(node.assoc());
        }
        false
    }

    pub fn nr_clks(&self) -> usize {
        self.nodes.len()
    }

    pub fn regs(&self) -> &R {
        &self.hw.regs
    }

    pub fn get(&self, id: ClockId) -> Option<&ClkNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    fn node(&self, id: ClockId) -> Result<&ClkNode, ClkError> {
        self.get(id).ok_or_else(|| {
            warn!("Unsupported clock ID: {:?}", id);
            ClkError::InvalidId(id)
        })
    }

    pub fn lookup(&self, name: &str) -> Option<ClockId> {
        self.nodes.iter().flatten().find(|n| n.name() == name).map(ClkNode::id)
    }

    pub fn name(&self, id: ClockId) -> Result<&'static str, ClkError> {
        Ok(self.node(id)?.name())
    }

    /// Names of the parent table slots, with placeholders for dummy slots.
    pub fn parent_names(&self, id: ClockId) -> Result<Vec<&'static str>, ClkError> {
        let node = self.node(id)?;
        Ok(node
            .parents()
            .iter()
            .map(|parent| match parent {
                Parent::Clock(pid) => self.get(*pid).map_or(DUMMY_UNKNOWN_NAME, ClkNode::name),
                Parent::DummyStop => DUMMY_STOP_NAME,
                Parent::DummyUnknown => DUMMY_UNKNOWN_NAME,
            })
            .collect())
    }

    fn parent_index(&self, node: &ClkNode) -> usize {
        if node.parents().len() > 1 {
            node.get_parent(&self.hw)
        } else {
            0
        }
    }

    /// The registered clock feeding `node`, if any.
    fn active_parent(&self, node: &ClkNode) -> Option<ClockId> {
        let pid = node.parents().get(self.parent_index(node))?.id()?;
        self.get(pid).map(ClkNode::id)
    }

    /// Index of the active parent in the node's parent table.
    pub fn get_parent(&self, id: ClockId) -> Result<usize, ClkError> {
        Ok(self.parent_index(self.node(id)?))
    }

    /// The active parent, or `None` for roots and orphans.
    pub fn parent(&self, id: ClockId) -> Result<Option<ClockId>, ClkError> {
        Ok(self.active_parent(self.node(id)?))
    }

    fn rate_of(&self, node: &ClkNode) -> u64 {
        let parent_rate = self
            .active_parent(node)
            .and_then(|pid| self.get(pid))
            .map_or(0, |parent| self.rate_of(parent));
        node.recalc_rate(&self.hw, parent_rate)
    }

    fn parent_rate(&self, node: &ClkNode) -> u64 {
        self.active_parent(node)
            .and_then(|pid| self.get(pid))
            .map_or(0, |parent| self.rate_of(parent))
    }

    /// Current rate, read back from hardware through the whole parent chain.
    /// Orphans (dummy or missing parent) run at 0.
    pub fn get_rate(&self, id: ClockId) -> Result<u64, ClkError> {
        Ok(self.rate_of(self.node(id)?))
    }

    /// The rate `set_rate(id, rate)` would actually program.
    pub fn round_rate(&self, id: ClockId, rate: u64) -> Result<u64, ClkError> {
        let node = self.node(id)?;
        let parent_rate = self.parent_rate(node);
        match node.round_rate(rate, parent_rate)? {
            Some(rounded) => Ok(rounded),
            None => Ok(self.rate_of(node)),
        }
    }

    pub fn set_rate(&self, id: ClockId, rate: u64) -> Result<(), ClkError> {
        let node = self.node(id)?;
        if !node.can_set_rate() {
            return Err(ClkError::NotSupported);
        }
        if rate == 0 {
            return Err(ClkError::InvalidRate(rate));
        }
        if node.flags().contains(ClkFlags::SET_RATE_GATE) && node.usage.lock().prepare > 0 {
            return Err(ClkError::Busy);
        }
        let parent_rate = self.parent_rate(node);
        let new_rate = node.round_rate(rate, parent_rate)?.unwrap_or(rate);
        node.set_rate(&self.hw, new_rate, parent_rate)?;
        debug!("{}: rate {} Hz (asked {} Hz, parent {} Hz)", node.name(), new_rate, rate, parent_rate);
        Ok(())
    }

    /// Switches `id` to parent slot `index`.
    ///
    /// If the clock is prepared or enabled, the new parent takes over those
    /// counts before the switch and the old parent drops them afterwards.
    /// Clocks flagged `SET_PARENT_GATE` can only be switched while unprepared.
    pub fn set_parent(&self, id: ClockId, index: usize) -> Result<(), ClkError> {
        let node = self.node(id)?;
        if !node.can_set_parent() {
            return Err(ClkError::NotSupported);
        }
        let new_parent = node
            .parents()
            .get(index)
            .ok_or(ClkError::InvalidParent(index))?
            .id()
            .ok_or(ClkError::OrphanParent)?;
        let new = self.node(new_parent)?;
        if self.parent_index(node) == index {
            return Ok(());
        }

        let usage = node.usage.lock();
        let prepared = usage.prepare > 0;
        let enabled = usage.enable > 0;
        if prepared && node.flags().contains(ClkFlags::SET_PARENT_GATE) {
            return Err(ClkError::Busy);
        }

        let old_parent = self.active_parent(node);
        let rate = self.rate_of(node);
        let parent_rate = self.rate_of(new);

        if prepared {
            self.prepare(new_parent)?;
        }
        if enabled {
            if let Err(e) = self.enable(new_parent) {
                if prepared {
                    self.release_prepare(new_parent);
                }
                return Err(e);
            }
        }
        if let Err(e) = node.set_parent(&self.hw, index, rate, parent_rate) {
            if enabled {
                self.release_enable(new_parent);
            }
            if prepared {
                self.release_prepare(new_parent);
            }
            return Err(e);
        }
        if let Some(old) = old_parent {
            if enabled {
                self.release_enable(old);
            }
            if prepared {
                self.release_prepare(old);
            }
        }
        drop(usage);
        info!("{}: reparented to {}", node.name(), new.name());
        Ok(())
    }

    pub fn prepare(&self, id: ClockId) -> Result<(), ClkError> {
        let node = self.node(id)?;
        let mut usage = node.usage.lock();
        if usage.prepare == 0 {
            let parent = self.active_parent(node);
            if let Some(parent) = parent {
                self.prepare(parent)?;
            }
            if let Err(e) = self.prepare_assoc(node) {
                if let Some(parent) = parent {
                    self.release_prepare(parent);
                }
                return Err(e);
            }
        }
        usage.prepare += 1;
        Ok(())
    }

    fn prepare_assoc(&self, node: &ClkNode) -> Result<(), ClkError> {
        let forwards = node.gate_desc().is_some_and(|desc| desc.prepare);
        if let (true, Some(assoc)) = (forwards, node.assoc()) {
            self.prepare(assoc)?;
            node.assoc_prepare.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn unprepare(&self, id: ClockId) -> Result<(), ClkError> {
        let node = self.node(id)?;
        let mut usage = node.usage.lock();
        if usage.prepare == 0 {
            warn!("{} already unprepared", node.name());
            return Ok(());
        }
        if usage.prepare == 1 && usage.enable > 0 {
            warn!("{} unprepared while still enabled", node.name());
        }
        usage.prepare -= 1;
        if usage.prepare == 0 {
            if take_one(&node.assoc_prepare) {
                if let Some(assoc) = node.assoc() {
                    self.release_prepare(assoc);
                }
            }
            if let Some(parent) = self.active_parent(node) {
                self.release_prepare(parent);
            }
        }
        Ok(())
    }

    pub fn enable(&self, id: ClockId) -> Result<(), ClkError> {
        let node = self.node(id)?;
        let mut usage = node.usage.lock();
        if usage.prepare == 0 {
            warn!("{} enabled before prepare", node.name());
            return Err(ClkError::NotPrepared);
        }
        if usage.enable == 0 {
            let parent = self.active_parent(node);
            if let Some(parent) = parent {
                self.enable(parent)?;
            }
            if let Err(e) = self.enable_hw(node) {
                if let Some(parent) = parent {
                    self.release_enable(parent);
                }
                return Err(e);
            }
        }
        usage.enable += 1;
        Ok(())
    }

    /// Hardware enable plus the forward to an associated gate.
    fn enable_hw(&self, node: &ClkNode) -> Result<(), ClkError> {
        node.enable(&self.hw)?;
        if let Some(assoc) = node.assoc() {
            if let Err(e) = self.enable(assoc) {
                node.disable(&self.hw);
                return Err(e);
            }
            node.assoc_enable.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn disable(&self, id: ClockId) -> Result<(), ClkError> {
        let node = self.node(id)?;
        let mut usage = node.usage.lock();
        if usage.enable == 0 {
            warn!("{} already disabled", node.name());
            return Ok(());
        }
        usage.enable -= 1;
        if usage.enable == 0 {
            node.disable(&self.hw);
            if take_one(&node.assoc_enable) {
                if let Some(assoc) = node.assoc() {
                    self.release_enable(assoc);
                }
            }
            if let Some(parent) = self.active_parent(node) {
                self.release_enable(parent);
            }
        }
        Ok(())
    }

    // Parents and associations are registered nodes, so their ID is valid.
    fn release_enable(&self, id: ClockId) {
        if let Err(e) = self.disable(id) {
            warn!("{}: releasing enable failed: {}", id, e);
        }
    }

    fn release_prepare(&self, id: ClockId) {
        if let Err(e) = self.unprepare(id) {
            warn!("{}: releasing prepare failed: {}", id, e);
        }
    }

    pub fn prepare_enable(&self, id: ClockId) -> Result<(), ClkError> {
        self.prepare(id)?;
        if let Err(e) = self.enable(id) {
            self.release_prepare(id);
            return Err(e);
        }
        Ok(())
    }

    pub fn disable_unprepare(&self, id: ClockId) -> Result<(), ClkError> {
        self.disable(id)?;
        self.unprepare(id)
    }

    /// Hardware state for gated clocks, usage count otherwise.
    pub fn is_enabled(&self, id: ClockId) -> Result<bool, ClkError> {
        let node = self.node(id)?;
        Ok(node
            .is_enabled(&self.hw)
            .unwrap_or_else(|| node.usage.lock().enable > 0))
    }

    pub fn enable_count(&self, id: ClockId) -> Result<u32, ClkError> {
        Ok(self.node(id)?.usage.lock().enable)
    }

    pub fn prepare_count(&self, id: ClockId) -> Result<u32, ClkError> {
        Ok(self.node(id)?.usage.lock().prepare)
    }

    /// Gates every clock nobody holds that is still running, leaves first.
    /// Clocks flagged `IGNORE_UNUSED` are left alone.
    pub fn disable_unused(&self) {
        for node in self.nodes.iter().rev().flatten() {
            if node.flags().contains(ClkFlags::IGNORE_UNUSED) || !node.can_gate() {
                continue;
            }
            let usage = node.usage.lock();
            if usage.prepare > 0 || usage.enable > 0 {
                continue;
            }
            if node.is_enabled(&self.hw) == Some(true) {
                info!("disabling unused clock {}", node.name());
                node.disable(&self.hw);
            }
        }
    }

    pub fn dump_pll(&self, id: ClockId, out: &mut dyn fmt::Write) -> Result<(), ClkError> {
        self.node(id)?.dump_pll(&self.hw, out)
    }
}

/// Decrements `count` unless it is already zero.
fn take_one(count: &AtomicU32) -> bool {
    count
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_sub(1))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clk::desc::{CguAccess, CguDesc, DivField, GateDesc, MuxField, SsiDesc};
    use crate::clk::{CpccrDesc, MHZ};
    use crate::regs::bit;
    use crate::regs::fake::FakeRegs;

    const OSC: ClockId = ClockId::new(0);
    const PLL: ClockId = ClockId::new(1);
    const CGU: ClockId = ClockId::new(2);
    const GATE_A: ClockId = ClockId::new(3);
    const GATE_B: ClockId = ClockId::new(4);
    const SSI: ClockId = ClockId::new(5);
    const GATE_C: ClockId = ClockId::new(6);
    const GATE_D: ClockId = ClockId::new(7);
    const BUS_MUX: ClockId = ClockId::new(8);
    const BUS_DIV: ClockId = ClockId::new(9);
    const FORWARD: ClockId = ClockId::new(10);
    const SELF_ASSOC: ClockId = ClockId::new(11);
    const CGU_ASSOC: ClockId = ClockId::new(12);
    const AUDIO: ClockId = ClockId::new(13);
    const LOOP_A: ClockId = ClockId::new(14);
    const LOOP_B: ClockId = ClockId::new(15);
    const NR: usize = 16;

    const CDR: u32 = 0x74;
    const GR: u32 = 0x20;

    static CGU_DESC: CguDesc = CguDesc {
        regoff: CDR,
        mux: Some(MuxField {
            regoff: CDR,
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
    static SSI_DESC: SsiDesc = SsiDesc { regoff: CDR, bit: 30 };
    static GATE_A_DESC: GateDesc = GateDesc::new(GR, 0).with_assoc(GATE_B, false);
    static GATE_B_DESC: GateDesc = GateDesc::new(GR, 1);
    static GATE_C_DESC: GateDesc = GateDesc::new(GR, 2).with_assoc(GATE_D, true);
    static GATE_D_DESC: GateDesc = GateDesc::new(GR, 3);
    static SELF_DESC: GateDesc = GateDesc::new(GR, 4).with_assoc(SELF_ASSOC, false);
    static CGU_ASSOC_DESC: GateDesc = GateDesc::new(GR, 5).with_assoc(CGU, false);
    static LOOP_A_DESC: GateDesc = GateDesc::new(GR, 6).with_assoc(LOOP_B, false);
    static LOOP_B_DESC: GateDesc = GateDesc::new(GR, 7).with_assoc(LOOP_A, false);
    static BUS_MUX_DESC: CpccrDesc = CpccrDesc { regoff: 0, shift: 30, mask: 0x3 };
    static BUS_DIV_DESC: CpccrDesc = CpccrDesc { regoff: 0, shift: 0, mask: 0xf };
    static AUDIO_MUX: MuxField = MuxField {
        regoff: 0x60,
        shift: 30,
        mask: 0x3,
        writable: true,
    };

    static P_PLL_OSC: [Parent; 2] = [Parent::Clock(PLL), Parent::Clock(OSC)];
    static P_OSC_CGU: [Parent; 2] = [Parent::Clock(OSC), Parent::Clock(CGU)];
    static P_CGU: [Parent; 1] = [Parent::Clock(CGU)];
    static P_OSC: [Parent; 1] = [Parent::Clock(OSC)];
    static P_BUS: [Parent; 4] = [
        Parent::DummyStop,
        Parent::Clock(OSC),
        Parent::Clock(PLL),
        Parent::DummyUnknown,
    ];
    static P_BUS_MUX: [Parent; 1] = [Parent::Clock(BUS_MUX)];
    static P_FORWARD: [Parent; 1] = [Parent::Clock(ClockId::new(15))];
    static P_AUDIO: [Parent; 3] = [Parent::Clock(PLL), Parent::Clock(OSC), Parent::DummyUnknown];

    const fn init(
        id: ClockId,
        name: &'static str,
        parents: &'static [Parent],
        kind: ClkKind,
        flags: ClkFlags,
    ) -> ClkInit {
        ClkInit {
            id,
            name,
            parents,
            kind,
            flags,
            lock: LockKind::Shared,
        }
    }

    static TABLE: [ClkInit; 14] = [
        init(
            CGU,
            "cgu",
            &P_PLL_OSC,
            ClkKind::Cgu {
                desc: &CGU_DESC,
                access: CguAccess::Full,
            },
            ClkFlags::SET_PARENT_GATE,
        ),
        init(GATE_B, "gate_b", &P_OSC, ClkKind::Gate(&GATE_B_DESC), ClkFlags::empty()),
        init(GATE_A, "gate_a", &P_CGU, ClkKind::Gate(&GATE_A_DESC), ClkFlags::empty()),
        init(SSI, "ssi", &P_OSC_CGU, ClkKind::Ssi(&SSI_DESC), ClkFlags::empty()),
        init(GATE_D, "gate_d", &P_OSC, ClkKind::Gate(&GATE_D_DESC), ClkFlags::empty()),
        init(GATE_C, "gate_c", &P_OSC, ClkKind::Gate(&GATE_C_DESC), ClkFlags::empty()),
        init(BUS_MUX, "bus_mux", &P_BUS, ClkKind::CpccrMux(&BUS_MUX_DESC), ClkFlags::empty()),
        init(BUS_DIV, "bus", &P_BUS_MUX, ClkKind::CpccrDiv(&BUS_DIV_DESC), ClkFlags::empty()),
        init(FORWARD, "forward", &P_FORWARD, ClkKind::Gate(&GATE_B_DESC), ClkFlags::empty()),
        init(SELF_ASSOC, "self_assoc", &P_OSC, ClkKind::Gate(&SELF_DESC), ClkFlags::empty()),
        init(CGU_ASSOC, "cgu_assoc", &P_OSC, ClkKind::Gate(&CGU_ASSOC_DESC), ClkFlags::empty()),
        init(AUDIO, "audio", &P_AUDIO, ClkKind::Audio(&AUDIO_MUX), ClkFlags::empty()),
        init(LOOP_A, "loop_a", &P_OSC, ClkKind::Gate(&LOOP_A_DESC), ClkFlags::empty()),
        init(LOOP_B, "loop_b", &P_OSC, ClkKind::Gate(&LOOP_B_DESC), ClkFlags::empty()),
    ];

    fn tree() -> ClkTree<FakeRegs> {
        let regs = FakeRegs::new();
        // All CLKGR gates closed, CGU stopped.
        regs.set(GR, u32::MAX);
        regs.set(CDR, bit(27));
        ClkTree::build(
            regs,
            None,
            NR,
            &[
                FixedClk { id: OSC, name: "osc", rate: 24 * MHZ },
                FixedClk { id: PLL, name: "pll", rate: 600 * MHZ },
            ],
            &TABLE,
        )
    }

    #[test]
    fn forward_reference_fails_only_that_node() {
        let tree = tree();
        assert!(tree.get(FORWARD).is_none());
        assert_eq!(tree.get_rate(FORWARD), Err(ClkError::InvalidId(FORWARD)));
        assert!(tree.get(LOOP_B).is_some());
        assert_eq!(tree.lookup("gate_a"), Some(GATE_A));
    }

    #[test]
    fn association_binding_is_validated() {
        let tree = tree();
        assert_eq!(tree.get(GATE_A).unwrap().assoc(), Some(GATE_B));
        assert_eq!(tree.get(GATE_C).unwrap().assoc(), Some(GATE_D));
        assert_eq!(tree.get(SELF_ASSOC).unwrap().assoc(), None);
        assert_eq!(tree.get(CGU_ASSOC).unwrap().assoc(), None);
        // Only the second of a two-gate cycle is refused.
        assert_eq!(tree.get(LOOP_A).unwrap().assoc(), Some(LOOP_B));
        assert_eq!(tree.get(LOOP_B).unwrap().assoc(), None);
    }

    #[test]
    fn rates_follow_the_chain() {
        let tree = tree();
        tree.regs().set(CDR, bit(27) | 5);
        assert_eq!(tree.get_rate(CGU), Ok(100 * MHZ));
        assert_eq!(tree.get_rate(GATE_A), Ok(100 * MHZ));
        // SSI on its second parent halves the CGU rate.
        tree.regs().set(CDR, bit(27) | bit(30) | 5);
        assert_eq!(tree.get_parent(SSI), Ok(1));
        assert_eq!(tree.get_rate(SSI), Ok(50 * MHZ));
        assert_eq!(tree.get_rate(AUDIO), Ok(24 * MHZ));
    }

    #[test]
    fn dummy_parents_are_orphans() {
        let tree = tree();
        assert_eq!(
            tree.parent_names(BUS_MUX).unwrap(),
            ["dummy_stop", "osc", "pll", "dummy_unknown"]
        );
        tree.regs().set(0, 0);
        assert_eq!(tree.parent(BUS_MUX), Ok(None));
        assert_eq!(tree.get_rate(BUS_DIV), Ok(0));
        tree.regs().set(0, (2 << 30) | 2);
        assert_eq!(tree.get_rate(BUS_DIV), Ok(200 * MHZ));
        tree.regs().set(0, 3 << 30);
        assert_eq!(tree.get_rate(BUS_MUX), Ok(0));
    }

    #[test]
    fn enable_requires_prepare() {
        let tree = tree();
        assert_eq!(tree.enable(GATE_B), Err(ClkError::NotPrepared));
        tree.prepare(GATE_B).unwrap();
        tree.enable(GATE_B).unwrap();
        assert!(tree.is_enabled(GATE_B).unwrap());
        assert_eq!(tree.enable_count(OSC), Ok(1));
        tree.disable_unprepare(GATE_B).unwrap();
        assert!(!tree.is_enabled(GATE_B).unwrap());
        assert_eq!(tree.enable_count(OSC), Ok(0));
        assert_eq!(tree.prepare_count(OSC), Ok(0));
    }

    #[test]
    fn enable_propagates_to_parents() {
        let tree = tree();
        tree.regs().set(CDR, bit(27) | 5);
        tree.prepare_enable(GATE_A).ok();
        // gate_a's association needs gate_b prepared first.
        assert_eq!(tree.enable_count(CGU), Ok(0));
        tree.prepare(GATE_B).unwrap();
        tree.prepare_enable(GATE_A).unwrap();
        assert_eq!(tree.enable_count(CGU), Ok(1));
        assert_eq!(tree.enable_count(PLL), Ok(1));
        assert!(tree.is_enabled(CGU).unwrap());
        tree.disable_unprepare(GATE_A).unwrap();
        assert_eq!(tree.enable_count(CGU), Ok(0));
        assert!(!tree.is_enabled(CGU).unwrap());
    }

    #[test]
    fn association_holds_target_until_last_disable() {
        let tree = tree();
        tree.prepare(GATE_B).unwrap();
        let before = tree.is_enabled(GATE_B).unwrap();
        assert!(!before);

        tree.prepare(GATE_A).unwrap();
        for _ in 0..3 {
            tree.enable(GATE_A).unwrap();
        }
        assert!(tree.is_enabled(GATE_B).unwrap());
        for _ in 0..2 {
            tree.disable(GATE_A).unwrap();
        }
        assert!(tree.is_enabled(GATE_B).unwrap());
        tree.disable(GATE_A).unwrap();
        assert_eq!(tree.is_enabled(GATE_B).unwrap(), before);
        assert_eq!(tree.enable_count(GATE_B), Ok(0));

        // Extra disables never drive the counts negative.
        tree.disable(GATE_A).unwrap();
        assert_eq!(tree.enable_count(GATE_B), Ok(0));
    }

    #[test]
    fn association_forwards_prepare_when_asked() {
        let tree = tree();
        tree.prepare_enable(GATE_C).unwrap();
        assert_eq!(tree.prepare_count(GATE_D), Ok(1));
        assert_eq!(tree.enable_count(GATE_D), Ok(1));
        assert_eq!(tree.regs().get(GR) & (bit(2) | bit(3)), 0);
        tree.disable_unprepare(GATE_C).unwrap();
        assert_eq!(tree.prepare_count(GATE_D), Ok(0));
        assert_eq!(tree.enable_count(GATE_D), Ok(0));
        assert_eq!(tree.regs().get(GR) & (bit(2) | bit(3)), bit(2) | bit(3));
    }

    #[test]
    fn failed_enable_rolls_back_parents() {
        let tree = tree();
        tree.regs().force_bits(CDR, bit(28));
        tree.prepare(GATE_B).unwrap();
        assert_eq!(tree.prepare_enable(GATE_A), Err(ClkError::Timeout));
        assert_eq!(tree.enable_count(PLL), Ok(0));
        assert_eq!(tree.prepare_count(CGU), Ok(0));
        assert_eq!(tree.regs().get(GR) & bit(0), bit(0));
    }

    #[test]
    fn release_of_unbalanced_parent_keeps_counts_at_zero() {
        let tree = tree();
        tree.prepare_enable(GATE_B).unwrap();
        assert_eq!(tree.enable_count(OSC), Ok(1));
        tree.disable_unprepare(OSC).unwrap();
        tree.disable_unprepare(GATE_B).unwrap();
        assert_eq!(tree.enable_count(OSC), Ok(0));
        assert_eq!(tree.prepare_count(OSC), Ok(0));
        assert_eq!(tree.enable_count(GATE_B), Ok(0));
        assert_eq!(tree.regs().get(GR) & bit(1), bit(1));
    }

    #[test]
    fn set_parent_moves_usage() {
        let tree = tree();
        tree.prepare_enable(SSI).unwrap();
        assert_eq!(tree.enable_count(OSC), Ok(1));
        tree.set_parent(SSI, 1).unwrap();
        assert_eq!(tree.get_parent(SSI), Ok(1));
        assert_eq!(tree.enable_count(OSC), Ok(0));
        assert_eq!(tree.enable_count(CGU), Ok(1));
        assert_eq!(tree.prepare_count(CGU), Ok(1));
        tree.disable_unprepare(SSI).unwrap();
        assert_eq!(tree.enable_count(CGU), Ok(0));
    }

    #[test]
    fn set_parent_validates_requests() {
        let tree = tree();
        assert_eq!(tree.set_parent(AUDIO, 3), Err(ClkError::InvalidParent(3)));
        assert_eq!(tree.set_parent(AUDIO, 2), Err(ClkError::OrphanParent));
        assert_eq!(tree.set_parent(BUS_MUX, 1), Err(ClkError::NotSupported));
        tree.set_parent(AUDIO, 1).unwrap();
        assert_eq!(tree.get_parent(AUDIO), Ok(1));

        tree.prepare(CGU).unwrap();
        assert_eq!(tree.set_parent(CGU, 1), Err(ClkError::Busy));
        tree.unprepare(CGU).unwrap();
        tree.set_parent(CGU, 1).unwrap();
        assert_eq!(tree.get_parent(CGU), Ok(1));
    }

    #[test]
    fn set_rate_programs_rounded_divider() {
        let tree = tree();
        assert_eq!(tree.round_rate(CGU, 70 * MHZ), Ok((600 * MHZ).div_ceil(9)));
        tree.set_rate(CGU, 70 * MHZ).unwrap();
        assert_eq!(tree.get_rate(CGU), Ok((600 * MHZ).div_ceil(9)));
        assert_eq!(tree.set_rate(CGU, 0), Err(ClkError::InvalidRate(0)));
        assert_eq!(tree.set_rate(GATE_A, MHZ), Err(ClkError::NotSupported));
        // Gates report their parent's rate as the rounded rate.
        assert_eq!(tree.round_rate(GATE_B, MHZ), Ok(24 * MHZ));
    }

    #[test]
    fn unused_clocks_are_gated() {
        let tree = tree();
        tree.regs().set(GR, 0);
        tree.prepare_enable(GATE_B).unwrap();
        tree.disable_unused();
        assert_eq!(tree.regs().get(GR) & bit(1), 0);
        assert_eq!(tree.regs().get(GR) & bit(3), bit(3));
    }

    #[test]
    fn invalid_id_is_reported() {
        let tree = tree();
        let bogus = ClockId::new(99);
        assert_eq!(tree.enable(bogus), Err(ClkError::InvalidId(bogus)));
        assert_eq!(tree.name(bogus), Err(ClkError::InvalidId(bogus)));
    }
}
