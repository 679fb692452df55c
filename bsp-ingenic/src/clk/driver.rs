//! rdrive clock provider over the CPM tree.

use core::result::Result::{self, *};

use log::{debug, warn};
use rdif_clk::Interface;
use rdrive::{DriverGeneric, KError};

use super::{ClkError, ClkTree, ClockId};
use crate::regs::RegisterIo;

/// Registered with rdrive as the SoC clock device.
///
/// Rate requests arrive through [`Interface`]; consumers that need gating
/// or reparenting go through [`ClkDriver::tree`].
pub struct ClkDriver<R> {
    tree: ClkTree<R>,
}

impl<R: RegisterIo> ClkDriver<R> {
    pub fn new(tree: ClkTree<R>) -> Self {
        ClkDriver { tree }
    }

    pub fn tree(&self) -> &ClkTree<R> {
        &self.tree
    }
}

fn clock_id(id: rdif_clk::ClockId) -> ClockId {
    let index: usize = id.into();
    ClockId::from(index)
}

fn to_kerror(id: ClockId, e: ClkError) -> KError {
    warn!("clk {}: {}", id, e);
    let name = match e {
        ClkError::InvalidId(_) | ClkError::NotSupported => "clock_id",
        ClkError::InvalidRate(_) => "rate",
        ClkError::InvalidParent(_) | ClkError::OrphanParent | ClkError::UnknownParent(_) => "parent",
        _ => "clock",
    };
    KError::InvalidArg { name }
}

impl<R: RegisterIo + 'static> DriverGeneric for ClkDriver<R> {
    fn open(&mut self) -> Result<(), KError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), KError> {
        Ok(())
    }
}

impl<R: RegisterIo + 'static> Interface for ClkDriver<R> {
    fn perper_enable(&mut self) {
        debug!("perper_enable");
    }

    fn get_rate(&self, id: rdif_clk::ClockId) -> Result<u64, KError> {
        let id = clock_id(id);
        self.tree.get_rate(id).map_err(|e| to_kerror(id, e))
    }

    fn set_rate(&mut self, id: rdif_clk::ClockId, rate: u64) -> Result<(), KError> {
        let id = clock_id(id);
        self.tree.set_rate(id, rate).map_err(|e| to_kerror(id, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clk::MHZ;
    use crate::clk::x1000::tests::boot_regs;
    use crate::clk::x1000::{CLK_CGU_SFC, CLK_PLL_APLL, CPM_SFCCDR, build_tree};
    use crate::regs::fake::FakeRegs;

    fn driver() -> ClkDriver<FakeRegs> {
        ClkDriver::new(build_tree(boot_regs(), Some(FakeRegs::new()), 24 * MHZ, 32_768))
    }

    fn raw(id: ClockId) -> rdif_clk::ClockId {
        id.index().into()
    }

    #[test]
    fn rates_go_through_the_tree() {
        let mut clk = driver();
        assert_eq!(clk.get_rate(raw(CLK_PLL_APLL)).unwrap(), 1008 * MHZ);
        clk.set_rate(raw(CLK_CGU_SFC), 150 * MHZ).unwrap();
        assert_eq!(clk.get_rate(raw(CLK_CGU_SFC)).unwrap(), 144 * MHZ);
        assert_eq!(clk.tree().regs().get(CPM_SFCCDR) & 0xff, 6);
    }

    #[test]
    fn errors_map_to_invalid_arg() {
        let mut clk = driver();
        assert!(matches!(
            clk.get_rate(999usize.into()),
            Err(KError::InvalidArg { name: "clock_id" })
        ));
        assert!(matches!(
            clk.set_rate(raw(CLK_PLL_APLL), 500 * MHZ),
            Err(KError::InvalidArg { name: "clock_id" })
        ));
        assert!(matches!(
            clk.set_rate(raw(CLK_CGU_SFC), 0),
            Err(KError::InvalidArg { name: "rate" })
        ));
    }
}
