extern crate alloc;

use bsp_ingenic::Mmio;
use bsp_ingenic::clk::{ClkDriver, x1000};
use log::{debug, info};
use rdrive::{PlatformDevice, probe::OnProbeError};
use rdrive::{module_driver, register::FdtInfo};

use crate::{Platform, config, iomap, platform};

pub type BoardClk = ClkDriver<Mmio>;

module_driver!(
    name: "Ingenic X1000 CGU",
    level: ProbeLevel::PostKernel,
    priority: ProbePriority::CLK,
    probe_kinds: &[
        ProbeKind::Fdt {
            compatibles: &["ingenic,x1000-cgu"],
            on_probe: probe_cgu
        }
    ],
);

/// Maps the CPM window and builds the X1000 clock tree over it.
///
/// The OPCR gates live in the same window, so it doubles as their regmap.
pub fn attach_cgu(
    platform: &dyn Platform,
    paddr: usize,
    size: usize,
) -> Result<BoardClk, OnProbeError> {
    let base = iomap(platform, "cpm", paddr, size)?;
    debug!("cpm address: {:#x}", base.as_ptr() as usize);

    // SAFETY: the platform mapped `size` bytes for the lifetime of the board.
    let cpm = unsafe { Mmio::new(base) };
    let tree = x1000::build_tree(cpm, Some(cpm), config::EXT_RATE, config::RTC_RATE);
    Ok(ClkDriver::new(tree))
}

fn probe_cgu(info: FdtInfo<'_>, plat_dev: PlatformDevice) -> Result<(), OnProbeError> {
    info!("Probing Ingenic X1000 CPM...");

    let cpm_reg = info
        .node
        .reg()
        .and_then(|mut regs| regs.next())
        .ok_or(OnProbeError::other(alloc::format!(
            "[{}] has no reg",
            info.node.name()
        )))?;

    info!(
        "CPM reg: addr={:#x}, size={:#x}",
        cpm_reg.address as usize,
        cpm_reg.size.unwrap_or(0)
    );

    let clk = attach_cgu(
        platform()?,
        cpm_reg.address as usize,
        cpm_reg.size.unwrap_or(config::CPM_SIZE),
    )?;
    plat_dev.register(clk);

    Ok(())
}
