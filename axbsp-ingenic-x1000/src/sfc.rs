extern crate alloc;

use alloc::sync::Arc;

use bsp_ingenic::Mmio;
use bsp_ingenic::clk::x1000::{CLK_CGU_SFC, CLK_GATE_SFC};
use bsp_ingenic::sfc::{IrqReturn, Sfc, SfcConfig};
use log::{debug, info, warn};
use rdif_clk::Interface as _;
use rdrive::{DriverGeneric, KError, get_one};
use rdrive::{PlatformDevice, module_driver, probe::OnProbeError, register::FdtInfo};
use spin::Once;

use crate::clk::BoardClk;
use crate::{Platform, PlatformKernel, config, iomap, platform};

pub type BoardSfc = Sfc<Mmio, PlatformKernel>;

static SFC: Once<Arc<BoardSfc>> = Once::new();

module_driver!(
    name: "Ingenic SFC",
    level: ProbeLevel::PostKernel,
    priority: ProbePriority::DEFAULT,
    probe_kinds: &[
        ProbeKind::Fdt {
            compatibles: &["ingenic,sfc"],
            on_probe: probe_sfc
        }
    ],
);

fn clk_error(what: &str, e: impl core::fmt::Display) -> OnProbeError {
    warn!("{} clk error: {}", what, e);
    OnProbeError::other(alloc::format!("[sfc] {} clk error: {}", what, e))
}

fn rdif_error(what: &str, e: KError) -> OnProbeError {
    OnProbeError::other(alloc::format!("[sfc] {} clk error: {:?}", what, e))
}

/// Clocks the flash controller from `clk` and attaches to it.
///
/// `cgu_sfc` is set to the board's maximum SFC frequency; the controller is
/// timed from the rate the divider actually produced.
pub fn attach_sfc(
    platform: &'static dyn Platform,
    clk: &mut BoardClk,
    paddr: usize,
    size: usize,
) -> Result<BoardSfc, OnProbeError> {
    let base = iomap(platform, "sfc", paddr, size)?;
    debug!("sfc address: {:#x}", base.as_ptr() as usize);

    let sfc_clk = CLK_CGU_SFC.index().into();
    clk.set_rate(sfc_clk, config::SFC_MAX_FREQUENCY)
        .map_err(|e| rdif_error("cgu", e))?;
    let tree = clk.tree();
    tree.prepare_enable(CLK_CGU_SFC).map_err(|e| clk_error("cgu", e))?;
    if let Err(e) = tree.prepare_enable(CLK_GATE_SFC) {
        if let Err(undo) = tree.disable_unprepare(CLK_CGU_SFC) {
            warn!("cgu clk error: {}", undo);
        }
        return Err(clk_error("gate", e));
    }
    let src_clk = clk.get_rate(sfc_clk).map_err(|e| rdif_error("cgu", e))?;

    // SAFETY: the platform mapped `size` bytes for the lifetime of the board.
    let regs = unsafe { Mmio::new(base) };
    let sfc = Sfc::new(
        regs,
        PlatformKernel::new(platform),
        SfcConfig {
            src_clk,
            threshold: config::SFC_THRESHOLD,
            quad_mode: config::SFC_QUAD_MODE,
        },
    );
    info!("Ingenic SFC: attached at {} Hz", src_clk);
    Ok(sfc)
}

/// Makes `sfc` the controller [`sfc_irq_handler`] serves.
///
/// Only the first call installs; later controllers are handed back unserved.
pub fn publish_sfc(sfc: BoardSfc) -> Arc<BoardSfc> {
    let sfc = Arc::new(sfc);
    let published = SFC.call_once(|| sfc.clone());
    if !Arc::ptr_eq(published, &sfc) {
        warn!("sfc already published");
    }
    sfc
}

fn probe_sfc(info: FdtInfo<'_>, plat_dev: PlatformDevice) -> Result<(), OnProbeError> {
    info!("Probing Ingenic X1000 SFC...");

    let sfc_reg = info
        .node
        .reg()
        .and_then(|mut regs| regs.next())
        .ok_or(OnProbeError::other(alloc::format!(
            "[{}] has no reg",
            info.node.name()
        )))?;

    info!(
        "SFC reg: addr={:#x}, size={:#x}",
        sfc_reg.address as usize,
        sfc_reg.size.unwrap_or(0)
    );

    let clk_device = get_one::<BoardClk>().ok_or(OnProbeError::other(alloc::format!(
        "[{}] no clock provider",
        info.node.name()
    )))?;
    let mut clk = clk_device.lock().map_err(|_| {
        OnProbeError::other(alloc::format!("[{}] clock provider busy", info.node.name()))
    })?;

    let sfc = attach_sfc(
        platform()?,
        &mut clk,
        sfc_reg.address as usize,
        sfc_reg.size.unwrap_or(config::SFC_SIZE),
    )?;
    plat_dev.register(SfcDriver {
        sfc: publish_sfc(sfc),
    });

    Ok(())
}

/// The flash controller as an rdrive device.
pub struct SfcDriver {
    pub sfc: Arc<BoardSfc>,
}

impl DriverGeneric for SfcDriver {
    fn open(&mut self) -> Result<(), KError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), KError> {
        Ok(())
    }
}

pub fn sfc() -> Option<&'static Arc<BoardSfc>> {
    SFC.get()
}

/// Entry for the platform's handler of the SFC interrupt line.
pub fn sfc_irq_handler() -> IrqReturn {
    match SFC.get() {
        Some(sfc) => sfc.handle_irq(),
        None => IrqReturn::None,
    }
}
