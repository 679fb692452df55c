//! X1000 CPM clock table.

use log::info;

use super::desc::{
    CguAccess, CguDesc, ClkFlags, ClkInit, ClkKind, CpccrDesc, DivField, GateDesc, LockKind,
    MuxField, Parent, PllDesc, SsiDesc,
};
use super::{ClkTree, ClockId, FixedClk, MHZ};
use crate::regs::RegisterIo;

pub const CPM_CPCCR: u32 = 0x00;
pub const CPM_CPAPCR: u32 = 0x10;
pub const CPM_CPMPCR: u32 = 0x14;
pub const CPM_CLKGR: u32 = 0x20;
pub const CPM_OPCR: u32 = 0x24;
pub const CPM_DDRCDR: u32 = 0x2c;
pub const CPM_USBCDR: u32 = 0x50;
pub const CPM_MACCDR: u32 = 0x54;
pub const CPM_I2SCDR: u32 = 0x60;
pub const CPM_LPCDR: u32 = 0x64;
pub const CPM_MSC0CDR: u32 = 0x68;
pub const CPM_SFCCDR: u32 = 0x74;
pub const CPM_CIMCDR: u32 = 0x7c;
pub const CPM_PCMCDR: u32 = 0x84;
pub const CPM_MSC1CDR: u32 = 0xa4;

pub const CLK_EXT: ClockId = ClockId::new(0);
pub const CLK_RTC: ClockId = ClockId::new(1);
pub const CLK_PLL_APLL: ClockId = ClockId::new(2);
pub const CLK_PLL_MPLL: ClockId = ClockId::new(3);
pub const CLK_MUX_SCLKA: ClockId = ClockId::new(4);
pub const CLK_MUX_CPLL: ClockId = ClockId::new(5);
pub const CLK_MUX_H0PLL: ClockId = ClockId::new(6);
pub const CLK_MUX_H2PLL: ClockId = ClockId::new(7);
pub const CLK_RATE_CPUCLK: ClockId = ClockId::new(8);
pub const CLK_RATE_L2CCLK: ClockId = ClockId::new(9);
pub const CLK_RATE_H0CLK: ClockId = ClockId::new(10);
pub const CLK_RATE_H2CLK: ClockId = ClockId::new(11);
pub const CLK_RATE_PCLK: ClockId = ClockId::new(12);
pub const CLK_CGU_DDR: ClockId = ClockId::new(13);
pub const CLK_CGU_MAC: ClockId = ClockId::new(14);
pub const CLK_CGU_LCD: ClockId = ClockId::new(15);
pub const CLK_CGU_MSC0: ClockId = ClockId::new(16);
pub const CLK_CGU_MSC1: ClockId = ClockId::new(17);
pub const CLK_CGU_USB: ClockId = ClockId::new(18);
pub const CLK_CGU_SFC: ClockId = ClockId::new(19);
pub const CLK_CGU_SSI: ClockId = ClockId::new(20);
pub const CLK_CGU_CIM: ClockId = ClockId::new(21);
pub const CLK_CGU_I2S: ClockId = ClockId::new(22);
pub const CLK_CGU_PCM: ClockId = ClockId::new(23);
/// First CLKGR gate; gate `n` below is CLKGR bit `n`.
pub const CLK_ID_GATE: usize = 24;
pub const CLK_GATE_NEMC: ClockId = ClockId::new(CLK_ID_GATE);
pub const CLK_GATE_EFUSE: ClockId = ClockId::new(CLK_ID_GATE + 1);
pub const CLK_GATE_SFC: ClockId = ClockId::new(CLK_ID_GATE + 2);
pub const CLK_GATE_OTG: ClockId = ClockId::new(CLK_ID_GATE + 3);
pub const CLK_GATE_MSC0: ClockId = ClockId::new(CLK_ID_GATE + 4);
pub const CLK_GATE_MSC1: ClockId = ClockId::new(CLK_ID_GATE + 5);
pub const CLK_GATE_SCC: ClockId = ClockId::new(CLK_ID_GATE + 6);
pub const CLK_GATE_I2C0: ClockId = ClockId::new(CLK_ID_GATE + 7);
pub const CLK_GATE_I2C1: ClockId = ClockId::new(CLK_ID_GATE + 8);
pub const CLK_GATE_I2C2: ClockId = ClockId::new(CLK_ID_GATE + 9);
pub const CLK_GATE_I2C3: ClockId = ClockId::new(CLK_ID_GATE + 10);
pub const CLK_GATE_AIC: ClockId = ClockId::new(CLK_ID_GATE + 11);
pub const CLK_GATE_JPEG: ClockId = ClockId::new(CLK_ID_GATE + 12);
pub const CLK_GATE_SADC: ClockId = ClockId::new(CLK_ID_GATE + 13);
pub const CLK_GATE_UART0: ClockId = ClockId::new(CLK_ID_GATE + 14);
pub const CLK_GATE_UART1: ClockId = ClockId::new(CLK_ID_GATE + 15);
pub const CLK_GATE_UART2: ClockId = ClockId::new(CLK_ID_GATE + 16);
pub const CLK_GATE_DMIC: ClockId = ClockId::new(CLK_ID_GATE + 17);
pub const CLK_GATE_TCU: ClockId = ClockId::new(CLK_ID_GATE + 18);
pub const CLK_GATE_SSI: ClockId = ClockId::new(CLK_ID_GATE + 19);
pub const CLK_GATE_OST: ClockId = ClockId::new(CLK_ID_GATE + 20);
pub const CLK_GATE_PDMA: ClockId = ClockId::new(CLK_ID_GATE + 21);
pub const CLK_GATE_CIM: ClockId = ClockId::new(CLK_ID_GATE + 22);
pub const CLK_GATE_LCD: ClockId = ClockId::new(CLK_ID_GATE + 23);
pub const CLK_GATE_AES: ClockId = ClockId::new(CLK_ID_GATE + 24);
pub const CLK_GATE_MAC: ClockId = ClockId::new(CLK_ID_GATE + 25);
pub const CLK_GATE_PCM: ClockId = ClockId::new(CLK_ID_GATE + 26);
pub const CLK_GATE_RTC: ClockId = ClockId::new(CLK_ID_GATE + 27);
pub const CLK_GATE_APB0: ClockId = ClockId::new(CLK_ID_GATE + 28);
pub const CLK_GATE_AHB0: ClockId = ClockId::new(CLK_ID_GATE + 29);
pub const CLK_GATE_CPU: ClockId = ClockId::new(CLK_ID_GATE + 30);
pub const CLK_GATE_DDR: ClockId = ClockId::new(CLK_ID_GATE + 31);
pub const CLK_GATE_SCLKA: ClockId = ClockId::new(CLK_ID_GATE + 32);
pub const CLK_GATE_USBPHY: ClockId = ClockId::new(CLK_ID_GATE + 33);
pub const CLK_GATE_SCLKABUS: ClockId = ClockId::new(CLK_ID_GATE + 34);
pub const NR_CLKS: usize = CLK_ID_GATE + 35;

const PLL_OD_ENCODE: [u32; 4] = [1, 2, 4, 8];

const APLL: PllDesc = PllDesc {
    regoff: CPM_CPAPCR,
    m_shift: 24,
    m_width: 7,
    n_shift: 18,
    n_width: 5,
    od_shift: 16,
    od_width: 2,
    en_bit: 8,
    on_bit: 10,
    bs_bit: 31,
    od_encode: &PLL_OD_ENCODE,
    div_step: 1,
};

const MPLL: PllDesc = PllDesc {
    regoff: CPM_CPMPCR,
    en_bit: 7,
    on_bit: 0,
    ..APLL
};

const fn cpccr(shift: u32, mask: u32) -> CpccrDesc {
    CpccrDesc {
        regoff: CPM_CPCCR,
        shift,
        mask,
    }
}

static SCLKA_MUX: CpccrDesc = cpccr(30, 0x3);
static CPLL_MUX: CpccrDesc = cpccr(28, 0x3);
static H0PLL_MUX: CpccrDesc = cpccr(26, 0x3);
static H2PLL_MUX: CpccrDesc = cpccr(24, 0x3);
static PCLK_DIV: CpccrDesc = cpccr(16, 0xf);
static H2_DIV: CpccrDesc = cpccr(12, 0xf);
static H0_DIV: CpccrDesc = cpccr(8, 0xf);
static L2C_DIV: CpccrDesc = cpccr(4, 0xf);
static CPU_DIV: CpccrDesc = cpccr(0, 0xf);

const fn cgu_mux(regoff: u32, shift: u32, mask: u32) -> MuxField {
    MuxField {
        regoff,
        shift,
        mask,
        writable: true,
    }
}

const fn cgu(regoff: u32, mux: Option<MuxField>, busy_bit: u32, stop_bit: u32, div_mask: u32, div_step: u32) -> CguDesc {
    CguDesc {
        regoff,
        mux,
        cs_exclk: None,
        ce_bit: 29,
        busy_bit,
        stop_bit,
        div: DivField {
            shift: 0,
            mask: div_mask,
        },
        div_step,
    }
}

static CGU_DDR_DESC: CguDesc = cgu(CPM_DDRCDR, Some(cgu_mux(CPM_DDRCDR, 30, 0x3)), 28, 27, 0xf, 1);
static CGU_MAC_DESC: CguDesc = cgu(CPM_MACCDR, Some(cgu_mux(CPM_MACCDR, 31, 0x1)), 28, 27, 0xff, 1);
static CGU_LCD_DESC: CguDesc = cgu(CPM_LPCDR, Some(cgu_mux(CPM_LPCDR, 31, 0x1)), 27, 26, 0xff, 1);
static CGU_MSC0_DESC: CguDesc = cgu(CPM_MSC0CDR, Some(cgu_mux(CPM_MSC0CDR, 31, 0x1)), 28, 27, 0xff, 2);
// MSC1 has no select of its own and runs from whatever MSC0 selects.
static CGU_MSC1_DESC: CguDesc = cgu(
    CPM_MSC1CDR,
    Some(MuxField {
        regoff: CPM_MSC0CDR,
        shift: 31,
        mask: 0x1,
        writable: false,
    }),
    28,
    27,
    0xff,
    2,
);
static CGU_USB_DESC: CguDesc = CguDesc {
    cs_exclk: Some(0),
    ..cgu(CPM_USBCDR, Some(cgu_mux(CPM_USBCDR, 30, 0x3)), 28, 27, 0xff, 1)
};
static CGU_SFC_DESC: CguDesc = cgu(CPM_SFCCDR, Some(cgu_mux(CPM_SFCCDR, 31, 0x1)), 28, 27, 0xff, 1);
static CGU_CIM_DESC: CguDesc = cgu(CPM_CIMCDR, Some(cgu_mux(CPM_CIMCDR, 31, 0x1)), 28, 27, 0xff, 1);
static SSI_SEL: SsiDesc = SsiDesc {
    regoff: CPM_SFCCDR,
    bit: 30,
};
static I2S_SEL: MuxField = cgu_mux(CPM_I2SCDR, 30, 0x3);
static PCM_SEL: MuxField = cgu_mux(CPM_PCMCDR, 30, 0x3);

static CLKGR_GATES: [GateDesc; 32] = {
    let mut gates = [GateDesc::new(CPM_CLKGR, 0); 32];
    let mut bit = 1;
    while bit < 32 {
        gates[bit] = GateDesc::new(CPM_CLKGR, bit as u32);
        bit += 1;
    }
    gates
};
static SCLKA_GATE: GateDesc = GateDesc::new(CPM_CPCCR, 23);
static USBPHY_GATE: GateDesc = GateDesc::regmap(CPM_OPCR, 23);
static SCLKABUS_GATE: GateDesc = GateDesc::regmap(CPM_OPCR, 28);

static P_EXT: [Parent; 1] = [Parent::Clock(CLK_EXT)];
static P_SCLKA_MUX: [Parent; 4] = [
    Parent::DummyStop,
    Parent::Clock(CLK_EXT),
    Parent::Clock(CLK_PLL_APLL),
    Parent::DummyUnknown,
];
static P_CPCCR_MUX: [Parent; 4] = [
    Parent::DummyStop,
    Parent::Clock(CLK_MUX_SCLKA),
    Parent::Clock(CLK_PLL_MPLL),
    Parent::DummyUnknown,
];
static P_CPLL: [Parent; 1] = [Parent::Clock(CLK_MUX_CPLL)];
static P_H0PLL: [Parent; 1] = [Parent::Clock(CLK_MUX_H0PLL)];
static P_H2PLL: [Parent; 1] = [Parent::Clock(CLK_MUX_H2PLL)];
static P_CGU_GRP0: [Parent; 2] = [Parent::Clock(CLK_MUX_SCLKA), Parent::Clock(CLK_PLL_MPLL)];
static P_CGU_USB: [Parent; 4] = [
    Parent::Clock(CLK_EXT),
    Parent::Clock(CLK_EXT),
    Parent::Clock(CLK_MUX_SCLKA),
    Parent::Clock(CLK_PLL_MPLL),
];
static P_CGU_SSI: [Parent; 2] = [Parent::Clock(CLK_EXT), Parent::Clock(CLK_CGU_SFC)];
static P_CGU_I2S: [Parent; 4] = [
    Parent::Clock(CLK_EXT),
    Parent::Clock(CLK_MUX_SCLKA),
    Parent::Clock(CLK_EXT),
    Parent::Clock(CLK_PLL_MPLL),
];
static P_CGU_PCM: [Parent; 4] = [
    Parent::Clock(CLK_MUX_SCLKA),
    Parent::Clock(CLK_EXT),
    Parent::Clock(CLK_PLL_MPLL),
    Parent::DummyUnknown,
];
static P_CPU: [Parent; 1] = [Parent::Clock(CLK_RATE_CPUCLK)];
static P_L2C: [Parent; 1] = [Parent::Clock(CLK_RATE_L2CCLK)];
static P_H0: [Parent; 1] = [Parent::Clock(CLK_RATE_H0CLK)];
static P_H2: [Parent; 1] = [Parent::Clock(CLK_RATE_H2CLK)];
static P_PCLK: [Parent; 1] = [Parent::Clock(CLK_RATE_PCLK)];
static P_SCLKA: [Parent; 1] = [Parent::Clock(CLK_MUX_SCLKA)];
static P_USB: [Parent; 1] = [Parent::Clock(CLK_CGU_USB)];

const fn unlocked(
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
        lock: LockKind::Unlocked,
    }
}

const fn locked(
    id: ClockId,
    name: &'static str,
    parents: &'static [Parent],
    kind: ClkKind,
    flags: ClkFlags,
) -> ClkInit {
    ClkInit {
        lock: LockKind::Shared,
        ..unlocked(id, name, parents, kind, flags)
    }
}

const fn cgu_clk(
    id: ClockId,
    name: &'static str,
    parents: &'static [Parent],
    desc: &'static CguDesc,
    flags: ClkFlags,
) -> ClkInit {
    locked(id, name, parents, ClkKind::Cgu { desc, access: CguAccess::Full }, flags)
}

const fn gate(
    id: ClockId,
    name: &'static str,
    parents: &'static [Parent],
    desc: &'static GateDesc,
    flags: ClkFlags,
) -> ClkInit {
    locked(id, name, parents, ClkKind::Gate(desc), flags)
}

const NONE: ClkFlags = ClkFlags::empty();
const KEEP: ClkFlags = ClkFlags::IGNORE_UNUSED;

/// Every X1000 clock except the two board oscillators, parents first.
pub static X1000_CLKS: [ClkInit; NR_CLKS - 2] = [
    unlocked(CLK_PLL_APLL, "apll", &P_EXT, ClkKind::Pll(&APLL), KEEP),
    unlocked(CLK_PLL_MPLL, "mpll", &P_EXT, ClkKind::Pll(&MPLL), KEEP),
    unlocked(CLK_MUX_SCLKA, "sclka_mux", &P_SCLKA_MUX, ClkKind::CpccrMux(&SCLKA_MUX), NONE),
    unlocked(CLK_MUX_CPLL, "cpu_mux", &P_CPCCR_MUX, ClkKind::CpccrMux(&CPLL_MUX), NONE),
    unlocked(CLK_MUX_H0PLL, "ahb0_mux", &P_CPCCR_MUX, ClkKind::CpccrMux(&H0PLL_MUX), NONE),
    unlocked(CLK_MUX_H2PLL, "ahb2_mux", &P_CPCCR_MUX, ClkKind::CpccrMux(&H2PLL_MUX), NONE),
    unlocked(CLK_RATE_PCLK, "pclk", &P_H2PLL, ClkKind::CpccrDiv(&PCLK_DIV), NONE),
    unlocked(CLK_RATE_H2CLK, "ahb2", &P_H2PLL, ClkKind::CpccrDiv(&H2_DIV), NONE),
    unlocked(CLK_RATE_H0CLK, "ahb0", &P_H0PLL, ClkKind::CpccrDiv(&H0_DIV), NONE),
    unlocked(CLK_RATE_CPUCLK, "cpu", &P_CPLL, ClkKind::CpccrDiv(&CPU_DIV), NONE),
    unlocked(CLK_RATE_L2CCLK, "l2cache", &P_CPLL, ClkKind::CpccrDiv(&L2C_DIV), NONE),
    locked(
        CLK_CGU_DDR,
        "cgu_ddr",
        &P_CPCCR_MUX,
        ClkKind::Cgu {
            desc: &CGU_DDR_DESC,
            access: CguAccess::ReadOnly,
        },
        KEEP,
    ),
    cgu_clk(CLK_CGU_MAC, "cgu_mac", &P_CGU_GRP0, &CGU_MAC_DESC, ClkFlags::SET_PARENT_GATE),
    cgu_clk(CLK_CGU_LCD, "cgu_lcd", &P_CGU_GRP0, &CGU_LCD_DESC, ClkFlags::SET_PARENT_GATE),
    cgu_clk(CLK_CGU_MSC0, "cgu_msc0", &P_CGU_GRP0, &CGU_MSC0_DESC, ClkFlags::SET_PARENT_GATE),
    cgu_clk(CLK_CGU_MSC1, "cgu_msc1", &P_CGU_GRP0, &CGU_MSC1_DESC, NONE),
    cgu_clk(CLK_CGU_USB, "cgu_usb", &P_CGU_USB, &CGU_USB_DESC, ClkFlags::SET_PARENT_GATE),
    cgu_clk(CLK_CGU_SFC, "cgu_sfc", &P_CGU_GRP0, &CGU_SFC_DESC, ClkFlags::SET_PARENT_GATE),
    cgu_clk(CLK_CGU_CIM, "cgu_cim", &P_CGU_GRP0, &CGU_CIM_DESC, ClkFlags::SET_PARENT_GATE),
    locked(CLK_CGU_SSI, "cgu_ssi", &P_CGU_SSI, ClkKind::Ssi(&SSI_SEL), NONE),
    locked(CLK_CGU_I2S, "cgu_i2s", &P_CGU_I2S, ClkKind::Audio(&I2S_SEL), NONE),
    locked(CLK_CGU_PCM, "cgu_pcm", &P_CGU_PCM, ClkKind::Audio(&PCM_SEL), NONE),
    gate(CLK_GATE_NEMC, "gate_nemc", &P_H2, &CLKGR_GATES[0], KEEP),
    gate(CLK_GATE_EFUSE, "gate_efuse", &P_H2, &CLKGR_GATES[1], NONE),
    gate(CLK_GATE_SFC, "gate_sfc", &P_H2, &CLKGR_GATES[2], NONE),
    gate(CLK_GATE_OTG, "gate_otg", &P_H2, &CLKGR_GATES[3], NONE),
    gate(CLK_GATE_MSC0, "gate_msc0", &P_H2, &CLKGR_GATES[4], NONE),
    gate(CLK_GATE_MSC1, "gate_msc1", &P_H2, &CLKGR_GATES[5], NONE),
    gate(CLK_GATE_SCC, "gate_scc", &P_PCLK, &CLKGR_GATES[6], NONE),
    gate(CLK_GATE_I2C0, "gate_i2c0", &P_PCLK, &CLKGR_GATES[7], NONE),
    gate(CLK_GATE_I2C1, "gate_i2c1", &P_PCLK, &CLKGR_GATES[8], NONE),
    gate(CLK_GATE_I2C2, "gate_i2c2", &P_PCLK, &CLKGR_GATES[9], NONE),
    gate(CLK_GATE_I2C3, "gate_i2c3", &P_PCLK, &CLKGR_GATES[10], NONE),
    gate(CLK_GATE_AIC, "gate_aic", &P_PCLK, &CLKGR_GATES[11], NONE),
    gate(CLK_GATE_JPEG, "gate_jpeg", &P_H0, &CLKGR_GATES[12], NONE),
    gate(CLK_GATE_SADC, "gate_sadc", &P_PCLK, &CLKGR_GATES[13], NONE),
    gate(CLK_GATE_UART0, "gate_uart0", &P_EXT, &CLKGR_GATES[14], NONE),
    gate(CLK_GATE_UART1, "gate_uart1", &P_EXT, &CLKGR_GATES[15], NONE),
    gate(CLK_GATE_UART2, "gate_uart2", &P_EXT, &CLKGR_GATES[16], NONE),
    gate(CLK_GATE_DMIC, "gate_dmic", &P_PCLK, &CLKGR_GATES[17], NONE),
    gate(CLK_GATE_TCU, "gate_tcu", &P_PCLK, &CLKGR_GATES[18], NONE),
    gate(CLK_GATE_SSI, "gate_ssi0", &P_PCLK, &CLKGR_GATES[19], NONE),
    gate(CLK_GATE_OST, "gate_ost", &P_L2C, &CLKGR_GATES[20], NONE),
    gate(CLK_GATE_PDMA, "gate_pdma", &P_H2, &CLKGR_GATES[21], NONE),
    gate(CLK_GATE_CIM, "gate_cim", &P_H0, &CLKGR_GATES[22], NONE),
    gate(CLK_GATE_LCD, "gate_lcd", &P_H0, &CLKGR_GATES[23], NONE),
    gate(CLK_GATE_AES, "gate_aes", &P_H2, &CLKGR_GATES[24], NONE),
    gate(CLK_GATE_MAC, "gate_mac", &P_H2, &CLKGR_GATES[25], NONE),
    gate(CLK_GATE_PCM, "gate_pcm", &P_PCLK, &CLKGR_GATES[26], NONE),
    gate(CLK_GATE_RTC, "gate_rtc", &P_PCLK, &CLKGR_GATES[27], NONE),
    gate(CLK_GATE_APB0, "gate_apb", &P_PCLK, &CLKGR_GATES[28], KEEP),
    gate(CLK_GATE_AHB0, "gate_ahb0", &P_H0, &CLKGR_GATES[29], KEEP),
    gate(CLK_GATE_CPU, "gate_cpu", &P_CPU, &CLKGR_GATES[30], KEEP),
    gate(CLK_GATE_DDR, "gate_ddr", &P_H0, &CLKGR_GATES[31], KEEP),
    gate(CLK_GATE_SCLKA, "sclka", &P_SCLKA, &SCLKA_GATE, KEEP),
    gate(CLK_GATE_USBPHY, "gate_usbphy", &P_USB, &USBPHY_GATE, NONE),
    gate(CLK_GATE_SCLKABUS, "sclka_bus", &P_SCLKA, &SCLKABUS_GATE, KEEP),
];

/// The two board oscillators.
pub fn fixed_clocks(ext_rate: u64, rtc_rate: u64) -> [FixedClk; 2] {
    [
        FixedClk {
            id: CLK_EXT,
            name: "ext",
            rate: ext_rate,
        },
        FixedClk {
            id: CLK_RTC,
            name: "rtc",
            rate: rtc_rate,
        },
    ]
}

/// Builds the X1000 tree over the CPM window `regs` and logs the bus rates.
///
/// `regmap` is the PM window behind the OPCR gates. Without it those two
/// gates are left unregistered.
pub fn build_tree<R: RegisterIo>(regs: R, regmap: Option<R>, ext_rate: u64, rtc_rate: u64) -> ClkTree<R> {
    let tree = ClkTree::build(regs, regmap, NR_CLKS, &fixed_clocks(ext_rate, rtc_rate), &X1000_CLKS);
    let [cpu, l2c, ahb0, ahb2, pclk] = bus_rates_mhz(&tree);
    info!(
        "CPU:[{}M]L2CACHE:[{}M]AHB0:[{}M]AHB2:[{}M]PCLK:[{}M]",
        cpu, l2c, ahb0, ahb2, pclk
    );
    tree
}

/// CPU, L2 cache, AHB0, AHB2 and APB rates in whole MHz, 0 if unavailable.
pub fn bus_rates_mhz<R: RegisterIo>(tree: &ClkTree<R>) -> [u64; 5] {
    ["cpu", "l2cache", "ahb0", "ahb2", "pclk"].map(|name| {
        tree.lookup(name)
            .and_then(|id| tree.get_rate(id).ok())
            .map_or(0, |rate| rate / MHZ)
    })
}
