//! SFC register map.

use crate::regs::bit;

pub const SFC_GLB: u32 = 0x0000;
pub const SFC_DEV_CONF: u32 = 0x0004;
pub const SFC_DEV_STA_EXP: u32 = 0x0008;
pub const SFC_DEV_STA_RT: u32 = 0x000c;
pub const SFC_DEV_STA_MSK: u32 = 0x0010;
pub const SFC_TRAN_LEN: u32 = 0x002c;
pub const SFC_MEM_ADDR: u32 = 0x0060;
pub const SFC_TRIG: u32 = 0x0064;
pub const SFC_SR: u32 = 0x0068;
pub const SFC_SCR: u32 = 0x006c;
pub const SFC_INTC: u32 = 0x0070;
pub const SFC_FSM: u32 = 0x0074;
pub const SFC_CGE: u32 = 0x0078;
pub const SFC_RM_DR: u32 = 0x1000;

pub const fn sfc_tran_conf(phase: usize) -> u32 {
    0x0014 + 4 * phase as u32
}

pub const fn sfc_dev_addr(phase: usize) -> u32 {
    0x0030 + 4 * phase as u32
}

pub const fn sfc_dev_addr_plus(phase: usize) -> u32 {
    0x0048 + 4 * phase as u32
}

/// Phase slots the controller sequences per transaction.
pub const MAX_PHASES: usize = 6;

// GLB
pub const GLB_TRAN_DIR: u32 = bit(13);
pub const GLB_THRESHOLD_OFFSET: u32 = 7;
pub const GLB_THRESHOLD_MSK: u32 = 0x3f << GLB_THRESHOLD_OFFSET;
pub const GLB_OP_MODE: u32 = bit(6);
pub const GLB_PHASE_NUM_OFFSET: u32 = 3;
pub const GLB_PHASE_NUM_MSK: u32 = 0x7 << GLB_PHASE_NUM_OFFSET;

// DEV_CONF
pub const DEV_CONF_SMP_DELAY_OFFSET: u32 = 16;
pub const DEV_CONF_SMP_DELAY_MSK: u32 = 0x3 << DEV_CONF_SMP_DELAY_OFFSET;
pub const DEV_CONF_HALF_CYCLE_DELAY: u32 = 1;
pub const DEV_CONF_THOLD_OFFSET: u32 = 11;
pub const DEV_CONF_THOLD_MSK: u32 = 0x3 << DEV_CONF_THOLD_OFFSET;
pub const DEV_CONF_TSETUP_OFFSET: u32 = 9;
pub const DEV_CONF_TSETUP_MSK: u32 = 0x3 << DEV_CONF_TSETUP_OFFSET;
pub const DEV_CONF_TSH_OFFSET: u32 = 5;
pub const DEV_CONF_TSH_MSK: u32 = 0xf << DEV_CONF_TSH_OFFSET;
pub const DEV_CONF_CPHA: u32 = bit(4);
pub const DEV_CONF_CPOL: u32 = bit(3);
pub const DEV_CONF_CEDL: u32 = bit(2);
pub const DEV_CONF_HOLDDL: u32 = bit(1);
pub const DEV_CONF_WPDL: u32 = bit(0);

// TRAN_CONF(n)
pub const TRAN_CONF_TRAN_MODE_OFFSET: u32 = 29;
pub const TRAN_CONF_TRAN_MODE_MSK: u32 = 0x7;
pub const TRAN_CONF_ADDR_WIDTH_OFFSET: u32 = 26;
pub const TRAN_CONF_ADDR_WIDTH_MSK: u32 = 0x7;
pub const TRAN_CONF_POLLEN: u32 = bit(25);
pub const TRAN_CONF_CMDEN: u32 = bit(24);
pub const TRAN_CONF_FMAT: u32 = bit(23);
pub const TRAN_CONF_DMYBITS_OFFSET: u32 = 17;
pub const TRAN_CONF_DMYBITS_MSK: u32 = 0x3f;
pub const TRAN_CONF_DATEEN: u32 = bit(16);
pub const TRAN_CONF_CMD_MSK: u32 = 0xffff;

// TRIG
pub const TRIG_FLUSH: u32 = bit(2);
pub const TRIG_STOP: u32 = bit(1);
pub const TRIG_START: u32 = bit(0);

// SR, SCR and INTC share one layout.
pub const INT_END: u32 = bit(4);
pub const INT_TREQ: u32 = bit(3);
pub const INT_RREQ: u32 = bit(2);
pub const INT_OVER: u32 = bit(1);
pub const INT_UNDER: u32 = bit(0);
pub const INT_ALL: u32 = 0x1f;

/// Default FIFO request threshold, in words.
pub const THRESHOLD: u32 = 31;

/// Named registers for [`super::Sfc::dump_regs`].
pub(crate) const DUMP_REGS: [(&str, u32); 13] = [
    ("SFC_GLB", SFC_GLB),
    ("SFC_DEV_CONF", SFC_DEV_CONF),
    ("SFC_DEV_STA_EXP", SFC_DEV_STA_EXP),
    ("SFC_DEV_STA_RT", SFC_DEV_STA_RT),
    ("SFC_DEV_STA_MSK", SFC_DEV_STA_MSK),
    ("SFC_TRAN_LEN", SFC_TRAN_LEN),
    ("SFC_MEM_ADDR", SFC_MEM_ADDR),
    ("SFC_TRIG", SFC_TRIG),
    ("SFC_SR", SFC_SR),
    ("SFC_SCR", SFC_SCR),
    ("SFC_INTC", SFC_INTC),
    ("SFC_FSM", SFC_FSM),
    ("SFC_CGE", SFC_CGE),
];
