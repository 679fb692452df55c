use std::{env, error::Error, fmt::Write as _, fs, path::PathBuf};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct BoardConfig {
    clocks: Clocks,
    cpm: Window,
    sfc: SfcConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct Clocks {
    ext_rate: u64,
    rtc_rate: u64,
}

/// Window size used when the device tree `reg` leaves it out.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Window {
    size: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SfcConfig {
    size: usize,
    max_frequency: u64,
    #[serde(default)]
    quad_mode: bool,
    #[serde(default = "default_threshold")]
    threshold: u32,
}

fn default_threshold() -> u32 {
    31
}

/// Highest value the GLB threshold field holds.
const THRESHOLD_MAX: u32 = 0x3f;
/// The SFC data FIFO sits at this offset of the window.
const SFC_MIN_SIZE: usize = 0x1004;

fn main() -> Result<(), Box<dyn Error>> {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let path = env::var_os("AXBSP_BOARD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| manifest_dir.join("board.toml"));

    println!("cargo:rerun-if-env-changed=AXBSP_BOARD_CONFIG");
    println!("cargo:rerun-if-changed={}", path.display());

    let text = fs::read_to_string(&path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let config: BoardConfig = toml::from_str(&text)?;
    validate(&config)?;

    let out = PathBuf::from(env::var("OUT_DIR")?).join("board_config.rs");
    fs::write(&out, render(&config)?)?;
    Ok(())
}

fn validate(config: &BoardConfig) -> Result<(), String> {
    if config.clocks.ext_rate == 0 {
        return Err("clocks.ext-rate must be non-zero".into());
    }
    if config.sfc.max_frequency == 0 {
        return Err("sfc.max-frequency must be non-zero".into());
    }
    if config.sfc.threshold == 0 || config.sfc.threshold > THRESHOLD_MAX {
        return Err(format!(
            "sfc.threshold {} out of range 1..={}",
            config.sfc.threshold, THRESHOLD_MAX
        ));
    }
    if config.sfc.size < SFC_MIN_SIZE {
        return Err(format!(
            "sfc.size {:#x} does not cover the data FIFO",
            config.sfc.size
        ));
    }
    Ok(())
}

fn render(config: &BoardConfig) -> Result<String, std::fmt::Error> {
    let mut s = String::new();
    writeln!(s, "// Generated by build.rs from board.toml.")?;
    writeln!(s)?;
    writeln!(s, "pub const EXT_RATE: u64 = {};", config.clocks.ext_rate)?;
    writeln!(s, "pub const RTC_RATE: u64 = {};", config.clocks.rtc_rate)?;
    writeln!(s, "pub const CPM_SIZE: usize = {:#x};", config.cpm.size)?;
    writeln!(s, "pub const SFC_SIZE: usize = {:#x};", config.sfc.size)?;
    writeln!(s, "pub const SFC_MAX_FREQUENCY: u64 = {};", config.sfc.max_frequency)?;
    writeln!(s, "pub const SFC_QUAD_MODE: bool = {};", config.sfc.quad_mode)?;
    writeln!(s, "pub const SFC_THRESHOLD: u32 = {};", config.sfc.threshold)?;
    Ok(s)
}
