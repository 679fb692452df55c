//! Board constants generated from `board.toml`.

include!(concat!(env!("OUT_DIR"), "/board_config.rs"));
