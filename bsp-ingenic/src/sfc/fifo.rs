//! CPU side of the SFC data FIFO.
//!
//! The FIFO moves 32-bit words; buffers are packed into them little-endian,
//! whatever their alignment. A trailing partial word is zero padded on write
//! and truncated on read.

use super::regs::SFC_RM_DR;
use crate::regs::RegisterIo;

/// Drains up to `threshold` words from the RX FIFO into `buf[*cur_len..]`.
pub fn read_rxfifo<R: RegisterIo>(io: &R, buf: &mut [u8], cur_len: &mut usize, threshold: u32) {
    let len = buf.len();
    if *cur_len >= len {
        return;
    }
    let words_left = (len.next_multiple_of(4) - *cur_len) / 4;
    let tail = len % 4;
    let (words, last_word) = if words_left > threshold as usize {
        (threshold as usize, false)
    } else if tail != 0 {
        (words_left - 1, true)
    } else {
        (words_left, false)
    };

    for _ in 0..words {
        let word = io.read(SFC_RM_DR).to_le_bytes();
        buf[*cur_len..*cur_len + 4].copy_from_slice(&word);
        *cur_len += 4;
    }
    if last_word {
        let word = io.read(SFC_RM_DR).to_le_bytes();
        buf[*cur_len..].copy_from_slice(&word[..tail]);
        *cur_len = len;
    }
}

/// Feeds up to `threshold` words from `buf[*cur_len..]` into the TX FIFO.
pub fn write_txfifo<R: RegisterIo>(io: &R, buf: &[u8], cur_len: &mut usize, threshold: u32) {
    for chunk in buf[(*cur_len).min(buf.len())..]
        .chunks(4)
        .take(threshold as usize)
    {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        io.write(SFC_RM_DR, u32::from_le_bytes(word));
        *cur_len += chunk.len();
    }
}
