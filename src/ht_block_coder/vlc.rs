//! VLC coding of quad significance patterns.
//!
//! A significant quad's pattern rho (four bits, one per sample in raster
//! order within the 2x2 quad) is coded with one of two prefix-free code
//! tables selected by a neighbour context: context 1 applies when the
//! left or upper quad is significant, where dense patterns are likelier
//! and get the short codes.

use super::mag_sgn::{RawBitReader, RawBitWriter};

/// (rho, code value, code length). Both tables are complete prefix codes
/// over rho in 1..=15 (rho 0 is handled by MEL, never by VLC).
const TABLE_CTX0: [(u8, u16, u8); 15] = [
    (1, 0b000, 3),
    (2, 0b001, 3),
    (4, 0b010, 3),
    (8, 0b011, 3),
    (3, 0b1000, 4),
    (5, 0b1001, 4),
    (10, 0b1010, 4),
    (12, 0b1011, 4),
    (6, 0b1100, 4),
    (9, 0b1101, 4),
    (15, 0b1110, 4),
    (7, 0b11110, 5),
    (11, 0b111110, 6),
    (13, 0b1111110, 7),
    (14, 0b1111111, 7),
];

const TABLE_CTX1: [(u8, u16, u8); 15] = [
    (15, 0b00, 2),
    (7, 0b010, 3),
    (11, 0b011, 3),
    (13, 0b100, 3),
    (14, 0b101, 3),
    (3, 0b1100, 4),
    (5, 0b1101, 4),
    (10, 0b11100, 5),
    (12, 0b11101, 5),
    (6, 0b11110, 5),
    (9, 0b111110, 6),
    (1, 0b1111110, 7),
    (2, 0b11111110, 8),
    (4, 0b111111110, 9),
    (8, 0b111111111, 9),
];

fn table(context: u8) -> &'static [(u8, u16, u8); 15] {
    if context == 0 {
        &TABLE_CTX0
    } else {
        &TABLE_CTX1
    }
}

/// Write the code word for a non-zero quad pattern.
pub fn encode_rho(w: &mut RawBitWriter, rho: u8, context: u8) {
    debug_assert!(rho != 0 && rho < 16);
    let entry = table(context)
        .iter()
        .find(|e| e.0 == rho)
        .expect("rho in 1..=15");
    w.write_bits(entry.1 as u32, entry.2);
}

/// Read a quad pattern; `None` on exhausted input.
pub fn decode_rho(r: &mut RawBitReader, context: u8) -> Option<u8> {
    let tbl = table(context);
    let mut acc: u16 = 0;
    let mut len: u8 = 0;
    loop {
        acc = (acc << 1) | r.read_bit()? as u16;
        len += 1;
        if let Some(entry) = tbl.iter().find(|e| e.2 == len && e.1 == acc) {
            return Some(entry.0);
        }
        if len > 9 {
            return None;
        }
    }
}
