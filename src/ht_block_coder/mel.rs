//! MEL adaptive run-length coding of quad significance.
//!
//! The exponent state k grows on completed zero-runs and shrinks on
//! significant quads, clamped to [0, 12]. A coded event is either a `0`
//! bit (a full run of 2^k insignificant quads) or a `1` bit followed by
//! k bits giving the partial run length before a significant quad.

use super::mag_sgn::{RawBitReader, RawBitWriter};

const K_MAX: i32 = 12;

#[derive(Default)]
pub struct MelEncoder {
    k: i32,
    run: i32,
}

impl MelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, w: &mut RawBitWriter, significant: bool) {
        if significant {
            w.write_bit(1);
            w.write_bits(self.run as u32, self.k as u8);
            self.run = 0;
            self.k = (self.k - 1).max(0);
        } else {
            self.run += 1;
            if self.run == 1 << self.k {
                w.write_bit(0);
                self.run = 0;
                self.k = (self.k + 1).min(K_MAX);
            }
        }
    }

    /// Emit the pending partial run so the decoder never starves.
    pub fn flush(&mut self, w: &mut RawBitWriter) {
        if self.run > 0 {
            w.write_bit(0);
            self.run = 0;
        }
    }
}

#[derive(Default)]
pub struct MelDecoder {
    k: i32,
    run: i32,
    sig_pending: bool,
}

impl MelDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, r: &mut RawBitReader) -> bool {
        if self.run > 0 {
            self.run -= 1;
            return false;
        }
        if self.sig_pending {
            self.sig_pending = false;
            return true;
        }
        match r.read_bit() {
            Some(0) | None => {
                // Full run of 2^k zeros (EOF behaves as an endless run).
                self.run = (1 << self.k) - 1;
                self.k = (self.k + 1).min(K_MAX);
                false
            }
            Some(_) => {
                let partial = r.read_bits(self.k as u8).unwrap_or(0) as i32;
                self.k = (self.k - 1).max(0);
                if partial == 0 {
                    true
                } else {
                    self.run = partial - 1;
                    self.sig_pending = true;
                    false
                }
            }
        }
    }
}
