//! Tag trees (ISO/IEC 15444-1 B.10.2).
//!
//! A tag tree codes a 2-D grid of non-negative integers by thresholds:
//! each query reveals whether a leaf's value is below a threshold,
//! spending bits only on what previous queries have not already pinned
//! down. Packet headers use one tree for first-inclusion layers and one
//! for zero-bit-plane counts per precinct band.

use crate::bit_io::{J2kBitReader, J2kBitWriter};
use crate::error::J2kError;

const UNSET: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct TagNode {
    parent: Option<usize>,
    value: u32,
    low: u32,
    known: bool,
}

#[derive(Debug, Clone)]
pub struct TagTree {
    nodes: Vec<TagNode>,
    leaves_w: usize,
    leaves_h: usize,
}

impl TagTree {
    /// Build a tree over a `width x height` leaf grid; each level halves
    /// (rounded up) until a single root remains.
    pub fn new(width: usize, height: usize) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        // Collect level dimensions, finest first.
        let mut dims = vec![(width, height)];
        let (mut w, mut h) = (width, height);
        while w > 1 || h > 1 {
            w = w.div_ceil(2);
            h = h.div_ceil(2);
            dims.push((w, h));
        }
        let mut level_offset = Vec::with_capacity(dims.len());
        let mut total = 0usize;
        for &(w, h) in &dims {
            level_offset.push(total);
            total += w * h;
        }
        let mut nodes = Vec::with_capacity(total);
        for (lvl, &(w, h)) in dims.iter().enumerate() {
            for y in 0..h {
                for x in 0..w {
                    let parent = if lvl + 1 < dims.len() {
                        let (pw, _) = dims[lvl + 1];
                        Some(level_offset[lvl + 1] + (y / 2) * pw + (x / 2))
                    } else {
                        None
                    };
                    nodes.push(TagNode {
                        parent,
                        value: UNSET,
                        low: 0,
                        known: false,
                    });
                }
            }
        }
        Self {
            nodes,
            leaves_w: width,
            leaves_h: height,
        }
    }

    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.value = UNSET;
            node.low = 0;
            node.known = false;
        }
    }

    fn leaf_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.leaves_w && y < self.leaves_h);
        y * self.leaves_w + x
    }

    /// Set a leaf value, propagating the minimum up the tree. All leaf
    /// values must be set before encoding begins.
    pub fn set_value(&mut self, x: usize, y: usize, value: u32) {
        let mut node = Some(self.leaf_index(x, y));
        while let Some(i) = node {
            if self.nodes[i].value != UNSET && self.nodes[i].value <= value {
                break;
            }
            self.nodes[i].value = value;
            node = self.nodes[i].parent;
        }
    }

    fn path_to_root(&self, leaf: usize) -> Vec<usize> {
        let mut path = vec![leaf];
        let mut node = leaf;
        while let Some(p) = self.nodes[node].parent {
            path.push(p);
            node = p;
        }
        path.reverse();
        path
    }

    /// Emit the bits proving whether leaf (x, y) has value < threshold.
    pub fn encode(&mut self, writer: &mut J2kBitWriter, x: usize, y: usize, threshold: u32) {
        let path = self.path_to_root(self.leaf_index(x, y));
        let mut low = 0u32;
        for &i in &path {
            if low > self.nodes[i].low {
                self.nodes[i].low = low;
            } else {
                low = self.nodes[i].low;
            }
            while low < threshold {
                if low >= self.nodes[i].value {
                    if !self.nodes[i].known {
                        writer.write_bit(1);
                        self.nodes[i].known = true;
                    }
                    break;
                }
                writer.write_bit(0);
                low += 1;
            }
            self.nodes[i].low = low;
        }
    }

    /// Consume bits and report whether leaf (x, y) has value < threshold.
    pub fn decode(
        &mut self,
        reader: &mut J2kBitReader,
        x: usize,
        y: usize,
        threshold: u32,
    ) -> Result<bool, J2kError> {
        let path = self.path_to_root(self.leaf_index(x, y));
        let mut low = 0u32;
        for &i in &path {
            if low > self.nodes[i].low {
                self.nodes[i].low = low;
            } else {
                low = self.nodes[i].low;
            }
            while low < threshold && low < self.nodes[i].value {
                if reader.read_bit()? == 0 {
                    low += 1;
                } else {
                    self.nodes[i].value = low;
                }
            }
            self.nodes[i].low = low.min(self.nodes[i].value);
        }
        let leaf = *path.last().expect("path contains the leaf");
        Ok(self.nodes[leaf].value < threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(tree_enc: &mut TagTree, tree_dec: &mut TagTree, queries: &[(usize, usize, u32)]) {
        let mut writer = J2kBitWriter::new();
        for &(x, y, t) in queries {
            tree_enc.encode(&mut writer, x, y, t);
        }
        let bytes = writer.finish();
        let mut reader = J2kBitReader::new(&bytes);
        for &(x, y, t) in queries {
            let below = tree_dec.decode(&mut reader, x, y, t).unwrap();
            assert_eq!(below, true, "query ({x},{y})<{t} must resolve");
        }
    }

    #[test]
    fn test_single_leaf() {
        let mut enc = TagTree::new(1, 1);
        let mut dec = TagTree::new(1, 1);
        enc.set_value(0, 0, 3);
        transfer(&mut enc, &mut dec, &[(0, 0, 4)]);
    }

    #[test]
    fn test_grid_values_recovered() {
        let (w, h) = (3, 2);
        let values = [[2u32, 0, 1], [3, 1, 0]];
        let mut enc = TagTree::new(w, h);
        let mut dec = TagTree::new(w, h);
        for y in 0..h {
            for x in 0..w {
                enc.set_value(x, y, values[y][x]);
            }
        }
        // Encode every leaf fully (large threshold) and read the values
        // back by raising thresholds one at a time.
        let mut writer = J2kBitWriter::new();
        for y in 0..h {
            for x in 0..w {
                enc.encode(&mut writer, x, y, 8);
            }
        }
        let bytes = writer.finish();
        let mut reader = J2kBitReader::new(&bytes);
        for y in 0..h {
            for x in 0..w {
                let mut t = 1;
                while !dec.decode(&mut reader, x, y, t).unwrap() {
                    t += 1;
                }
                assert_eq!(t - 1, values[y][x], "leaf ({x},{y})");
            }
        }
    }

    #[test]
    fn test_incremental_thresholds_share_bits() {
        // Layered inclusion: the same tree queried with rising thresholds
        // across "layers" must stay consistent.
        let (w, h) = (4, 4);
        let mut enc = TagTree::new(w, h);
        let mut dec = TagTree::new(w, h);
        for y in 0..h {
            for x in 0..w {
                enc.set_value(x, y, ((x + y) % 3) as u32);
            }
        }
        let mut writer = J2kBitWriter::new();
        let mut expected = Vec::new();
        for t in 1..=3u32 {
            for y in 0..h {
                for x in 0..w {
                    enc.encode(&mut writer, x, y, t);
                    expected.push(((x + y) % 3) as u32 <= t - 1);
                }
            }
        }
        let bytes = writer.finish();
        let mut reader = J2kBitReader::new(&bytes);
        let mut it = expected.into_iter();
        for t in 1..=3u32 {
            for y in 0..h {
                for x in 0..w {
                    let below = dec.decode(&mut reader, x, y, t).unwrap();
                    assert_eq!(below, it.next().unwrap(), "t={t} ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut tree = TagTree::new(2, 2);
        tree.set_value(0, 0, 5);
        tree.reset();
        let mut writer = J2kBitWriter::new();
        tree.set_value(0, 0, 0);
        tree.set_value(1, 0, 0);
        tree.set_value(0, 1, 0);
        tree.set_value(1, 1, 0);
        tree.encode(&mut writer, 0, 0, 1);
        // Value 0 against threshold 1 needs one bit per level.
        assert!(!writer.finish().is_empty());
    }
}
