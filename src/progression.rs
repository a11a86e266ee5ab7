//! Packet sequencing.
//!
//! A packet is identified by (layer, resolution, component, precinct);
//! the progression order nests those four loops with the outermost index
//! named first. Encoder, decoder and transcoder all consume the same
//! sequence so packet order is identical on both sides. POC entries
//! replace the default order with consecutive sub-progressions over
//! bounded layer/resolution/component ranges.

use std::collections::HashSet;

use crate::config::ProgressionOrder;
use crate::headers::J2kPocEntry;

/// One packet slot in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketId {
    pub layer: u16,
    pub resolution: u8,
    pub component: u16,
    pub precinct: usize,
}

/// Per-component, per-resolution precinct counts.
pub struct PacketSpace<'a> {
    pub layers: u16,
    /// precincts[c][r] = precinct count for component c at resolution r;
    /// the resolution count may differ per component.
    pub precincts: &'a [Vec<usize>],
}

impl PacketSpace<'_> {
    fn components(&self) -> u16 {
        self.precincts.len() as u16
    }

    fn max_resolutions(&self) -> u8 {
        self.precincts.iter().map(|r| r.len()).max().unwrap_or(0) as u8
    }

    fn max_precincts(&self) -> usize {
        self.precincts
            .iter()
            .flat_map(|r| r.iter().copied())
            .max()
            .unwrap_or(0)
    }

    fn contains(&self, id: &PacketId) -> bool {
        self.precincts
            .get(id.component as usize)
            .and_then(|r| r.get(id.resolution as usize))
            .is_some_and(|&count| id.precinct < count)
    }
}

fn push_if_present(space: &PacketSpace, out: &mut Vec<PacketId>, id: PacketId) {
    if space.contains(&id) {
        out.push(id);
    }
}

/// Generate the packet sequence for one tile in the given order.
pub fn packet_sequence(order: ProgressionOrder, space: &PacketSpace) -> Vec<PacketId> {
    sequence_over(
        order,
        space,
        0..space.layers,
        0..space.max_resolutions(),
        0..space.components(),
    )
}

fn sequence_over(
    order: ProgressionOrder,
    space: &PacketSpace,
    layers: std::ops::Range<u16>,
    resolutions: std::ops::Range<u8>,
    components: std::ops::Range<u16>,
) -> Vec<PacketId> {
    let mut out = Vec::new();
    let precinct_bound = space.max_precincts();
    match order {
        ProgressionOrder::Lrcp => {
            for layer in layers.clone() {
                for resolution in resolutions.clone() {
                    for component in components.clone() {
                        for precinct in 0..precinct_bound {
                            push_if_present(space, &mut out, PacketId { layer, resolution, component, precinct });
                        }
                    }
                }
            }
        }
        ProgressionOrder::Rlcp => {
            for resolution in resolutions.clone() {
                for layer in layers.clone() {
                    for component in components.clone() {
                        for precinct in 0..precinct_bound {
                            push_if_present(space, &mut out, PacketId { layer, resolution, component, precinct });
                        }
                    }
                }
            }
        }
        ProgressionOrder::Rpcl => {
            for resolution in resolutions.clone() {
                for precinct in 0..precinct_bound {
                    for component in components.clone() {
                        for layer in layers.clone() {
                            push_if_present(space, &mut out, PacketId { layer, resolution, component, precinct });
                        }
                    }
                }
            }
        }
        ProgressionOrder::Pcrl => {
            for precinct in 0..precinct_bound {
                for component in components.clone() {
                    for resolution in resolutions.clone() {
                        for layer in layers.clone() {
                            push_if_present(space, &mut out, PacketId { layer, resolution, component, precinct });
                        }
                    }
                }
            }
        }
        ProgressionOrder::Cprl => {
            for component in components.clone() {
                for precinct in 0..precinct_bound {
                    for resolution in resolutions.clone() {
                        for layer in layers.clone() {
                            push_if_present(space, &mut out, PacketId { layer, resolution, component, precinct });
                        }
                    }
                }
            }
        }
    }
    out
}

/// Packet sequence honouring POC entries: each entry contributes its
/// bounded sub-progression in order; packets already emitted by an
/// earlier entry are not repeated.
pub fn packet_sequence_with_poc(
    default_order: ProgressionOrder,
    space: &PacketSpace,
    poc: &[J2kPocEntry],
) -> Vec<PacketId> {
    if poc.is_empty() {
        return packet_sequence(default_order, space);
    }
    let mut seen: HashSet<PacketId> = HashSet::new();
    let mut out = Vec::new();
    for entry in poc {
        let layers = 0..entry.layer_end.min(space.layers);
        let resolutions = entry.resolution_start..entry.resolution_end.min(space.max_resolutions());
        let components = entry.component_start..entry.component_end.min(space.components());
        for id in sequence_over(entry.order, space, layers, resolutions, components) {
            if seen.insert(id) {
                out.push(id);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space_1c(layers: u16, resolutions: usize) -> Vec<Vec<usize>> {
        let _ = layers;
        vec![vec![1; resolutions]]
    }

    #[test]
    fn test_lrcp_order() {
        let precincts = space_1c(2, 3);
        let space = PacketSpace {
            layers: 2,
            precincts: &precincts,
        };
        let seq = packet_sequence(ProgressionOrder::Lrcp, &space);
        assert_eq!(seq.len(), 6);
        // Layer is outermost.
        assert!(seq[..3].iter().all(|p| p.layer == 0));
        assert!(seq[3..].iter().all(|p| p.layer == 1));
        assert_eq!(seq[0].resolution, 0);
        assert_eq!(seq[2].resolution, 2);
    }

    #[test]
    fn test_rlcp_order() {
        let precincts = space_1c(2, 3);
        let space = PacketSpace {
            layers: 2,
            precincts: &precincts,
        };
        let seq = packet_sequence(ProgressionOrder::Rlcp, &space);
        // Resolution outermost: both layers of r=0 first.
        assert_eq!(seq[0].resolution, 0);
        assert_eq!(seq[1].resolution, 0);
        assert_eq!(seq[0].layer, 0);
        assert_eq!(seq[1].layer, 1);
    }

    #[test]
    fn test_cprl_order_two_components() {
        let precincts = vec![vec![1; 2], vec![1; 2]];
        let space = PacketSpace {
            layers: 1,
            precincts: &precincts,
        };
        let seq = packet_sequence(ProgressionOrder::Cprl, &space);
        assert_eq!(seq.len(), 4);
        assert!(seq[..2].iter().all(|p| p.component == 0));
        assert!(seq[2..].iter().all(|p| p.component == 1));
    }

    #[test]
    fn test_every_order_covers_all_packets_once() {
        let precincts = vec![vec![1; 4], vec![1; 3]];
        let space = PacketSpace {
            layers: 3,
            precincts: &precincts,
        };
        let expected = 3 * 4 + 3 * 3;
        for order in [
            ProgressionOrder::Lrcp,
            ProgressionOrder::Rlcp,
            ProgressionOrder::Rpcl,
            ProgressionOrder::Pcrl,
            ProgressionOrder::Cprl,
        ] {
            let seq = packet_sequence(order, &space);
            assert_eq!(seq.len(), expected, "{order:?}");
            let unique: HashSet<_> = seq.iter().collect();
            assert_eq!(unique.len(), expected, "{order:?} repeats packets");
        }
    }

    #[test]
    fn test_components_with_different_resolution_counts() {
        // Component 1 has fewer resolutions; its missing packets are
        // skipped, not emitted.
        let precincts = vec![vec![1; 3], vec![1; 1]];
        let space = PacketSpace {
            layers: 1,
            precincts: &precincts,
        };
        let seq = packet_sequence(ProgressionOrder::Lrcp, &space);
        assert_eq!(seq.len(), 4);
        assert!(seq
            .iter()
            .all(|p| !(p.component == 1 && p.resolution > 0)));
    }

    #[test]
    fn test_poc_two_entries() {
        let precincts = space_1c(2, 3);
        let space = PacketSpace {
            layers: 2,
            precincts: &precincts,
        };
        let poc = vec![
            J2kPocEntry {
                resolution_start: 0,
                component_start: 0,
                layer_end: 2,
                resolution_end: 1,
                component_end: 1,
                order: ProgressionOrder::Lrcp,
            },
            J2kPocEntry {
                resolution_start: 0,
                component_start: 0,
                layer_end: 2,
                resolution_end: 3,
                component_end: 1,
                order: ProgressionOrder::Rlcp,
            },
        ];
        let seq = packet_sequence_with_poc(ProgressionOrder::Lrcp, &space, &poc);
        // First entry: r=0 only, both layers. Second entry fills the rest
        // without repeating r=0 packets.
        assert_eq!(seq.len(), 6);
        assert_eq!(seq[0].resolution, 0);
        assert_eq!(seq[1].resolution, 0);
        let unique: HashSet<_> = seq.iter().collect();
        assert_eq!(unique.len(), 6);
    }
}
