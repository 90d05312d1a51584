/*!
Simple mesh back end: latency from Manhattan distance.

Every processing element gets a coordinate on an `x_size` by `y_size` mesh.
Memory CPUs sit at the linear indices named by `mcpus_indices`; tiles fill
the remaining positions in row-major order. Packet latency is
`injection + link traversal + hops * latency_per_hop`, where the hop count
includes the destination router.
*/

use crate::error::ConfigError;

const DESTINATION_ROUTER: u64 = 1;
const INJECTION: u64 = 1;
const LINK_TRAVERSAL: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    pub x: u16,
    pub y: u16,
}

#[derive(Debug)]
pub struct MeshGeometry {
    tiles: Vec<Coord>,
    mcpus: Vec<Coord>,
    x_size: u16,
    y_size: u16,
    latency_per_hop: u64,
    /// Accumulated hop counts, one slot per network.
    pub hop_counts: Vec<u64>,
    /// Packets per (destination, source) coordinate pair; O(PEs^2), so only
    /// gathered when the feature is on.
    #[cfg(feature = "packet_matrix")]
    pub dst_src_count: std::collections::HashMap<(Coord, Coord), u64>,
}

impl MeshGeometry {
    pub fn new(
        x_size: u16,
        y_size: u16,
        num_tiles: u16,
        mcpus_indices: &[u16],
        latency_per_hop: u64,
        num_networks: usize,
    ) -> Result<Self, ConfigError> {
        let pes = num_tiles + mcpus_indices.len() as u16;
        if x_size * y_size != pes {
            return Err(ConfigError::MeshSizeMismatch { x: x_size, y: y_size, pes });
        }

        let coord = |i: u16| Coord {
            x: i % x_size,
            y: i / x_size,
        };

        let mcpus: Vec<Coord> = mcpus_indices.iter().map(|&i| coord(i)).collect();
        let tiles: Vec<Coord> = (0..pes)
            .filter(|i| !mcpus_indices.contains(i))
            .map(coord)
            .collect();

        Ok(MeshGeometry {
            tiles,
            mcpus,
            x_size,
            y_size,
            latency_per_hop,
            hop_counts: vec![0; num_networks],
            #[cfg(feature = "packet_matrix")]
            dst_src_count: Default::default(),
        })
    }

    pub fn tile_coord(&self, tile: u16) -> Coord {
        self.tiles[tile as usize]
    }

    pub fn mcpu_coord(&self, mcpu: u16) -> Coord {
        self.mcpus[mcpu as usize]
    }

    fn hops(&self, a: Coord, b: Coord) -> u64 {
        let dx = a.x.abs_diff(b.x) as u64;
        let dy = a.y.abs_diff(b.y) as u64;
        let hops = dx + dy + DESTINATION_ROUTER;
        debug_assert!(hops <= (self.x_size + self.y_size) as u64);
        hops
    }

    /// Latency for a packet between two PEs, charging the hop count to the
    /// given network's counter.
    pub fn packet_latency(&mut self, src: Coord, dst: Coord, network: u8) -> u64 {
        let hops = self.hops(src, dst);
        self.hop_counts[network as usize] += hops;
        #[cfg(feature = "packet_matrix")]
        {
            *self.dst_src_count.entry((dst, src)).or_insert(0) += 1;
        }
        INJECTION + LINK_TRAVERSAL + hops * self.latency_per_hop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_fill_non_mcpu_slots() {
        // 3x2 mesh, MCPUs at linear indices 0 and 5.
        let g = MeshGeometry::new(3, 2, 4, &[0, 5], 1, 1).unwrap();
        assert_eq!(g.mcpu_coord(0), Coord { x: 0, y: 0 });
        assert_eq!(g.mcpu_coord(1), Coord { x: 2, y: 1 });
        assert_eq!(g.tile_coord(0), Coord { x: 1, y: 0 });
        assert_eq!(g.tile_coord(3), Coord { x: 1, y: 1 });
    }

    #[test]
    fn latency_counts_manhattan_hops() {
        let mut g = MeshGeometry::new(3, 2, 4, &[0, 5], 2, 1).unwrap();
        let src = g.tile_coord(0); // (1,0)
        let dst = g.mcpu_coord(1); // (2,1)
        // hops = |1-2| + |0-1| + destination router = 3
        assert_eq!(g.packet_latency(src, dst, 0), 1 + 1 + 3 * 2);
        assert_eq!(g.hop_counts[0], 3);
    }

    #[test]
    fn geometry_rejects_wrong_mesh() {
        assert!(MeshGeometry::new(2, 2, 4, &[0], 1, 1).is_err());
    }
}
