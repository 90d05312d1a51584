/*!
Configuration: a recursive parameter tree addressed by dotted paths, plus the
typed `SimConfig` the assembly code consumes.

The tree is a JSON document. `ParamTree` provides typed getters with optional
defaulting; `SimConfig::from_tree` pulls every recognized path, validates the
cross-component constraints (line sizes, mesh geometry, policy names) and
fails construction on the first inconsistency.
*/

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ConfigError;

/// Thin wrapper over a parsed JSON document with dotted-path access.
#[derive(Debug, Clone)]
pub struct ParamTree {
    root: Value,
}

impl ParamTree {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(ParamTree {
            root: serde_json::from_str(text)?,
        })
    }

    pub fn empty() -> Self {
        ParamTree {
            root: Value::Object(Default::default()),
        }
    }

    /// Look up a node by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for part in path.split('.') {
            node = node.as_object()?.get(part)?;
        }
        Some(node)
    }

    pub fn get_u64(&self, path: &str, default: u64) -> Result<u64, ConfigError> {
        match self.get(path) {
            None => Ok(default),
            Some(v) => v.as_u64().ok_or_else(|| ConfigError::WrongType {
                path: path.into(),
                expected: "non-negative integer",
            }),
        }
    }

    pub fn get_u16(&self, path: &str, default: u16) -> Result<u16, ConfigError> {
        Ok(self.get_u64(path, default as u64)? as u16)
    }

    pub fn get_bool(&self, path: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(path) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| ConfigError::WrongType {
                path: path.into(),
                expected: "boolean",
            }),
        }
    }

    pub fn get_string(&self, path: &str, default: &str) -> Result<String, ConfigError> {
        match self.get(path) {
            None => Ok(default.to_string()),
            Some(v) => v
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ConfigError::WrongType {
                    path: path.into(),
                    expected: "string",
                }),
        }
    }

    pub fn get_string_list(&self, path: &str, default: &[&str]) -> Result<Vec<String>, ConfigError> {
        match self.get(path) {
            None => Ok(default.iter().map(|s| s.to_string()).collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ConfigError::WrongType {
                            path: path.into(),
                            expected: "list of strings",
                        })
                })
                .collect(),
            Some(_) => Err(ConfigError::WrongType {
                path: path.into(),
                expected: "list of strings",
            }),
        }
    }

    pub fn get_u16_list(&self, path: &str, default: &[u16]) -> Result<Vec<u16>, ConfigError> {
        match self.get(path) {
            None => Ok(default.to_vec()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_u64().map(|n| n as u16).ok_or_else(|| ConfigError::WrongType {
                        path: path.into(),
                        expected: "list of integers",
                    })
                })
                .collect(),
            Some(_) => Err(ConfigError::WrongType {
                path: path.into(),
                expected: "list of integers",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Tiled,
    L2UnitTest,
    MemoryControllerUnitTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationMode {
    ExecutionDriven,
    TraceDriven,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NocModel {
    Functional,
    Simple,
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L2SharingMode {
    TilePrivate,
    FullyShared,
}

/// Data mapping for cache banks and, under `fully_shared`, tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDataMappingPolicy {
    /// Bank and tile come from the low-order set bits.
    SetInterleaving,
    /// Bank and tile come from the high-order set bits, keeping a page
    /// resident in one bank.
    PageToBank,
}

/// Data mapping for scratchpad accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VRegMappingPolicy {
    CoreToBank,
    VregInterleaving,
}

/// DRAM address decode scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMappingPolicy {
    OpenPage,
    ClosePage,
}

fn parse_enum<T>(path: &str, value: &str, table: &[(&str, T)]) -> Result<T, ConfigError>
where
    T: Copy,
{
    table
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(_, v)| *v)
        .ok_or_else(|| ConfigError::UnknownValue {
            path: path.into(),
            value: value.into(),
        })
}

/// Every parameter the assembly consumes, pulled out of the tree and checked.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub architecture: Architecture,
    pub simulation_mode: SimulationMode,

    pub num_cores: u16,
    pub num_threads_per_core: u16,
    pub thread_switch_latency: u64,
    pub num_mshrs_per_core: u16,

    pub num_tiles: u16,
    pub x_size: u16,
    pub y_size: u16,
    pub num_memory_cpus: u16,
    pub mcpus_indices: Vec<u16>,

    pub noc_model: NocModel,
    pub noc_networks: Vec<String>,
    pub message_header_size: Vec<String>,
    pub message_to_network_and_class: Vec<String>,
    pub noc_packet_latency: u64,
    pub noc_latency_per_hop: u64,

    pub l2_sharing_mode: L2SharingMode,
    pub bank_policy: CacheDataMappingPolicy,
    pub tile_policy: CacheDataMappingPolicy,
    pub scratchpad_policy: VRegMappingPolicy,

    pub num_l2_banks: u16,
    pub line_size: u64,
    pub size_kb: u64,
    pub associativity: u64,
    pub lvrf_ways: u64,
    pub bank_hit_latency: u64,
    pub bank_miss_latency: u64,
    pub bank_max_outstanding_misses: u16,
    pub l1_line_size: u64,

    pub arbiter_q_size: usize,
    pub local_bank_latency: u64,

    pub address_mapping_policy: AddressMappingPolicy,
    pub num_memory_controllers: u64,
    pub num_banks_per_mc: u64,
    pub num_rows_per_bank: u64,
    pub num_cols_per_bank: u64,
    pub mc_latency: u64,
    pub mc_row_miss_penalty: u64,

    pub mcpu_line_size: u64,
    pub mcpu_latency: u64,
    pub enable_smart_mcpu: bool,

    pub vector_bypass_l1: bool,
    pub vector_bypass_l2: bool,
    pub l1_writeback: bool,

    pub trace: bool,
    pub events_to_trace: Vec<String>,
    pub trace_start_tick: u64,
    pub trace_end_tick: u64,
}

impl SimConfig {
    pub fn from_tree(t: &ParamTree) -> Result<Self, ConfigError> {
        let architecture = parse_enum(
            "architecture",
            &t.get_string("architecture", "tiled")?,
            &[
                ("tiled", Architecture::Tiled),
                ("l2_unit_test", Architecture::L2UnitTest),
                ("memory_controller_unit_test", Architecture::MemoryControllerUnitTest),
            ],
        )?;
        let simulation_mode = parse_enum(
            "simulation_mode",
            &t.get_string("simulation_mode", "execution_driven")?,
            &[
                ("execution_driven", SimulationMode::ExecutionDriven),
                ("trace_driven", SimulationMode::TraceDriven),
            ],
        )?;
        let noc_model = parse_enum(
            "noc.noc_model",
            &t.get_string("noc.noc_model", "functional")?,
            &[
                ("functional", NocModel::Functional),
                ("simple", NocModel::Simple),
                ("detailed", NocModel::Detailed),
            ],
        )?;
        let l2_sharing_mode = parse_enum(
            "l2_sharing_mode",
            &t.get_string("l2_sharing_mode", "tile_private")?,
            &[
                ("tile_private", L2SharingMode::TilePrivate),
                ("fully_shared", L2SharingMode::FullyShared),
            ],
        )?;
        let cache_policies = [
            ("set_interleaving", CacheDataMappingPolicy::SetInterleaving),
            ("page_to_bank", CacheDataMappingPolicy::PageToBank),
        ];
        let bank_policy = parse_enum("bank_policy", &t.get_string("bank_policy", "set_interleaving")?, &cache_policies)?;
        let tile_policy = parse_enum("tile_policy", &t.get_string("tile_policy", "set_interleaving")?, &cache_policies)?;
        let scratchpad_policy = parse_enum(
            "scratchpad_policy",
            &t.get_string("scratchpad_policy", "core_to_bank")?,
            &[
                ("core_to_bank", VRegMappingPolicy::CoreToBank),
                ("vreg_interleaving", VRegMappingPolicy::VregInterleaving),
            ],
        )?;
        let address_mapping_policy = parse_enum(
            "memory_controller.address_policy",
            &t.get_string("memory_controller.address_policy", "open_page")?,
            &[
                ("open_page", AddressMappingPolicy::OpenPage),
                ("close_page", AddressMappingPolicy::ClosePage),
            ],
        )?;

        let num_tiles = t.get_u16("num_tiles", 1)?;
        let num_memory_cpus = t.get_u16("num_memory_cpus", 1)?;
        let x_size = t.get_u16("x_size", 2)?;
        let y_size = t.get_u16("y_size", 1)?;
        let mcpus_indices = t.get_u16_list("mcpus_indices", &[0])?;

        let pes = num_tiles + num_memory_cpus;
        if x_size * y_size != pes {
            return Err(ConfigError::MeshSizeMismatch { x: x_size, y: y_size, pes });
        }
        if mcpus_indices.len() != num_memory_cpus as usize {
            return Err(ConfigError::McpuCountMismatch {
                expected: num_memory_cpus,
                got: mcpus_indices.len(),
            });
        }

        let line_size = t.get_u64("l2_bank.line_size", 64)?;
        let l1_line_size = t.get_u64("l1.line_size", line_size)?;
        let mcpu_line_size = t.get_u64("memory_cpu.line_size", line_size)?;
        if line_size != l1_line_size || line_size != mcpu_line_size {
            return Err(ConfigError::LineSizeMismatch {
                l1: l1_line_size,
                l2: line_size,
                mcpu: mcpu_line_size,
            });
        }

        let cfg = SimConfig {
            architecture,
            simulation_mode,
            num_cores: t.get_u16("num_cores", 1)?,
            num_threads_per_core: t.get_u16("num_threads_per_core", 1)?,
            thread_switch_latency: t.get_u64("thread_switch_latency", 0)?,
            num_mshrs_per_core: t.get_u16("num_mshrs_per_core", 8)?,
            num_tiles,
            x_size,
            y_size,
            num_memory_cpus,
            mcpus_indices,
            noc_model,
            noc_networks: t.get_string_list(
                "noc.noc_networks",
                &["DATA_TRANSFER", "ADDRESS_ONLY", "CONTROL"],
            )?,
            message_header_size: t.get_string_list(
                "noc.message_header_size",
                &crate::noc::message::DEFAULT_HEADER_SIZES,
            )?,
            message_to_network_and_class: t.get_string_list(
                "noc.message_to_network_and_class",
                &crate::noc::message::DEFAULT_NETWORK_AND_CLASS,
            )?,
            noc_packet_latency: t.get_u64("noc.packet_latency", 30)?,
            noc_latency_per_hop: t.get_u64("noc.latency_per_hop", 1)?,
            l2_sharing_mode,
            bank_policy,
            tile_policy,
            scratchpad_policy,
            num_l2_banks: t.get_u16("tile.num_l2_banks", 1)?,
            line_size,
            size_kb: t.get_u64("l2_bank.size_kb", 2048)?,
            associativity: t.get_u64("l2_bank.associativity", 8)?,
            lvrf_ways: t.get_u64("l2_bank.lvrf_ways", 0)?,
            bank_hit_latency: t.get_u64("l2_bank.hit_latency", 10)?,
            bank_miss_latency: t.get_u64("l2_bank.miss_latency", 10)?,
            bank_max_outstanding_misses: t.get_u16("l2_bank.max_outstanding_misses", 8)?,
            l1_line_size,
            arbiter_q_size: t.get_u64("arbiter.q_sz", 16)? as usize,
            local_bank_latency: t.get_u64("tile.latency", 1)?,
            address_mapping_policy,
            num_memory_controllers: t.get_u64("num_memory_controllers", num_memory_cpus as u64)?,
            num_banks_per_mc: t.get_u64("memory_controller.num_banks", 8)?,
            num_rows_per_bank: t.get_u64("memory_controller.num_rows", 65536)?,
            num_cols_per_bank: t.get_u64("memory_controller.num_cols", 1024)?,
            mc_latency: t.get_u64("memory_controller.latency", 100)?,
            mc_row_miss_penalty: t.get_u64("memory_controller.row_miss_penalty", 25)?,
            mcpu_line_size,
            mcpu_latency: t.get_u64("memory_cpu.latency", 1)?,
            enable_smart_mcpu: t.get_bool("memory_cpu.enable_smart_mcpu", false)?,
            vector_bypass_l1: t.get_bool("vector_bypass_l1", false)?,
            vector_bypass_l2: t.get_bool("vector_bypass_l2", false)?,
            l1_writeback: t.get_bool("l1_writeback", true)?,
            trace: t.get_bool("trace", false)?,
            events_to_trace: t.get_string_list("events_to_trace", &[])?,
            trace_start_tick: t.get_u64("trace_start_tick", 0)?,
            trace_end_tick: t.get_u64("trace_end_tick", u64::MAX)?,
        };

        Ok(cfg)
    }

    /// Defaults for a topology, used heavily by tests.
    pub fn for_topology(num_tiles: u16, num_cores: u16, num_banks: u16) -> Self {
        let mut cfg = SimConfig::from_tree(&ParamTree::empty()).expect("defaults are consistent");
        cfg.num_tiles = num_tiles;
        cfg.num_cores = num_cores;
        cfg.num_l2_banks = num_banks;
        cfg.x_size = num_tiles + cfg.num_memory_cpus;
        cfg.y_size = 1;
        cfg
    }

    pub fn cores_per_tile(&self) -> u16 {
        self.num_cores / self.num_tiles
    }

    /// `(mc_shift, mc_mask)` for memory-controller selection on an address.
    pub fn mc_selection_bits(&self) -> (u64, u64) {
        let shift = log2_ceil(self.line_size);
        let mask = (self.num_memory_controllers as u64).next_power_of_two() - 1;
        (shift, mask)
    }

    /// The memory CPU that handles MCPU_REQUEST traffic for a given tile.
    pub fn mcpu_for_tile(&self, tile: u16) -> u16 {
        (tile as u32 * self.num_memory_cpus as u32 / self.num_tiles as u32) as u16
    }
}

/// ceil(log2(v)) for v >= 1.
pub fn log2_ceil(v: u64) -> u64 {
    if v <= 1 {
        0
    } else {
        64 - (v - 1).leading_zeros() as u64
    }
}

/// Parse `"NAME:value"` entries into a map, as used by the per-message-type
/// configuration lists.
pub fn parse_keyed_entries<'a>(
    path: &str,
    entries: &'a [String],
) -> Result<HashMap<&'a str, &'a str>, ConfigError> {
    let mut out = HashMap::new();
    for entry in entries {
        let (key, value) = entry.split_once(':').ok_or_else(|| ConfigError::MalformedEntry {
            path: path.into(),
            entry: entry.clone(),
        })?;
        out.insert(key, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_paths_resolve() {
        let t = ParamTree::from_json(r#"{"noc": {"noc_model": "simple", "packet_latency": 4}}"#).unwrap();
        assert_eq!(t.get_string("noc.noc_model", "functional").unwrap(), "simple");
        assert_eq!(t.get_u64("noc.packet_latency", 30).unwrap(), 4);
        assert_eq!(t.get_u64("noc.missing", 7).unwrap(), 7);
    }

    #[test]
    fn unknown_policy_is_fatal() {
        let t = ParamTree::from_json(r#"{"bank_policy": "hash_of_hashes"}"#).unwrap();
        assert!(matches!(
            SimConfig::from_tree(&t),
            Err(ConfigError::UnknownValue { .. })
        ));
    }

    #[test]
    fn mesh_must_fit_pes() {
        let t = ParamTree::from_json(r#"{"num_tiles": 4, "num_memory_cpus": 1, "x_size": 2, "y_size": 2}"#)
            .unwrap();
        assert!(matches!(
            SimConfig::from_tree(&t),
            Err(ConfigError::MeshSizeMismatch { .. })
        ));
    }

    #[test]
    fn line_sizes_must_agree() {
        let t = ParamTree::from_json(
            r#"{"l2_bank": {"line_size": 64}, "memory_cpu": {"line_size": 128}}"#,
        )
        .unwrap();
        assert!(matches!(
            SimConfig::from_tree(&t),
            Err(ConfigError::LineSizeMismatch { .. })
        ));
    }

    #[test]
    fn log2_ceil_rounds_up() {
        assert_eq!(log2_ceil(1), 0);
        assert_eq!(log2_ceil(2), 1);
        assert_eq!(log2_ceil(64), 6);
        assert_eq!(log2_ceil(65), 7);
    }
}
