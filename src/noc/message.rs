/*!
NoC messages and the per-message-type configuration table.

The NoC partitions traffic by message type: every type maps to one network
(by name) and one class (a priority, a virtual channel, or both). The mapping
and the per-type header sizes come from the configuration and must cover the
complete closed set of types; anything else is fatal at construction.
*/

use crate::config::parse_keyed_entries;
use crate::error::ConfigError;
use crate::event::Event;

/// The closed set of message types the NoC can carry.
///
/// The NoC routes on (type, source, destination): a type determines whether
/// the endpoints are tiles or memory CPUs, so port indices are scoped to the
/// endpoint kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum NocMessageType {
    RemoteL2Request = 0,
    MemoryRequestLoad = 1,
    MemoryRequestStore = 2,
    MemoryRequestWb = 3,
    RemoteL2Ack = 4,
    /// Completion of a memory operation, memory tile to tile.
    MemoryAck = 5,
    /// An instruction for the memory tile, and its reply on the way back.
    McpuRequest = 6,
    /// Scratchpad completion, tile to memory tile.
    ScratchpadAck = 7,
    /// Scratchpad data transfer, tile to memory tile.
    ScratchpadDataReply = 8,
    /// A command for the scratchpad, memory tile to tile.
    ScratchpadCommand = 9,
    /// Traffic between memory tiles.
    MemTileRequest = 10,
    MemTileReply = 11,
}

pub const NOC_MESSAGE_TYPE_COUNT: usize = 12;

pub const ALL_MESSAGE_TYPES: [NocMessageType; NOC_MESSAGE_TYPE_COUNT] = [
    NocMessageType::RemoteL2Request,
    NocMessageType::MemoryRequestLoad,
    NocMessageType::MemoryRequestStore,
    NocMessageType::MemoryRequestWb,
    NocMessageType::RemoteL2Ack,
    NocMessageType::MemoryAck,
    NocMessageType::McpuRequest,
    NocMessageType::ScratchpadAck,
    NocMessageType::ScratchpadDataReply,
    NocMessageType::ScratchpadCommand,
    NocMessageType::MemTileRequest,
    NocMessageType::MemTileReply,
];

impl NocMessageType {
    pub fn name(self) -> &'static str {
        match self {
            NocMessageType::RemoteL2Request => "REMOTE_L2_REQUEST",
            NocMessageType::MemoryRequestLoad => "MEMORY_REQUEST_LOAD",
            NocMessageType::MemoryRequestStore => "MEMORY_REQUEST_STORE",
            NocMessageType::MemoryRequestWb => "MEMORY_REQUEST_WB",
            NocMessageType::RemoteL2Ack => "REMOTE_L2_ACK",
            NocMessageType::MemoryAck => "MEMORY_ACK",
            NocMessageType::McpuRequest => "MCPU_REQUEST",
            NocMessageType::ScratchpadAck => "SCRATCHPAD_ACK",
            NocMessageType::ScratchpadDataReply => "SCRATCHPAD_DATA_REPLY",
            NocMessageType::ScratchpadCommand => "SCRATCHPAD_COMMAND",
            NocMessageType::MemTileRequest => "MEM_TILE_REQUEST",
            NocMessageType::MemTileReply => "MEM_TILE_REPLY",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_MESSAGE_TYPES.iter().copied().find(|t| t.name() == name)
    }
}

pub const DEFAULT_HEADER_SIZES: [&str; NOC_MESSAGE_TYPE_COUNT] = [
    "REMOTE_L2_REQUEST:8",
    "MEMORY_REQUEST_LOAD:8",
    "MEMORY_REQUEST_STORE:8",
    "MEMORY_REQUEST_WB:8",
    "REMOTE_L2_ACK:8",
    "MEMORY_ACK:8",
    "MCPU_REQUEST:8",
    "SCRATCHPAD_ACK:8",
    "SCRATCHPAD_DATA_REPLY:8",
    "SCRATCHPAD_COMMAND:8",
    "MEM_TILE_REQUEST:8",
    "MEM_TILE_REPLY:8",
];

pub const DEFAULT_NETWORK_AND_CLASS: [&str; NOC_MESSAGE_TYPE_COUNT] = [
    "REMOTE_L2_REQUEST:ADDRESS_ONLY.1",
    "MEMORY_REQUEST_LOAD:ADDRESS_ONLY.1",
    "MEMORY_REQUEST_STORE:DATA_TRANSFER.0",
    "MEMORY_REQUEST_WB:DATA_TRANSFER.0",
    "REMOTE_L2_ACK:DATA_TRANSFER.1",
    "MEMORY_ACK:DATA_TRANSFER.1",
    "MCPU_REQUEST:ADDRESS_ONLY.0",
    "SCRATCHPAD_ACK:CONTROL.0",
    "SCRATCHPAD_DATA_REPLY:DATA_TRANSFER.2",
    "SCRATCHPAD_COMMAND:DATA_TRANSFER.3",
    "MEM_TILE_REQUEST:DATA_TRANSFER.2",
    "MEM_TILE_REPLY:DATA_TRANSFER.2",
];

/// The message-type to (network, class) and header-size tables, built once
/// from configuration and passed to every component that creates messages.
#[derive(Debug, Clone)]
pub struct MessageMap {
    networks: Vec<String>,
    network_of: [u8; NOC_MESSAGE_TYPE_COUNT],
    class_of: [u8; NOC_MESSAGE_TYPE_COUNT],
    header_bits: [u16; NOC_MESSAGE_TYPE_COUNT],
    max_class: u8,
}

impl MessageMap {
    pub fn new(
        networks: &[String],
        header_entries: &[String],
        net_class_entries: &[String],
    ) -> Result<Self, ConfigError> {
        for pair in networks.windows(2) {
            if pair[0] == pair[1] {
                return Err(ConfigError::UnknownValue {
                    path: "noc.noc_networks".into(),
                    value: format!("duplicate network {}", pair[0]),
                });
            }
        }

        let headers = parse_keyed_entries("noc.message_header_size", header_entries)?;
        let net_class = parse_keyed_entries("noc.message_to_network_and_class", net_class_entries)?;

        let mut map = MessageMap {
            networks: networks.to_vec(),
            network_of: [0; NOC_MESSAGE_TYPE_COUNT],
            class_of: [0; NOC_MESSAGE_TYPE_COUNT],
            header_bits: [0; NOC_MESSAGE_TYPE_COUNT],
            max_class: 0,
        };

        for ty in ALL_MESSAGE_TYPES {
            let header = headers
                .get(ty.name())
                .ok_or(ConfigError::MessageNotMapped(ty.name()))?;
            map.header_bits[ty as usize] =
                header.parse().map_err(|_| ConfigError::MalformedEntry {
                    path: "noc.message_header_size".into(),
                    entry: format!("{}:{}", ty.name(), header),
                })?;

            let spec = net_class
                .get(ty.name())
                .ok_or(ConfigError::MessageNotMapped(ty.name()))?;
            let (net_name, class) = spec.split_once('.').ok_or_else(|| ConfigError::MalformedEntry {
                path: "noc.message_to_network_and_class".into(),
                entry: format!("{}:{}", ty.name(), spec),
            })?;
            let network = networks
                .iter()
                .position(|n| n == net_name)
                .ok_or_else(|| ConfigError::UnknownNetwork {
                    message: ty.name().into(),
                    network: net_name.into(),
                })?;
            let class: u8 = class.parse().map_err(|_| ConfigError::MalformedEntry {
                path: "noc.message_to_network_and_class".into(),
                entry: format!("{}:{}", ty.name(), spec),
            })?;
            map.network_of[ty as usize] = network as u8;
            map.class_of[ty as usize] = class;
            map.max_class = map.max_class.max(class);
        }

        Ok(map)
    }

    pub fn defaults() -> Self {
        let networks: Vec<String> = ["DATA_TRANSFER", "ADDRESS_ONLY", "CONTROL"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let headers: Vec<String> = DEFAULT_HEADER_SIZES.iter().map(|s| s.to_string()).collect();
        let net_class: Vec<String> = DEFAULT_NETWORK_AND_CLASS.iter().map(|s| s.to_string()).collect();
        MessageMap::new(&networks, &headers, &net_class).expect("default tables are complete")
    }

    pub fn network_for(&self, ty: NocMessageType) -> u8 {
        self.network_of[ty as usize]
    }

    pub fn class_for(&self, ty: NocMessageType) -> u8 {
        self.class_of[ty as usize]
    }

    pub fn header_bits(&self, ty: NocMessageType) -> u16 {
        self.header_bits[ty as usize]
    }

    pub fn num_networks(&self) -> usize {
        self.networks.len()
    }

    pub fn network_name(&self, network: u8) -> &str {
        &self.networks[network as usize]
    }

    pub fn max_class(&self) -> u8 {
        self.max_class
    }
}

/// A message in flight on the NoC, wrapping the event it transports.
#[derive(Debug, Clone)]
pub struct NocMessage {
    pub payload: Event,
    pub ty: NocMessageType,
    /// Total size in bits, header included.
    pub size_bits: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub network: u8,
    pub class: u8,
}

impl NocMessage {
    /// Build a message. Messages must carry fully routed payloads (home tile
    /// and memory controller already stamped where applicable); they are
    /// created only at the tile and memory-CPU seams.
    pub fn new(
        payload: Event,
        ty: NocMessageType,
        payload_size_bytes: u32,
        src_port: u16,
        dst_port: u16,
        map: &MessageMap,
    ) -> Self {
        NocMessage {
            payload,
            ty,
            size_bits: payload_size_bytes * 8 + map.header_bits(ty) as u32,
            src_port,
            dst_port,
            network: map.network_for(ty),
            class: map.class_for(ty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AccessType, CacheRequest, Event};

    #[test]
    fn default_tables_cover_every_type() {
        let map = MessageMap::defaults();
        for ty in ALL_MESSAGE_TYPES {
            assert!(map.header_bits(ty) > 0, "{} has no header", ty.name());
            assert!((map.network_for(ty) as usize) < map.num_networks());
        }
        assert_eq!(map.max_class(), 3);
    }

    #[test]
    fn network_and_class_derive_from_type() {
        let map = MessageMap::defaults();
        let req = CacheRequest::new(0x1000, AccessType::Load, 0, 0, 0);
        let msg = NocMessage::new(
            Event::Cache(req),
            NocMessageType::RemoteL2Request,
            8,
            0,
            1,
            &map,
        );
        assert_eq!(map.network_name(msg.network), "ADDRESS_ONLY");
        assert_eq!(msg.class, 1);
        assert_eq!(msg.size_bits, 8 * 8 + 8);
    }

    #[test]
    fn missing_mapping_is_fatal() {
        let networks = vec!["ONLY".to_string()];
        let headers: Vec<String> = DEFAULT_HEADER_SIZES.iter().map(|s| s.to_string()).collect();
        // Drop one entry from the network/class table.
        let net_class: Vec<String> = DEFAULT_NETWORK_AND_CLASS[1..]
            .iter()
            .map(|s| s.replace("ADDRESS_ONLY", "ONLY").replace("DATA_TRANSFER", "ONLY").replace("CONTROL", "ONLY"))
            .collect();
        assert!(MessageMap::new(&networks, &headers, &net_class).is_err());
    }
}
