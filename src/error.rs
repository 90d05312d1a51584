//! Error types. Configuration inconsistencies are fatal at construction and
//! surface as `ConfigError`; everything non-transient propagates to `main`
//! through `SimError`. Capacity transients (full arbiter queue, exhausted
//! MSHRs, blocked ejection) are never errors, they map to stall states.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration parameter `{0}`")]
    MissingParameter(String),

    #[error("configuration parameter `{path}` is not a {expected}")]
    WrongType { path: String, expected: &'static str },

    #[error("unknown value `{value}` for `{path}`")]
    UnknownValue { path: String, value: String },

    #[error("malformed entry `{entry}` in `{path}`")]
    MalformedEntry { path: String, entry: String },

    #[error("message type `{0}` is not covered by message_to_network_and_class")]
    MessageNotMapped(&'static str),

    #[error("network `{network}` referenced by `{message}` is not in noc_networks")]
    UnknownNetwork { message: String, network: String },

    #[error("line_size must match across L1, L2 banks and memory CPUs ({l1} / {l2} / {mcpu})")]
    LineSizeMismatch { l1: u64, l2: u64, mcpu: u64 },

    #[error("mesh of {x}x{y} cannot host {pes} processing elements")]
    MeshSizeMismatch { x: u16, y: u16, pes: u16 },

    #[error("mcpus_indices must name exactly {expected} memory CPUs, got {got}")]
    McpuCountMismatch { expected: u16, got: usize },

    #[error("configuration document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("front end failed: {0}")]
    FrontEnd(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
