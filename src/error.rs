use crate::types::{Key, TxnId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OffloadError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Layout / compilation invariants
    #[error("Key {0} has no layout entry (cold key reached the compiler)")]
    ColdKey(Key),

    #[error("Transaction has no hot keys")]
    EmptyTransaction,

    #[error("Key {0} is already placed")]
    KeyAlreadyPlaced(Key),

    #[error("Register array (stage {stage}, reg {register}) is full")]
    RegisterFull { stage: usize, register: usize },

    #[error("Location (stage {stage}, reg {register}, slot {slot}) is outside the register space")]
    LocationOutOfRange {
        stage: usize,
        register: usize,
        slot: u32,
    },

    #[error("Lock partition needs {needed} lock ids but only {available} exist")]
    LockPartitionOverflow { needed: usize, available: usize },

    // Simulator resources
    #[error("Invalid port: {0}")]
    InvalidPort(usize),

    #[error("Transaction slot pool exhausted ({0} slots)")]
    PoolExhausted(usize),

    #[error("Stale slot handle {index} (generation {generation})")]
    StaleSlot { index: u32, generation: u32 },

    #[error("Run did not finish within {0} cycles")]
    CycleBudgetExceeded(u64),

    // Wire format
    #[error("Packet too short: {len} bytes, need {needed}")]
    PacketTooShort { len: usize, needed: usize },

    #[error("Packet does not carry the switch transaction magic")]
    BadPacketMagic,

    #[error("Packet has no terminating stop marker")]
    MissingStopMarker,

    #[error("Transaction has {count} register instructions, packet holds {max}")]
    TooManyInstructions { count: usize, max: usize },

    #[error("Value {value} does not fit the {field} field")]
    FieldOverflow { field: &'static str, value: u64 },

    #[error("Unknown register opcode: 0x{0:02x}")]
    UnknownOpcode(u8),

    // Verification
    #[error("Unserializable history, dependency cycle: {cycle:?}")]
    NotSerializable { cycle: Vec<TxnId> },
}

pub type OffloadResult<T> = Result<T, OffloadError>;
