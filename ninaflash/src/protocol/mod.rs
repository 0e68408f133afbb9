//! Command sketch protocol.

pub mod channel;
pub mod frame;

// Re-export common types
pub use channel::CommandChannel;
pub use frame::{ACK, CommandFrame, DIGEST_LEN, MIN_PAYLOAD_SIZE, Opcode};
