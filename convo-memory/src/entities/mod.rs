//! Entities - Messages, Blocks, and Chains
//!
//! `TigerStyle`: Plain serde value types. Timestamps are passed in by the
//! caller (from a `Clock`) so simulations control every age.

mod block;
mod chain;
mod message;

pub use block::{BlockSource, ConversationBlock, CorrectionNote, MemoryTier, ProcessingStatus};
pub use chain::{ChainError, ChainSummary, MessageChain};
pub use message::{Message, MessageRole, MessageType};
