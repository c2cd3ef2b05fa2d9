//! Core data types shared by the meshmac medium model and MAC layer

pub mod actor;
pub mod packet;
pub mod types;

pub use actor::{Actor, Position};
pub use packet::{Mode, Packet, PacketError, Payload};
pub use types::{ActorId, Tick, TransmissionId, ACK_MARKER};
