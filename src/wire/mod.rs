//! Bit-exact switch packet format

pub mod packet;

pub use packet::{packet_len, PassInstrs, RegisterInstr, SwitchPacket, HEADER_LEN, PACKET_MAGIC, RECORD_LEN, STOP_BIT};
