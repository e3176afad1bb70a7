//! Switch transaction packet
//!
//! Fixed-size layout, all multi-byte fields big-endian:
//!
//! ```text
//! [16] magic
//! [4]  locks_check    [4] locks_acquire    [4] locks_undo
//! [1]  is_second_pass [1] fail_count
//! [8 * (max_hot_ops + 1)] records: type, opcode, slot (u16), payload (u32)
//! ```
//!
//! `type` is the 1-based flat register index. The first record of every
//! pass after the first carries `STOP_BIT`; a record whose type is exactly
//! `STOP_BIT` ends the packet. Unused record space is zero.

use crate::error::{OffloadError, OffloadResult};
use crate::types::{AccessMode, LockSet, RegisterId, SoftwareTransaction};
use smallvec::SmallVec;

pub const PACKET_MAGIC: [u8; 16] = [
    0xBE, 0x87, 0xEF, 0x7E, 0x61, 0x3C, 0x4B, 0x33, 0x82, 0xEB, 0x90, 0x66, 0x3A, 0x40, 0x3D, 0xAE,
];

pub const STOP_BIT: u8 = 0x80;

/// Magic plus lock and flag fields
pub const HEADER_LEN: usize = PACKET_MAGIC.len() + 4 * 3 + 2;

pub const RECORD_LEN: usize = 8;

/// Largest 0-based flat register index the 7-bit type field can carry
const MAX_FLAT_REGISTER: usize = (STOP_BIT as usize) - 2;

/// Encoded size of a packet holding up to `max_hot_ops` instructions
#[inline]
pub const fn packet_len(max_hot_ops: usize) -> usize {
    HEADER_LEN + RECORD_LEN * (max_hot_ops + 1)
}

/// One register operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterInstr {
    /// 0-based flat register index, `stage * regs_per_stage + register`
    pub register: u8,
    pub opcode: AccessMode,
    pub slot: u16,
    pub payload: u32,
}

impl RegisterInstr {
    pub fn register_id(&self, regs_per_stage: usize) -> RegisterId {
        RegisterId::from_flat(self.register as usize, regs_per_stage)
    }

    fn write_to(&self, buf: &mut [u8], stop: bool) {
        let stop_bit = if stop { STOP_BIT } else { 0 };
        buf[0] = (self.register + 1) | stop_bit;
        buf[1] = self.opcode as u8;
        buf[2..4].copy_from_slice(&self.slot.to_be_bytes());
        buf[4..8].copy_from_slice(&self.payload.to_be_bytes());
    }
}

pub type PassInstrs = SmallVec<[RegisterInstr; 8]>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwitchPacket {
    pub locks_check: LockSet,
    pub locks_acquire: LockSet,
    pub locks_undo: LockSet,
    pub is_second_pass: bool,
    pub fail_count: u8,
    pub passes: Vec<PassInstrs>,
}

impl SwitchPacket {
    /// Build the packet for a compiled transaction in its current protocol state
    pub fn from_transaction(txn: &SoftwareTransaction, regs_per_stage: usize) -> OffloadResult<Self> {
        let fail_count = u8::try_from(txn.fail_count).map_err(|_| OffloadError::FieldOverflow {
            field: "fail_count",
            value: txn.fail_count as u64,
        })?;

        let mut passes: Vec<PassInstrs> = vec![SmallVec::new(); txn.num_passes()];
        for access in &txn.accesses {
            let flat = access.location.register_id().flat(regs_per_stage);
            if flat > MAX_FLAT_REGISTER {
                return Err(OffloadError::FieldOverflow {
                    field: "register",
                    value: flat as u64,
                });
            }
            let slot = u16::try_from(access.location.slot).map_err(|_| OffloadError::FieldOverflow {
                field: "slot",
                value: access.location.slot as u64,
            })?;

            let pass = passes.get_mut(access.pass).ok_or(OffloadError::FieldOverflow {
                field: "pass",
                value: access.pass as u64,
            })?;
            pass.push(RegisterInstr {
                register: flat as u8,
                opcode: access.mode,
                slot,
                payload: access.value,
            });
        }

        Ok(Self {
            locks_check: txn.locks_check,
            locks_acquire: txn.locks_want,
            locks_undo: txn.locks_undo,
            is_second_pass: txn.pass_cursor > 0,
            fail_count,
            passes,
        })
    }

    pub fn num_instructions(&self) -> usize {
        self.passes.iter().map(|p| p.len()).sum()
    }

    /// Serialize into a zero-padded `packet_len(max_hot_ops)` buffer
    pub fn encode(&self, max_hot_ops: usize) -> OffloadResult<Vec<u8>> {
        let count = self.num_instructions();
        if count > max_hot_ops {
            return Err(OffloadError::TooManyInstructions {
                count,
                max: max_hot_ops,
            });
        }

        let mut buf = vec![0u8; packet_len(max_hot_ops)];
        buf[..16].copy_from_slice(&PACKET_MAGIC);
        buf[16..20].copy_from_slice(&self.locks_check.bits().to_be_bytes());
        buf[20..24].copy_from_slice(&self.locks_acquire.bits().to_be_bytes());
        buf[24..28].copy_from_slice(&self.locks_undo.bits().to_be_bytes());
        buf[28] = self.is_second_pass as u8;
        buf[29] = self.fail_count;

        let mut offset = HEADER_LEN;
        for (p, pass) in self.passes.iter().enumerate() {
            for (i, instr) in pass.iter().enumerate() {
                instr.write_to(&mut buf[offset..offset + RECORD_LEN], p > 0 && i == 0);
                offset += RECORD_LEN;
            }
        }
        buf[offset] = STOP_BIT;
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> OffloadResult<Self> {
        let needed = HEADER_LEN + RECORD_LEN;
        if buf.len() < needed {
            return Err(OffloadError::PacketTooShort {
                len: buf.len(),
                needed,
            });
        }
        if buf[..16] != PACKET_MAGIC {
            return Err(OffloadError::BadPacketMagic);
        }

        let be32 = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let mut packet = SwitchPacket {
            locks_check: LockSet::from_bits(be32(16)),
            locks_acquire: LockSet::from_bits(be32(20)),
            locks_undo: LockSet::from_bits(be32(24)),
            is_second_pass: buf[28] != 0,
            fail_count: buf[29],
            passes: Vec::new(),
        };

        for record in buf[HEADER_LEN..].chunks_exact(RECORD_LEN) {
            let ty = record[0];
            let register = ty & !STOP_BIT;
            if register == 0 {
                if ty == STOP_BIT {
                    return Ok(packet);
                }
                // Zero padding reached before the terminator
                return Err(OffloadError::MissingStopMarker);
            }
            if ty & STOP_BIT != 0 || packet.passes.is_empty() {
                packet.passes.push(SmallVec::new());
            }

            let opcode = AccessMode::from_u8(record[1]).ok_or(OffloadError::UnknownOpcode(record[1]))?;
            let instr = RegisterInstr {
                register: register - 1,
                opcode,
                slot: u16::from_be_bytes([record[2], record[3]]),
                payload: u32::from_be_bytes([record[4], record[5], record[6], record[7]]),
            };
            if let Some(pass) = packet.passes.last_mut() {
                pass.push(instr);
            }
        }

        Err(OffloadError::MissingStopMarker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::TransactionCompiler;
    use crate::config::SwitchConfig;
    use crate::layout::Layout;
    use crate::types::{Access, Key, Transaction};

    fn compiled() -> SoftwareTransaction {
        // 2 stages x 2 regs; keys 1,2 share (0,1), key 3 on (1,0)
        let config = SwitchConfig::with_dimensions(2, 2, 4);
        let mut layout = Layout::new(&config).unwrap();
        layout.place(Key(1), RegisterId::new(0, 1)).unwrap();
        layout.place(Key(2), RegisterId::new(0, 1)).unwrap();
        layout.place(Key(3), RegisterId::new(1, 0)).unwrap();
        layout.set_frequency(Key(1), 3);
        layout.set_frequency(Key(2), 2);
        let compiler = TransactionCompiler::new(&layout, &config).unwrap();
        let txn = Transaction::new(vec![
            Access::write(Key(2), 0xDEAD_BEEF),
            Access::read(Key(3)),
            Access::write(Key(1), 7),
        ]);
        let (mut out, _) = compiler.compile_batch(0, &[txn]).unwrap();
        out.remove(0)
    }

    #[test]
    fn test_packet_size() {
        assert_eq!(HEADER_LEN, 30);
        assert_eq!(packet_len(8), 102);
    }

    #[test]
    fn test_encoded_bytes() {
        let stx = compiled();
        let packet = SwitchPacket::from_transaction(&stx, 2).unwrap();
        let buf = packet.encode(8).unwrap();
        assert_eq!(buf.len(), 102);
        assert_eq!(&buf[..16], &PACKET_MAGIC);

        // locks: key 2 is contended -> lock 0
        assert_eq!(&buf[16..20], &[0, 0, 0, 1]);
        assert_eq!(&buf[20..24], &[0, 0, 0, 1]);
        assert_eq!(&buf[24..28], &[0, 0, 0, 0]);
        assert_eq!(buf[28], 0);
        assert_eq!(buf[29], 0);

        // pass 0: key 1 on flat reg 1 (type 2), key 3 on flat reg 2 (type 3)
        assert_eq!(&buf[30..38], &[2, 2, 0, 0, 0, 0, 0, 7]);
        assert_eq!(&buf[38..46], &[3, 1, 0, 0, 0, 0, 0, 0]);
        // pass 1: key 2, stop bit marks the pass boundary
        assert_eq!(&buf[46..54], &[0x80 | 2, 2, 0, 1, 0xDE, 0xAD, 0xBE, 0xEF]);
        // terminator, then zero padding
        assert_eq!(buf[54], STOP_BIT);
        assert!(buf[55..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_recovers_instructions_and_locks() {
        let stx = compiled();
        let packet = SwitchPacket::from_transaction(&stx, 2).unwrap();
        let decoded = SwitchPacket::decode(&packet.encode(8).unwrap()).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.passes.len(), 2);
        assert_eq!(decoded.passes[1][0].register_id(2), RegisterId::new(0, 1));
        assert_eq!(decoded.locks_acquire, stx.locks_want);
    }

    #[test]
    fn test_random_transactions_survive_encode_decode() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let config = SwitchConfig::with_dimensions(3, 2, 16);
        let mut layout = Layout::new(&config).unwrap();
        for k in 0..60u64 {
            layout.place(Key(k), RegisterId::from_flat((k % 6) as usize, 2)).unwrap();
            layout.set_frequency(Key(k), k % 7);
        }
        let compiler = TransactionCompiler::new(&layout, &config).unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        let txns: Vec<Transaction> = (0..200)
            .map(|_| {
                let n = rng.gen_range(1..=8);
                Transaction::new(
                    (0..n)
                        .map(|_| {
                            let key = Key(rng.gen_range(0..60));
                            if rng.gen_bool(0.5) {
                                Access::read(key)
                            } else {
                                Access::write(key, rng.gen())
                            }
                        })
                        .collect(),
                )
            })
            .collect();
        let (compiled, _) = compiler.compile_batch(0, &txns).unwrap();

        let mut multi_pass = 0;
        for mut stx in compiled {
            stx.locks_undo = LockSet::from_bits(rng.gen::<u32>() & 0b111);
            stx.fail_count = rng.gen_range(0..8);
            if stx.num_passes() > 1 {
                multi_pass += 1;
            }

            let packet = SwitchPacket::from_transaction(&stx, 2).unwrap();
            let decoded = SwitchPacket::decode(&packet.encode(8).unwrap()).unwrap();

            assert_eq!(decoded.locks_check, stx.locks_check);
            assert_eq!(decoded.locks_acquire, stx.locks_want);
            assert_eq!(decoded.locks_undo, stx.locks_undo);
            assert_eq!(decoded.fail_count as u32, stx.fail_count);
            assert_eq!(decoded.passes.len(), stx.num_passes());

            for (pass, instrs) in decoded.passes.iter().enumerate() {
                let expected: Vec<(RegisterId, AccessMode, u16, u32)> = stx
                    .accesses
                    .iter()
                    .filter(|a| a.pass == pass)
                    .map(|a| (a.location.register_id(), a.mode, a.location.slot as u16, a.value))
                    .collect();
                let got: Vec<(RegisterId, AccessMode, u16, u32)> = instrs
                    .iter()
                    .map(|i| (i.register_id(2), i.opcode, i.slot, i.payload))
                    .collect();
                assert_eq!(got, expected);
            }
        }
        assert!(multi_pass > 0);
    }

    #[test]
    fn test_in_flight_state_is_carried() {
        let mut stx = compiled();
        stx.pass_cursor = 1;
        stx.fail_count = 3;
        stx.locks_undo = LockSet::from_bits(0b100);
        let buf = SwitchPacket::from_transaction(&stx, 2).unwrap().encode(8).unwrap();
        assert_eq!(buf[28], 1);
        assert_eq!(buf[29], 3);
        assert_eq!(&buf[24..28], &[0, 0, 0, 4]);

        stx.fail_count = 300;
        assert!(matches!(
            SwitchPacket::from_transaction(&stx, 2),
            Err(OffloadError::FieldOverflow { field: "fail_count", .. })
        ));
    }

    #[test]
    fn test_encode_limits() {
        let packet = SwitchPacket::from_transaction(&compiled(), 2).unwrap();
        assert_eq!(
            packet.encode(2),
            Err(OffloadError::TooManyInstructions { count: 3, max: 2 })
        );

        let mut stx = compiled();
        stx.accesses[0].location.slot = 70_000;
        assert!(matches!(
            SwitchPacket::from_transaction(&stx, 2),
            Err(OffloadError::FieldOverflow { field: "slot", .. })
        ));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let buf = SwitchPacket::from_transaction(&compiled(), 2)
            .unwrap()
            .encode(8)
            .unwrap();

        assert!(matches!(
            SwitchPacket::decode(&buf[..20]),
            Err(OffloadError::PacketTooShort { len: 20, .. })
        ));

        let mut bad = buf.clone();
        bad[0] ^= 0xFF;
        assert_eq!(SwitchPacket::decode(&bad), Err(OffloadError::BadPacketMagic));

        let mut bad = buf.clone();
        bad[31] = 9;
        assert_eq!(SwitchPacket::decode(&bad), Err(OffloadError::UnknownOpcode(9)));

        let mut bad = buf.clone();
        bad[54] = 0;
        assert_eq!(SwitchPacket::decode(&bad), Err(OffloadError::MissingStopMarker));

        // Instructions fill every record, no room left for the terminator
        let mut bad = buf[..HEADER_LEN + 3 * RECORD_LEN].to_vec();
        bad[HEADER_LEN + 2 * RECORD_LEN] = 3;
        assert_eq!(SwitchPacket::decode(&bad), Err(OffloadError::MissingStopMarker));
    }

    #[test]
    fn test_empty_packet_is_just_a_terminator() {
        let buf = SwitchPacket::default().encode(1).unwrap();
        assert_eq!(buf.len(), packet_len(1));
        assert_eq!(buf[HEADER_LEN], STOP_BIT);
        let decoded = SwitchPacket::decode(&buf).unwrap();
        assert!(decoded.passes.is_empty());
    }
}
