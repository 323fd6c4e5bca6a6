use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::error::AppError;
use crate::protocol::{self, ACK, MAX_PAYLOAD, MODE_SELECT, Op, PREAMBLE, RESET, SYNC, hex};
use crate::registry::RegisterIo;

/// Byte-level access to the half-duplex serial line.
pub trait SerialChannel: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<(), AppError>;
    /// Read one byte; `None` on timeout.
    fn recv_byte(&mut self) -> Result<Option<u8>, AppError>;
    fn flush_input(&mut self) -> Result<(), AppError>;
    fn flush_io(&mut self) -> Result<(), AppError>;
}

const RESET_ROUNDS: u32 = 10;
const RESET_SETTLE: Duration = Duration::from_millis(200);
const TRANSACTION_ATTEMPTS: u32 = 3;

/// Owns the serial channel and runs the strict request/response exchange.
/// One transaction at a time; the mutex also covers re-initialization.
///
/// Without a channel the link runs in simulation mode: every transaction
/// succeeds with zero bytes moved and callers keep their cached values.
pub struct DeviceLink {
    channel: Mutex<Option<Box<dyn SerialChannel>>>,
}

impl DeviceLink {
    pub fn new(channel: Box<dyn SerialChannel>) -> Self {
        Self {
            channel: Mutex::new(Some(channel)),
        }
    }

    pub fn simulated() -> Self {
        Self {
            channel: Mutex::new(None),
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.channel.lock().is_none()
    }

    /// Reset the controller to KW mode and switch it to 300 framing.
    pub fn initialize(&self) -> Result<(), AppError> {
        match self.channel.lock().as_mut() {
            Some(chan) => Self::handshake(chan.as_mut()),
            None => Ok(()),
        }
    }

    fn handshake(chan: &mut dyn SerialChannel) -> Result<(), AppError> {
        let mut rounds = RESET_ROUNDS;
        loop {
            if rounds == 0 {
                return Err(AppError::Transport("reset to KW protocol failed".into()));
            }
            rounds -= 1;

            chan.flush_io()?;
            trace!("WR {}", hex(&[RESET]));
            chan.send(&[RESET])?;
            thread::sleep(RESET_SETTLE);
            chan.flush_input()?;
            let byte = chan.recv_byte()?;
            trace!("RD {}", byte.map(|b| hex(&[b])).unwrap_or_default());
            if byte == Some(SYNC) {
                break;
            }
        }

        trace!("WR {}", hex(&MODE_SELECT));
        chan.send(&MODE_SELECT)?;
        match chan.recv_byte()? {
            Some(ACK) => Ok(()),
            Some(other) => Err(AppError::Desync(format!("unexpected response {other:02x}"))),
            None => Err(AppError::Desync("no response to mode select".into())),
        }
    }

    fn transact(&self, op: Op, addr: u16, data: &mut [u8]) -> Result<usize, AppError> {
        let mut guard = self.channel.lock();
        let Some(chan) = guard.as_mut() else {
            let tag = if op == Op::Write { "t-" } else { "r-" };
            debug!("{tag} {addr:04x} {}", hex(data));
            return Ok(0);
        };
        let chan = chan.as_mut();

        let frame = match op {
            Op::Read => protocol::encode_read(addr, data.len())?,
            Op::Write => protocol::encode_write(addr, data)?,
        };
        let tag = if op == Op::Write { "tx" } else { "rx" };
        debug!("{tag} {addr:04x} {}", hex(data));

        let mut attempt = 0;
        loop {
            trace!("WR {}", hex(&frame));
            chan.flush_io()?;
            chan.send(&frame)?;

            match chan.recv_byte()? {
                Some(ACK) => break,
                Some(SYNC) => {
                    warn!("desync at {addr:04x}, re-initializing");
                    if let Err(e) = Self::handshake(chan) {
                        warn!("re-initialization failed: {e}");
                    }
                }
                other => trace!("unexpected ack {other:02x?}"),
            }

            attempt += 1;
            if attempt >= TRANSACTION_ATTEMPTS {
                return Err(AppError::Transport(format!(
                    "no ack for {addr:04x} after {TRANSACTION_ATTEMPTS} attempts"
                )));
            }
        }

        // From here on any short read is terminal for this transaction.
        let byte = Self::must_recv(chan)?;
        if byte != PREAMBLE {
            return Err(AppError::Transport(format!("bad preamble {byte:02x}")));
        }
        let rlen = Self::must_recv(chan)? as usize;
        if rlen > MAX_PAYLOAD + 5 {
            return Err(AppError::Transport(format!(
                "response length {rlen} out of range"
            )));
        }

        // [len][dir][op][addr_hi][addr_lo][count][payload...][crc]
        let mut resp = Vec::with_capacity(rlen + 2);
        resp.push(rlen as u8);
        for _ in 0..rlen + 1 {
            resp.push(Self::must_recv(chan)?);
        }
        trace!("RD {}{}", hex(&[PREAMBLE]), hex(&resp));

        if protocol::checksum(&resp[..resp.len() - 1]) != resp[resp.len() - 1] {
            return Err(AppError::Checksum(format!("register {addr:04x}")));
        }

        if op == Op::Read {
            if rlen < 5 + data.len() {
                return Err(AppError::Transport(format!(
                    "short payload for {addr:04x}: {rlen}"
                )));
            }
            data.copy_from_slice(&resp[6..6 + data.len()]);
        }

        Ok(rlen)
    }

    fn must_recv(chan: &mut dyn SerialChannel) -> Result<u8, AppError> {
        chan.recv_byte()?
            .ok_or_else(|| AppError::Transport("read timeout".into()))
    }
}

impl RegisterIo for DeviceLink {
    fn read_register(&self, addr: u16, buf: &mut [u8]) -> Result<i32, AppError> {
        let ret = self.transact(Op::Read, addr, buf);
        if let Err(e) = &ret {
            warn!("rx {addr:04x} {e}");
        }
        ret.map(|n| n as i32)
    }

    fn write_register(&self, addr: u16, bytes: &[u8]) -> Result<i32, AppError> {
        let mut data = bytes.to_vec();
        let ret = self.transact(Op::Write, addr, &mut data);
        if let Err(e) = &ret {
            warn!("tx {addr:04x} {e}");
        }
        ret.map(|n| n as i32)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::protocol::checksum;

    #[derive(Default)]
    struct ScriptChannel {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl ScriptChannel {
        fn with_rx(bytes: &[u8]) -> Self {
            Self {
                rx: bytes.iter().copied().collect(),
                tx: Vec::new(),
            }
        }
    }

    impl SerialChannel for ScriptChannel {
        fn send(&mut self, bytes: &[u8]) -> Result<(), AppError> {
            self.tx.extend_from_slice(bytes);
            Ok(())
        }

        fn recv_byte(&mut self) -> Result<Option<u8>, AppError> {
            Ok(self.rx.pop_front())
        }

        fn flush_input(&mut self) -> Result<(), AppError> {
            Ok(())
        }

        fn flush_io(&mut self) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn response(op: Op, addr: u16, payload: &[u8]) -> Vec<u8> {
        let mut body = vec![
            (5 + payload.len()) as u8,
            0x01,
            op as u8,
            (addr >> 8) as u8,
            addr as u8,
            payload.len() as u8,
        ];
        body.extend_from_slice(payload);
        body.push(checksum(&body));
        let mut frame = vec![PREAMBLE];
        frame.extend_from_slice(&body);
        frame
    }

    #[test]
    fn read_transaction_returns_payload() {
        let mut script = vec![ACK];
        script.extend_from_slice(&response(Op::Read, 0x0810, &[0x66, 0x08]));
        let link = DeviceLink::new(Box::new(ScriptChannel::with_rx(&script)));

        let mut buf = [0u8; 2];
        let n = link.read_register(0x0810, &mut buf).unwrap();
        assert_eq!(n, 7);
        assert_eq!(buf, [0x66, 0x08]);
    }

    #[test]
    fn write_transaction_sends_frame() {
        let mut script = vec![ACK];
        script.extend_from_slice(&response(Op::Write, 0x2306, &[]));
        let link = DeviceLink::new(Box::new(ScriptChannel::with_rx(&script)));

        let n = link.write_register(0x2306, &[0x01]).unwrap();
        assert_eq!(n, 5);
    }

    #[test]
    fn sync_byte_triggers_reinit_then_retry() {
        // First ack slot holds SYNC, so the link re-runs the handshake
        // (one reset round, mode select ack) before resending the request.
        let mut script = vec![SYNC, SYNC, ACK, ACK];
        script.extend_from_slice(&response(Op::Read, 0x0810, &[0x01, 0x00]));
        let link = DeviceLink::new(Box::new(ScriptChannel::with_rx(&script)));

        let mut buf = [0u8; 2];
        assert!(link.read_register(0x0810, &mut buf).is_ok());
    }

    #[test]
    fn checksum_mismatch_is_terminal() {
        let mut frame = response(Op::Read, 0x0810, &[0x66, 0x08]);
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        let mut script = vec![ACK];
        script.extend_from_slice(&frame);
        let link = DeviceLink::new(Box::new(ScriptChannel::with_rx(&script)));

        let mut buf = [0u8; 2];
        assert!(matches!(
            link.read_register(0x0810, &mut buf),
            Err(AppError::Checksum(_))
        ));
    }

    #[test]
    fn retry_budget_exhausts_to_transport_error() {
        let link = DeviceLink::new(Box::new(ScriptChannel::with_rx(&[0x15, 0x15, 0x15])));

        let mut buf = [0u8; 2];
        assert!(matches!(
            link.read_register(0x0810, &mut buf),
            Err(AppError::Transport(_))
        ));
    }

    #[test]
    fn bad_preamble_is_terminal() {
        let link = DeviceLink::new(Box::new(ScriptChannel::with_rx(&[ACK, 0x42])));

        let mut buf = [0u8; 1];
        assert!(matches!(
            link.read_register(0x0810, &mut buf),
            Err(AppError::Transport(_))
        ));
    }

    #[test]
    fn simulation_mode_reads_zero_bytes() {
        let link = DeviceLink::simulated();
        assert!(link.is_simulated());

        let mut buf = [0xaa, 0xbb];
        assert_eq!(link.read_register(0x0810, &mut buf).unwrap(), 0);
        assert_eq!(buf, [0xaa, 0xbb]);
        assert_eq!(link.write_register(0x0810, &[1, 2]).unwrap(), 0);
    }

    #[test]
    fn oversized_length_fails_before_sending() {
        let chan = ScriptChannel::default();
        let link = DeviceLink::new(Box::new(chan));

        let mut buf = [0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            link.read_register(0x0810, &mut buf),
            Err(AppError::InvalidValue(_))
        ));
    }
}
