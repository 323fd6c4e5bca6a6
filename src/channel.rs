use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

use crate::error::AppError;
use crate::link::SerialChannel;

const BAUD: u32 = 4800;
/// Worst-case controller response latency.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the controller's optolink port: 4800 baud, 8 data bits, even
/// parity, two stop bits. DTR is raised to power the adapter head.
pub fn open(device: &str) -> Result<Box<dyn SerialChannel>, AppError> {
    let mut port = serialport::new(device, BAUD)
        .data_bits(DataBits::Eight)
        .parity(Parity::Even)
        .stop_bits(StopBits::Two)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|e| AppError::Transport(format!("open {device}: {e}")))?;
    port.write_data_terminal_ready(true)
        .map_err(|e| AppError::Transport(format!("set dtr on {device}: {e}")))?;

    Ok(Box::new(SerialPortChannel { port }))
}

struct SerialPortChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel for SerialPortChannel {
    fn send(&mut self, bytes: &[u8]) -> Result<(), AppError> {
        self.port
            .write_all(bytes)
            .map_err(|e| AppError::Transport(format!("serial write: {e}")))
    }

    fn recv_byte(&mut self) -> Result<Option<u8>, AppError> {
        let mut byte = [0u8; 1];
        match self.port.read_exact(&mut byte) {
            Ok(()) => Ok(Some(byte[0])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(AppError::Transport(format!("serial read: {e}"))),
        }
    }

    fn flush_input(&mut self) -> Result<(), AppError> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| AppError::Transport(format!("flush input: {e}")))
    }

    fn flush_io(&mut self) -> Result<(), AppError> {
        self.port
            .clear(ClearBuffer::All)
            .map_err(|e| AppError::Transport(format!("flush: {e}")))
    }
}
