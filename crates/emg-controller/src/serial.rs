//! Serial link to the acquisition board and arm

use emg_core::{transport_error, EmgResult, Transport};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{self, BufRead, BufReader, Write};
use std::time::Duration;

/// Serial port settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Bound on one blocking read
    pub read_timeout: Duration,
    /// Bound on one command write
    pub write_timeout: Duration,
}

impl SerialConfig {
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_millis(100),
        }
    }
}

/// Names of the serial ports present on this machine
pub fn available_ports() -> Vec<String> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .unwrap_or_default()
}

/// Board link over a serial port
///
/// Reads and writes go through separate handles to the same port so each
/// direction keeps its own timeout.
pub struct SerialTransport {
    config: SerialConfig,
    reader: Option<BufReader<Box<dyn SerialPort>>>,
    writer: Option<Box<dyn SerialPort>>,
    // Bytes of a line cut off by a read timeout
    pending: Vec<u8>,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> EmgResult<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| transport_error!("cannot open {}: {}", config.port, e))?;

        let mut writer = port
            .try_clone()
            .map_err(|e| transport_error!("cannot clone {}: {}", config.port, e))?;
        writer
            .set_timeout(config.write_timeout)
            .map_err(|e| transport_error!("cannot set write timeout on {}: {}", config.port, e))?;

        tracing::info!("Connected to {} at {} baud", config.port, config.baud_rate);

        Ok(Self {
            config: config.clone(),
            reader: Some(BufReader::new(port)),
            writer: Some(writer),
            pending: Vec::new(),
        })
    }

    fn take_line(&mut self) -> String {
        let bytes = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&bytes);
        line.trim_end_matches(['\r', '\n']).to_string()
    }
}

impl Transport for SerialTransport {
    fn read_line(&mut self) -> EmgResult<Option<String>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| transport_error!("{} is closed", self.config.port))?;

        match reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => Err(transport_error!("{} reached end of stream", self.config.port)),
            Ok(_) if self.pending.ends_with(b"\n") => Ok(Some(self.take_line())),
            // Partial line; the rest arrives on a later read
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(transport_error!("read from {} failed: {}", self.config.port, e)),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> EmgResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| transport_error!("{} is closed", self.config.port))?;

        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| transport_error!("write to {} failed: {}", self.config.port, e))
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            tracing::info!("Closed {}", self.config.port);
        }
        self.writer = None;
        self.pending.clear();
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.config.port, self.config.baud_rate)
    }
}
