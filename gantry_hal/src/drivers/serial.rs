//! Physical serial port driver.
//!
//! One `serialport` handle is opened and cloned: the original becomes the
//! read half, the clone the write half, so the listener and the worker never
//! contend for the same handle.

use crate::transport::{
    LineFramer, LineReader, LineWriter, Link, PortDescriptor, PortDriver, PortKind,
    TransportError,
};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

const READ_CHUNK: usize = 256;

/// Driver for one enumerated serial device.
pub struct SerialDriver {
    descriptor: PortDescriptor,
}

impl SerialDriver {
    pub fn new(descriptor: PortDescriptor) -> Self {
        Self { descriptor }
    }
}

impl PortDriver for SerialDriver {
    fn descriptor(&self) -> PortDescriptor {
        self.descriptor.clone()
    }

    fn open(&self, baud: u32, read_timeout: Duration) -> Result<Link, TransportError> {
        let name = &self.descriptor.name;
        let open_failed = |e: serialport::Error| TransportError::OpenFailed {
            port: name.clone(),
            reason: e.to_string(),
        };

        let port = serialport::new(name, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(open_failed)?;
        let writer = port.try_clone().map_err(open_failed)?;
        debug!("Opened serial port {} at {} baud", name, baud);

        Ok(Link {
            reader: Box::new(SerialReader {
                port,
                framer: LineFramer::new(),
                chunk: [0; READ_CHUNK],
            }),
            writer: Box::new(SerialWriter { port: writer }),
        })
    }
}

struct SerialReader {
    port: Box<dyn SerialPort>,
    framer: LineFramer,
    chunk: [u8; READ_CHUNK],
}

impl LineReader for SerialReader {
    fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if let Some(line) = self.framer.next_line() {
                return Ok(Some(line));
            }
            match self.port.read(&mut self.chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.framer.push(&self.chunk[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

struct SerialWriter {
    port: Box<dyn SerialPort>,
}

impl LineWriter for SerialWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

/// Human readable description of an enumerated port.
fn describe(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb.product.as_deref().unwrap_or("USB serial");
            match usb.manufacturer.as_deref() {
                Some(maker) => format!("{product} - {maker} [{:04x}:{:04x}]", usb.vid, usb.pid),
                None => format!("{product} [{:04x}:{:04x}]", usb.vid, usb.pid),
            }
        }
        SerialPortType::PciPort => "PCI serial".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
        SerialPortType::Unknown => "Serial port".to_string(),
    }
}

/// Physical serial ports visible to the OS.
///
/// Enumeration failures are logged and yield an empty list.
pub fn available() -> Vec<PortDescriptor> {
    match serialport::available_ports() {
        Ok(ports) => ports
            .iter()
            .map(|info| PortDescriptor::new(&info.port_name, describe(info), PortKind::Serial))
            .collect(),
        Err(e) => {
            warn!("Serial port enumeration failed: {}", e);
            Vec::new()
        }
    }
}
