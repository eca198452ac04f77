//! Port manager.
//!
//! Owns the single active link. All methods take `&self` and are safe to
//! call from the listener, the worker and the caller thread at once:
//!
//! ```text
//!   select ──► open ──► { read_line (listener) | write (worker) } ──► close
//! ```
//!
//! Reads and writes use separate locks. Transport faults are logged and
//! reported as failure values; nothing here panics.

use crate::driver_registry::DriverRegistry;
use crate::drivers::loopback::LoopbackDriver;
use crate::drivers::serial::{self, SerialDriver};
use crate::transport::{LineReader, LineWriter, PortDescriptor, PortDriver, TransportError};
use gantry_common::config::{GantryConfig, TransportConfig};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, trace, warn};

/// Port enumeration, selection and line I/O.
pub struct PortManager {
    config: TransportConfig,
    drivers: RwLock<DriverRegistry>,
    selected: Mutex<Option<Arc<dyn PortDriver>>>,
    reader: Mutex<Option<Box<dyn LineReader>>>,
    writer: Mutex<Option<Box<dyn LineWriter>>>,
    open: AtomicBool,
}

impl PortManager {
    /// Manager with no registered drivers.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            drivers: RwLock::new(DriverRegistry::new()),
            selected: Mutex::new(None),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }

    /// Manager for a full configuration; registers the loopback rig in
    /// development mode.
    pub fn from_config(config: &GantryConfig) -> Self {
        let manager = Self::new(config.transport.clone());
        if config.transport.development {
            // Fresh registry, cannot collide.
            let _ = manager.register(Arc::new(LoopbackDriver::new(&config.emulator)));
        }
        manager
    }

    #[inline]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Register an additional driver.
    pub fn register(&self, driver: Arc<dyn PortDriver>) -> Result<(), TransportError> {
        let descriptor = driver.descriptor();
        self.drivers.write().register(driver)?;
        debug!("Registered port driver {}", descriptor);
        Ok(())
    }

    /// Physical ports not matching an ignore pattern, then registered ports.
    pub fn enumerate(&self) -> Vec<PortDescriptor> {
        let mut ports: Vec<PortDescriptor> = serial::available()
            .into_iter()
            .filter(|p| !self.config.is_ignored(&p.description))
            .collect();
        ports.extend(self.drivers.read().descriptors());
        ports
    }

    /// Look up a registered or physical port by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PortDriver>, TransportError> {
        if let Some(driver) = self.drivers.read().get(name) {
            return Ok(driver);
        }
        serial::available()
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| Arc::new(SerialDriver::new(p)) as Arc<dyn PortDriver>)
            .ok_or_else(|| TransportError::PortNotFound(name.to_string()))
    }

    /// Bind a port without opening it.
    ///
    /// Re-selecting the active port is a no-op. Selecting another port
    /// while open closes the current link first.
    pub fn select(&self, name: &str) -> Result<(), TransportError> {
        let mut selected = self.selected.lock();
        if selected
            .as_ref()
            .is_some_and(|d| d.descriptor().name == name)
        {
            return Ok(());
        }

        let driver = self.resolve(name)?;
        if self.is_open() {
            self.close();
        }
        info!("Selected port {}", driver.descriptor());
        *selected = Some(driver);
        Ok(())
    }

    /// Name of the selected port.
    pub fn selected(&self) -> Option<String> {
        self.selected.lock().as_ref().map(|d| d.descriptor().name)
    }

    /// Open the selected port. No-op when already open.
    pub fn open(&self, baud: u32) -> Result<(), TransportError> {
        let selected = self.selected.lock();
        if self.is_open() {
            return Ok(());
        }
        let driver = selected.as_ref().ok_or(TransportError::NoPortSelected)?;

        let link = driver
            .open(baud, self.config.read_timeout())
            .inspect_err(|e| error!("Failed to open {}: {}", driver.descriptor().name, e))?;
        *self.reader.lock() = Some(link.reader);
        *self.writer.lock() = Some(link.writer);
        self.open.store(true, Ordering::Release);
        info!("Opened {} at {} baud", driver.descriptor().name, baud);
        Ok(())
    }

    /// Open at the configured baud rate.
    pub fn open_default(&self) -> Result<(), TransportError> {
        self.open(self.config.baud)
    }

    /// Drop the link. No-op when closed.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.writer.lock().take();
            self.reader.lock().take();
            info!("Port closed");
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Write one payload followed by the line terminator.
    ///
    /// Returns `false` when closed or on a write failure.
    pub fn write(&self, payload: &str) -> bool {
        let mut writer = self.writer.lock();
        let Some(w) = writer.as_mut() else {
            warn!("Write dropped, port not open: {:?}", payload);
            return false;
        };

        let mut bytes = Vec::with_capacity(payload.len() + self.config.line_terminator.len());
        bytes.extend_from_slice(payload.as_bytes());
        bytes.extend_from_slice(self.config.line_terminator.as_bytes());
        match w.write_all(&bytes) {
            Ok(()) => {
                trace!("-> {:?}", payload);
                true
            }
            Err(e) => {
                error!("Write failed: {}", e);
                false
            }
        }
    }

    /// Next inbound line, waiting at most the read timeout.
    ///
    /// A broken link is closed and yields `None` from then on.
    pub fn read_line(&self) -> Option<String> {
        let result = {
            let mut reader = self.reader.lock();
            reader.as_mut()?.read_line()
        };
        match result {
            Ok(Some(line)) => {
                trace!("<- {:?}", line);
                Some(line)
            }
            Ok(None) => None,
            Err(e) => {
                error!("Read failed, closing link: {}", e);
                self.close();
                None
            }
        }
    }
}

impl Drop for PortManager {
    fn drop(&mut self) {
        self.close();
    }
}
