//! Driver registry for port drivers.
//!
//! Maps port names to driver instances. The registry is owned by the
//! [`PortManager`](crate::PortManager); nothing here is global.

use crate::transport::{PortDescriptor, PortDriver, TransportError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of non-enumerable ports (loopback, test harnesses).
#[derive(Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, Arc<dyn PortDriver>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under its descriptor name.
    ///
    /// # Errors
    /// Returns `TransportError::DuplicatePort` if the name is taken.
    pub fn register(&mut self, driver: Arc<dyn PortDriver>) -> Result<(), TransportError> {
        let name = driver.descriptor().name;
        if self.drivers.contains_key(&name) {
            return Err(TransportError::DuplicatePort(name));
        }
        self.drivers.insert(name, driver);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PortDriver>> {
        self.drivers.get(name).cloned()
    }

    /// Descriptors of all registered drivers, sorted by name.
    pub fn descriptors(&self) -> Vec<PortDescriptor> {
        self.drivers.values().map(|d| d.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
