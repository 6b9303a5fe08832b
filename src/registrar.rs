//! Bounded `BusId -> Device` registrar (§4.4).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::device::Device;
use crate::error::{Result, UsbIpError};
use crate::wire::op::{text_to_fixed, BusId};

#[derive(Debug, Clone, Copy)]
pub struct RegistrarConfig {
    pub bus_num: u32,
    pub max_device_count: usize,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            bus_num: 1,
            max_device_count: 10,
        }
    }
}

struct Inner {
    devices: HashMap<BusId, Arc<dyn Device>>,
    next_dev_num: u32,
}

/// Registrar for one virtual USB bus (`RegistrarConfig::bus_num`). Insertion
/// is serialized; lookups never observe a torn map because the whole table
/// sits behind a single mutex (§4.4 only requires a consistent snapshot, not
/// lock-free reads).
pub struct Registrar {
    config: RegistrarConfig,
    inner: Mutex<Inner>,
}

impl Registrar {
    pub fn new(config: RegistrarConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                devices: HashMap::new(),
                next_dev_num: 1,
            }),
        }
    }

    /// Register `device`, assigning it the next `DevNum` under this
    /// registrar's fixed `BusNum`. Fails with [`UsbIpError::CapacityReached`]
    /// once `max_device_count` entries are installed.
    pub fn register(&self, device: Arc<dyn Device>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.devices.len() >= self.config.max_device_count {
            return Err(UsbIpError::CapacityReached);
        }

        let dev_num = inner.next_dev_num;
        inner.next_dev_num += 1;
        let bus_id_text = format!("{}-{}", self.config.bus_num, dev_num);
        let path_text = format!(
            "/sys/devices/virtual/usbip/{}-{}",
            self.config.bus_num, dev_num
        );
        let bus_id: BusId = text_to_fixed(&bus_id_text);
        device.set_bus_id(self.config.bus_num, dev_num, bus_id, text_to_fixed(&path_text));

        inner.devices.insert(bus_id, device);
        Ok(())
    }

    pub fn get(&self, bus_id: &BusId) -> Result<Arc<dyn Device>> {
        let inner = self.inner.lock().unwrap();
        inner
            .devices
            .get(bus_id)
            .cloned()
            .ok_or(UsbIpError::DeviceNotFound)
    }

    /// Enumeration order is unspecified; callers must not rely on it.
    pub fn available(&self) -> Vec<Arc<dyn Device>> {
        let inner = self.inner.lock().unwrap();
        inner.devices.values().cloned().collect()
    }

    /// Calls `close` on every registered device, collecting failures rather
    /// than stopping at the first one (§4.4: `close() -> AggregateError`).
    pub fn close(&self) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        let failures: Vec<UsbIpError> = inner
            .devices
            .values()
            .filter_map(|device| device.close().err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(UsbIpError::AggregateError(failures))
        }
    }
}
