//! # iqflow HAL
//!
//! Hardware layer for the iqflow streaming graph: a registry of source
//! drivers addressed by connection string, plus the bladeRF backend.
//!
//! ## Example
//!
//! ```rust,ignore
//! use iqflow_hal::default_registry;
//! use iqflow_core::{SourceBlock, WorkStatus};
//!
//! let registry = default_registry();
//! let mut source = registry.create("bladerf://instance=0,channels=2")?;
//!
//! source.start()?;
//! let mut ch0 = vec![Default::default(); 4096];
//! let mut ch1 = vec![Default::default(); 4096];
//! match source.work(4096, &mut [&mut ch0, &mut ch1])? {
//!     WorkStatus::Produced(n) => println!("got {} samples", n),
//!     WorkStatus::Done => println!("stream over"),
//! }
//! source.stop()?;
//! ```

pub mod args;
pub mod bladerf;

pub use args::DeviceArgs;
pub use bladerf::BladerfDriver;

use iqflow_core::block::SourceBlock;
use iqflow_core::types::{SdrError, SdrResult};

/// Device information from discovery.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Driver that owns the device.
    pub driver: String,
    /// Device serial number.
    pub serial: String,
    /// Human-readable label.
    pub label: String,
    /// Connection arguments that select this device.
    pub address: String,
}

/// Factory for receive source blocks.
pub trait SourceDriver: Send + Sync {
    /// Driver name (e.g. "bladerf").
    fn name(&self) -> &str;

    /// Discover attached devices.
    fn discover(&self) -> Vec<DeviceInfo>;

    /// Build a configured source block from connection arguments.
    fn create_from_string(&self, args: &str) -> SdrResult<Box<dyn SourceBlock>>;
}

/// Registry of available source drivers.
pub struct DriverRegistry {
    drivers: Vec<Box<dyn SourceDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: Vec::new(),
        }
    }

    /// Register a driver.
    pub fn register(&mut self, driver: Box<dyn SourceDriver>) {
        self.drivers.push(driver);
    }

    /// Look up a driver by name.
    pub fn get(&self, name: &str) -> Option<&dyn SourceDriver> {
        self.drivers
            .iter()
            .find(|d| d.name() == name)
            .map(|d| d.as_ref())
    }

    /// Names of all registered drivers.
    pub fn list(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    /// Discover devices across every driver.
    pub fn discover_all(&self) -> Vec<DeviceInfo> {
        self.drivers.iter().flat_map(|d| d.discover()).collect()
    }

    /// Create a source from a connection string.
    ///
    /// Format: `"driver://args"` (e.g. `"bladerf://instance=0"`).
    pub fn create(&self, uri: &str) -> SdrResult<Box<dyn SourceBlock>> {
        let (driver_name, args) = uri.split_once("://").ok_or_else(|| {
            SdrError::ConfigError("invalid URI format, use 'driver://args'".to_string())
        })?;

        let driver = self.get(driver_name).ok_or_else(|| {
            SdrError::DeviceNotFound(format!("unknown driver: {}", driver_name))
        })?;

        driver.create_from_string(args)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with all built-in drivers.
pub fn default_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register(Box::new(BladerfDriver::new()));
    registry
}
