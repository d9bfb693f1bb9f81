//! # bladeRF Backend
//!
//! Receive support for Nuand bladeRF devices over the synchronous
//! streaming API. The backend splits into:
//!
//! - [`ffi`] — runtime-loaded libbladeRF bindings
//! - [`device`] — the configuration surface (tuner, gain, modes)
//! - [`stream`] — the synchronous transfer controller
//! - [`source`] — the source block feeding the execution graph
//! - [`modes`] — string-configured mode enumerations

pub mod device;
pub mod ffi;
pub mod modes;
pub mod source;
pub mod stream;

pub use device::BladerfDevice;
pub use modes::{GainMode, Loopback, RxMux, SamplingSource};
pub use source::BladerfSource;
pub use stream::{
    ChannelLayout, Receive, RxTransport, StreamSetup, SyncRxController,
    MAX_CONSECUTIVE_FAILURES,
};

use iqflow_core::block::SourceBlock;
use iqflow_core::types::{SdrError, SdrResult};

use crate::args::DeviceArgs;
use crate::{DeviceInfo, SourceDriver};

/// bladeRF device driver.
///
/// Provides hardware access when libbladeRF is present; otherwise
/// discovery is empty and creation fails with `DeviceNotFound`.
pub struct BladerfDriver {
    available: bool,
}

impl BladerfDriver {
    pub fn new() -> Self {
        let available = ffi::is_available();
        if available {
            tracing::info!("bladeRF driver initialized with hardware support");
        } else {
            tracing::debug!("bladeRF driver initialized (stub mode - no libbladeRF)");
        }
        Self { available }
    }

    /// Whether libbladeRF was found on this host.
    pub fn is_available(&self) -> bool {
        self.available
    }
}

impl Default for BladerfDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceDriver for BladerfDriver {
    fn name(&self) -> &str {
        "bladerf"
    }

    fn discover(&self) -> Vec<DeviceInfo> {
        if !self.available {
            return Vec::new();
        }

        ffi::list_devices()
            .into_iter()
            .map(|dev| {
                let info = DeviceInfo {
                    driver: "bladerf".to_string(),
                    serial: dev.serial.clone(),
                    label: format!("Nuand bladeRF #{}", dev.instance),
                    address: format!("instance={}", dev.instance),
                };
                tracing::debug!("found {} (serial: {})", info.label, info.serial);
                info
            })
            .collect()
    }

    fn create_from_string(&self, args: &str) -> SdrResult<Box<dyn SourceBlock>> {
        if !self.available {
            return Err(SdrError::DeviceNotFound(
                "libbladeRF not available; install the bladeRF package".to_string(),
            ));
        }

        let args = DeviceArgs::parse(args);
        Ok(Box::new(BladerfSource::from_args(&args)?))
    }
}
