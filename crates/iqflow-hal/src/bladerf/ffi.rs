//! # libbladeRF FFI Bindings
//!
//! Low-level bindings to libbladeRF for Nuand bladeRF devices.
//!
//! This module uses dynamic loading (libloading) to avoid a compile-time
//! dependency on libbladeRF. The library is loaded at runtime, so the same
//! binary works with or without bladeRF hardware attached; without it the
//! driver reports no devices and every open fails cleanly.
//!
//! Only the synchronous RX surface is bound: device open/close and
//! enumeration, tuner setters, the sync streaming configuration
//! (`bladerf_sync_config` / `bladerf_sync_rx` / `bladerf_enable_module`),
//! and the mode controls the configuration surface forwards to
//! (sampling source, bias-tee, loopback, RX mux, gain modes).

use std::ffi::{c_char, c_int, c_uint, c_void, CStr, CString};
use std::ptr;
use std::sync::OnceLock;
use std::time::Duration;

use libloading::{Library, Symbol};

use iqflow_core::types::{SdrError, SdrResult};

/// bladeRF device handle (opaque pointer).
pub type DeviceHandle = *mut c_void;

/// RX channel `ch` in libbladeRF's channel numbering.
pub const fn channel_rx(ch: usize) -> c_int {
    ((ch as c_int) << 1) | 0x0
}

// Status codes (subset the RX path can encounter).
pub const ERR_TIMEOUT: c_int = -6;
pub const ERR_NODEV: c_int = -7;
pub const ERR_UNSUPPORTED: c_int = -8;

// Sample formats.
pub const FORMAT_SC16_Q11: c_int = 1;
pub const FORMAT_SC8_Q7: c_int = 4;

// Channel layouts for sync_config.
pub const LAYOUT_RX_X1: c_int = 0;
pub const LAYOUT_RX_X2: c_int = 2;

// Sampling source.
pub const SAMPLING_INTERNAL: c_int = 1;
pub const SAMPLING_EXTERNAL: c_int = 2;

// Gain modes.
pub const GAIN_DEFAULT: c_int = 0;
pub const GAIN_MGC: c_int = 1;
pub const GAIN_FASTATTACK: c_int = 2;
pub const GAIN_SLOWATTACK: c_int = 3;
pub const GAIN_HYBRID: c_int = 4;

// Loopback modes.
pub const LB_NONE: c_int = 0;
pub const LB_FIRMWARE: c_int = 1;
pub const LB_BB_TXLPF_RXVGA2: c_int = 2;
pub const LB_BB_TXVGA1_RXVGA2: c_int = 3;
pub const LB_BB_TXLPF_RXLPF: c_int = 4;
pub const LB_BB_TXVGA1_RXLPF: c_int = 5;
pub const LB_RF_LNA1: c_int = 6;
pub const LB_RF_LNA2: c_int = 7;
pub const LB_RF_LNA3: c_int = 8;
pub const LB_RFIC_BIST: c_int = 9;

// RX mux modes.
pub const RX_MUX_BASEBAND: c_int = 0;
pub const RX_MUX_12BIT_COUNTER: c_int = 1;
pub const RX_MUX_32BIT_COUNTER: c_int = 2;
pub const RX_MUX_DIGITAL_LOOPBACK: c_int = 4;

/// bladerf_devinfo.
#[repr(C)]
pub struct Devinfo {
    pub backend: c_int,
    pub serial: [c_char; 33],
    pub usb_bus: u8,
    pub usb_addr: u8,
    pub instance: c_uint,
    pub manufacturer: [c_char; 33],
    pub product: [c_char; 33],
}

/// bladerf_version.
#[repr(C)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub describe: *const c_char,
}

/// Loaded libbladeRF and its function pointers.
struct BladerfLib {
    _lib: Library,
    open: Symbol<'static, unsafe extern "C" fn(*mut DeviceHandle, *const c_char) -> c_int>,
    close: Symbol<'static, unsafe extern "C" fn(DeviceHandle)>,
    get_device_list: Symbol<'static, unsafe extern "C" fn(*mut *mut Devinfo) -> c_int>,
    free_device_list: Symbol<'static, unsafe extern "C" fn(*mut Devinfo)>,
    set_sample_rate:
        Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, c_uint, *mut c_uint) -> c_int>,
    get_sample_rate:
        Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, *mut c_uint) -> c_int>,
    set_frequency: Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, u64) -> c_int>,
    get_frequency: Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, *mut u64) -> c_int>,
    set_bandwidth:
        Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, c_uint, *mut c_uint) -> c_int>,
    get_bandwidth:
        Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, *mut c_uint) -> c_int>,
    set_gain: Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, c_int) -> c_int>,
    get_gain: Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, *mut c_int) -> c_int>,
    set_gain_stage: Symbol<
        'static,
        unsafe extern "C" fn(DeviceHandle, c_int, *const c_char, c_int) -> c_int,
    >,
    get_gain_stage: Symbol<
        'static,
        unsafe extern "C" fn(DeviceHandle, c_int, *const c_char, *mut c_int) -> c_int,
    >,
    get_gain_stages: Symbol<
        'static,
        unsafe extern "C" fn(DeviceHandle, c_int, *mut *const c_char, usize) -> c_int,
    >,
    set_gain_mode: Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, c_int) -> c_int>,
    get_gain_mode: Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, *mut c_int) -> c_int>,
    set_sampling: Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int) -> c_int>,
    set_bias_tee: Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, bool) -> c_int>,
    set_loopback: Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int) -> c_int>,
    set_rx_mux: Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int) -> c_int>,
    sync_config: Symbol<
        'static,
        unsafe extern "C" fn(DeviceHandle, c_int, c_int, c_uint, c_uint, c_uint, c_uint) -> c_int,
    >,
    sync_rx: Symbol<
        'static,
        unsafe extern "C" fn(DeviceHandle, *mut c_void, c_uint, *mut c_void, c_uint) -> c_int,
    >,
    enable_module: Symbol<'static, unsafe extern "C" fn(DeviceHandle, c_int, bool) -> c_int>,
    fpga_version: Symbol<'static, unsafe extern "C" fn(DeviceHandle, *mut Version) -> c_int>,
    set_rfic_register: Symbol<'static, unsafe extern "C" fn(DeviceHandle, u16, u8) -> c_int>,
    strerror: Symbol<'static, unsafe extern "C" fn(c_int) -> *const c_char>,
}

/// Global library instance (loaded once).
static BLADERF_LIB: OnceLock<Option<BladerfLib>> = OnceLock::new();

/// Library names to try on different platforms.
#[cfg(target_os = "linux")]
const LIB_NAMES: &[&str] = &["libbladeRF.so.2", "libbladeRF.so"];

#[cfg(target_os = "macos")]
const LIB_NAMES: &[&str] = &["libbladeRF.dylib", "libbladeRF.2.dylib"];

#[cfg(target_os = "windows")]
const LIB_NAMES: &[&str] = &["bladeRF.dll", "libbladeRF.dll"];

/// Load libbladeRF.
fn load_library() -> Option<BladerfLib> {
    for name in LIB_NAMES {
        if let Ok(lib) = unsafe { Library::new(name) } {
            let result = unsafe {
                // Transmute the library reference to 'static for the symbols.
                // The Library stays alive inside the struct.
                let lib_ref: &'static Library = std::mem::transmute(&lib);

                Some(BladerfLib {
                    open: lib_ref.get(b"bladerf_open\0").ok()?,
                    close: lib_ref.get(b"bladerf_close\0").ok()?,
                    get_device_list: lib_ref.get(b"bladerf_get_device_list\0").ok()?,
                    free_device_list: lib_ref.get(b"bladerf_free_device_list\0").ok()?,
                    set_sample_rate: lib_ref.get(b"bladerf_set_sample_rate\0").ok()?,
                    get_sample_rate: lib_ref.get(b"bladerf_get_sample_rate\0").ok()?,
                    set_frequency: lib_ref.get(b"bladerf_set_frequency\0").ok()?,
                    get_frequency: lib_ref.get(b"bladerf_get_frequency\0").ok()?,
                    set_bandwidth: lib_ref.get(b"bladerf_set_bandwidth\0").ok()?,
                    get_bandwidth: lib_ref.get(b"bladerf_get_bandwidth\0").ok()?,
                    set_gain: lib_ref.get(b"bladerf_set_gain\0").ok()?,
                    get_gain: lib_ref.get(b"bladerf_get_gain\0").ok()?,
                    set_gain_stage: lib_ref.get(b"bladerf_set_gain_stage\0").ok()?,
                    get_gain_stage: lib_ref.get(b"bladerf_get_gain_stage\0").ok()?,
                    get_gain_stages: lib_ref.get(b"bladerf_get_gain_stages\0").ok()?,
                    set_gain_mode: lib_ref.get(b"bladerf_set_gain_mode\0").ok()?,
                    get_gain_mode: lib_ref.get(b"bladerf_get_gain_mode\0").ok()?,
                    set_sampling: lib_ref.get(b"bladerf_set_sampling\0").ok()?,
                    set_bias_tee: lib_ref.get(b"bladerf_set_bias_tee\0").ok()?,
                    set_loopback: lib_ref.get(b"bladerf_set_loopback\0").ok()?,
                    set_rx_mux: lib_ref.get(b"bladerf_set_rx_mux\0").ok()?,
                    sync_config: lib_ref.get(b"bladerf_sync_config\0").ok()?,
                    sync_rx: lib_ref.get(b"bladerf_sync_rx\0").ok()?,
                    enable_module: lib_ref.get(b"bladerf_enable_module\0").ok()?,
                    fpga_version: lib_ref.get(b"bladerf_fpga_version\0").ok()?,
                    set_rfic_register: lib_ref.get(b"bladerf_set_rfic_register\0").ok()?,
                    strerror: lib_ref.get(b"bladerf_strerror\0").ok()?,
                    _lib: lib,
                })
            };

            if result.is_some() {
                tracing::info!("Loaded bladeRF library: {}", name);
                return result;
            }
        }
    }
    tracing::debug!("bladeRF library not found");
    None
}

fn get_lib() -> Option<&'static BladerfLib> {
    BLADERF_LIB.get_or_init(load_library).as_ref()
}

/// Check if libbladeRF is available.
pub fn is_available() -> bool {
    get_lib().is_some()
}

/// Human-readable text for a libbladeRF status code.
pub fn strerror(status: c_int) -> String {
    get_lib()
        .map(|lib| {
            let ptr = unsafe { (lib.strerror)(status) };
            if ptr.is_null() {
                format!("status {}", status)
            } else {
                unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() }
            }
        })
        .unwrap_or_else(|| format!("status {}", status))
}

/// Map a nonzero status code to the error taxonomy.
fn status_error(status: c_int, what: &str) -> SdrError {
    match status {
        ERR_TIMEOUT => SdrError::Timeout(what.to_string()),
        ERR_NODEV => SdrError::DeviceNotFound(format!("{}: {}", what, strerror(status))),
        ERR_UNSUPPORTED => SdrError::Unsupported(what.to_string()),
        _ => SdrError::HardwareError(format!("{}: {}", what, strerror(status))),
    }
}

fn check(status: c_int, what: &str) -> SdrResult<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(status_error(status, what))
    }
}

/// One enumerated device.
#[derive(Debug, Clone)]
pub struct ListedDevice {
    pub instance: u32,
    pub serial: String,
}

/// Enumerate attached bladeRF devices. Empty when the library is missing
/// or nothing is connected.
pub fn list_devices() -> Vec<ListedDevice> {
    let lib = match get_lib() {
        Some(lib) => lib,
        None => return Vec::new(),
    };

    let mut list: *mut Devinfo = ptr::null_mut();
    let count = unsafe { (lib.get_device_list)(&mut list) };
    if count <= 0 || list.is_null() {
        return Vec::new();
    }

    let mut devices = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let info = unsafe { &*list.add(i) };
        let serial = unsafe {
            CStr::from_ptr(info.serial.as_ptr())
                .to_string_lossy()
                .into_owned()
        };
        devices.push(ListedDevice {
            instance: info.instance,
            serial,
        });
    }

    unsafe { (lib.free_device_list)(list) };
    devices
}

/// Safe wrapper around an open bladeRF device.
///
/// Exclusively owns the connection: created by [`BladerfHandle::open`],
/// closed on drop. No streaming call is issued outside an active session
/// (the layers above enforce that).
pub struct BladerfHandle {
    dev: DeviceHandle,
    lib: &'static BladerfLib,
}

// SAFETY: libbladeRF device handles may be used from one thread at a time;
// the session lock above this layer serializes all access.
unsafe impl Send for BladerfHandle {}

impl BladerfHandle {
    /// Open a device by identifier string (e.g. `"*:serial=..."`,
    /// `"*:instance=0"`, or `""` for the first device).
    pub fn open(identifier: &str) -> SdrResult<Self> {
        let lib = get_lib().ok_or_else(|| {
            SdrError::DeviceNotFound("libbladeRF not available".to_string())
        })?;

        let ident = CString::new(identifier)
            .map_err(|_| SdrError::ConfigError("identifier contains NUL".to_string()))?;

        let mut dev: DeviceHandle = ptr::null_mut();
        let status = unsafe { (lib.open)(&mut dev, ident.as_ptr()) };
        if status != 0 || dev.is_null() {
            return Err(status_error(status, "bladerf_open"));
        }

        Ok(Self { dev, lib })
    }

    /// Set sample rate; returns the rate actually applied.
    pub fn set_sample_rate(&self, ch: usize, rate: u32) -> SdrResult<u32> {
        let lib = self.lib;
        let mut actual: c_uint = 0;
        check(
            unsafe { (lib.set_sample_rate)(self.dev, channel_rx(ch), rate, &mut actual) },
            "bladerf_set_sample_rate",
        )?;
        Ok(actual)
    }

    pub fn sample_rate(&self, ch: usize) -> SdrResult<u32> {
        let lib = self.lib;
        let mut rate: c_uint = 0;
        check(
            unsafe { (lib.get_sample_rate)(self.dev, channel_rx(ch), &mut rate) },
            "bladerf_get_sample_rate",
        )?;
        Ok(rate)
    }

    pub fn set_frequency(&self, ch: usize, freq_hz: u64) -> SdrResult<u64> {
        let lib = self.lib;
        check(
            unsafe { (lib.set_frequency)(self.dev, channel_rx(ch), freq_hz) },
            "bladerf_set_frequency",
        )?;
        self.frequency(ch)
    }

    pub fn frequency(&self, ch: usize) -> SdrResult<u64> {
        let lib = self.lib;
        let mut freq: u64 = 0;
        check(
            unsafe { (lib.get_frequency)(self.dev, channel_rx(ch), &mut freq) },
            "bladerf_get_frequency",
        )?;
        Ok(freq)
    }

    /// Set analog bandwidth; returns the bandwidth actually applied.
    pub fn set_bandwidth(&self, ch: usize, bw_hz: u32) -> SdrResult<u32> {
        let lib = self.lib;
        let mut actual: c_uint = 0;
        check(
            unsafe { (lib.set_bandwidth)(self.dev, channel_rx(ch), bw_hz, &mut actual) },
            "bladerf_set_bandwidth",
        )?;
        Ok(actual)
    }

    pub fn bandwidth(&self, ch: usize) -> SdrResult<u32> {
        let lib = self.lib;
        let mut bw: c_uint = 0;
        check(
            unsafe { (lib.get_bandwidth)(self.dev, channel_rx(ch), &mut bw) },
            "bladerf_get_bandwidth",
        )?;
        Ok(bw)
    }

    /// Set overall gain in dB; returns the gain actually applied.
    pub fn set_gain(&self, ch: usize, gain_db: i32) -> SdrResult<i32> {
        let lib = self.lib;
        check(
            unsafe { (lib.set_gain)(self.dev, channel_rx(ch), gain_db) },
            "bladerf_set_gain",
        )?;
        self.gain(ch)
    }

    pub fn gain(&self, ch: usize) -> SdrResult<i32> {
        let lib = self.lib;
        let mut gain: c_int = 0;
        check(
            unsafe { (lib.get_gain)(self.dev, channel_rx(ch), &mut gain) },
            "bladerf_get_gain",
        )?;
        Ok(gain)
    }

    pub fn set_gain_stage(&self, ch: usize, stage: &str, gain_db: i32) -> SdrResult<i32> {
        let lib = self.lib;
        let name = CString::new(stage)
            .map_err(|_| SdrError::ConfigError("gain stage contains NUL".to_string()))?;
        check(
            unsafe { (lib.set_gain_stage)(self.dev, channel_rx(ch), name.as_ptr(), gain_db) },
            "bladerf_set_gain_stage",
        )?;
        self.gain_stage(ch, stage)
    }

    pub fn gain_stage(&self, ch: usize, stage: &str) -> SdrResult<i32> {
        let lib = self.lib;
        let name = CString::new(stage)
            .map_err(|_| SdrError::ConfigError("gain stage contains NUL".to_string()))?;
        let mut gain: c_int = 0;
        check(
            unsafe { (lib.get_gain_stage)(self.dev, channel_rx(ch), name.as_ptr(), &mut gain) },
            "bladerf_get_gain_stage",
        )?;
        Ok(gain)
    }

    /// Names of the gain stages on an RX channel.
    pub fn gain_stages(&self, ch: usize) -> SdrResult<Vec<String>> {
        let lib = self.lib;

        // First call sizes the list, second fills it.
        let count =
            unsafe { (lib.get_gain_stages)(self.dev, channel_rx(ch), ptr::null_mut(), 0) };
        if count < 0 {
            return Err(status_error(count, "bladerf_get_gain_stages"));
        }

        let mut names: Vec<*const c_char> = vec![ptr::null(); count as usize];
        let filled = unsafe {
            (lib.get_gain_stages)(self.dev, channel_rx(ch), names.as_mut_ptr(), names.len())
        };
        if filled < 0 {
            return Err(status_error(filled, "bladerf_get_gain_stages"));
        }

        Ok(names
            .into_iter()
            .take(filled as usize)
            .filter(|p| !p.is_null())
            .map(|p| unsafe { CStr::from_ptr(p).to_string_lossy().into_owned() })
            .collect())
    }

    pub fn set_gain_mode(&self, ch: usize, mode: c_int) -> SdrResult<()> {
        let lib = self.lib;
        check(
            unsafe { (lib.set_gain_mode)(self.dev, channel_rx(ch), mode) },
            "bladerf_set_gain_mode",
        )
    }

    pub fn gain_mode(&self, ch: usize) -> SdrResult<c_int> {
        let lib = self.lib;
        let mut mode: c_int = 0;
        check(
            unsafe { (lib.get_gain_mode)(self.dev, channel_rx(ch), &mut mode) },
            "bladerf_get_gain_mode",
        )?;
        Ok(mode)
    }

    pub fn set_sampling(&self, sampling: c_int) -> SdrResult<()> {
        let lib = self.lib;
        check(
            unsafe { (lib.set_sampling)(self.dev, sampling) },
            "bladerf_set_sampling",
        )
    }

    pub fn set_bias_tee(&self, ch: usize, enable: bool) -> SdrResult<()> {
        let lib = self.lib;
        check(
            unsafe { (lib.set_bias_tee)(self.dev, channel_rx(ch), enable) },
            "bladerf_set_bias_tee",
        )
    }

    pub fn set_loopback(&self, mode: c_int) -> SdrResult<()> {
        let lib = self.lib;
        check(
            unsafe { (lib.set_loopback)(self.dev, mode) },
            "bladerf_set_loopback",
        )
    }

    pub fn set_rx_mux(&self, mode: c_int) -> SdrResult<()> {
        let lib = self.lib;
        check(
            unsafe { (lib.set_rx_mux)(self.dev, mode) },
            "bladerf_set_rx_mux",
        )
    }

    /// Apply the synchronous stream configuration.
    pub fn sync_config(
        &self,
        layout: c_int,
        format: c_int,
        num_buffers: u32,
        samples_per_buffer: u32,
        num_transfers: u32,
        timeout: Duration,
    ) -> SdrResult<()> {
        let lib = self.lib;
        check(
            unsafe {
                (lib.sync_config)(
                    self.dev,
                    layout,
                    format,
                    num_buffers,
                    samples_per_buffer,
                    num_transfers,
                    timeout.as_millis() as c_uint,
                )
            },
            "bladerf_sync_config",
        )
    }

    /// Blocking receive of `samples` complex samples into `words`.
    ///
    /// On error the buffer contents are undefined.
    pub fn sync_rx(&self, words: &mut [i16], samples: usize, timeout: Duration) -> SdrResult<()> {
        let lib = self.lib;
        check(
            unsafe {
                (lib.sync_rx)(
                    self.dev,
                    words.as_mut_ptr() as *mut c_void,
                    samples as c_uint,
                    ptr::null_mut(),
                    timeout.as_millis() as c_uint,
                )
            },
            "bladerf_sync_rx",
        )
    }

    pub fn enable_module(&self, ch: usize, enable: bool) -> SdrResult<()> {
        let lib = self.lib;
        check(
            unsafe { (lib.enable_module)(self.dev, channel_rx(ch), enable) },
            "bladerf_enable_module",
        )
    }

    /// FPGA version as (major, minor, patch).
    pub fn fpga_version(&self) -> SdrResult<(u16, u16, u16)> {
        let lib = self.lib;
        let mut version = Version {
            major: 0,
            minor: 0,
            patch: 0,
            describe: ptr::null(),
        };
        check(
            unsafe { (lib.fpga_version)(self.dev, &mut version) },
            "bladerf_fpga_version",
        )?;
        Ok((version.major, version.minor, version.patch))
    }

    /// Write one RFIC register.
    pub fn set_rfic_register(&self, address: u16, value: u8) -> SdrResult<()> {
        let lib = self.lib;
        check(
            unsafe { (lib.set_rfic_register)(self.dev, address, value) },
            "bladerf_set_rfic_register",
        )
    }
}

impl Drop for BladerfHandle {
    fn drop(&mut self) {
        unsafe { (self.lib.close)(self.dev) };
    }
}
