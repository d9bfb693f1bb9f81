//! # bladeRF Device Control Surface
//!
//! Open/close plumbing and the configuration setters the source block
//! forwards to: sample rate, center frequency, bandwidth, gain (overall,
//! per stage, and mode), antenna routing, sampling clock source, bias-tee,
//! loopback, and RX mux.
//!
//! Every setter forwards to the hardware and reports the value actually
//! applied (the hardware rounds). Optional features a given board lacks
//! come back as `Unsupported`; those are logged and absorbed rather than
//! failing the session.

use std::time::Duration;

use iqflow_core::types::{SdrError, SdrResult};

use crate::args::DeviceArgs;

use super::ffi::{self, BladerfHandle};
use super::modes::{parse_bias_tee, GainMode, Loopback, RxMux, SamplingSource};
use super::stream::{ChannelLayout, RxTransport, StreamSetup};

/// Frequency range (Hz) across supported boards.
pub const BLADERF_MIN_FREQ: u64 = 47_000_000;
pub const BLADERF_MAX_FREQ: u64 = 6_000_000_000;

/// Sample rate range (Hz).
pub const BLADERF_MIN_SAMPLE_RATE: u32 = 160_000;
pub const BLADERF_MAX_SAMPLE_RATE: u32 = 61_440_000;

/// RX channels on the largest supported board.
pub const MAX_RX_CHANNELS: usize = 2;

/// Antenna port names, indexed by physical RX channel.
pub const RX_ANTENNAS: [&str; MAX_RX_CHANNELS] = ["RX1", "RX2"];

/// RFIC register/value pairs applied once per streaming session.
/// Values are board bring-up settings supplied by the vendor tooling.
const RFIC_CALIBRATION: &[(u16, u8)] = &[
    (0x003, 0x54),
    (0x1e0, 0xBF),
    (0x1e4, 0xFF),
    (0x1f2, 0xFF),
    (0x1e6, 0x87),
    (0x1e7, 0x00),
    (0x1e8, 0x00),
    (0x1e9, 0x00),
    (0x1ea, 0x00),
    (0x1eb, 0x00),
    (0x1ec, 0x00),
    (0x1ed, 0x00),
    (0x1ee, 0x00),
    (0x1ef, 0x00),
    (0x3f6, 0x03),
];

/// Downgrade `Unsupported` to a warning; everything else propagates.
fn tolerate_unsupported(result: SdrResult<()>, what: &str) -> SdrResult<()> {
    match result {
        Err(SdrError::Unsupported(_)) => {
            tracing::warn!("{} not supported by this device", what);
            Ok(())
        }
        other => other,
    }
}

/// An open bladeRF receive device.
pub struct BladerfDevice {
    handle: BladerfHandle,
    label: String,
}

impl BladerfDevice {
    /// Open a device by identifier (`"*:instance=0"`, `"*:serial=..."`, or
    /// `""` for the first one found) and run the post-open sanity checks.
    pub fn open(identifier: &str) -> SdrResult<Self> {
        let handle = BladerfHandle::open(identifier)?;

        let label = if identifier.is_empty() {
            "bladeRF".to_string()
        } else {
            format!("bladeRF ({})", identifier)
        };

        // Pre-v0.0.1 FPGA images emit marker words this path no longer
        // strips; warn rather than misinterpret samples silently.
        match handle.fpga_version() {
            Ok((major, minor, patch)) => {
                if major == 0 && minor == 0 && patch < 1 {
                    tracing::warn!(
                        "FPGA v{}.{}.{} predates v0.0.1; samples may be misinterpreted",
                        major, minor, patch
                    );
                } else {
                    tracing::debug!("FPGA v{}.{}.{}", major, minor, patch);
                }
            }
            Err(e) => tracing::warn!("failed to read FPGA version: {}", e),
        }

        tracing::info!("opened {}", label);
        Ok(Self { handle, label })
    }

    /// Device label for diagnostics.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Apply the mode options carried by a connection string. Configuration
    /// errors here are never fatal: unknown values warn and keep defaults,
    /// unsupported features warn and are skipped.
    pub fn apply_options(&mut self, args: &DeviceArgs) -> SdrResult<()> {
        if args.contains("sampling") {
            let source =
                args.get_mode("sampling", SamplingSource::parse, SamplingSource::Internal);
            tolerate_unsupported(self.set_sampling_source(source), "sampling source")?;
        }

        if let Some(raw) = args.get("biastee") {
            self.set_bias_tee(0, parse_bias_tee(raw))?;
        }

        let loopback = args.get_mode("loopback", Loopback::parse, Loopback::None);
        self.set_loopback(loopback)?;

        let rxmux = args.get_mode("rxmux", RxMux::parse, RxMux::Baseband);
        self.set_rx_mux(rxmux)?;

        if args.contains("agc_mode") {
            let mode = args.get_mode("agc_mode", GainMode::parse, GainMode::Default);
            for ch in 0..MAX_RX_CHANNELS {
                tolerate_unsupported(self.set_gain_mode(ch, mode), "AGC mode")?;
            }
        }

        if args.contains("agc") {
            let automatic = args.get_mode(
                "agc",
                |s| match s {
                    "1" | "true" | "on" => Ok(true),
                    "0" | "false" | "off" => Ok(false),
                    other => {
                        Err(SdrError::ConfigError(format!("invalid agc value: {}", other)))
                    }
                },
                false,
            );
            let mode = if automatic {
                GainMode::automatic()
            } else {
                GainMode::Manual
            };
            for ch in 0..MAX_RX_CHANNELS {
                tolerate_unsupported(self.set_gain_mode(ch, mode), "gain mode")?;
                tracing::info!("{} gain mode set to {:?}", RX_ANTENNAS[ch], mode);
            }
        }

        Ok(())
    }

    /// Set sample rate; returns the rate the hardware settled on.
    pub fn set_sample_rate(&mut self, ch: usize, rate: u32) -> SdrResult<u32> {
        if !(BLADERF_MIN_SAMPLE_RATE..=BLADERF_MAX_SAMPLE_RATE).contains(&rate) {
            return Err(SdrError::ConfigError(format!(
                "sample rate {} out of range [{}, {}]",
                rate, BLADERF_MIN_SAMPLE_RATE, BLADERF_MAX_SAMPLE_RATE
            )));
        }
        self.handle.set_sample_rate(ch, rate)
    }

    pub fn sample_rate(&self, ch: usize) -> SdrResult<u32> {
        self.handle.sample_rate(ch)
    }

    /// Set center frequency; returns the frequency actually tuned.
    pub fn set_frequency(&mut self, ch: usize, freq_hz: u64) -> SdrResult<u64> {
        if !(BLADERF_MIN_FREQ..=BLADERF_MAX_FREQ).contains(&freq_hz) {
            return Err(SdrError::ConfigError(format!(
                "frequency {} out of range [{}, {}]",
                freq_hz, BLADERF_MIN_FREQ, BLADERF_MAX_FREQ
            )));
        }
        self.handle.set_frequency(ch, freq_hz)
    }

    pub fn frequency(&self, ch: usize) -> SdrResult<u64> {
        self.handle.frequency(ch)
    }

    /// Set analog bandwidth; returns the applied value.
    pub fn set_bandwidth(&mut self, ch: usize, bw_hz: u32) -> SdrResult<u32> {
        self.handle.set_bandwidth(ch, bw_hz)
    }

    pub fn bandwidth(&self, ch: usize) -> SdrResult<u32> {
        self.handle.bandwidth(ch)
    }

    /// Set overall gain in dB; returns the applied value.
    pub fn set_gain(&mut self, ch: usize, gain_db: i32) -> SdrResult<i32> {
        self.handle.set_gain(ch, gain_db)
    }

    pub fn gain(&self, ch: usize) -> SdrResult<i32> {
        self.handle.gain(ch)
    }

    /// Set one named gain stage; returns the applied value.
    pub fn set_gain_stage(&mut self, ch: usize, stage: &str, gain_db: i32) -> SdrResult<i32> {
        self.handle.set_gain_stage(ch, stage, gain_db)
    }

    pub fn gain_stage(&self, ch: usize, stage: &str) -> SdrResult<i32> {
        self.handle.gain_stage(ch, stage)
    }

    /// Names of the gain stages on `ch`.
    pub fn gain_stages(&self, ch: usize) -> SdrResult<Vec<String>> {
        self.handle.gain_stages(ch)
    }

    pub fn set_gain_mode(&mut self, ch: usize, mode: GainMode) -> SdrResult<()> {
        self.handle.set_gain_mode(ch, mode.to_ffi())
    }

    pub fn gain_mode(&self, ch: usize) -> SdrResult<GainMode> {
        let raw = self.handle.gain_mode(ch)?;
        Ok(match raw {
            ffi::GAIN_MGC => GainMode::Manual,
            ffi::GAIN_FASTATTACK => GainMode::FastAttack,
            ffi::GAIN_SLOWATTACK => GainMode::SlowAttack,
            ffi::GAIN_HYBRID => GainMode::Hybrid,
            _ => GainMode::Default,
        })
    }

    pub fn set_sampling_source(&mut self, source: SamplingSource) -> SdrResult<()> {
        self.handle.set_sampling(source.to_ffi())
    }

    /// Bias-tee supply on a port. Unsupported boards warn and continue.
    pub fn set_bias_tee(&mut self, ch: usize, enable: bool) -> SdrResult<()> {
        tolerate_unsupported(self.handle.set_bias_tee(ch, enable), "bias-tee")
    }

    /// Loopback routing. Unsupported modes warn and continue.
    pub fn set_loopback(&mut self, mode: Loopback) -> SdrResult<()> {
        tolerate_unsupported(
            self.handle.set_loopback(mode.to_ffi()),
            "loopback mode",
        )
    }

    /// RX mux source. Unsupported modes warn and continue.
    pub fn set_rx_mux(&mut self, mode: RxMux) -> SdrResult<()> {
        tolerate_unsupported(self.handle.set_rx_mux(mode.to_ffi()), "RX mux mode")
    }

    /// Antenna names for the RX side.
    pub fn antennas(&self) -> Vec<String> {
        RX_ANTENNAS.iter().map(|s| s.to_string()).collect()
    }

    /// Physical RX channel for an antenna name, if it exists.
    pub fn antenna_channel(antenna: &str) -> Option<usize> {
        RX_ANTENNAS
            .iter()
            .position(|a| a.eq_ignore_ascii_case(antenna))
    }
}

impl RxTransport for BladerfDevice {
    fn apply_stream_config(
        &mut self,
        setup: &StreamSetup,
        layout: ChannelLayout,
    ) -> SdrResult<()> {
        self.handle.sync_config(
            layout.to_ffi(),
            setup.format_to_ffi(),
            setup.num_buffers,
            setup.samples_per_buffer as u32,
            setup.num_transfers,
            setup.timeout,
        )
    }

    fn set_channel_enabled(&mut self, ch: usize, enabled: bool) -> SdrResult<()> {
        self.handle.enable_module(ch, enabled)
    }

    fn receive(
        &mut self,
        words: &mut [i16],
        samples: usize,
        timeout: Duration,
    ) -> SdrResult<usize> {
        self.handle.sync_rx(words, samples, timeout)?;
        Ok(samples)
    }

    fn apply_calibration(&mut self) -> SdrResult<()> {
        for &(address, value) in RFIC_CALIBRATION {
            self.handle.set_rfic_register(address, value)?;
        }
        tracing::debug!("applied RFIC init sequence ({} registers)", RFIC_CALIBRATION.len());
        Ok(())
    }
}
