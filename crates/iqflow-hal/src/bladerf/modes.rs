//! # Mode Enumerations
//!
//! Closed enumerations for the string-configured device modes, each with a
//! total mapping from the option strings the connection arguments carry.
//! Unknown strings produce a typed `ConfigError`; callers downgrade that to
//! a warning and keep the default, so a typo in a connection string never
//! takes the session down.

use std::ffi::c_int;

use serde::{Deserialize, Serialize};

use iqflow_core::types::{SdrError, SdrResult};

use super::ffi;

/// ADC sampling clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingSource {
    /// On-board oscillator.
    #[default]
    Internal,
    /// External reference input.
    External,
}

impl SamplingSource {
    pub fn parse(s: &str) -> SdrResult<Self> {
        match s {
            "internal" => Ok(SamplingSource::Internal),
            "external" => Ok(SamplingSource::External),
            other => Err(SdrError::ConfigError(format!(
                "unknown sampling source: {}",
                other
            ))),
        }
    }

    pub fn to_ffi(self) -> c_int {
        match self {
            SamplingSource::Internal => ffi::SAMPLING_INTERNAL,
            SamplingSource::External => ffi::SAMPLING_EXTERNAL,
        }
    }
}

/// Bias-tee supply on the RX port.
///
/// The option strings `on`, `1`, and `rx` all enable it; anything else
/// leaves it off (matching long-standing connection-string behavior).
pub fn parse_bias_tee(s: &str) -> bool {
    matches!(s, "on" | "1" | "rx")
}

/// RF/baseband loopback routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loopback {
    #[default]
    None,
    Firmware,
    BbTxlpfRxvga2,
    BbTxlpfRxlpf,
    BbTxvga1Rxvga2,
    BbTxvga1Rxlpf,
    RfLna1,
    RfLna2,
    RfLna3,
    RficBist,
}

impl Loopback {
    pub fn parse(s: &str) -> SdrResult<Self> {
        match s {
            "none" => Ok(Loopback::None),
            "firmware" => Ok(Loopback::Firmware),
            "bb_txlpf_rxvga2" => Ok(Loopback::BbTxlpfRxvga2),
            "bb_txlpf_rxlpf" => Ok(Loopback::BbTxlpfRxlpf),
            "bb_txvga1_rxvga2" => Ok(Loopback::BbTxvga1Rxvga2),
            "bb_txvga1_rxlpf" => Ok(Loopback::BbTxvga1Rxlpf),
            "rf_lna1" => Ok(Loopback::RfLna1),
            "rf_lna2" => Ok(Loopback::RfLna2),
            "rf_lna3" => Ok(Loopback::RfLna3),
            "rfic_bist" => Ok(Loopback::RficBist),
            other => Err(SdrError::ConfigError(format!(
                "unknown loopback mode: {}",
                other
            ))),
        }
    }

    pub fn to_ffi(self) -> c_int {
        match self {
            Loopback::None => ffi::LB_NONE,
            Loopback::Firmware => ffi::LB_FIRMWARE,
            Loopback::BbTxlpfRxvga2 => ffi::LB_BB_TXLPF_RXVGA2,
            Loopback::BbTxlpfRxlpf => ffi::LB_BB_TXLPF_RXLPF,
            Loopback::BbTxvga1Rxvga2 => ffi::LB_BB_TXVGA1_RXVGA2,
            Loopback::BbTxvga1Rxlpf => ffi::LB_BB_TXVGA1_RXLPF,
            Loopback::RfLna1 => ffi::LB_RF_LNA1,
            Loopback::RfLna2 => ffi::LB_RF_LNA2,
            Loopback::RfLna3 => ffi::LB_RF_LNA3,
            Loopback::RficBist => ffi::LB_RFIC_BIST,
        }
    }
}

/// What the RX FIFO is fed from. Counter modes replace samples with test
/// patterns for link debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RxMux {
    #[default]
    Baseband,
    Counter12bit,
    Counter32bit,
    DigitalLoopback,
}

impl RxMux {
    pub fn parse(s: &str) -> SdrResult<Self> {
        match s {
            "baseband" => Ok(RxMux::Baseband),
            "12bit" => Ok(RxMux::Counter12bit),
            "32bit" => Ok(RxMux::Counter32bit),
            "digital" => Ok(RxMux::DigitalLoopback),
            other => Err(SdrError::ConfigError(format!(
                "unknown RX mux mode: {}",
                other
            ))),
        }
    }

    pub fn to_ffi(self) -> c_int {
        match self {
            RxMux::Baseband => ffi::RX_MUX_BASEBAND,
            RxMux::Counter12bit => ffi::RX_MUX_12BIT_COUNTER,
            RxMux::Counter32bit => ffi::RX_MUX_32BIT_COUNTER,
            RxMux::DigitalLoopback => ffi::RX_MUX_DIGITAL_LOOPBACK,
        }
    }
}

/// Gain control mode. `Default` lets the hardware pick; the AGC variants
/// select a specific automatic profile; `Manual` disables AGC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GainMode {
    #[default]
    Default,
    Manual,
    FastAttack,
    SlowAttack,
    Hybrid,
}

impl GainMode {
    pub fn parse(s: &str) -> SdrResult<Self> {
        match s {
            "default" => Ok(GainMode::Default),
            "manual" | "mgc" => Ok(GainMode::Manual),
            "fast" | "fast_attack" => Ok(GainMode::FastAttack),
            "slow" | "slow_attack" => Ok(GainMode::SlowAttack),
            "hybrid" => Ok(GainMode::Hybrid),
            other => Err(SdrError::ConfigError(format!(
                "unknown gain mode: {}",
                other
            ))),
        }
    }

    pub fn to_ffi(self) -> c_int {
        match self {
            GainMode::Default => ffi::GAIN_DEFAULT,
            GainMode::Manual => ffi::GAIN_MGC,
            GainMode::FastAttack => ffi::GAIN_FASTATTACK,
            GainMode::SlowAttack => ffi::GAIN_SLOWATTACK,
            GainMode::Hybrid => ffi::GAIN_HYBRID,
        }
    }

    /// Mode used when automatic gain is requested as a plain boolean.
    pub fn automatic() -> Self {
        GainMode::Default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_source_mapping() {
        assert_eq!(
            SamplingSource::parse("internal").unwrap(),
            SamplingSource::Internal
        );
        assert_eq!(
            SamplingSource::parse("external").unwrap(),
            SamplingSource::External
        );
        assert!(SamplingSource::parse("gpsdo").is_err());
    }

    #[test]
    fn test_bias_tee_strings() {
        assert!(parse_bias_tee("on"));
        assert!(parse_bias_tee("1"));
        assert!(parse_bias_tee("rx"));
        assert!(!parse_bias_tee("off"));
        assert!(!parse_bias_tee("yes"));
    }

    #[test]
    fn test_loopback_total_mapping() {
        for (s, mode) in [
            ("none", Loopback::None),
            ("firmware", Loopback::Firmware),
            ("bb_txlpf_rxvga2", Loopback::BbTxlpfRxvga2),
            ("bb_txlpf_rxlpf", Loopback::BbTxlpfRxlpf),
            ("bb_txvga1_rxvga2", Loopback::BbTxvga1Rxvga2),
            ("bb_txvga1_rxlpf", Loopback::BbTxvga1Rxlpf),
            ("rf_lna1", Loopback::RfLna1),
            ("rf_lna2", Loopback::RfLna2),
            ("rf_lna3", Loopback::RfLna3),
            ("rfic_bist", Loopback::RficBist),
        ] {
            assert_eq!(Loopback::parse(s).unwrap(), mode);
        }
        assert!(Loopback::parse("antenna").is_err());
    }

    #[test]
    fn test_rx_mux_mapping() {
        assert_eq!(RxMux::parse("baseband").unwrap(), RxMux::Baseband);
        assert_eq!(RxMux::parse("12bit").unwrap(), RxMux::Counter12bit);
        assert_eq!(RxMux::parse("32bit").unwrap(), RxMux::Counter32bit);
        assert_eq!(RxMux::parse("digital").unwrap(), RxMux::DigitalLoopback);
        assert!(RxMux::parse("").is_err());
    }

    #[test]
    fn test_gain_mode_aliases() {
        assert_eq!(GainMode::parse("mgc").unwrap(), GainMode::Manual);
        assert_eq!(GainMode::parse("fast").unwrap(), GainMode::FastAttack);
        assert_eq!(GainMode::parse("slow_attack").unwrap(), GainMode::SlowAttack);
        assert!(GainMode::parse("agc").is_err());
    }
}
