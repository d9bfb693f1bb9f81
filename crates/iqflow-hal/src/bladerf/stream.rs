//! # Synchronous Transfer Controller
//!
//! Owns the device's synchronous streaming configuration and the blocking
//! receive path. The controller enforces the session rules the hardware
//! API requires:
//!
//! - the stream configuration is applied exactly once per session, before
//!   any channel is enabled;
//! - per-channel enable/disable is idempotent;
//! - `receive` blocks for at most the configured transfer timeout, and on
//!   error the buffer contents are undefined, so nothing is forwarded.
//!
//! Transfer failures are tracked across calls: any success resets the
//! consecutive-failure counter, and hitting [`MAX_CONSECUTIVE_FAILURES`]
//! turns the next outcome into [`Receive::Shutdown`] so a disconnected or
//! wedged device ends the session instead of retrying forever. A single
//! glitch is tolerated and surfaced as [`Receive::Glitch`].
//!
//! The hardware sits behind the [`RxTransport`] seam so the layers above
//! can be exercised without a device.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use iqflow_core::convert::SampleFormat;
use iqflow_core::types::{SdrError, SdrResult};

use super::ffi;

/// Consecutive failed transfers tolerated before the session shuts down.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Channel layout of the physical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// One RX channel.
    RxX1,
    /// Two RX channels, interleaved on the wire.
    RxX2,
}

impl ChannelLayout {
    /// Layout for `channels` enabled RX channels.
    pub fn for_channels(channels: usize) -> SdrResult<Self> {
        match channels {
            1 => Ok(ChannelLayout::RxX1),
            2 => Ok(ChannelLayout::RxX2),
            n => Err(SdrError::ConfigError(format!(
                "unsupported RX channel count: {}",
                n
            ))),
        }
    }

    /// Number of logical channels carried.
    pub fn channels(&self) -> usize {
        match self {
            ChannelLayout::RxX1 => 1,
            ChannelLayout::RxX2 => 2,
        }
    }

    pub(crate) fn to_ffi(self) -> std::ffi::c_int {
        match self {
            ChannelLayout::RxX1 => ffi::LAYOUT_RX_X1,
            ChannelLayout::RxX2 => ffi::LAYOUT_RX_X2,
        }
    }
}

/// Synchronous stream configuration. Immutable while a session is active;
/// changing it means stop → reconfigure → start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSetup {
    /// Number of transfer buffers the driver cycles through.
    pub num_buffers: u32,
    /// Complex samples per transfer buffer; also the per-`work` cap.
    pub samples_per_buffer: usize,
    /// In-flight USB transfers.
    pub num_transfers: u32,
    /// Blocking-receive bound.
    pub timeout: Duration,
    /// Fixed-point wire format.
    pub format: SampleFormat,
}

impl Default for StreamSetup {
    fn default() -> Self {
        Self {
            num_buffers: 16,
            samples_per_buffer: 4096,
            num_transfers: 8,
            timeout: Duration::from_millis(3500),
            format: SampleFormat::PackedInt8,
        }
    }
}

impl StreamSetup {
    pub(crate) fn format_to_ffi(&self) -> std::ffi::c_int {
        match self.format {
            SampleFormat::PackedInt8 => ffi::FORMAT_SC8_Q7,
            SampleFormat::Int16 => ffi::FORMAT_SC16_Q11,
        }
    }
}

/// Seam between the transfer controller and the hardware API.
pub trait RxTransport: Send {
    /// Apply the synchronous stream configuration for a new session.
    fn apply_stream_config(&mut self, setup: &StreamSetup, layout: ChannelLayout)
        -> SdrResult<()>;

    /// Enable or disable one physical RX channel.
    fn set_channel_enabled(&mut self, ch: usize, enabled: bool) -> SdrResult<()>;

    /// Blocking receive of `samples` complex samples into `words`.
    /// Buffer contents are undefined on error.
    fn receive(&mut self, words: &mut [i16], samples: usize, timeout: Duration)
        -> SdrResult<usize>;

    /// Hardware calibration/init sequence run once per session, after
    /// configuration. Default: nothing to do.
    fn apply_calibration(&mut self) -> SdrResult<()> {
        Ok(())
    }
}

/// Outcome of one controller receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receive {
    /// Samples landed in the buffer.
    Samples(usize),
    /// One failed transfer; tolerated, nothing forwarded this call.
    Glitch,
    /// Consecutive-failure limit reached; stop streaming.
    Shutdown,
}

/// Session-scoped controller over an [`RxTransport`].
pub struct SyncRxController<T: RxTransport> {
    transport: T,
    setup: StreamSetup,
    layout: ChannelLayout,
    configured: bool,
    enabled: BTreeSet<usize>,
    failures: u32,
}

impl<T: RxTransport> SyncRxController<T> {
    pub fn new(transport: T, setup: StreamSetup, layout: ChannelLayout) -> Self {
        Self {
            transport,
            setup,
            layout,
            configured: false,
            enabled: BTreeSet::new(),
            failures: 0,
        }
    }

    pub fn setup(&self) -> &StreamSetup {
        &self.setup
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consecutive failures so far (diagnostics).
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Apply the stream configuration for this session. Exactly once:
    /// a second call without an intervening [`end_session`] is an error.
    ///
    /// [`end_session`]: SyncRxController::end_session
    pub fn configure(&mut self) -> SdrResult<()> {
        if self.configured {
            return Err(SdrError::ConfigError(
                "stream already configured for this session".to_string(),
            ));
        }
        self.transport.apply_stream_config(&self.setup, self.layout)?;
        self.configured = true;
        self.failures = 0;
        Ok(())
    }

    /// Enable a physical channel. No-op success if already enabled.
    pub fn enable_channel(&mut self, ch: usize) -> SdrResult<()> {
        if !self.configured {
            return Err(SdrError::ConfigError(
                "stream must be configured before enabling channels".to_string(),
            ));
        }
        if self.enabled.contains(&ch) {
            return Ok(());
        }
        self.transport.set_channel_enabled(ch, true)?;
        self.enabled.insert(ch);
        Ok(())
    }

    /// Disable a physical channel. No-op success if already disabled.
    pub fn disable_channel(&mut self, ch: usize) -> SdrResult<()> {
        if !self.enabled.contains(&ch) {
            return Ok(());
        }
        self.transport.set_channel_enabled(ch, false)?;
        self.enabled.remove(&ch);
        Ok(())
    }

    /// Run the transport's calibration hook.
    pub fn apply_calibration(&mut self) -> SdrResult<()> {
        self.transport.apply_calibration()
    }

    /// Tear the session down: disable every enabled channel and clear the
    /// configured flag and failure counter.
    pub fn end_session(&mut self) -> SdrResult<()> {
        let enabled: Vec<usize> = self.enabled.iter().copied().collect();
        for ch in enabled {
            self.transport.set_channel_enabled(ch, false)?;
            self.enabled.remove(&ch);
        }
        self.configured = false;
        self.failures = 0;
        Ok(())
    }

    /// Blocking receive of `samples` complex samples into `words`.
    pub fn receive(&mut self, words: &mut [i16], samples: usize) -> Receive {
        match self.transport.receive(words, samples, self.setup.timeout) {
            Ok(n) => {
                self.failures = 0;
                Receive::Samples(n)
            }
            Err(e) => {
                self.failures += 1;
                tracing::warn!("receive error ({}/{}): {}", self.failures,
                    MAX_CONSECUTIVE_FAILURES, e);
                if self.failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::warn!("consecutive transfer error limit hit, shutting down");
                    Receive::Shutdown
                } else {
                    Receive::Glitch
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted transport: pops one result per receive call.
    pub(crate) struct ScriptedTransport {
        pub script: Vec<SdrResult<usize>>,
        pub configured: u32,
        pub enables: Vec<(usize, bool)>,
        pub calibrated: u32,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<SdrResult<usize>>) -> Self {
            Self {
                script,
                configured: 0,
                enables: Vec::new(),
                calibrated: 0,
            }
        }
    }

    impl RxTransport for ScriptedTransport {
        fn apply_stream_config(
            &mut self,
            _setup: &StreamSetup,
            _layout: ChannelLayout,
        ) -> SdrResult<()> {
            self.configured += 1;
            Ok(())
        }

        fn set_channel_enabled(&mut self, ch: usize, enabled: bool) -> SdrResult<()> {
            self.enables.push((ch, enabled));
            Ok(())
        }

        fn receive(
            &mut self,
            words: &mut [i16],
            samples: usize,
            _timeout: Duration,
        ) -> SdrResult<usize> {
            match self.script.pop() {
                Some(Ok(n)) => {
                    let n = n.min(samples);
                    for w in words.iter_mut() {
                        *w = 0x0101u16 as i16;
                    }
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(samples),
            }
        }

        fn apply_calibration(&mut self) -> SdrResult<()> {
            self.calibrated += 1;
            Ok(())
        }
    }

    fn timeout() -> SdrResult<usize> {
        Err(SdrError::Timeout("sync receive".to_string()))
    }

    fn controller(script: Vec<SdrResult<usize>>) -> SyncRxController<ScriptedTransport> {
        SyncRxController::new(
            ScriptedTransport::new(script),
            StreamSetup::default(),
            ChannelLayout::RxX1,
        )
    }

    #[test]
    fn test_configure_exactly_once() {
        let mut ctrl = controller(vec![]);
        ctrl.configure().unwrap();
        assert!(ctrl.configure().is_err());
        assert_eq!(ctrl.transport().configured, 1);

        ctrl.end_session().unwrap();
        ctrl.configure().unwrap();
        assert_eq!(ctrl.transport().configured, 2);
    }

    #[test]
    fn test_channel_enable_is_idempotent() {
        let mut ctrl = controller(vec![]);
        ctrl.configure().unwrap();
        ctrl.enable_channel(0).unwrap();
        ctrl.enable_channel(0).unwrap();
        ctrl.disable_channel(0).unwrap();
        ctrl.disable_channel(0).unwrap();
        // One hardware call each way despite doubled requests.
        assert_eq!(ctrl.transport().enables, vec![(0, true), (0, false)]);
    }

    #[test]
    fn test_enable_requires_configuration() {
        let mut ctrl = controller(vec![]);
        assert!(ctrl.enable_channel(0).is_err());
    }

    #[test]
    fn test_failure_threshold_shuts_down() {
        // Script is popped from the back: three consecutive timeouts.
        let mut ctrl = controller(vec![timeout(), timeout(), timeout()]);
        ctrl.configure().unwrap();
        let mut words = vec![0i16; 64];

        assert_eq!(ctrl.receive(&mut words, 64), Receive::Glitch);
        assert_eq!(ctrl.receive(&mut words, 64), Receive::Glitch);
        assert_eq!(ctrl.receive(&mut words, 64), Receive::Shutdown);
        assert_eq!(ctrl.failures(), MAX_CONSECUTIVE_FAILURES);
    }

    #[test]
    fn test_success_resets_failure_counter() {
        // fail, fail, ok, fail: the success in between resets the count.
        let mut ctrl = controller(vec![timeout(), Ok(64), timeout(), timeout()]);
        ctrl.configure().unwrap();
        let mut words = vec![0i16; 64];

        assert_eq!(ctrl.receive(&mut words, 64), Receive::Glitch);
        assert_eq!(ctrl.receive(&mut words, 64), Receive::Glitch);
        assert_eq!(ctrl.receive(&mut words, 64), Receive::Samples(64));
        assert_eq!(ctrl.failures(), 0);
        assert_eq!(ctrl.receive(&mut words, 64), Receive::Glitch);
    }

    #[test]
    fn test_end_session_disables_channels() {
        let mut ctrl = controller(vec![]);
        ctrl.configure().unwrap();
        ctrl.enable_channel(0).unwrap();
        ctrl.enable_channel(1).unwrap();
        ctrl.end_session().unwrap();
        let t = ctrl.transport();
        assert!(t.enables.contains(&(0, false)));
        assert!(t.enables.contains(&(1, false)));
        assert_eq!(ctrl.failures(), 0);
    }

    #[test]
    fn test_layout_for_channels() {
        assert_eq!(ChannelLayout::for_channels(1).unwrap(), ChannelLayout::RxX1);
        assert_eq!(ChannelLayout::for_channels(2).unwrap(), ChannelLayout::RxX2);
        assert!(ChannelLayout::for_channels(3).is_err());
        assert_eq!(ChannelLayout::RxX2.channels(), 2);
    }

    #[test]
    fn test_default_setup() {
        let setup = StreamSetup::default();
        assert_eq!(setup.num_buffers, 16);
        assert_eq!(setup.samples_per_buffer, 4096);
        assert_eq!(setup.num_transfers, 8);
        assert_eq!(setup.timeout, Duration::from_millis(3500));
        assert_eq!(setup.format, SampleFormat::PackedInt8);
    }
}
