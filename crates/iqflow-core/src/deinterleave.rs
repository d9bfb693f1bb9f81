//! # Channel Router
//!
//! Splits one physical sample stream carrying N logical channels into N
//! contiguous per-channel buffers. The wire interleaves channels
//! round-robin: sample 0 → channel 0, sample 1 → channel 1, …, sample N →
//! channel 0 again. Per-channel ordering is preserved.
//!
//! A single-channel router degenerates to a bulk copy.
//!
//! Output port count and buffer sizes are fixed by the session
//! configuration, so any mismatch here is a wiring bug in the caller and
//! fails fast with a typed error rather than truncating.
//!
//! ## Example
//!
//! ```rust
//! use iqflow_core::deinterleave::ChannelRouter;
//! use iqflow_core::types::IQSample;
//!
//! let router = ChannelRouter::new(2);
//! let input: Vec<IQSample> = (0..6).map(|k| IQSample::new(k as f32, 0.0)).collect();
//! let mut ch0 = vec![IQSample::default(); 3];
//! let mut ch1 = vec![IQSample::default(); 3];
//! let per_channel = router
//!     .route(&input, &mut [&mut ch0, &mut ch1])
//!     .unwrap();
//! assert_eq!(per_channel, 3);
//! assert_eq!(ch0[1].re, 2.0); // a1
//! assert_eq!(ch1[1].re, 3.0); // b1
//! ```

use crate::types::{DspError, DspResult, IQSample};

/// Round-robin demultiplexer from one interleaved stream to N channels.
#[derive(Debug, Clone, Copy)]
pub struct ChannelRouter {
    channels: usize,
}

impl ChannelRouter {
    /// Create a router for `channels` logical output channels.
    pub fn new(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
        }
    }

    /// Number of output channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Distribute `input` across the output buffers.
    ///
    /// Returns the number of samples written to *each* channel
    /// (`input.len() / channels`). Fails if the port count differs from the
    /// configured channel count, if `input` is not a whole number of
    /// cross-channel sample groups, or if any output buffer is too short.
    pub fn route(
        &self,
        input: &[IQSample],
        outputs: &mut [&mut [IQSample]],
    ) -> DspResult<usize> {
        if outputs.len() != self.channels {
            return Err(DspError::PortCountMismatch {
                expected: self.channels,
                got: outputs.len(),
            });
        }
        if input.len() % self.channels != 0 {
            return Err(DspError::LengthMismatch {
                expected: (input.len() / self.channels) * self.channels,
                got: input.len(),
            });
        }

        let per_channel = input.len() / self.channels;
        for out in outputs.iter() {
            if out.len() < per_channel {
                return Err(DspError::LengthMismatch {
                    expected: per_channel,
                    got: out.len(),
                });
            }
        }

        if self.channels == 1 {
            outputs[0][..per_channel].copy_from_slice(input);
            return Ok(per_channel);
        }

        for (group, samples) in input.chunks_exact(self.channels).enumerate() {
            for (ch, &sample) in samples.iter().enumerate() {
                outputs[ch][group] = sample;
            }
        }

        Ok(per_channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<IQSample> {
        (0..n).map(|k| IQSample::new(k as f32, -(k as f32))).collect()
    }

    #[test]
    fn test_single_channel_is_identity() {
        let router = ChannelRouter::new(1);
        let input = ramp(8);
        let mut out = vec![IQSample::default(); 8];
        let n = router.route(&input, &mut [&mut out]).unwrap();
        assert_eq!(n, 8);
        assert_eq!(out, input);
    }

    #[test]
    fn test_two_channel_deinterleave() {
        let router = ChannelRouter::new(2);
        // [a0, b0, a1, b1, a2, b2]
        let input = ramp(6);
        let mut ch0 = vec![IQSample::default(); 3];
        let mut ch1 = vec![IQSample::default(); 3];
        let n = router.route(&input, &mut [&mut ch0, &mut ch1]).unwrap();

        assert_eq!(n, 3);
        assert_eq!(ch0, vec![input[0], input[2], input[4]]);
        assert_eq!(ch1, vec![input[1], input[3], input[5]]);
    }

    #[test]
    fn test_three_channel_ordering() {
        let router = ChannelRouter::new(3);
        let input = ramp(9);
        let mut bufs = vec![vec![IQSample::default(); 3]; 3];
        {
            let mut slices: Vec<&mut [IQSample]> =
                bufs.iter_mut().map(|b| b.as_mut_slice()).collect();
            router.route(&input, &mut slices).unwrap();
        }
        for ch in 0..3 {
            for k in 0..3 {
                assert_eq!(bufs[ch][k], input[k * 3 + ch]);
            }
        }
    }

    #[test]
    fn test_port_count_mismatch_fails() {
        let router = ChannelRouter::new(2);
        let input = ramp(4);
        let mut only = vec![IQSample::default(); 4];
        let err = router.route(&input, &mut [&mut only]).unwrap_err();
        assert_eq!(
            err,
            DspError::PortCountMismatch {
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn test_ragged_input_fails() {
        let router = ChannelRouter::new(2);
        let input = ramp(5);
        let mut ch0 = vec![IQSample::default(); 3];
        let mut ch1 = vec![IQSample::default(); 3];
        assert!(router.route(&input, &mut [&mut ch0, &mut ch1]).is_err());
    }

    #[test]
    fn test_short_output_buffer_fails() {
        let router = ChannelRouter::new(2);
        let input = ramp(8);
        let mut ch0 = vec![IQSample::default(); 4];
        let mut ch1 = vec![IQSample::default(); 2];
        assert!(router.route(&input, &mut [&mut ch0, &mut ch1]).is_err());
    }

    #[test]
    fn test_empty_input() {
        let router = ChannelRouter::new(2);
        let mut ch0: Vec<IQSample> = Vec::new();
        let mut ch1: Vec<IQSample> = Vec::new();
        let n = router.route(&[], &mut [&mut ch0, &mut ch1]).unwrap();
        assert_eq!(n, 0);
    }
}
