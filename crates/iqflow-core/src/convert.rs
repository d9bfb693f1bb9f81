//! # Sample Conversion Unit
//!
//! Normalizes fixed-point interleaved I/Q batches from the transfer layer
//! into float32 [`IQSample`]s in approximately [-1.0, 1.0].
//!
//! The fixed-point width is a parameter of the unit, not a hard-coded
//! assumption: the wire carries either two 8-bit components packed into
//! each 16-bit word ([`SampleFormat::PackedInt8`]) or full-precision 16-bit
//! components ([`SampleFormat::Int16`]). Each component is divided by the
//! maximum representable magnitude of its width, so the most negative code
//! lands slightly outside -1.0 (-128/127 ≈ -1.0079). That overshoot is the
//! hardware's own convention and is deliberately not clamped.
//!
//! The conversion is a single flat pass with a fixed per-sample formula and
//! no branching, so the compiler can vectorize it; callers keep the output
//! buffer on an alignment boundary (see [`crate::buffer::AlignedBuf`]).
//!
//! ## Example
//!
//! ```rust
//! use iqflow_core::convert::{SampleConverter, SampleFormat};
//! use iqflow_core::types::IQSample;
//!
//! let conv = SampleConverter::new(SampleFormat::Int16);
//! // Two samples: (32767, 0) and (-32767, 16384)
//! let words = [32767i16, 0, -32767, 16384];
//! let mut out = vec![IQSample::default(); 2];
//! let n = conv.convert(&words, &mut out).unwrap();
//! assert_eq!(n, 2);
//! assert_eq!(out[0].re, 1.0);
//! assert_eq!(out[1].re, -1.0);
//! ```

use crate::types::{DspError, DspResult, IQSample};

/// Fixed-point layout of a raw transfer buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Two signed 8-bit components per 16-bit word, low byte first.
    /// One word per complex sample.
    PackedInt8,
    /// One signed 16-bit component per word. Two words per complex sample.
    Int16,
}

impl SampleFormat {
    /// Raw i16 words needed to carry `samples` complex samples.
    pub fn words_for_samples(&self, samples: usize) -> usize {
        match self {
            SampleFormat::PackedInt8 => samples,
            SampleFormat::Int16 => samples * 2,
        }
    }

    /// Complex samples carried by `words` raw i16 words.
    pub fn samples_for_words(&self, words: usize) -> usize {
        match self {
            SampleFormat::PackedInt8 => words,
            SampleFormat::Int16 => words / 2,
        }
    }
}

/// Fixed-point to float32 I/Q converter.
#[derive(Debug, Clone, Copy)]
pub struct SampleConverter {
    format: SampleFormat,
    scale: f32,
}

/// Maximum magnitude of an 8-bit component.
const INT8_FULL_SCALE: f32 = 127.0;

/// Maximum magnitude of a 16-bit component.
const INT16_FULL_SCALE: f32 = 32767.0;

impl SampleConverter {
    /// Create a converter for the given wire format.
    pub fn new(format: SampleFormat) -> Self {
        let scale = match format {
            SampleFormat::PackedInt8 => 1.0 / INT8_FULL_SCALE,
            SampleFormat::Int16 => 1.0 / INT16_FULL_SCALE,
        };
        Self { format, scale }
    }

    /// Wire format this converter expects.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Convert a raw word buffer into normalized I/Q samples.
    ///
    /// Input sample k maps to output sample k; ordering is never permuted.
    /// `out` must hold exactly the number of samples `words` carries, or
    /// the call fails without writing anything.
    pub fn convert(&self, words: &[i16], out: &mut [IQSample]) -> DspResult<usize> {
        let samples = self.format.samples_for_words(words.len());
        if out.len() != samples {
            return Err(DspError::LengthMismatch {
                expected: samples,
                got: out.len(),
            });
        }

        match self.format {
            SampleFormat::PackedInt8 => {
                for (word, slot) in words.iter().zip(out.iter_mut()) {
                    let i = (*word as u8 as i8) as f32;
                    let q = (*word >> 8) as i8 as f32;
                    *slot = IQSample::new(i * self.scale, q * self.scale);
                }
            }
            SampleFormat::Int16 => {
                for (pair, slot) in words.chunks_exact(2).zip(out.iter_mut()) {
                    *slot = IQSample::new(
                        pair[0] as f32 * self.scale,
                        pair[1] as f32 * self.scale,
                    );
                }
            }
        }

        Ok(samples)
    }
}
