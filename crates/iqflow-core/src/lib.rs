//! # iqflow Core
//!
//! Framework-side contract and stream DSP units for binding sample sources
//! to a block-oriented streaming graph.
//!
//! A source block pulls fixed-point batches from a device, normalizes them
//! to float32 I/Q, splits the physical stream into logical channels, and
//! hands the result to the scheduler under strict per-call constraints
//! (bounded work, output-count quantization, buffer alignment).
//!
//! ## Data flow
//!
//! ```text
//! device transfer → SampleConverter → ChannelRouter → output buffers
//!        (raw i16 words)   (IQSample)    (per channel)
//! ```
//!
//! ## Modules
//!
//! - [`block`] — the pull-based `start`/`stop`/`work` execution contract
//! - [`convert`] — fixed-point → float32 I/Q normalization
//! - [`deinterleave`] — round-robin channel demultiplexing
//! - [`buffer`] — aligned session-scoped scratch buffers
//! - [`logging`] — `tracing` subscriber setup
//! - [`types`] — sample and error types

pub mod block;
pub mod buffer;
pub mod convert;
pub mod deinterleave;
pub mod logging;
pub mod types;

pub use block::{drain_source, SourceBlock, WorkStatus};
pub use buffer::{AlignedBuf, DEFAULT_ALIGNMENT};
pub use convert::{SampleConverter, SampleFormat};
pub use deinterleave::ChannelRouter;
pub use types::{DspError, DspResult, IQBuffer, IQSample, SdrError, SdrResult};
