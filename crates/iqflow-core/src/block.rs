//! # Block Execution Contract
//!
//! Source blocks feed the graph under a cooperative pull model: an external
//! scheduler repeatedly invokes [`SourceBlock::work`] on a dedicated
//! execution context, and the block performs a bounded amount of work per
//! invocation. No block spawns threads of its own; a blocking device read
//! inside `work` is an accepted, timeout-bounded wait.
//!
//! ## Lifecycle
//!
//! ```text
//! Stopped --start()--> Running --stop()--> Stopped
//!                         |
//!                    work() -> Done   (terminal; requires stop()+start())
//! ```
//!
//! `work` reports termination as a value ([`WorkStatus::Done`]), not an
//! error: a source that has decided it can produce no more output is a
//! normal end-of-stream for the scheduler, while an `Err` means the call
//! itself failed.
//!
//! ## Output constraints
//!
//! A block advertises three scheduling constraints the caller must honor:
//!
//! - [`output_multiple`](SourceBlock::output_multiple): produced counts are
//!   always a multiple of this (one conceptual sample spans one slot per
//!   channel).
//! - [`max_items_per_work`](SourceBlock::max_items_per_work): upper bound on
//!   items produced by a single invocation.
//! - [`alignment`](SourceBlock::alignment): byte alignment the block's
//!   internal conversion buffers are held to, for vectorized conversion.

use crate::types::{IQSample, SdrResult};

/// Outcome of a single `work` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Number of items written to each output buffer this call.
    /// Always a multiple of the block's `output_multiple`, possibly zero.
    Produced(usize),
    /// No more output will ever be produced by this session.
    Done,
}

impl WorkStatus {
    /// Items produced, treating `Done` as zero.
    pub fn items(&self) -> usize {
        match self {
            WorkStatus::Produced(n) => *n,
            WorkStatus::Done => 0,
        }
    }

    /// Whether this status ends the stream.
    pub fn is_done(&self) -> bool {
        matches!(self, WorkStatus::Done)
    }
}

/// A pull-driven sample source.
///
/// All session-mutable state is guarded by the implementation; `start`,
/// `stop`, and `work` are mutually exclusive, and external shutdown waits
/// for an in-flight `work` to return.
pub trait SourceBlock: Send {
    /// Block name for diagnostics.
    fn name(&self) -> &str;

    /// Number of logical output channels (= output buffer count `work`
    /// expects).
    fn output_channels(&self) -> usize;

    /// Begin a streaming session.
    ///
    /// Valid only from the stopped state; a second `start` without an
    /// intervening `stop` fails with `AlreadyRunning` and leaves the
    /// existing session untouched. A failure during startup rolls back so
    /// that no partial session state is observable.
    fn start(&mut self) -> SdrResult<()>;

    /// End the streaming session. Idempotent: stopping a stopped block
    /// succeeds with no side effects.
    fn stop(&mut self) -> SdrResult<()>;

    /// Produce up to `max_items` samples per output channel.
    ///
    /// `outputs` must contain exactly `output_channels()` slices, each with
    /// room for at least `min(max_items, max_items_per_work())` items.
    /// Calling `work` on a stopped block is a defensive no-op returning
    /// `Produced(0)`.
    fn work(
        &mut self,
        max_items: usize,
        outputs: &mut [&mut [IQSample]],
    ) -> SdrResult<WorkStatus>;

    /// Produced counts are always a multiple of this.
    fn output_multiple(&self) -> usize {
        1
    }

    /// Upper bound on items produced per `work` invocation.
    fn max_items_per_work(&self) -> usize;

    /// Byte alignment of the block's conversion buffers.
    fn alignment(&self) -> usize {
        crate::buffer::DEFAULT_ALIGNMENT
    }
}

/// Drive a source for at most `iterations` work calls, handing each batch
/// to `sink`. Returns the total items produced per channel.
///
/// This is a minimal scheduler for tests and demos; real deployments embed
/// the block in their own execution context.
pub fn drain_source<F>(
    source: &mut dyn SourceBlock,
    batch_items: usize,
    iterations: usize,
    mut sink: F,
) -> SdrResult<usize>
where
    F: FnMut(&[Vec<IQSample>]),
{
    let channels = source.output_channels();
    let cap = batch_items.min(source.max_items_per_work());
    let mut buffers: Vec<Vec<IQSample>> = vec![vec![IQSample::default(); cap]; channels];
    let mut total = 0usize;

    for _ in 0..iterations {
        let produced = {
            let mut slices: Vec<&mut [IQSample]> =
                buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
            match source.work(cap, &mut slices)? {
                WorkStatus::Done => break,
                WorkStatus::Produced(n) => n,
            }
        };
        if produced > 0 {
            let batch: Vec<Vec<IQSample>> = buffers
                .iter()
                .map(|b| b[..produced / channels].to_vec())
                .collect();
            sink(&batch);
            total += produced;
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts down a fixed item budget, then signals Done.
    struct CountedSource {
        remaining: usize,
        running: bool,
    }

    impl SourceBlock for CountedSource {
        fn name(&self) -> &str {
            "counted"
        }

        fn output_channels(&self) -> usize {
            1
        }

        fn start(&mut self) -> SdrResult<()> {
            self.running = true;
            Ok(())
        }

        fn stop(&mut self) -> SdrResult<()> {
            self.running = false;
            Ok(())
        }

        fn work(
            &mut self,
            max_items: usize,
            outputs: &mut [&mut [IQSample]],
        ) -> SdrResult<WorkStatus> {
            if !self.running {
                return Ok(WorkStatus::Produced(0));
            }
            if self.remaining == 0 {
                return Ok(WorkStatus::Done);
            }
            let n = max_items.min(self.remaining).min(outputs[0].len());
            for slot in outputs[0][..n].iter_mut() {
                *slot = IQSample::new(1.0, -1.0);
            }
            self.remaining -= n;
            Ok(WorkStatus::Produced(n))
        }

        fn max_items_per_work(&self) -> usize {
            64
        }
    }

    #[test]
    fn test_work_status_accessors() {
        assert_eq!(WorkStatus::Produced(42).items(), 42);
        assert_eq!(WorkStatus::Done.items(), 0);
        assert!(WorkStatus::Done.is_done());
        assert!(!WorkStatus::Produced(0).is_done());
    }

    #[test]
    fn test_drain_source_honors_budget_and_done() {
        let mut src = CountedSource {
            remaining: 150,
            running: false,
        };
        src.start().unwrap();

        let mut batches = 0;
        let total = drain_source(&mut src, 64, 100, |batch| {
            assert_eq!(batch.len(), 1);
            batches += 1;
        })
        .unwrap();

        // 64 + 64 + 22, then Done on the fourth call.
        assert_eq!(total, 150);
        assert_eq!(batches, 3);
    }

    #[test]
    fn test_stopped_source_produces_nothing() {
        let mut src = CountedSource {
            remaining: 10,
            running: false,
        };
        let total = drain_source(&mut src, 8, 5, |_| panic!("no batches expected")).unwrap();
        assert_eq!(total, 0);
    }
}
