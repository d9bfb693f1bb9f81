//! Capture a few batches of I/Q samples from an attached bladeRF.
//!
//! Run with: cargo run --example rx_capture -p iqflow-hal

use iqflow_core::block::{SourceBlock, WorkStatus};
use iqflow_core::logging::{init_logging, LogConfig};
use iqflow_core::types::IQSample;
use iqflow_hal::default_registry;

fn main() {
    init_logging(&LogConfig::default());

    let registry = default_registry();

    for dev in registry.discover_all() {
        println!("found {} via {} ({})", dev.label, dev.driver, dev.address);
    }

    let mut source = match registry.create("bladerf://instance=0") {
        Ok(source) => source,
        Err(e) => {
            eprintln!("no usable device: {}", e);
            return;
        }
    };

    if let Err(e) = source.start() {
        eprintln!("start failed: {}", e);
        return;
    }

    let mut buffer = vec![IQSample::default(); source.max_items_per_work()];
    for batch in 0..4 {
        let n = buffer.len();
        let status = source.work(n, &mut [buffer.as_mut_slice()]);
        match status {
            Ok(WorkStatus::Produced(n)) => {
                let power: f32 =
                    buffer[..n].iter().map(|s| s.norm_sqr()).sum::<f32>() / n.max(1) as f32;
                println!("batch {}: {} samples, mean power {:.6}", batch, n, power);
            }
            Ok(WorkStatus::Done) => {
                println!("stream ended");
                break;
            }
            Err(e) => {
                eprintln!("work failed: {}", e);
                break;
            }
        }
    }

    let _ = source.stop();
}
