pub mod batch;
pub mod pool;

pub use batch::{batch_ranges, run_scenario_batch, BatchRun, BatchSummary};
pub use pool::WorkerPool;
