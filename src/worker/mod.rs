pub mod pool;
pub mod process;

pub use self::pool::{Worker, WorkerPool, WorkerRef};
