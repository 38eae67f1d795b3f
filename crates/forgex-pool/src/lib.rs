pub mod mempool;
pub mod pool;
pub mod queue;

pub use mempool::Mempool;
pub use pool::TransactionPool;
pub use queue::TransactionQueue;
