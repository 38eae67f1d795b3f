pub mod account;
pub mod block;
pub mod constants;
pub mod error;
pub mod slots;
pub mod transaction;
pub mod types;

pub use account::*;
pub use block::Block;
pub use constants::*;
pub use error::ForgexError;
pub use slots::SlotClock;
pub use transaction::*;
pub use types::*;
