pub mod fork;
pub mod genesis;
pub mod pipeline;
pub mod roster;
pub mod store;

pub use fork::{incoming_wins, ForkKind};
pub use genesis::{apply_genesis, genesis_block, GenesisParams};
pub use pipeline::{BlockPipeline, BlockReceipt, PipelineConfig};
pub use roster::DelegateRoster;
pub use store::ChainStore;
