pub mod repository;
pub mod services;
pub mod store;

pub use repository::AccountRepository;
pub use services::{
    apply_unconfirmed, calculate_fee, create_transaction, undo_unconfirmed, validate,
    verify_transaction,
};
pub use store::ChainDb;
