pub mod model;
pub mod repository;

pub use model::Transaction;
pub use repository::TransactionRepository;
