pub mod model;
pub mod repository;

pub use model::{QueuePriority, QueuedMessage};
pub use repository::MessageQueueRepository;
