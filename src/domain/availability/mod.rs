pub mod model;
pub mod repository;

pub use model::ComponentScope;
pub use repository::AvailabilityRepository;
