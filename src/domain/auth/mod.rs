pub mod model;
pub mod repository;

pub use model::{id_token_hash, CachedIdToken};
pub use repository::{AuthCacheRepository, AuthListRepository};
