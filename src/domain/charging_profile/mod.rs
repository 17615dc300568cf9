pub mod model;
pub mod repository;

pub use model::{ChargingScheduleSpec, SchedulePeriodSpec, StoredChargingProfile};
pub use repository::{ChargingProfileRepository, ClearProfileCriteria};
