pub mod model;
pub mod repository;

pub use model::{VariableAttribute, VariableMonitor, VariableSelector};
pub use repository::{DeviceModelRepository, MonitorCriteria};
