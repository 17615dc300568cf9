//! Database migrations module

pub use sea_orm_migration::prelude::*;

mod m20241015_000001_create_auth_cache;
mod m20241015_000002_create_auth_list;
mod m20241015_000003_create_availability;
mod m20241015_000004_create_transactions;
mod m20241015_000005_create_transaction_meter_values;
mod m20241015_000006_create_message_queue;
mod m20241015_000007_create_variables;
mod m20241015_000008_create_variable_monitoring;
mod m20241015_000009_create_charging_profiles;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20241015_000001_create_auth_cache::Migration),
            Box::new(m20241015_000002_create_auth_list::Migration),
            Box::new(m20241015_000003_create_availability::Migration),
            Box::new(m20241015_000004_create_transactions::Migration),
            Box::new(m20241015_000005_create_transaction_meter_values::Migration),
            Box::new(m20241015_000006_create_message_queue::Migration),
            Box::new(m20241015_000007_create_variables::Migration),
            Box::new(m20241015_000008_create_variable_monitoring::Migration),
            Box::new(m20241015_000009_create_charging_profiles::Migration),
        ]
    }
}
