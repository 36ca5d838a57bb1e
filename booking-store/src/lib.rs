pub mod app_config;
pub mod database;
pub mod events;
pub mod redis_repo;
pub mod reservation_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use events::EventProducer;
pub use redis_repo::RedisSweepLease;
pub use reservation_repo::PgLedgerStore;
