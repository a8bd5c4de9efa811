pub mod activity_repo;
pub mod app_config;
pub mod auth_gateway;
pub mod booking_repo;
pub mod database;
pub mod redis_repo;

pub use activity_repo::StoreActivityRepository;
pub use auth_gateway::SupabaseAuthGateway;
pub use booking_repo::StoreBookingRepository;
pub use database::DbClient;
pub use redis_repo::RedisClient;
