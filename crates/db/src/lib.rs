pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, SeedResult, VerificationResult, DEMO_USER_ID};
pub use repositories::{
    CartRepository, CatalogGateway, HistoryRepository, OrderRepository, ProfileRepository,
    RepositoryError, SessionRepository,
};
