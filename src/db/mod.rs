//! Database module for BlogCraft server
//!
//! Domain records, the repository traits services depend on, and the two
//! storage backends behind them.

pub mod memory;
pub mod models;
pub mod operations;
pub mod store;

pub use memory::MemoryStore;
pub use models::{
    Post, PostLength, Section, SeoMetadata, SignInToken, Subscription, Tier, UsagePeriod,
    UsageRecord, User, UserSession,
};
pub use operations::{DbOperations, DbPoolStatus};
pub use store::{
    PostRepository, Repositories, SessionRepository, SubscriptionRepository, UsageRepository,
    UserRepository,
};
