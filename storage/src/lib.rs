pub mod engine_repo;
pub mod models;
pub mod outbox_repo;
pub mod subscription_repo;
pub mod tasks_repo;
pub mod uow;

pub use engine_repo::EngineRepository;
pub use models::{BotDeliveryTask, OutboxRecord};
pub use outbox_repo::OutboxRepository;
pub use subscription_repo::SubscriptionRepository;
pub use tasks_repo::{CreateBotDeliveryTask, TaskRepository};
