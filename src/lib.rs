pub mod cli;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod local;
pub mod manager;
pub mod models;
pub mod session;
pub mod store;
pub mod utils;
pub mod view;

pub use config::Config;
pub use database::SqliteTaskStore;
pub use error::TaskError;
pub use local::JsonTaskStore;
pub use manager::TaskCollection;
pub use models::{Priority, Status, Task, TaskDraft, TaskId};
pub use session::{Identity, Session, UserId};
pub use store::{StatusPredicate, StoreError, TaskStore};
pub use utils::Profile;
