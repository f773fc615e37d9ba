pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod rpc;
pub mod scheduler;
pub mod shutdown;
pub mod storage;

pub use coordinator::{AssignOutcome, CheckOutcome, Coordinator};
pub use error::{CoordinatorError, Result};
