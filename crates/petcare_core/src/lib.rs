pub mod clock;
pub mod completion;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod notify;
pub mod recurrence;
pub mod storage;
pub mod task_api;
pub mod worker;
