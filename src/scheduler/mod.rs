//! Background dispatch of response-agent callbacks: non-blocking launch,
//! tracked in-flight registry, contained failures, bulk cancellation.

pub mod dispatch;
pub mod task;

pub use dispatch::TaskScheduler;
pub use task::{Callback, CallbackResult, CancelToken, ScheduledTask, TaskId, TaskStatus};
