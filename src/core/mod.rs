pub mod driver;
pub mod error;
pub mod event;
pub mod history;
pub mod metrics;
pub mod observer;
pub mod queue;
pub mod state;

pub use driver::{BoxedFeed, CoreSettings, SchedCore};
pub use error::{QueueFull, SchedError, TableFull};
pub use event::SchedEvent;
pub use history::{BurstStats, CommandHistory, CommandId};
pub use metrics::{Metrics, Reporter, RunSummary};
pub use queue::{Level, LevelQueue, LevelSet};
pub use state::{JobId, JobState, JobTable, Millis, ProcessRecord};
