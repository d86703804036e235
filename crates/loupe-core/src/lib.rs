//! Asynchronous artifact loading with binding correctness.
//!
//! A fixed pool of worker threads serves load requests LIFO (the most
//! recently requested item first), while a per-target binding protocol
//! guarantees that only the most recently requested load for a given UI
//! target ever delivers its result to that target. Results cross back to
//! a single consumer thread through [`Deliveries`].

mod binding;
pub use binding::BindingTracker;

mod capability;
pub use capability::{BoxError, CacheTier, Compute, DataSource, LoadKey};

mod dispatch;
pub use dispatch::Deliveries;

mod error;
pub use error::LoadError;

mod loader;
pub use loader::{LoadHandle, LoadOutcome, Loader, LoaderBuilder};

mod queue;
pub use queue::LifoQueue;

mod scheduler;
pub use scheduler::Scheduler;

mod task;
pub use task::LoadTask;

pub use loupe_model::{PoolConfig, Sequence, TargetId, TaskStatus};

pub mod prelude {
    pub use crate::capability::{BoxError, CacheTier, Compute, DataSource};
    pub use crate::error::LoadError;
    pub use crate::loader::{LoadOutcome, Loader};
    pub use loupe_model::{PoolConfig, TargetId};
}
