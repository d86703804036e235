mod config;
pub use config::PoolConfig;

mod status;
pub use status::TaskStatus;

mod target;
pub use target::TargetId;

/// Monotonic submission counter value.
///
/// Assigned once per task at submission time, never reused. Used only for
/// queue priority: higher sequence means more recently requested.
pub type Sequence = u64;
