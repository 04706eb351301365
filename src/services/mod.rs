//! Entity services.
//!
//! One service per domain entity, each built on the base synchronization
//! service. A service owns its validation rules, merge-field precedence and
//! remote path construction; everything else (caching, retries, local-first
//! persistence) is inherited.

mod friends;
mod profile;
mod weight_log;
mod workouts;

pub use friends::FriendService;
pub use profile::ProfileService;
pub use weight_log::WeightLogService;
pub use workouts::WorkoutService;
