//! Process-local, constructor-injected mutable state: the report TTL cache
//! and the lead-form submission throttle. Both take a [`Clock`] so tests can
//! drive time directly instead of sleeping.

pub mod clock;
pub mod ttl;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ttl::TtlCache;
pub use window::SubmissionThrottle;
