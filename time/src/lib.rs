pub mod latency;
pub mod time;
pub use latency::LatencyGuard;
pub use time::{epoch, get_current_milli_timestamp};
