//! Safety: loop detection and the mission governor.

pub mod governor;
pub mod loop_detector;

pub use self::governor::SafetyGovernor;
pub use self::loop_detector::detect_loop;
