// Metric name constants to avoid typos across crates.

/// Sessions accepted (counter).
pub const SESSIONS_OPENED_TOTAL: &str = "camrelay_sessions_opened_total";
/// Sessions torn down (counter, labels: reason).
pub const SESSIONS_CLOSED_TOTAL: &str = "camrelay_sessions_closed_total";
/// Sessions currently between accept and teardown (gauge).
pub const SESSIONS_ACTIVE: &str = "camrelay_sessions_active";
/// Endpoint pair setup failures (counter, labels: kind).
pub const ENDPOINT_FAILURES_TOTAL: &str = "camrelay_endpoint_failures_total";
/// Frames or results forwarded (counter, labels: direction).
pub const FRAMES_FORWARDED_TOTAL: &str = "camrelay_frames_forwarded_total";
/// Session lifetime in seconds (histogram).
pub const SESSION_DURATION_SECONDS: &str = "camrelay_session_duration_seconds";
/// Survivors aborted after the cancel grace period (counter).
pub const SURVIVOR_ABORTS_TOTAL: &str = "camrelay_survivor_aborts_total";
/// Frames analysed by the pipeline worker (counter, labels: outcome).
pub const WORKER_FRAMES_TOTAL: &str = "camrelay_worker_frames_total";
