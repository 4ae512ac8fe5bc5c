/// Monitoring engine module - runs the uptime and SSL checks
///
/// This module is responsible for:
/// - Building probe requests and following redirect chains
/// - Evaluating responses into status events
/// - Validating certificates
/// - Scheduling checks and keeping uptime checks from overlapping
pub mod checker;
pub mod evaluator;
pub mod lock;
pub mod request;
pub mod scheduler;
pub mod ssl;
pub mod types;

pub use checker::{HttpTransport, ReqwestTransport, RetryPolicy, UptimeChecker};
pub use evaluator::HttpCheckResponseEvaluator;
pub use lock::UptimeCheckLockRegistry;
pub use scheduler::{CheckScheduler, SchedulerSettings, SchedulingError};
pub use ssl::{RustlsSslValidator, SslChecker, SslValidator};
