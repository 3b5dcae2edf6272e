use std::time::Duration;

/// How long a peer waits for further notifications once it believes it has
/// reached the end of leader election. Also the initial notification poll
/// timeout of the convergence loop.
pub const FINALIZE_WAIT: Duration = Duration::from_millis(200);

/// Upper bound on the interval between two consecutive notification checks.
/// This bounds how long the system takes to come back up after long
/// partitions.
pub const MAX_NOTIFICATION_INTERVAL: Duration = Duration::from_millis(60_000);

/// Poll timeout used by the messenger workers when waiting on their queues
/// and on the connection manager. A timeout here is not an error, the worker
/// simply re-enters the poll.
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(3_000);

/// Notification wire format version carried by the 40-byte layout.
pub const CURRENT_NOTIFICATION_VERSION: i32 = 0x1;

/// Initial vote value used by non-participants. Orders below every real
/// candidate under the precedence predicate.
pub(crate) const OBSERVER_ID: i64 = i64::MIN;
