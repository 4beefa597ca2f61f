use std::fmt;

/// The one broker-visible outcome for a dequeued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack(AckReason),
    /// Reject without requeue; the queue's DLX routes it to the failed queue.
    Reject(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckReason {
    Delivered,
    Duplicate,
    NoDeliverableEndpoint,
    /// An updated copy carrying `retry_count` was published before acking.
    Resubmitted { retry_count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Malformed,
    RetryBudgetExhausted,
    RenderFailed,
    ResubmitFailed,
}

impl Disposition {
    pub fn is_ack(&self) -> bool {
        matches!(self, Disposition::Ack(_))
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Ack(AckReason::Delivered) => write!(f, "ack:delivered"),
            Disposition::Ack(AckReason::Duplicate) => write!(f, "ack:duplicate"),
            Disposition::Ack(AckReason::NoDeliverableEndpoint) => write!(f, "ack:no_endpoint"),
            Disposition::Ack(AckReason::Resubmitted { retry_count }) => {
                write!(f, "ack:resubmitted(retry={})", retry_count)
            }
            Disposition::Reject(RejectReason::Malformed) => write!(f, "reject:malformed"),
            Disposition::Reject(RejectReason::RetryBudgetExhausted) => {
                write!(f, "reject:retry_budget_exhausted")
            }
            Disposition::Reject(RejectReason::RenderFailed) => write!(f, "reject:render_failed"),
            Disposition::Reject(RejectReason::ResubmitFailed) => {
                write!(f, "reject:resubmit_failed")
            }
        }
    }
}
