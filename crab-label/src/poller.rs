//! Status polling for HTTP mode
//!
//! Re-issues `checkStatus` while the agent reports `ready` / `in-progress`.
//! Each check carries a 30 second long-poll hint, so there is no backoff by
//! default. The loop ends on the first other status, a transport failure,
//! cancellation, or the attempt/deadline limits of [`PollPolicy`].

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PollPolicy;
use crate::error::TransportResult;
use crate::outcome::PrintOutcome;
use crate::protocol::AgentReply;

/// Source of status-check replies
#[async_trait]
pub trait StatusChecker: Send + Sync {
    async fn check_status(
        &self,
        printer: &str,
        request_id: u64,
        response_id: &str,
    ) -> TransportResult<AgentReply>;
}

/// Drives one request from its first pending acknowledgement to a terminal outcome
pub struct ResultPoller<'a, C: StatusChecker + ?Sized> {
    checker: &'a C,
    policy: &'a PollPolicy,
}

impl<'a, C: StatusChecker + ?Sized> ResultPoller<'a, C> {
    pub fn new(checker: &'a C, policy: &'a PollPolicy) -> Self {
        Self { checker, policy }
    }

    #[instrument(skip(self, cancel))]
    pub async fn poll(
        &self,
        printer: &str,
        request_id: u64,
        response_id: &str,
        cancel: &CancellationToken,
    ) -> PrintOutcome {
        let started = Instant::now();
        let mut response_id = response_id.to_string();
        let mut attempt: u32 = 0;

        loop {
            let remaining = self.policy.deadline.checked_sub(started.elapsed());
            let Some(remaining) = remaining.filter(|_| attempt < self.policy.max_attempts) else {
                warn!(attempt, "Status polling limit reached");
                return PrintOutcome::PollLimitExceeded { response_id };
            };
            attempt += 1;

            let check = self.checker.check_status(printer, request_id, &response_id);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(attempt, "Status polling cancelled");
                    return PrintOutcome::Cancelled;
                }
                r = tokio::time::timeout(remaining, check) => match r {
                    Ok(r) => r,
                    Err(_) => {
                        warn!(attempt, "Status polling deadline reached");
                        return PrintOutcome::PollLimitExceeded { response_id };
                    }
                },
            };

            let reply = match result {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(attempt, error = %e, "Status check failed");
                    return e.into();
                }
            };

            if !reply.status().is_pending() {
                info!(attempt, result = %reply.result, "Request reached terminal status");
                return PrintOutcome::from_terminal_reply(reply);
            }

            debug!(attempt, result = %reply.result, "Request still pending");
            if let Some(id) = reply.response_id.filter(|id| !id.is_empty()) {
                response_id = id;
            }

            if !self.policy.interval.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return PrintOutcome::Cancelled,
                    _ = tokio::time::sleep(self.policy.interval) => {}
                }
            }
        }
    }
}
