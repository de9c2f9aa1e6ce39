//! Print request coordinator
//!
//! Entry point for the rest of the application: encode, send, wait for
//! completion, report once.
//!
//! Every call reports [`PrintEvent::Accepted`] before any network activity
//! and exactly one [`PrintEvent::Finished`] afterwards. Intermediate
//! `ready` / `in-progress` statuses are never reported.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::batch::EncodedPayload;
use crate::command::CommandAccumulator;
use crate::config::{AgentConfig, TransportMode};
use crate::error::{LabelResult, TransportError};
use crate::outcome::{PrintEvent, PrintOutcome};
use crate::poller::ResultPoller;
use crate::protocol::{AckStatus, AgentReply, MsrRequest};
use crate::transport::{HttpTransport, ReplyReceiver, SocketKey, TransportClient};

/// What kind of request an acknowledgement belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Print,
    CardRead,
}

/// Facade over encoding, transport and polling
#[derive(Debug, Clone)]
pub struct PrintRequestCoordinator {
    config: AgentConfig,
    transport: TransportClient,
}

impl PrintRequestCoordinator {
    pub fn new(config: AgentConfig) -> LabelResult<Self> {
        let transport = TransportClient::new(&config)?;
        Ok(Self { config, transport })
    }

    pub fn mode(&self) -> TransportMode {
        self.transport.mode()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Close persistent sockets; waiting requests finish as disconnected
    pub fn shutdown(&self) {
        if let TransportClient::Socket(registry) = &self.transport {
            registry.shutdown();
        }
    }

    /// Snapshot the accumulator, encode it and print it
    pub async fn print_label<F>(
        &self,
        printer: &str,
        accumulator: &mut CommandAccumulator,
        request_id: u64,
        on_event: F,
    ) -> LabelResult<PrintOutcome>
    where
        F: FnMut(PrintEvent) + Send,
    {
        let payload = accumulator.finish(request_id)?;
        Ok(self.print(printer, payload, on_event).await)
    }

    pub async fn print<F>(&self, printer: &str, payload: EncodedPayload, on_event: F) -> PrintOutcome
    where
        F: FnMut(PrintEvent) + Send,
    {
        self.print_cancellable(printer, payload, &CancellationToken::new(), on_event)
            .await
    }

    #[instrument(skip(self, payload, cancel, on_event), fields(request_id = payload.request_id()))]
    pub async fn print_cancellable<F>(
        &self,
        printer: &str,
        payload: EncodedPayload,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> PrintOutcome
    where
        F: FnMut(PrintEvent) + Send,
    {
        on_event(PrintEvent::Accepted);

        let request_id = payload.request_id();
        let outcome = match &self.transport {
            TransportClient::Http(http) => match http.send_print(printer, &payload).await {
                Ok(ack) => {
                    self.follow_ack(http, printer, request_id, ack, RequestKind::Print, cancel)
                        .await
                }
                Err(e) => e.into(),
            },
            TransportClient::Socket(registry) => {
                let rx = registry.send(
                    &SocketKey::print(printer),
                    Some(request_id),
                    payload.into_string(),
                );
                self.await_push(rx, cancel).await
            }
        };

        info!(outcome = ?outcome, "Print request finished");
        on_event(PrintEvent::Finished(outcome.clone()));
        outcome
    }

    /// Read magnetic stripe data from the printer's card reader
    pub async fn request_msr_data<F>(&self, printer: &str, timeout_secs: u64, on_event: F) -> PrintOutcome
    where
        F: FnMut(PrintEvent) + Send,
    {
        self.request_msr_data_cancellable(printer, timeout_secs, &CancellationToken::new(), on_event)
            .await
    }

    #[instrument(skip(self, cancel, on_event))]
    pub async fn request_msr_data_cancellable<F>(
        &self,
        printer: &str,
        timeout_secs: u64,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> PrintOutcome
    where
        F: FnMut(PrintEvent) + Send,
    {
        on_event(PrintEvent::Accepted);

        let outcome = match &self.transport {
            TransportClient::Http(http) => match http.request_msr(printer, timeout_secs).await {
                Ok(ack) => {
                    let request_id = ack.request_id.unwrap_or_default();
                    self.follow_ack(http, printer, request_id, ack, RequestKind::CardRead, cancel)
                        .await
                }
                Err(e) => e.into(),
            },
            TransportClient::Socket(registry) => {
                match serde_json::to_string(&MsrRequest {
                    timeout: timeout_secs,
                }) {
                    Ok(body) => {
                        let rx = registry.send(&SocketKey::msr(printer), None, body);
                        self.await_push(rx, cancel).await
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to encode card-reader request");
                        PrintOutcome::ParseFailed
                    }
                }
            }
        };

        info!(outcome = ?outcome, "Card-reader request finished");
        on_event(PrintEvent::Finished(outcome.clone()));
        outcome
    }

    /// HTTP mode: act on the initial acknowledgement
    async fn follow_ack(
        &self,
        http: &HttpTransport,
        printer: &str,
        request_id: u64,
        ack: AgentReply,
        kind: RequestKind,
        cancel: &CancellationToken,
    ) -> PrintOutcome {
        match ack.status() {
            AckStatus::Ready | AckStatus::InProgress => {
                let request_id = ack.request_id.unwrap_or(request_id);
                ResultPoller::new(http, &self.config.poll)
                    .poll(printer, request_id, ack.response_id(), cancel)
                    .await
            }
            AckStatus::Duplicated => {
                info!(result = %ack.result, "Agent reported duplicate request");
                PrintOutcome::Duplicated(ack.result)
            }
            AckStatus::Terminal => match kind {
                RequestKind::CardRead => PrintOutcome::from_terminal_reply(ack),
                RequestKind::Print => {
                    warn!(result = %ack.result, "Unexpected initial acknowledgement");
                    PrintOutcome::Unexpected(ack.result)
                }
            },
        }
    }

    /// Socket mode: wait for the agent to push the terminal reply
    async fn await_push(&self, rx: ReplyReceiver, cancel: &CancellationToken) -> PrintOutcome {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PrintOutcome::Cancelled,
            r = tokio::time::timeout(self.config.poll.deadline, rx) => r,
        };

        match received {
            Err(_) => PrintOutcome::PollLimitExceeded {
                response_id: String::new(),
            },
            Ok(Err(_)) => TransportError::ConnectionClosed.into(),
            Ok(Ok(Err(e))) => e.into(),
            Ok(Ok(Ok(reply))) => match reply.status() {
                AckStatus::Duplicated => PrintOutcome::Duplicated(reply.result),
                _ => PrintOutcome::from_terminal_reply(reply),
            },
        }
    }
}
