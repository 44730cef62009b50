//! Command/response correlation
//!
//! Every outgoing command gets a connection-unique id and a deadline. The
//! reader side resolves entries as responses arrive; the sending side awaits
//! its entry and removes it on expiry. Entries whose caller went away are
//! reclaimed by [`CommandCorrelator::reap_expired`].

use super::traits::CdpResponse;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{oneshot, Mutex};
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

/// Resolver handed back by [`CommandCorrelator::register`]
pub type ResponseReceiver = oneshot::Receiver<Result<CdpResponse>>;

/// In-flight protocol call
#[derive(Debug)]
struct PendingCommand {
    /// Command method (for logging)
    method: String,
    /// Moment after which the entry is failed with a timeout
    deadline: Instant,
    /// When the command was registered
    issued_at: Instant,
    /// Response channel sender
    sender: oneshot::Sender<Result<CdpResponse>>,
}

/// Id allocator plus id -> pending-entry map for one connection
#[derive(Debug)]
pub struct CommandCorrelator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingCommand>>,
}

impl Default for CommandCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandCorrelator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate an id and register a pending entry for it
    pub async fn register(&self, method: &str, timeout: Duration) -> (u64, ResponseReceiver) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = oneshot::channel();
        let now = Instant::now();

        let mut pending = self.pending.lock().await;
        pending.insert(
            id,
            PendingCommand {
                method: method.to_string(),
                deadline: now + timeout,
                issued_at: now,
                sender,
            },
        );

        (id, receiver)
    }

    /// Hand a response to its waiting caller. Returns false for unknown ids.
    pub async fn resolve(&self, response: CdpResponse) -> bool {
        let entry = self.pending.lock().await.remove(&response.id);

        match entry {
            Some(pending) => {
                debug!("Resolved command {} ({})", response.id, pending.method);
                let _ = pending.sender.send(Ok(response));
                true
            }
            None => {
                warn!("Received response for unknown command ID: {}", response.id);
                false
            }
        }
    }

    /// Drop an entry without resolving it
    pub async fn expire(&self, id: u64) -> bool {
        self.pending.lock().await.remove(&id).is_some()
    }

    /// Fail every entry whose deadline is at or before `now`
    pub async fn reap_expired(&self, now: Instant) -> usize {
        let mut pending = self.pending.lock().await;
        let expired: Vec<u64> = pending
            .iter()
            .filter(|(_, cmd)| cmd.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(cmd) = pending.remove(id) {
                warn!("Reclaiming expired command {} ({})", id, cmd.method);
                let _ = cmd.sender.send(Err(Error::timeout_after(
                    format!("Command {} ({}) timed out", id, cmd.method),
                    now.saturating_duration_since(cmd.issued_at),
                )));
            }
        }

        expired.len()
    }

    /// Reject all outstanding entries, e.g. on connection loss
    pub async fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<(u64, PendingCommand)> = self.pending.lock().await.drain().collect();
        let count = drained.len();

        for (id, cmd) in drained {
            let _ = cmd.sender.send(Err(Error::connection(format!(
                "Command {} ({}) aborted: {}",
                id, cmd.method, reason
            ))));
        }

        count
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Wait for the entry registered as `id`, enforcing `timeout`. Protocol
    /// error responses become [`Error::Cdp`].
    pub async fn await_response(
        &self,
        id: u64,
        method: &str,
        receiver: ResponseReceiver,
        timeout: Duration,
    ) -> Result<CdpResponse> {
        let started = Instant::now();

        let response = match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => {
                return Err(Error::connection(format!(
                    "Command {} ({}) response channel closed",
                    id, method
                )))
            }
            Err(_) => {
                self.expire(id).await;
                return Err(Error::timeout_after(
                    format!("Command {} ({}) timed out", id, method),
                    started.elapsed(),
                ));
            }
        };

        if let Some(error) = &response.error {
            return Err(Error::cdp(format!(
                "{}: {} (code: {})",
                method, error.message, error.code
            )));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::traits::CdpError;
    use crate::ErrorKind;
    use std::sync::Arc;

    fn ok_response(id: u64) -> CdpResponse {
        CdpResponse {
            id,
            result: Some(serde_json::json!({ "id": id })),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_increasing() {
        let correlator = CommandCorrelator::new();
        let (a, _ra) = correlator.register("A.one", Duration::from_secs(5)).await;
        let (b, _rb) = correlator.register("A.two", Duration::from_secs(5)).await;
        let (c, _rc) = correlator.register("A.three", Duration::from_secs(5)).await;

        assert!(a < b && b < c);
        assert_eq!(correlator.pending_count().await, 3);
    }

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_callers() {
        let correlator = Arc::new(CommandCorrelator::new());
        let (first, rx_first) = correlator.register("Runtime.evaluate", Duration::from_secs(5)).await;
        let (second, rx_second) = correlator.register("Page.captureScreenshot", Duration::from_secs(5)).await;

        assert!(correlator.resolve(ok_response(second)).await);
        assert!(correlator.resolve(ok_response(first)).await);

        let got_first = correlator
            .await_response(first, "Runtime.evaluate", rx_first, Duration::from_secs(1))
            .await
            .unwrap();
        let got_second = correlator
            .await_response(second, "Page.captureScreenshot", rx_second, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(got_first.result.unwrap()["id"], first);
        assert_eq!(got_second.result.unwrap()["id"], second);
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_entry() {
        let correlator = CommandCorrelator::new();
        let (id, rx) = correlator.register("Page.navigate", Duration::from_millis(20)).await;

        let err = correlator
            .await_response(id, "Page.navigate", rx, Duration::from_millis(20))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(correlator.pending_count().await, 0);
        assert!(!correlator.resolve(ok_response(id)).await);
    }

    #[tokio::test]
    async fn test_reaper_fails_abandoned_entries() {
        let correlator = CommandCorrelator::new();
        let (_, rx) = correlator.register("Runtime.evaluate", Duration::from_millis(10)).await;
        let (_, _keep) = correlator.register("Runtime.evaluate", Duration::from_secs(60)).await;

        let reaped = correlator
            .reap_expired(Instant::now() + Duration::from_millis(50))
            .await;

        assert_eq!(reaped, 1);
        assert_eq!(correlator.pending_count().await, 1);
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_fail_all_rejects_with_connection_error() {
        let correlator = CommandCorrelator::new();
        let (_, rx1) = correlator.register("A.one", Duration::from_secs(5)).await;
        let (_, rx2) = correlator.register("A.two", Duration::from_secs(5)).await;

        assert_eq!(correlator.fail_all("socket closed").await, 2);

        for rx in [rx1, rx2] {
            let err = rx.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Connection);
        }
    }

    #[tokio::test]
    async fn test_protocol_error_response() {
        let correlator = CommandCorrelator::new();
        let (id, rx) = correlator.register("Bogus.method", Duration::from_secs(5)).await;

        correlator
            .resolve(CdpResponse {
                id,
                result: None,
                error: Some(CdpError {
                    code: -32601,
                    message: "'Bogus.method' wasn't found".to_string(),
                    data: None,
                }),
            })
            .await;

        let err = correlator
            .await_response(id, "Bogus.method", rx, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("-32601"));
    }
}
