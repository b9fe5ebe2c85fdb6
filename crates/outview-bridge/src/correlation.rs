//! Request/response correlation.
//! - SeqCounter: one counter for every outbound message
//! - PendingRequests: bounded in-flight table keyed by request seq
//! - PendingResponse: awaitable handle with deadline + cancellation

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::RequestError;
use crate::protocol::Response;

/// Sequence numbers start at 1 and only grow. The counter pins at
/// `u64::MAX` instead of wrapping back to 0.
#[derive(Debug)]
pub struct SeqCounter {
    next: u64,
}

impl Default for SeqCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl SeqCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next;
        self.next = seq.saturating_add(1);
        seq
    }
}

#[derive(Debug)]
struct PendingEntry {
    command: String,
    deadline: Option<Instant>,
    resolver: oneshot::Sender<Response>,
}

/// In-flight requests awaiting a response from the host.
#[derive(Debug)]
pub struct PendingRequests {
    entries: FxHashMap<u64, PendingEntry>,
    limit: usize,
    timeout: Option<Duration>,
}

impl PendingRequests {
    /// `limit` is clamped to at least one entry; `timeout = None` disables deadlines.
    #[must_use]
    pub fn new(limit: usize, timeout: Option<Duration>) -> Self {
        Self {
            entries: FxHashMap::default(),
            limit: limit.max(1),
            timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.entries.contains_key(&seq)
    }

    /// Reserve a slot for `seq`. Expired entries are swept first so stale
    /// requests never hold the table full.
    pub fn register(
        &mut self,
        seq: u64,
        command: &str,
        now: Instant,
    ) -> Result<PendingResponse, RequestError> {
        if self.entries.len() >= self.limit {
            self.sweep_expired(now);
        }
        if self.entries.len() >= self.limit {
            return Err(RequestError::TooManyInFlight { limit: self.limit });
        }
        let deadline = self.timeout.map(|timeout| now + timeout);
        let (resolver, receiver) = oneshot::channel();
        self.entries.insert(
            seq,
            PendingEntry {
                command: command.to_string(),
                deadline,
                resolver,
            },
        );
        Ok(PendingResponse {
            seq,
            deadline,
            receiver,
        })
    }

    /// Hand `response` to the request it answers. Returns `false` when no
    /// request is waiting on `request_seq` (duplicate, stale or foreign).
    pub fn resolve(&mut self, response: Response) -> bool {
        let Some(entry) = self.entries.remove(&response.request_seq) else {
            debug!(
                request_seq = response.request_seq,
                command = %response.command,
                "dropping unmatched response"
            );
            return false;
        };
        if entry.command != response.command {
            debug!(
                request_seq = response.request_seq,
                expected = %entry.command,
                got = %response.command,
                "response command differs from request"
            );
        }
        // The waiter may have given up already; nothing to do then.
        let _ = entry.resolver.send(response);
        true
    }

    /// Drop the pending entry for `seq`; its waiter observes `Cancelled`.
    pub fn cancel(&mut self, seq: u64) -> bool {
        self.entries.remove(&seq).is_some()
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Remove entries whose deadline is at or before `now`.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|seq, entry| match entry.deadline {
            Some(deadline) if deadline <= now => {
                debug!(seq, command = %entry.command, "request expired without response");
                false
            }
            _ => true,
        });
        before - self.entries.len()
    }
}

/// Awaitable response to one outbound request.
#[derive(Debug)]
#[must_use = "a pending response does nothing unless awaited or polled"]
pub struct PendingResponse {
    seq: u64,
    deadline: Option<Instant>,
    receiver: oneshot::Receiver<Response>,
}

impl PendingResponse {
    /// Handle that is already resolved; used when no host can answer.
    pub(crate) fn ready(seq: u64, response: Response) -> Self {
        let (resolver, receiver) = oneshot::channel();
        let _ = resolver.send(response);
        Self {
            seq,
            deadline: None,
            receiver,
        }
    }

    /// Sequence number of the originating request.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Non-blocking check for a response that already arrived.
    pub fn try_response(&mut self) -> Option<Response> {
        self.receiver.try_recv().ok()
    }

    pub async fn wait(self) -> Result<Response, RequestError> {
        let seq = self.seq;
        let Some(deadline) = self.deadline else {
            return self
                .receiver
                .await
                .map_err(|_| RequestError::Cancelled { seq });
        };
        match tokio::time::timeout_at(deadline.into(), self.receiver).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) if Instant::now() >= deadline => Err(RequestError::TimedOut { seq }),
            Ok(Err(_)) => Err(RequestError::Cancelled { seq }),
            Err(_) => Err(RequestError::TimedOut { seq }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_to(request_seq: u64, command: &str) -> Response {
        Response {
            seq: 100 + request_seq,
            command: command.to_string(),
            request_seq,
            body: Some(json!({"ok": true})),
        }
    }

    #[test]
    fn seq_counter_starts_at_one_and_increases() {
        let mut counter = SeqCounter::new();
        let mut previous = 0;
        for expected in 1..=5 {
            let seq = counter.next_seq();
            assert_eq!(seq, expected);
            assert!(seq > previous);
            previous = seq;
        }
    }

    #[test]
    fn seq_counter_never_wraps_to_zero() {
        let mut counter = SeqCounter {
            next: u64::MAX - 1,
        };
        assert_eq!(counter.next_seq(), u64::MAX - 1);
        assert_eq!(counter.next_seq(), u64::MAX);
        assert_eq!(counter.next_seq(), u64::MAX);
    }

    #[tokio::test]
    async fn resolves_matching_response() {
        let mut pending = PendingRequests::new(8, None);
        let handle = pending.register(1, "setContents", Instant::now()).unwrap();
        assert!(pending.resolve(response_to(1, "setContents")));
        assert!(pending.is_empty());
        let response = handle.wait().await.unwrap();
        assert_eq!(response.request_seq, 1);
    }

    #[tokio::test]
    async fn unmatched_response_leaves_other_requests_alone() {
        let mut pending = PendingRequests::new(8, None);
        let handle = pending.register(1, "a", Instant::now()).unwrap();
        assert!(!pending.resolve(response_to(42, "a")));
        assert!(pending.contains(1));

        assert!(pending.resolve(response_to(1, "a")));
        assert!(!pending.resolve(response_to(1, "a")), "duplicate is dropped");
        assert_eq!(handle.wait().await.unwrap().seq, 101);
    }

    #[tokio::test]
    async fn responses_may_arrive_out_of_order() {
        let mut pending = PendingRequests::new(8, None);
        let first = pending.register(1, "a", Instant::now()).unwrap();
        let second = pending.register(2, "b", Instant::now()).unwrap();
        assert!(pending.resolve(response_to(2, "b")));
        assert!(pending.resolve(response_to(1, "a")));
        assert_eq!(second.wait().await.unwrap().command, "b");
        assert_eq!(first.wait().await.unwrap().command, "a");
    }

    #[tokio::test]
    async fn cancelled_request_reports_cancelled() {
        let mut pending = PendingRequests::new(8, None);
        let handle = pending.register(7, "a", Instant::now()).unwrap();
        assert!(pending.cancel(7));
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, RequestError::Cancelled { seq: 7 }));
    }

    #[tokio::test]
    async fn request_without_response_times_out() {
        let mut pending = PendingRequests::new(8, Some(Duration::from_millis(10)));
        let handle = pending.register(3, "a", Instant::now()).unwrap();
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, RequestError::TimedOut { seq: 3 }));
    }

    #[test]
    fn sweep_drops_expired_entries_only() {
        let timeout = Duration::from_millis(50);
        let mut pending = PendingRequests::new(8, Some(timeout));
        let start = Instant::now();
        let _old = pending.register(1, "a", start).unwrap();
        let _fresh = pending.register(2, "b", start + timeout).unwrap();
        assert_eq!(pending.sweep_expired(start + timeout), 1);
        assert!(!pending.contains(1));
        assert!(pending.contains(2));
    }

    #[test]
    fn table_is_bounded() {
        let mut pending = PendingRequests::new(1, None);
        let _first = pending.register(1, "a", Instant::now()).unwrap();
        let err = pending.register(2, "b", Instant::now()).unwrap_err();
        assert!(matches!(err, RequestError::TooManyInFlight { limit: 1 }));
    }

    #[test]
    fn full_table_makes_room_from_expired_entries() {
        let timeout = Duration::from_millis(5);
        let mut pending = PendingRequests::new(1, Some(timeout));
        let start = Instant::now();
        let _first = pending.register(1, "a", start).unwrap();
        assert!(pending.register(2, "b", start + timeout).is_ok());
        assert!(!pending.contains(1));
    }

    #[test]
    fn ready_handle_is_immediately_available() {
        let mut handle = PendingResponse::ready(4, response_to(4, "a"));
        assert_eq!(handle.seq(), 4);
        assert_eq!(handle.try_response().map(|r| r.request_seq), Some(4));
    }
}
