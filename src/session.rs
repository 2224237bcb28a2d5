use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one in-flight flow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Drops results of requests that were abandoned while in flight.
///
/// Each request takes a ticket with [`begin`](Self::begin). Closing the consumer calls
/// [`invalidate`](Self::invalidate); a result is applied only if its ticket is still current.
#[derive(Debug, Default)]
pub struct RequestGenerations {
    current: AtomicU64,
}

impl RequestGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Ticket {
        Ticket(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.current.load(Ordering::SeqCst) == ticket.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_request_supersedes_older() {
        let generations = RequestGenerations::new();
        let first = generations.begin();
        assert!(generations.is_current(first));

        let second = generations.begin();
        assert!(!generations.is_current(first));
        assert!(generations.is_current(second));
    }

    #[test]
    fn invalidate_drops_in_flight_ticket() {
        let generations = RequestGenerations::new();
        let ticket = generations.begin();
        generations.invalidate();
        assert!(!generations.is_current(ticket));
        assert!(generations.is_current(generations.begin()));
    }
}
