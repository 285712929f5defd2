//! Rate limiting for IPC clients

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ClientId;

/// Fixed-window request limiter, one window per client.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    clients: HashMap<ClientId, WindowState>,
}

#[derive(Debug)]
struct WindowState {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            clients: HashMap::new(),
        }
    }

    /// Returns `false` when the client has exhausted the current window.
    pub fn check(&mut self, client_id: &ClientId) -> bool {
        let now = Instant::now();
        let state = self
            .clients
            .entry(client_id.clone())
            .or_insert(WindowState { started: now, count: 0 });

        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.count = 0;
        }

        state.count += 1;
        state.count <= self.max_per_window
    }

    /// Drop a disconnected client's window state.
    pub fn remove_client(&mut self, client_id: &ClientId) {
        self.clients.remove(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(60));
        let client = ClientId::new();

        assert!(limiter.check(&client));
        assert!(limiter.check(&client));
        assert!(limiter.check(&client));
        assert!(!limiter.check(&client));
    }

    #[test]
    fn clients_have_separate_windows() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a = ClientId::new();
        let b = ClientId::new();

        assert!(limiter.check(&a));
        assert!(!limiter.check(&a));
        assert!(limiter.check(&b));
    }
}
