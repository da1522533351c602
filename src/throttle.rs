// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Token-bucket rate limiter for the Cleaner's background I/O.
//!
//! Tokens are denominated in bytes. `consume` blocks the calling thread
//! until enough tokens accumulate, but wakes promptly when `interrupt` is
//! called so `StopCleaning` doesn't have to wait out a long sleep.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct State {
    tokens: f64,
    last_refill: Instant,
    interrupted: bool,
}

/// A byte-rate token bucket, refilled continuously from `bytes_per_sec`.
pub struct Throttle {
    bytes_per_sec: f64,
    state: Mutex<State>,
    cv: Condvar,
}

impl Throttle {
    /// `bytes_per_sec == 0` disables throttling entirely (`consume` returns
    /// immediately).
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            bytes_per_sec: bytes_per_sec as f64,
            state: Mutex::new(State {
                tokens: 0.0,
                last_refill: Instant::now(),
                interrupted: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Replace the rate (e.g. when `StartCleaning` applies fresh IOPS
    /// configuration).
    pub fn set_rate(&mut self, bytes_per_sec: u64) {
        self.bytes_per_sec = bytes_per_sec as f64;
    }

    /// Block until `bytes` worth of tokens are available, or until
    /// [`Throttle::interrupt`] is called. Returns `false` if interrupted
    /// before enough tokens accumulated.
    pub fn consume(&self, bytes: u64) -> bool {
        if self.bytes_per_sec <= 0.0 {
            return true;
        }

        let mut state = self.state.lock().unwrap();
        loop {
            if state.interrupted {
                state.interrupted = false;
                return false;
            }

            let now = Instant::now();
            let elapsed = now.duration_since(state.last_refill).as_secs_f64();
            state.tokens = (state.tokens + elapsed * self.bytes_per_sec)
                .min(self.bytes_per_sec.max(bytes as f64));
            state.last_refill = now;

            if state.tokens >= bytes as f64 {
                state.tokens -= bytes as f64;
                return true;
            }

            let deficit = bytes as f64 - state.tokens;
            let wait = Duration::from_secs_f64((deficit / self.bytes_per_sec).min(1.0));
            let (guard, _timeout) = self.cv.wait_timeout(state, wait).unwrap();
            state = guard;
        }
    }

    /// Wake any thread blocked in `consume`, causing it to return `false`.
    pub fn interrupt(&self) {
        let mut state = self.state.lock().unwrap();
        state.interrupted = true;
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unthrottled_consume_never_blocks() {
        let throttle = Throttle::new(0);
        assert!(throttle.consume(1024 * 1024 * 1024));
    }

    #[test]
    fn interrupt_unblocks_a_waiting_consumer() {
        let throttle = Arc::new(Throttle::new(1)); // 1 byte/sec, trivially starved
        let t2 = throttle.clone();
        let handle = thread::spawn(move || t2.consume(1_000_000));
        thread::sleep(Duration::from_millis(50));
        throttle.interrupt();
        let completed = handle.join().unwrap();
        assert!(!completed);
    }
}
