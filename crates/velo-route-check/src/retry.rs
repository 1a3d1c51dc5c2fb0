// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request timeout handling.
//!
//! Expired requests are collected first and re-issued afterwards, so the
//! pending maps are never mutated while being scanned.

use crate::tracker::{RequestTracker, TargetKind};
use tokio::time::Instant;

/// Default number of attempts per target.
pub const DEFAULT_MAX_TRIES: u32 = 5;

/// A target dropped after exhausting its attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedTarget {
    pub kind: TargetKind,
    pub target_id: String,
    pub attempts: u32,
}

/// Outcome of one timeout sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeoutSweep {
    /// Requests re-queued; the caller must flush before waiting again.
    pub requeued: usize,

    /// Targets removed for good.
    pub abandoned: Vec<AbandonedTarget>,
}

impl TimeoutSweep {
    pub fn needs_flush(&self) -> bool {
        self.requeued > 0
    }
}

/// Bounded retry policy for timed-out requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_tries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRIES)
    }
}

impl RetryPolicy {
    /// Create a policy allowing `max_tries` attempts per target (at least one).
    pub fn new(max_tries: u32) -> Self {
        Self {
            max_tries: max_tries.max(1),
        }
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Re-issue or abandon every request whose deadline passed before `now`.
    pub fn sweep(&self, tracker: &mut RequestTracker, now: Instant) -> TimeoutSweep {
        let mut result = TimeoutSweep::default();

        for expired in tracker.take_expired(now) {
            let kind = expired.kind();

            if expired.attempt_count < self.max_tries {
                tracing::warn!(
                    "{} {} timed out (attempt {}/{}), requeueing",
                    kind,
                    expired.target_id(),
                    expired.attempt_count,
                    self.max_tries
                );
                tracker.issue(
                    expired.request,
                    expired.timeout,
                    expired.attempt_count + 1,
                    now,
                );
                result.requeued += 1;
            } else {
                tracing::error!(
                    "{} {} timed out after {} attempts",
                    kind,
                    expired.target_id(),
                    expired.attempt_count
                );
                result.abandoned.push(AbandonedTarget {
                    kind,
                    target_id: expired.target_id().to_string(),
                    attempts: expired.attempt_count,
                });
            }
        }

        result
    }
}
