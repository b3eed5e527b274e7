#![forbid(unsafe_code)]

use std::time::Duration;

/// Schedule of the window sweep. Nothing is pending while no channel holds
/// events; the first recorded event arms the next run.
#[derive(Debug, Clone)]
pub struct SweepScheduler {
	interval: i64,
	next_due: Option<i64>,
}

impl SweepScheduler {
	pub fn new(interval: i64) -> Self {
		Self {
			interval: interval.max(1),
			next_due: None,
		}
	}

	pub fn interval(&self) -> i64 {
		self.interval
	}

	/// Applies from the next arming on; a pending run keeps its due time.
	pub fn set_interval(&mut self, interval: i64) {
		self.interval = interval.max(1);
	}

	#[cfg(test)]
	pub fn next_due(&self) -> Option<i64> {
		self.next_due
	}

	#[cfg(test)]
	pub fn is_pending(&self) -> bool {
		self.next_due.is_some()
	}

	/// Arm a run one interval from `now` unless one is already pending.
	pub fn arm(&mut self, now: i64) {
		if self.next_due.is_none() {
			self.next_due = Some(now.saturating_add(self.interval));
		}
	}

	pub fn is_due(&self, now: i64) -> bool {
		self.next_due.is_some_and(|due| now >= due)
	}

	/// Time left until the pending run, `None` when idle.
	pub fn wait_time(&self, now: i64) -> Option<Duration> {
		self.next_due
			.map(|due| Duration::from_secs(u64::try_from(due.saturating_sub(now)).unwrap_or(0)))
	}

	/// Record a finished run; re-arms only while events remain.
	pub fn complete(&mut self, now: i64, events_remain: bool) {
		self.next_due = None;
		if events_remain {
			self.arm(now);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn arming_is_idempotent_while_pending() {
		let mut s = SweepScheduler::new(600);
		assert!(!s.is_pending());
		s.arm(1_000);
		s.arm(1_500);
		assert_eq!(s.next_due(), Some(1_600));
		assert!(!s.is_due(1_599));
		assert!(s.is_due(1_600));
	}

	#[test]
	fn completion_rearms_only_with_remaining_events() {
		let mut s = SweepScheduler::new(60);
		s.arm(0);
		s.complete(60, true);
		assert_eq!(s.next_due(), Some(120));
		s.complete(120, false);
		assert!(!s.is_pending());
		assert_eq!(s.wait_time(120), None);
	}

	#[test]
	fn wait_time_saturates_at_zero() {
		let mut s = SweepScheduler::new(10);
		s.arm(100);
		assert_eq!(s.wait_time(105), Some(Duration::from_secs(5)));
		assert_eq!(s.wait_time(500), Some(Duration::ZERO));
	}

	#[test]
	fn interval_change_applies_to_next_arming() {
		let mut s = SweepScheduler::new(10);
		s.arm(0);
		s.set_interval(100);
		assert_eq!(s.next_due(), Some(10));
		s.complete(10, true);
		assert_eq!(s.next_due(), Some(110));
		assert_eq!(s.interval(), 100);
	}
}
