//! Bounded retry loops and reusable wait conditions.
//!
//! [`retry_until`] evaluates an async predicate up to a configured number of
//! attempts, sleeping between failures, the whole loop bounded by an outer
//! deadline. A predicate returning `Some` wins immediately; deadline expiry
//! or attempt exhaustion yields `None`.
//!
//! [`retry_condition`] runs the identical control flow over a [`Condition`]
//! object: a stateful matcher whose success latches once satisfied. The two
//! entry points are mutually exclusive: a call site supplies either a
//! predicate or a condition, never both.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use regex::{Regex, RegexBuilder};
use tokio::time::{sleep, timeout};
use tracing::{debug, trace};

// ============================================================================
// Named Budgets
// ============================================================================

/// Standard wait budgets, from shortest to longest.
pub mod timeouts {
    use std::time::Duration;

    /// 2 seconds.
    pub const SHORT: Duration = Duration::from_secs(2);
    /// 10 seconds.
    pub const NORMAL: Duration = Duration::from_secs(10);
    /// 20 seconds.
    pub const MEDIUM: Duration = Duration::from_secs(20);
    /// 30 seconds.
    pub const LONG: Duration = Duration::from_secs(30);
    /// 2 minutes.
    pub const EXTRA: Duration = Duration::from_secs(120);
}

/// Standard attempt counts.
pub mod attempts {
    /// 5 attempts.
    pub const FEW: u32 = 5;
    /// 10 attempts.
    pub const NORMAL: u32 = 10;
    /// 20 attempts.
    pub const MANY: u32 = 20;
}

// ============================================================================
// Pause
// ============================================================================

/// Pause between failed attempts: a constant, or a per-attempt schedule.
#[derive(Debug, Clone)]
pub enum Pause {
    /// The same pause after every failed attempt.
    Fixed(Duration),
    /// Indexed by attempt; shorter schedules are padded by repeating the
    /// last element.
    Schedule(Vec<Duration>),
}

impl Pause {
    /// Half a second.
    #[must_use]
    pub fn short() -> Self {
        Self::Fixed(Duration::from_millis(500))
    }

    /// One second.
    #[must_use]
    pub fn normal() -> Self {
        Self::Fixed(Duration::from_secs(1))
    }

    /// Five seconds.
    #[must_use]
    pub fn above_normal() -> Self {
        Self::Fixed(Duration::from_secs(5))
    }

    /// Ten seconds.
    #[must_use]
    pub fn long() -> Self {
        Self::Fixed(Duration::from_secs(10))
    }

    /// The default backoff schedule: 0.5, 0.5, 1, 1, 2, 2, 5, 5 seconds.
    #[must_use]
    pub fn progressive() -> Self {
        Self::Schedule(
            [500, 500, 1000, 1000, 2000, 2000, 5000, 5000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
        )
    }
}

// ============================================================================
// RetryPolicy
// ============================================================================

/// Bounds for one retry loop: outer deadline, attempt count, pause schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    timeout: Duration,
    attempts: u32,
    pause: Pause,
}

impl Default for RetryPolicy {
    /// Normal budget: 10 s deadline, 10 attempts, progressive pauses.
    fn default() -> Self {
        Self {
            timeout: timeouts::NORMAL,
            attempts: attempts::NORMAL,
            pause: Pause::progressive(),
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the outer deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the attempt count; values below 1 are clamped to 1.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Sets the pause schedule.
    #[must_use]
    pub fn with_pause(mut self, pause: Pause) -> Self {
        self.pause = pause;
        self
    }

    /// Returns the outer deadline.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the attempt count.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the pause for the given zero-based attempt index.
    ///
    /// A single-attempt policy never pauses. A schedule shorter than the
    /// attempt count repeats its last element.
    #[must_use]
    pub fn pause_at(&self, attempt: u32) -> Duration {
        if self.attempts == 1 {
            return Duration::ZERO;
        }
        match &self.pause {
            Pause::Fixed(duration) => *duration,
            Pause::Schedule(schedule) => schedule
                .get(attempt as usize)
                .or_else(|| schedule.last())
                .copied()
                .unwrap_or(Duration::ZERO),
        }
    }
}

// ============================================================================
// retry_until
// ============================================================================

/// Retries an async predicate until it yields a value, attempts run out, or
/// the deadline expires.
///
/// `None` from the predicate counts as failure; anything else is success and
/// is returned immediately, so success always wins over simultaneous
/// exhaustion. Between failed attempts the loop sleeps for the
/// schedule-indexed pause. Deadline expiry aborts regardless of attempts
/// remaining and yields `None`.
pub async fn retry_until<T, F, Fut>(policy: &RetryPolicy, mut predicate: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let bounded = async {
        for attempt in 0..policy.attempts() {
            trace!(attempt, "Retry attempt");

            if let Some(value) = predicate().await {
                debug!(attempt, "Retry succeeded");
                return Some(value);
            }

            if attempt + 1 < policy.attempts() {
                sleep(policy.pause_at(attempt)).await;
            }
        }
        debug!(attempts = policy.attempts(), "Retry attempts exhausted");
        None
    };

    match timeout(policy.timeout(), bounded).await {
        Ok(result) => result,
        Err(_) => {
            debug!(timeout_ms = policy.timeout().as_millis() as u64, "Retry deadline expired");
            None
        }
    }
}

// ============================================================================
// Condition
// ============================================================================

/// A reusable, stateful wait condition.
///
/// Once satisfied, the condition latches: further [`test`](Self::test) calls
/// are no-ops returning `true` until [`reset`](Self::reset).
pub trait Condition {
    /// Tests a value against the condition, latching on success.
    fn test(&mut self, value: &str) -> bool;

    /// Returns `true` once the condition has been satisfied.
    fn satisfied(&self) -> bool;

    /// Clears the latch and the test counter.
    fn reset(&mut self);

    /// Returns how many times `test` has evaluated a value since the last
    /// reset (latched no-op calls are not counted).
    fn tests(&self) -> u32;
}

/// How a [`TextCondition`] compares its needles against a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    /// Needle occurs anywhere in the value.
    Contains,
    /// Needle is the final characters of the value.
    EndsWith,
}

/// Case-insensitive substring / suffix condition over one or more needles.
#[derive(Debug)]
pub struct TextCondition {
    needles: Vec<String>,
    mode: TextMatch,
    satisfied: bool,
    tests: u32,
}

impl TextCondition {
    /// Condition satisfied when any needle occurs in the tested value.
    #[must_use]
    pub fn contains<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_mode(needles, TextMatch::Contains)
    }

    /// Condition satisfied when any needle ends the tested value.
    #[must_use]
    pub fn ends_with<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_mode(needles, TextMatch::EndsWith)
    }

    fn with_mode<I, S>(needles: I, mode: TextMatch) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            needles: needles
                .into_iter()
                .map(|s| s.into().to_lowercase())
                .collect(),
            mode,
            satisfied: false,
            tests: 0,
        }
    }
}

impl Condition for TextCondition {
    fn test(&mut self, value: &str) -> bool {
        if self.satisfied {
            return true;
        }
        self.tests += 1;

        let value = value.to_lowercase();
        self.satisfied = self.needles.iter().any(|needle| match self.mode {
            TextMatch::Contains => value.contains(needle),
            TextMatch::EndsWith => value.ends_with(needle),
        });
        self.satisfied
    }

    fn satisfied(&self) -> bool {
        self.satisfied
    }

    fn reset(&mut self) {
        self.satisfied = false;
        self.tests = 0;
    }

    fn tests(&self) -> u32 {
        self.tests
    }
}

/// Pattern condition over one or more regexes.
#[derive(Debug)]
pub struct PatternCondition {
    patterns: Vec<Regex>,
    satisfied: bool,
    tests: u32,
}

impl PatternCondition {
    /// Condition satisfied when any pattern matches the tested value.
    #[must_use]
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self {
            patterns,
            satisfied: false,
            tests: 0,
        }
    }

    /// Builds a condition from literal strings, escaped and matched
    /// case-insensitively.
    pub fn literals<I, S>(literals: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = literals
            .into_iter()
            .map(|lit| {
                RegexBuilder::new(&regex::escape(lit.as_ref()))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| crate::Error::invalid_argument(format!("bad pattern: {e}")))
            })
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(Self::new(patterns))
    }
}

impl Condition for PatternCondition {
    fn test(&mut self, value: &str) -> bool {
        if self.satisfied {
            return true;
        }
        self.tests += 1;
        self.satisfied = self.patterns.iter().any(|p| p.is_match(value));
        self.satisfied
    }

    fn satisfied(&self) -> bool {
        self.satisfied
    }

    fn reset(&mut self) {
        self.satisfied = false;
        self.tests = 0;
    }

    fn tests(&self) -> u32 {
        self.tests
    }
}

/// Closure-backed condition.
pub struct FnCondition<F> {
    func: F,
    satisfied: bool,
    tests: u32,
}

impl<F: FnMut(&str) -> bool> FnCondition<F> {
    /// Wraps a closure as a latching condition.
    #[must_use]
    pub fn new(func: F) -> Self {
        Self {
            func,
            satisfied: false,
            tests: 0,
        }
    }
}

impl<F: FnMut(&str) -> bool> Condition for FnCondition<F> {
    fn test(&mut self, value: &str) -> bool {
        if self.satisfied {
            return true;
        }
        self.tests += 1;
        self.satisfied = (self.func)(value);
        self.satisfied
    }

    fn satisfied(&self) -> bool {
        self.satisfied
    }

    fn reset(&mut self) {
        self.satisfied = false;
        self.tests = 0;
    }

    fn tests(&self) -> u32 {
        self.tests
    }
}

// ============================================================================
// retry_condition
// ============================================================================

/// Retries a probe until a [`Condition`] is satisfied by one of its values.
///
/// Identical control flow to [`retry_until`]: each attempt runs `probe`; a
/// `None` probe result counts as failure, otherwise the value is fed to
/// `condition.test`. Returns `true` as soon as the condition is satisfied.
pub async fn retry_condition<F, Fut>(
    policy: &RetryPolicy,
    condition: &mut dyn Condition,
    mut probe: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<String>>,
{
    let bounded = async {
        for attempt in 0..policy.attempts() {
            trace!(attempt, "Condition attempt");

            if let Some(value) = probe().await
                && condition.test(&value)
            {
                debug!(attempt, tests = condition.tests(), "Condition satisfied");
                return true;
            }

            if attempt + 1 < policy.attempts() {
                sleep(policy.pause_at(attempt)).await;
            }
        }
        debug!(attempts = policy.attempts(), "Condition attempts exhausted");
        false
    };

    match timeout(policy.timeout(), bounded).await {
        Ok(satisfied) => satisfied,
        Err(_) => {
            debug!(timeout_ms = policy.timeout().as_millis() as u64, "Condition deadline expired");
            false
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;

    fn quick_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_timeout(Duration::from_secs(60))
            .with_attempts(attempts)
            .with_pause(Pause::Fixed(Duration::from_millis(100)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_predicate_invoked_exactly_n_times() {
        let calls = Cell::new(0u32);

        let result: Option<()> = retry_until(&quick_policy(7), || {
            calls.set(calls.get() + 1);
            async { None }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.get(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_immediately() {
        let calls = Cell::new(0u32);

        let result = retry_until(&quick_policy(10), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { (n == 3).then_some("done") }
        })
        .await;

        assert_eq!(result, Some("done"));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_final_attempt_beats_exhaustion() {
        let calls = Cell::new(0u32);

        let result = retry_until(&quick_policy(4), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { (n == 4).then_some(n) }
        })
        .await;

        assert_eq!(result, Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_returns_without_sleeping() {
        let start = tokio::time::Instant::now();
        let calls = Cell::new(0u32);

        let result: Option<()> = retry_until(&quick_policy(1), || {
            calls.set(calls.get() + 1);
            async { None }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.get(), 1);
        // With a paused clock, any sleep would be visible here.
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_before_attempts_exhausted() {
        let policy = RetryPolicy::new()
            .with_timeout(Duration::from_millis(2500))
            .with_attempts(10)
            .with_pause(Pause::Fixed(Duration::from_secs(1)));
        let calls = Cell::new(0u32);

        let result: Option<()> = retry_until(&policy, || {
            calls.set(calls.get() + 1);
            async { None }
        })
        .await;

        assert_eq!(result, None);
        assert!(calls.get() < 10, "deadline should cut attempts short");
    }

    #[test]
    fn test_schedule_pads_with_last_element() {
        let policy = RetryPolicy::new().with_attempts(6).with_pause(Pause::Schedule(vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
        ]));

        assert_eq!(policy.pause_at(0), Duration::from_millis(10));
        assert_eq!(policy.pause_at(1), Duration::from_millis(20));
        assert_eq!(policy.pause_at(2), Duration::from_millis(20));
        assert_eq!(policy.pause_at(5), Duration::from_millis(20));
    }

    #[test]
    fn test_single_attempt_collapses_pause() {
        let policy = RetryPolicy::new()
            .with_attempts(1)
            .with_pause(Pause::Fixed(Duration::from_secs(5)));
        assert_eq!(policy.pause_at(0), Duration::ZERO);
    }

    #[test]
    fn test_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new().with_attempts(0).attempts(), 1);
    }

    #[test]
    fn test_text_condition_latches() {
        let mut cond = TextCondition::contains(["/foo/"]);

        assert!(!cond.test("/bar/baz"));
        assert!(cond.test("/Super/cali/FOO/bar"));
        assert!(cond.satisfied());
        assert_eq!(cond.tests(), 2);

        // Latched: no further evaluation.
        assert!(cond.test("does not match at all"));
        assert_eq!(cond.tests(), 2);

        cond.reset();
        assert!(!cond.satisfied());
        assert_eq!(cond.tests(), 0);
    }

    #[test]
    fn test_text_condition_ends_with() {
        let mut cond = TextCondition::ends_with(["login", "signin"]);
        assert!(!cond.test("https://example.com/login/next"));
        assert!(cond.test("https://example.com/SignIn"));
    }

    #[test]
    fn test_pattern_condition_literals_are_escaped() {
        let mut cond = PatternCondition::literals(["a.b?"]).expect("build");
        assert!(!cond.test("aXb!"));
        assert!(cond.test("prefix A.B? suffix"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_condition_control_flow() {
        let mut cond = TextCondition::contains(["complete"]);
        let calls = Cell::new(0u32);

        let satisfied = retry_condition(&quick_policy(10), &mut cond, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                Some(if n < 3 { "loading".to_string() } else { "complete".to_string() })
            }
        })
        .await;

        assert!(satisfied);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_condition_exhaustion() {
        let mut cond = TextCondition::contains(["never"]);

        let satisfied = retry_condition(&quick_policy(3), &mut cond, || async {
            Some("nope".to_string())
        })
        .await;

        assert!(!satisfied);
        assert_eq!(cond.tests(), 3);
    }
}
