//! User-supplied guards, behaviors and activities.
//!
//! Guards are predicates over the executor context and the triggering event.
//! Behaviors (effects, entry and exit actions) mutate the context. Both may
//! fail; the executor contains those failures instead of aborting a step.

use super::event::Event;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type GuardFn<C> = dyn Fn(&C, &Event) -> anyhow::Result<bool> + Send + Sync;
type BehaviorFn<C> = dyn Fn(&mut C, &Event) -> anyhow::Result<()> + Send + Sync;
type ActivityFn = dyn Fn(&CancelToken) -> anyhow::Result<()> + Send + Sync;

/// Predicate that decides whether a transition may fire.
///
/// # Example
///
/// ```rust
/// use orthogon::core::{Event, Guard};
///
/// let positive = Guard::new(|balance: &i64, _event: &Event| *balance > 0);
///
/// assert!(positive.check(&10, &Event::named("withdraw")).unwrap());
/// assert!(!positive.check(&0, &Event::named("withdraw")).unwrap());
/// ```
pub struct Guard<C> {
    predicate: Arc<GuardFn<C>>,
}

impl<C> Guard<C> {
    /// Create a guard from an infallible predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(move |context, event| Ok(predicate(context, event))),
        }
    }

    /// Create a guard whose evaluation may fail. A failure counts as `false`.
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(predicate),
        }
    }

    pub fn check(&self, context: &C, event: &Event) -> anyhow::Result<bool> {
        (self.predicate)(context, event)
    }
}

impl<C> Clone for Guard<C> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<C> fmt::Debug for Guard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard")
    }
}

/// Context-mutating action: transition effect, entry or exit behavior.
pub struct Behavior<C> {
    action: Arc<BehaviorFn<C>>,
}

impl<C> Behavior<C> {
    pub fn new<F>(action: F) -> Self
    where
        F: Fn(&mut C, &Event) + Send + Sync + 'static,
    {
        Behavior {
            action: Arc::new(move |context, event| {
                action(context, event);
                Ok(())
            }),
        }
    }

    pub fn fallible<F>(action: F) -> Self
    where
        F: Fn(&mut C, &Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Behavior {
            action: Arc::new(action),
        }
    }

    pub fn run(&self, context: &mut C, event: &Event) -> anyhow::Result<()> {
        (self.action)(context, event)
    }
}

impl<C> Clone for Behavior<C> {
    fn clone(&self) -> Self {
        Self {
            action: Arc::clone(&self.action),
        }
    }
}

impl<C> fmt::Debug for Behavior<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Behavior")
    }
}

/// Long-running "do" behavior of a state.
///
/// Activities run on the executor's scheduler, never on the thread that
/// mutates the active configuration, so they get no access to the context.
/// They should poll the [`CancelToken`] and return early once the state is
/// left.
#[derive(Clone)]
pub struct Activity {
    body: Arc<ActivityFn>,
}

impl Activity {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&CancelToken) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Activity {
            body: Arc::new(body),
        }
    }

    pub fn run(&self, token: &CancelToken) -> anyhow::Result<()> {
        (self.body)(token)
    }
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Activity")
    }
}

/// Shared cancellation flag handed to scheduled work.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_sees_context_and_event() {
        let guard = Guard::new(|limit: &usize, event: &Event| {
            event.name().map(str::len).unwrap_or(0) <= *limit
        });

        assert!(guard.check(&5, &Event::named("go")).unwrap());
        assert!(!guard.check(&1, &Event::named("go")).unwrap());
    }

    #[test]
    fn fallible_guard_reports_error() {
        let guard: Guard<()> = Guard::fallible(|_, _| anyhow::bail!("no database"));
        assert!(guard.check(&(), &Event::Completion).is_err());
    }

    #[test]
    fn behavior_mutates_context() {
        let behavior = Behavior::new(|log: &mut Vec<String>, event: &Event| {
            log.push(event.name().unwrap_or("?").to_string());
        });

        let mut log = Vec::new();
        behavior.run(&mut log, &Event::named("tick")).unwrap();
        behavior.clone().run(&mut log, &Event::Completion).unwrap();

        assert_eq!(log, vec!["tick".to_string(), "?".to_string()]);
    }

    #[test]
    fn activity_observes_cancellation() {
        let activity = Activity::new(|token| {
            if token.is_cancelled() {
                anyhow::bail!("cancelled");
            }
            Ok(())
        });

        let token = CancelToken::new();
        assert!(activity.run(&token).is_ok());
        token.cancel();
        assert!(activity.run(&token).is_err());
    }
}
