//! Events delivered to an executor and the keys transitions are triggered by.

use super::ids::TransitionId;
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// Application-defined event type.
///
/// Custom events match triggers by `(type name, key)` equality, so two
/// instances with equal keys fire the same transitions. The payload stays
/// reachable from behaviors through [`Event::downcast`].
///
/// # Example
///
/// ```rust
/// use orthogon::core::{CustomEvent, Event};
/// use std::any::Any;
///
/// #[derive(Debug)]
/// struct Deposit {
///     amount: u64,
/// }
///
/// impl CustomEvent for Deposit {
///     fn key(&self) -> String {
///         "deposit".to_string()
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
///
/// let event = Event::custom(Deposit { amount: 10 });
/// assert_eq!(event.downcast::<Deposit>().map(|d| d.amount), Some(10));
/// ```
pub trait CustomEvent: Debug + Send + Sync + 'static {
    /// Equality key within this event type.
    fn key(&self) -> String;

    /// Access to the concrete value.
    fn as_any(&self) -> &dyn Any;

    /// Type discriminator; defaults to the Rust type name.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// An inbound stimulus.
#[derive(Clone, Debug)]
pub enum Event {
    /// Plain named signal, matched by name.
    Named(Arc<str>),
    /// Expiry of a time trigger; generated by the executor's timers.
    Timeout(TransitionId),
    /// Application event type.
    Custom(Arc<dyn CustomEvent>),
    /// Synthetic completion event. Observed by behaviors that run during
    /// start-up and completion cascades; never matches a trigger.
    Completion,
}

impl Event {
    /// Create a named event.
    pub fn named(name: impl AsRef<str>) -> Self {
        Event::Named(Arc::from(name.as_ref()))
    }

    /// Wrap an application event.
    pub fn custom<E: CustomEvent>(event: E) -> Self {
        Event::Custom(Arc::new(event))
    }

    /// Key used for trigger matching.
    pub fn key(&self) -> EventKey {
        match self {
            Event::Named(name) => EventKey::Named(name.clone()),
            Event::Timeout(transition) => EventKey::Timeout(*transition),
            Event::Custom(custom) => EventKey::Custom {
                type_name: custom.type_name(),
                key: custom.key(),
            },
            Event::Completion => EventKey::Completion,
        }
    }

    /// Name of a named event.
    pub fn name(&self) -> Option<&str> {
        match self {
            Event::Named(name) => Some(name.as_ref()),
            _ => None,
        }
    }

    /// Borrow the payload of a custom event.
    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        match self {
            Event::Custom(custom) => custom.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, Event::Completion)
    }
}

impl From<&str> for Event {
    fn from(name: &str) -> Self {
        Event::named(name)
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Event::named(name)
    }
}

/// Hashable identity of an event, used to index transitions by trigger.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKey {
    Named(Arc<str>),
    Timeout(TransitionId),
    Custom { type_name: &'static str, key: String },
    Completion,
}

impl EventKey {
    pub fn named(name: impl AsRef<str>) -> Self {
        EventKey::Named(Arc::from(name.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Coin(u32);

    impl CustomEvent for Coin {
        fn key(&self) -> String {
            "coin".into()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn named_events_match_by_name() {
        assert_eq!(Event::named("go").key(), Event::from("go").key());
        assert_ne!(Event::named("go").key(), Event::named("stop").key());
    }

    #[test]
    fn custom_events_match_by_type_and_key() {
        let a = Event::custom(Coin(1));
        let b = Event::custom(Coin(25));
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), Event::named("coin").key());
        assert_eq!(b.downcast::<Coin>().map(|c| c.0), Some(25));
    }

    #[test]
    fn completion_is_distinct() {
        assert!(Event::Completion.is_completion());
        assert_eq!(Event::Completion.key(), EventKey::Completion);
        assert_eq!(Event::Completion.name(), None);
    }
}
