//! Builder for transition details.

use crate::core::{Behavior, Event, EventKey, Guard, TransitionKind, Trigger};
use std::time::Duration;

/// Declarative description of a transition, resolved at build time.
pub(crate) struct TransitionDef<C> {
    pub(crate) source: String,
    pub(crate) target: String,
    pub(crate) kind: TransitionKind,
    pub(crate) triggers: Vec<Trigger>,
    pub(crate) guard: Option<Guard<C>>,
    pub(crate) effect: Option<Behavior<C>>,
}

/// Fluent configuration of a single transition.
///
/// Obtained through [`StateMachineBuilder::transition`](super::StateMachineBuilder::transition).
/// Without triggers the transition is a completion transition (or a plain
/// hop when its source is a pseudostate).
pub struct TransitionBuilder<C> {
    kind: TransitionKind,
    triggers: Vec<Trigger>,
    guard: Option<Guard<C>>,
    effect: Option<Behavior<C>>,
}

impl<C: 'static> TransitionBuilder<C> {
    pub(crate) fn new() -> Self {
        Self {
            kind: TransitionKind::External,
            triggers: Vec::new(),
            guard: None,
            effect: None,
        }
    }

    /// Trigger on a named event.
    pub fn on(mut self, name: impl AsRef<str>) -> Self {
        self.triggers.push(Trigger::Event(EventKey::named(name)));
        self
    }

    /// Trigger on anything matching `event` (custom events included).
    pub fn on_event(mut self, event: &Event) -> Self {
        self.triggers.push(Trigger::Event(event.key()));
        self
    }

    /// Trigger once the source has been active for `delay`.
    pub fn after(mut self, delay: Duration) -> Self {
        self.triggers.push(Trigger::After(delay));
        self
    }

    pub fn guard<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Guard::new(predicate));
        self
    }

    pub fn try_guard<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.guard = Some(Guard::fallible(predicate));
        self
    }

    pub fn effect<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut C, &Event) + Send + Sync + 'static,
    {
        self.effect = Some(Behavior::new(action));
        self
    }

    pub fn try_effect<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut C, &Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.effect = Some(Behavior::fallible(action));
        self
    }

    pub fn kind(mut self, kind: TransitionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn local(self) -> Self {
        self.kind(TransitionKind::Local)
    }

    pub fn internal(self) -> Self {
        self.kind(TransitionKind::Internal)
    }

    pub(crate) fn into_def(self, source: String, target: String) -> TransitionDef<C> {
        TransitionDef {
            source,
            target,
            kind: self.kind,
            triggers: self.triggers,
            guard: self.guard,
            effect: self.effect,
        }
    }
}
