//! Builders for regions and the states inside them.

use super::machine::MachineDefinition;
use crate::core::{Activity, Behavior, CancelToken, Event, EventKey, PseudoKind};
use std::sync::Arc;

pub(crate) struct RegionDef<C> {
    pub(crate) id: String,
    pub(crate) vertices: Vec<VertexDef<C>>,
}

pub(crate) struct VertexDef<C> {
    pub(crate) id: String,
    pub(crate) kind: VertexDefKind<C>,
}

pub(crate) enum VertexDefKind<C> {
    State(StateDef<C>),
    Final,
    Pseudo(PseudoKind),
}

pub(crate) struct StateDef<C> {
    pub(crate) name: Option<String>,
    pub(crate) regions: Vec<RegionDef<C>>,
    pub(crate) entry: Vec<Behavior<C>>,
    pub(crate) exit: Vec<Behavior<C>>,
    pub(crate) activity: Option<Activity>,
    pub(crate) connection_points: Vec<(String, PseudoKind)>,
    pub(crate) deferred: Vec<EventKey>,
    pub(crate) submachine: Option<Arc<MachineDefinition<C>>>,
    pub(crate) orthogonal: bool,
}

/// Fluent construction of one region's vertices.
pub struct RegionBuilder<C> {
    def: RegionDef<C>,
}

impl<C: 'static> RegionBuilder<C> {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            def: RegionDef {
                id: id.into(),
                vertices: Vec::new(),
            },
        }
    }

    pub(crate) fn into_def(self) -> RegionDef<C> {
        self.def
    }

    fn pseudo(mut self, id: impl Into<String>, kind: PseudoKind) -> Self {
        self.def.vertices.push(VertexDef {
            id: id.into(),
            kind: VertexDefKind::Pseudo(kind),
        });
        self
    }

    /// Add a state configured by `configure`.
    pub fn state<F>(mut self, id: impl Into<String>, configure: F) -> Self
    where
        F: FnOnce(StateBuilder<C>) -> StateBuilder<C>,
    {
        let built = configure(StateBuilder::new());
        self.def.vertices.push(VertexDef {
            id: id.into(),
            kind: VertexDefKind::State(built.def),
        });
        self
    }

    /// Add a state with no behaviors and no regions.
    pub fn simple(self, id: impl Into<String>) -> Self {
        self.state(id, |s| s)
    }

    pub fn final_state(mut self, id: impl Into<String>) -> Self {
        self.def.vertices.push(VertexDef {
            id: id.into(),
            kind: VertexDefKind::Final,
        });
        self
    }

    pub fn initial(self, id: impl Into<String>) -> Self {
        self.pseudo(id, PseudoKind::Initial)
    }

    pub fn choice(self, id: impl Into<String>) -> Self {
        self.pseudo(id, PseudoKind::Choice)
    }

    pub fn junction(self, id: impl Into<String>) -> Self {
        self.pseudo(id, PseudoKind::Junction)
    }

    pub fn fork(self, id: impl Into<String>) -> Self {
        self.pseudo(id, PseudoKind::Fork)
    }

    pub fn join(self, id: impl Into<String>) -> Self {
        self.pseudo(id, PseudoKind::Join)
    }

    pub fn shallow_history(self, id: impl Into<String>) -> Self {
        self.pseudo(id, PseudoKind::ShallowHistory)
    }

    pub fn deep_history(self, id: impl Into<String>) -> Self {
        self.pseudo(id, PseudoKind::DeepHistory)
    }

    pub fn terminate(self, id: impl Into<String>) -> Self {
        self.pseudo(id, PseudoKind::Terminate)
    }
}

/// Fluent configuration of a state.
pub struct StateBuilder<C> {
    def: StateDef<C>,
}

impl<C: 'static> StateBuilder<C> {
    fn new() -> Self {
        Self {
            def: StateDef {
                name: None,
                regions: Vec::new(),
                entry: Vec::new(),
                exit: Vec::new(),
                activity: None,
                connection_points: Vec::new(),
                deferred: Vec::new(),
                submachine: None,
                orthogonal: false,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.def.name = Some(name.into());
        self
    }

    /// Add a sub-region. One region makes a composite state, two or more an
    /// orthogonal one.
    pub fn region<F>(mut self, id: impl Into<String>, configure: F) -> Self
    where
        F: FnOnce(RegionBuilder<C>) -> RegionBuilder<C>,
    {
        self.def.regions.push(configure(RegionBuilder::new(id)).into_def());
        self
    }

    /// Declare the state orthogonal; the build fails unless it ends up with
    /// at least two regions.
    pub fn orthogonal(mut self) -> Self {
        self.def.orthogonal = true;
        self
    }

    pub fn on_entry<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut C, &Event) + Send + Sync + 'static,
    {
        self.def.entry.push(Behavior::new(action));
        self
    }

    pub fn try_on_entry<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut C, &Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.def.entry.push(Behavior::fallible(action));
        self
    }

    pub fn on_exit<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut C, &Event) + Send + Sync + 'static,
    {
        self.def.exit.push(Behavior::new(action));
        self
    }

    pub fn try_on_exit<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut C, &Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.def.exit.push(Behavior::fallible(action));
        self
    }

    /// Run `body` on the scheduler while the state is active.
    pub fn activity<F>(mut self, body: F) -> Self
    where
        F: Fn(&CancelToken) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.def.activity = Some(Activity::new(body));
        self
    }

    /// Keep named events this state cannot handle for later.
    pub fn defer(mut self, name: impl AsRef<str>) -> Self {
        self.def.deferred.push(EventKey::named(name));
        self
    }

    pub fn defer_event(mut self, event: &Event) -> Self {
        self.def.deferred.push(event.key());
        self
    }

    pub fn entry_point(mut self, id: impl Into<String>) -> Self {
        self.def
            .connection_points
            .push((id.into(), PseudoKind::EntryPoint));
        self
    }

    pub fn exit_point(mut self, id: impl Into<String>) -> Self {
        self.def
            .connection_points
            .push((id.into(), PseudoKind::ExitPoint));
        self
    }

    /// Inline `machine` as this state's content.
    ///
    /// Its regions, connection points and transitions are copied in with
    /// every id prefixed by `"<state id>/"`; the copy is detached from the
    /// definition it came from.
    pub fn submachine(mut self, machine: Arc<MachineDefinition<C>>) -> Self {
        self.def.submachine = Some(machine);
        self
    }
}
