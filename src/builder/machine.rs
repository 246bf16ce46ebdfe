//! Builder for complete machines and the finalize step.

use super::error::{BuildError, BuildErrors};
use super::ownership;
use super::region::{RegionBuilder, RegionDef, StateDef, VertexDef, VertexDefKind};
use super::transition::{TransitionBuilder, TransitionDef};
use super::validate::{self, Check};
use crate::core::{
    EventKey, PseudoKind, Region, RegionId, RegionOwner, StateData, StateMachine,
    StateMachineMeta, Transition, TransitionId, Trigger, Vertex, VertexId, VertexKind,
    VertexOwner,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use stillwater::validation::Validation;

/// Declarative machine description, reusable as a submachine.
pub struct MachineDefinition<C> {
    pub(crate) id: String,
    pub(crate) regions: Vec<RegionDef<C>>,
    pub(crate) connection_points: Vec<(String, PseudoKind)>,
    pub(crate) transitions: Vec<TransitionDef<C>>,
}

impl<C> MachineDefinition<C> {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Builder for constructing state machines with a fluent API.
///
/// # Example
///
/// ```rust
/// use orthogon::builder::StateMachineBuilder;
///
/// let machine = StateMachineBuilder::<Vec<String>>::new("door")
///     .region("main", |r| r.initial("init").simple("closed").simple("open"))
///     .transition("init", "closed", |t| t)
///     .transition("closed", "open", |t| t.on("open"))
///     .transition("open", "closed", |t| t.on("close"))
///     .build()
///     .unwrap();
///
/// assert_eq!(machine.id(), "door");
/// assert!(machine.find_vertex("open").is_some());
/// ```
pub struct StateMachineBuilder<C> {
    definition: MachineDefinition<C>,
}

impl<C: 'static> StateMachineBuilder<C> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            definition: MachineDefinition {
                id: id.into(),
                regions: Vec::new(),
                connection_points: Vec::new(),
                transitions: Vec::new(),
            },
        }
    }

    /// Add a top region.
    pub fn region<F>(mut self, id: impl Into<String>, configure: F) -> Self
    where
        F: FnOnce(RegionBuilder<C>) -> RegionBuilder<C>,
    {
        self.definition
            .regions
            .push(configure(RegionBuilder::new(id)).into_def());
        self
    }

    pub fn entry_point(mut self, id: impl Into<String>) -> Self {
        self.definition
            .connection_points
            .push((id.into(), PseudoKind::EntryPoint));
        self
    }

    pub fn exit_point(mut self, id: impl Into<String>) -> Self {
        self.definition
            .connection_points
            .push((id.into(), PseudoKind::ExitPoint));
        self
    }

    /// Add a transition between two vertex ids, configured by `configure`.
    /// Ids are resolved when the machine is built.
    pub fn transition<F>(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        configure: F,
    ) -> Self
    where
        F: FnOnce(TransitionBuilder<C>) -> TransitionBuilder<C>,
    {
        let def = configure(TransitionBuilder::new()).into_def(source.into(), target.into());
        self.definition.transitions.push(def);
        self
    }

    /// Freeze the description so it can be inlined into states of other
    /// machines.
    pub fn into_definition(self) -> Arc<MachineDefinition<C>> {
        Arc::new(self.definition)
    }

    /// Build the machine, reporting every structural problem at once.
    pub fn build(self) -> Result<StateMachine<C>, BuildErrors> {
        finalize(&self.definition)
    }
}

/// Assemble, index, validate and measure a machine.
pub(crate) fn finalize<C: 'static>(
    definition: &MachineDefinition<C>,
) -> Result<StateMachine<C>, BuildErrors> {
    let mut assembly = Assembly::default();

    if definition.regions.is_empty() {
        assembly.fail(BuildError::NoRegions(definition.id.clone()));
    }

    let top_regions: Vec<RegionId> = definition
        .regions
        .iter()
        .map(|region| assembly.add_region(region, RegionOwner::Machine, ""))
        .collect();
    let connection_points: Vec<VertexId> = definition
        .connection_points
        .iter()
        .map(|(id, kind)| assembly.add_point(id, *kind, VertexOwner::Machine, ""))
        .collect();
    assembly
        .pending
        .extend(definition.transitions.iter().map(|t| (t, String::new())));

    let Assembly {
        vertices,
        regions,
        vertex_index,
        region_index,
        pending,
        mut checks,
    } = assembly;

    let mut machine = StateMachine {
        id: definition.id.clone(),
        vertices,
        regions,
        transitions: Vec::new(),
        top_regions,
        connection_points,
        meta: StateMachineMeta::default(),
        vertex_index,
        region_index,
    };

    for (def, prefix) in pending {
        let source_id = format!("{prefix}{}", def.source);
        let target_id = format!("{prefix}{}", def.target);

        let Some(source) = machine.find_vertex(&source_id) else {
            checks.push(Validation::fail(BuildError::UnresolvedSource(source_id)));
            continue;
        };
        let Some(target) = machine.find_vertex(&target_id) else {
            checks.push(Validation::fail(BuildError::UnresolvedTarget {
                from: source_id,
                target: target_id,
            }));
            continue;
        };

        match ownership::owning_region(&machine, source, target, def.kind) {
            Ok(owner) => {
                let id = TransitionId::new(machine.transitions.len());
                machine.transitions.push(Transition {
                    id,
                    source,
                    target,
                    kind: def.kind,
                    owner,
                    triggers: def.triggers.clone(),
                    guard: def.guard.clone(),
                    effect: def.effect.clone(),
                });
            }
            Err(error) => checks.push(Validation::fail(error)),
        }
    }

    index_transitions(&mut machine);
    checks.extend(validate::structure(&machine));

    machine.meta = StateMachineMeta::compute(
        &machine.vertices,
        &machine.regions,
        &machine.transitions,
        &machine.top_regions,
    );

    match Validation::all_vec(checks) {
        Validation::Success(_) => Ok(machine),
        Validation::Failure(errors) => Err(BuildErrors(errors.iter().cloned().collect())),
    }
}

fn index_transitions<C>(machine: &mut StateMachine<C>) {
    for index in 0..machine.transitions.len() {
        let transition = &machine.transitions[index];
        let id = transition.id;
        let (source, target, owner) = (transition.source, transition.target, transition.owner);
        let keys: Vec<EventKey> = transition
            .triggers
            .iter()
            .map(|trigger| match trigger {
                Trigger::Event(key) => key.clone(),
                Trigger::After(_) => EventKey::Timeout(id),
            })
            .collect();
        let completion = transition.is_completion();
        let timed = transition.delay().is_some();

        let vertex = &mut machine.vertices[source.index()];
        vertex.outgoing.push(id);
        for key in keys {
            vertex.by_trigger.entry(key).or_default().push(id);
        }
        if completion {
            vertex.completions.push(id);
        }
        if timed {
            vertex.time_triggers.push(id);
        }

        machine.vertices[target.index()].incoming.push(id);
        machine.regions[owner.index()].transitions.push(id);
    }
}

struct Assembly<'a, C> {
    vertices: Vec<Vertex<C>>,
    regions: Vec<Region>,
    vertex_index: HashMap<String, VertexId>,
    region_index: HashMap<String, RegionId>,
    pending: Vec<(&'a TransitionDef<C>, String)>,
    checks: Vec<Check>,
}

impl<C> Default for Assembly<'_, C> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            regions: Vec::new(),
            vertex_index: HashMap::new(),
            region_index: HashMap::new(),
            pending: Vec::new(),
            checks: Vec::new(),
        }
    }
}

impl<'a, C: 'static> Assembly<'a, C> {
    fn fail(&mut self, error: BuildError) {
        self.checks.push(Validation::fail(error));
    }

    fn add_region(&mut self, def: &'a RegionDef<C>, owner: RegionOwner, prefix: &str) -> RegionId {
        let id = RegionId::new(self.regions.len());
        let full_id = format!("{prefix}{}", def.id);
        if self.region_index.insert(full_id.clone(), id).is_some() {
            self.fail(BuildError::DuplicateRegionId(full_id.clone()));
        }
        self.regions.push(Region {
            id: full_id,
            owner,
            vertices: Vec::new(),
            transitions: Vec::new(),
            initial: None,
            shallow_history: None,
            deep_history: None,
        });

        for vertex in &def.vertices {
            let vertex_id = self.add_vertex(vertex, VertexOwner::Region(id), prefix);
            self.regions[id.index()].vertices.push(vertex_id);
            if let VertexDefKind::Pseudo(kind) = vertex.kind {
                self.cache_default(id, kind, vertex_id);
            }
        }
        id
    }

    fn cache_default(&mut self, region: RegionId, kind: PseudoKind, vertex: VertexId) {
        let entry = &mut self.regions[region.index()];
        let slot = match kind {
            PseudoKind::Initial => &mut entry.initial,
            PseudoKind::ShallowHistory => &mut entry.shallow_history,
            PseudoKind::DeepHistory => &mut entry.deep_history,
            _ => return,
        };
        if slot.is_some() {
            let error = BuildError::DuplicateDefault {
                region: entry.id.clone(),
                kind,
            };
            self.fail(error);
        } else {
            *slot = Some(vertex);
        }
    }

    fn register_vertex(&mut self, full_id: &str, id: VertexId) {
        if self.vertex_index.insert(full_id.to_string(), id).is_some() {
            self.fail(BuildError::DuplicateVertexId(full_id.to_string()));
        }
    }

    fn push_vertex(
        &mut self,
        full_id: String,
        name: Option<String>,
        owner: VertexOwner,
        kind: VertexKind<C>,
    ) -> VertexId {
        let id = VertexId::new(self.vertices.len());
        self.register_vertex(&full_id, id);
        self.vertices.push(Vertex {
            id: full_id,
            name,
            owner,
            kind,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            by_trigger: HashMap::new(),
            completions: Vec::new(),
            time_triggers: Vec::new(),
        });
        id
    }

    fn add_point(&mut self, id: &str, kind: PseudoKind, owner: VertexOwner, prefix: &str) -> VertexId {
        self.push_vertex(format!("{prefix}{id}"), None, owner, VertexKind::Pseudo(kind))
    }

    fn add_vertex(&mut self, def: &'a VertexDef<C>, owner: VertexOwner, prefix: &str) -> VertexId {
        let full_id = format!("{prefix}{}", def.id);
        match &def.kind {
            VertexDefKind::Final => self.push_vertex(full_id, None, owner, VertexKind::Final),
            VertexDefKind::Pseudo(kind) => {
                self.push_vertex(full_id, None, owner, VertexKind::Pseudo(*kind))
            }
            VertexDefKind::State(state) => {
                let placeholder = VertexKind::State(StateData {
                    regions: Vec::new(),
                    entry: Vec::new(),
                    exit: Vec::new(),
                    activity: None,
                    connection_points: Vec::new(),
                    deferred: HashSet::new(),
                    submachine: None,
                });
                let id = self.push_vertex(full_id.clone(), state.name.clone(), owner, placeholder);
                self.fill_state(id, &full_id, state, prefix);
                id
            }
        }
    }

    fn fill_state(&mut self, id: VertexId, full_id: &str, def: &'a StateDef<C>, prefix: &str) {
        let mut regions = Vec::new();
        let mut points = Vec::new();

        for region in &def.regions {
            regions.push(self.add_region(region, RegionOwner::State(id), prefix));
        }
        for (point, kind) in &def.connection_points {
            points.push(self.add_point(point, *kind, VertexOwner::State(id), prefix));
        }

        let mut submachine = None;
        if let Some(sub) = &def.submachine {
            let inner = format!("{full_id}/");
            for region in &sub.regions {
                regions.push(self.add_region(region, RegionOwner::State(id), &inner));
            }
            for (point, kind) in &sub.connection_points {
                points.push(self.add_point(point, *kind, VertexOwner::State(id), &inner));
            }
            for transition in &sub.transitions {
                self.pending.push((transition, inner.clone()));
            }
            submachine = Some(sub.id.clone());
        }

        if def.orthogonal && regions.len() < 2 {
            self.fail(BuildError::OrthogonalNeedsRegions {
                state: full_id.to_string(),
                found: regions.len(),
            });
        }

        self.vertices[id.index()].kind = VertexKind::State(StateData {
            regions,
            entry: def.entry.clone(),
            exit: def.exit.clone(),
            activity: def.activity.clone(),
            connection_points: points,
            deferred: def.deferred.iter().cloned().collect(),
            submachine,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActiveStrategy, TransitionKind};
    use std::time::Duration;

    fn owner_of(machine: &StateMachine<()>, source: &str, target: &str) -> String {
        let source = machine.find_vertex(source).unwrap();
        let target = machine.find_vertex(target).unwrap();
        let transition = machine
            .transitions()
            .find(|t| t.source() == source && t.target() == target)
            .unwrap();
        machine.region(transition.owner()).id().to_string()
    }

    #[test]
    fn builder_requires_regions() {
        let result = StateMachineBuilder::<()>::new("empty").build();
        let errors = result.unwrap_err();
        assert!(errors.contains(|e| matches!(e, BuildError::NoRegions(_))));
    }

    #[test]
    fn builder_accumulates_all_errors() {
        let result = StateMachineBuilder::<()>::new("broken")
            .region("main", |r| {
                r.initial("i1")
                    .initial("i2")
                    .simple("a")
                    .simple("a")
                    .final_state("done")
            })
            .transition("i1", "missing", |t| t)
            .transition("ghost", "a", |t| t)
            .transition("done", "a", |t| t.on("again"))
            .build();

        let errors = result.unwrap_err();
        assert!(errors.contains(|e| matches!(e, BuildError::DuplicateDefault { .. })));
        assert!(errors.contains(|e| matches!(e, BuildError::DuplicateVertexId(id) if id == "a")));
        assert!(errors.contains(|e| matches!(
            e,
            BuildError::UnresolvedTarget { from, target } if from == "i1" && target == "missing"
        )));
        assert!(errors.contains(|e| matches!(e, BuildError::UnresolvedSource(id) if id == "ghost")));
        assert!(errors
            .errors()
            .iter()
            .any(|e| e.to_string() == "Transition target 'missing' (from 'i1') does not exist"));
        assert!(errors.contains(|e| matches!(e, BuildError::FinalStateOutgoing(_))));
        assert_eq!(errors.errors().len(), 5);
    }

    #[test]
    fn orthogonal_declaration_needs_two_regions() {
        let result = StateMachineBuilder::<()>::new("m")
            .region("main", |r| {
                r.state("p", |s| s.orthogonal().region("only", |r| r.simple("x")))
            })
            .build();

        let errors = result.unwrap_err();
        assert!(errors.contains(|e| matches!(
            e,
            BuildError::OrthogonalNeedsRegions { found: 1, .. }
        )));
    }

    #[test]
    fn triggers_on_pseudostate_exits_are_rejected() {
        let result = StateMachineBuilder::<()>::new("m")
            .region("main", |r| r.initial("init").simple("a"))
            .transition("init", "a", |t| t.on("go"))
            .build();

        assert!(result
            .unwrap_err()
            .contains(|e| matches!(e, BuildError::TriggeredPseudostateExit(_))));
    }

    #[test]
    fn finalize_indexes_triggers_and_defaults() {
        let machine = StateMachineBuilder::<()>::new("m")
            .region("main", |r| {
                r.initial("init")
                    .deep_history("h")
                    .simple("a")
                    .simple("b")
            })
            .transition("init", "a", |t| t)
            .transition("a", "b", |t| t.on("go"))
            .transition("a", "b", |t| t.after(Duration::from_millis(10)))
            .transition("b", "a", |t| t)
            .build()
            .unwrap();

        let main = machine.region(machine.top_regions()[0]);
        assert_eq!(main.initial(), machine.find_vertex("init"));
        assert_eq!(main.deep_history(), machine.find_vertex("h"));
        assert_eq!(main.shallow_history(), None);

        let a = machine.vertex(machine.find_vertex("a").unwrap());
        assert_eq!(a.triggered_by(&EventKey::named("go")).len(), 1);
        assert_eq!(a.time_triggers().len(), 1);
        let timer = a.time_triggers()[0];
        assert_eq!(a.triggered_by(&EventKey::Timeout(timer)), &[timer]);

        let b = machine.vertex(machine.find_vertex("b").unwrap());
        assert_eq!(b.completions().len(), 1);

        assert!(machine.meta().has_time_triggers);
        assert!(machine.meta().has_completion_transitions);
        assert_eq!(machine.meta().history_count, 1);
        assert_eq!(machine.meta().active_strategy(), ActiveStrategy::Composite);
    }

    #[test]
    fn every_transition_gets_an_owner() {
        let machine = StateMachineBuilder::<()>::new("m")
            .region("main", |r| {
                r.initial("init")
                    .simple("a")
                    .state("s", |s| {
                        s.region("inner", |r| r.initial("si").simple("x").simple("y"))
                    })
            })
            .transition("init", "a", |t| t)
            .transition("si", "x", |t| t)
            .transition("a", "x", |t| t.on("deep"))
            .transition("x", "a", |t| t.on("up"))
            .transition("s", "y", |t| t.on("local").local())
            .transition("x", "x", |t| t.on("tick").internal())
            .transition("s", "x", |t| t.on("reset"))
            .build()
            .unwrap();

        assert_eq!(owner_of(&machine, "a", "x"), "main");
        assert_eq!(owner_of(&machine, "x", "a"), "main");
        assert_eq!(owner_of(&machine, "s", "y"), "inner");
        assert_eq!(owner_of(&machine, "x", "x"), "inner");
        assert_eq!(owner_of(&machine, "s", "x"), "main");
        assert_eq!(owner_of(&machine, "si", "x"), "inner");
    }

    #[test]
    fn local_transition_in_orthogonal_source_uses_target_branch() {
        let machine = StateMachineBuilder::<()>::new("m")
            .region("main", |r| {
                r.state("p", |s| {
                    s.region("left", |r| r.simple("l1"))
                        .region("right", |r| r.simple("r1").simple("r2"))
                })
            })
            .transition("p", "r2", |t| t.on("go").local())
            .build()
            .unwrap();

        assert_eq!(owner_of(&machine, "p", "r2"), "right");
    }

    #[test]
    fn unsupported_transition_shapes_are_rejected() {
        let result = StateMachineBuilder::<()>::new("m")
            .region("main", |r| r.simple("a").simple("b"))
            .transition("a", "b", |t| t.on("x").local())
            .transition("a", "b", |t| t.on("y").internal())
            .build();

        let errors = result.unwrap_err();
        assert!(errors.contains(|e| matches!(e, BuildError::UnsupportedLocal { .. })));
        assert!(errors.contains(|e| matches!(e, BuildError::UnsupportedInternal { .. })));
    }

    #[test]
    fn parallel_top_regions_have_no_common_ancestor() {
        let result = StateMachineBuilder::<()>::new("m")
            .region("left", |r| r.simple("a"))
            .region("right", |r| r.simple("b"))
            .transition("a", "b", |t| t.on("jump"))
            .build();

        assert!(result
            .unwrap_err()
            .contains(|e| matches!(e, BuildError::NoCommonAncestor { .. })));
    }

    #[test]
    fn exit_point_transition_owned_by_inner_region() {
        let machine = StateMachineBuilder::<()>::new("m")
            .region("main", |r| {
                r.state("s", |s| {
                    s.exit_point("out").region("inner", |r| r.simple("x"))
                })
                .simple("after")
            })
            .transition("x", "out", |t| t.on("leave"))
            .transition("out", "after", |t| t)
            .build()
            .unwrap();

        assert_eq!(owner_of(&machine, "x", "out"), "inner");
        assert_eq!(owner_of(&machine, "out", "after"), "main");
        let out = machine.vertex(machine.find_vertex("out").unwrap());
        assert_eq!(out.region(), None);
    }

    #[test]
    fn exit_point_of_orthogonal_state_owned_by_source_region() {
        let machine = StateMachineBuilder::<()>::new("m")
            .region("main", |r| {
                r.state("s", |s| {
                    s.exit_point("out")
                        .region("left", |r| r.simple("x"))
                        .region("right", |r| r.simple("y"))
                })
                .simple("after")
            })
            .transition("x", "out", |t| t.on("left"))
            .transition("y", "out", |t| t.on("right"))
            .transition("out", "after", |t| t)
            .build()
            .unwrap();

        assert_eq!(owner_of(&machine, "x", "out"), "left");
        assert_eq!(owner_of(&machine, "y", "out"), "right");
        assert_eq!(owner_of(&machine, "out", "after"), "main");
    }

    #[test]
    fn submachine_is_inlined_with_prefixed_ids() {
        let door = StateMachineBuilder::<()>::new("door")
            .region("door-main", |r| r.initial("init").simple("closed").simple("open"))
            .exit_point("broken")
            .transition("init", "closed", |t| t)
            .transition("closed", "open", |t| t.on("open"))
            .into_definition();

        let machine = StateMachineBuilder::<()>::new("house")
            .region("main", |r| {
                r.initial("init")
                    .state("front", |s| s.submachine(door.clone()))
                    .state("back", |s| s.submachine(door.clone()))
            })
            .transition("init", "front", |t| t)
            .build()
            .unwrap();

        for prefix in ["front/", "back/"] {
            assert!(machine.find_vertex(&format!("{prefix}open")).is_some());
            assert!(machine.find_region(&format!("{prefix}door-main")).is_some());
        }

        let front = machine.find_vertex("front").unwrap();
        let data = machine.vertex(front).state().unwrap();
        assert_eq!(data.submachine(), Some("door"));
        assert_eq!(data.regions().len(), 1);
        assert_eq!(data.connection_points().len(), 1);
        assert!(machine.meta().has_submachine_states);
        assert_eq!(owner_of(&machine, "back/closed", "back/open"), "back/door-main");
        assert_eq!(
            machine
                .transitions()
                .filter(|t| t.kind() == TransitionKind::External)
                .count(),
            5
        );
    }
}
