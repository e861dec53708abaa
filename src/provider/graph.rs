//! The provider graph: stage nodes, their lifecycle, and dependency-first sequencing.
//!
//! Nodes are added in construction order and addressed through typed [`Node`] handles, so
//! reading a stage's outputs is a checked downcast rather than a lookup by name. Every node
//! moves monotonically through [`NodeState`]; [`ProviderGraph::reach`] drives a node and its
//! dependencies to a requested state, setting up and installing dependencies first.

use crate::cache::CacheKey;
use crate::core::{LoomError, StageFailure, StagePhase};
use crate::fetch::etag_path;
use crate::provider::context::{Environment, StageContext};
use crate::utils::fs::remove_path;
use anyhow::{Context, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use tracing::{debug, info};

/// Upcast to [`Any`] for typed access to boxed providers.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One stage of the pipeline.
///
/// `setup` computes cache keys and output paths and must stay cheap. `install` produces the
/// outputs; it is skipped in favour of `load` when [`is_cached`](Provider::is_cached) reports
/// that every output already exists.
pub trait Provider: AsAny {
    /// Stage name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Whether this stage's outputs depend on project-local inputs.
    fn needs_isolation(&self, _env: &Environment) -> Result<bool> {
        Ok(false)
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()>;

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()>;

    /// Restore in-memory state from existing outputs after a cache hit.
    fn load(&mut self, _ctx: &StageContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Files this stage writes, known after setup.
    fn outputs(&self) -> Vec<PathBuf>;

    fn is_cached(&self) -> bool {
        let outputs = self.outputs();
        !outputs.is_empty() && outputs.iter().all(|path| path.exists())
    }

    /// Key identifying this stage's outputs, known after setup.
    fn cache_key(&self) -> Option<&CacheKey> {
        None
    }
}

/// Lifecycle state of a node. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeState {
    Uninitialized,
    SetUp,
    Installed,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::SetUp => "set up",
            Self::Installed => "installed",
        })
    }
}

/// Untyped node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Typed handle to a node holding a `P`.
pub struct Node<P> {
    id: NodeId,
    marker: PhantomData<fn() -> P>,
}

impl<P> Node<P> {
    pub const fn id(self) -> NodeId {
        self.id
    }
}

impl<P> Clone for Node<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Node<P> {}

impl<P> fmt::Debug for Node<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.id.0)
    }
}

impl<P> From<Node<P>> for NodeId {
    fn from(node: Node<P>) -> Self {
        node.id
    }
}

struct Slot {
    name: &'static str,
    provider: RefCell<Box<dyn Provider>>,
    dependencies: Vec<NodeId>,
    state: Cell<NodeState>,
    visiting: Cell<bool>,
    marking: Cell<bool>,
    projectmapped: Cell<Option<bool>>,
}

/// The stage graph of one build
///
/// Owns the [`Environment`] shared by every stage. Nodes live for a single invocation; only
/// the files they write persist.
pub struct ProviderGraph {
    env: Environment,
    slots: Vec<Slot>,
}

impl ProviderGraph {
    pub fn new(env: Environment) -> Self {
        Self { env, slots: Vec::new() }
    }

    pub const fn env(&self) -> &Environment {
        &self.env
    }

    /// Add a stage depending on `dependencies`, in order.
    pub fn add<P: Provider>(
        &mut self,
        provider: P,
        dependencies: impl IntoIterator<Item = NodeId>,
    ) -> Node<P> {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            name: provider.name(),
            provider: RefCell::new(Box::new(provider)),
            dependencies: dependencies.into_iter().collect(),
            state: Cell::new(NodeState::Uninitialized),
            visiting: Cell::new(false),
            marking: Cell::new(false),
            projectmapped: Cell::new(None),
        });
        Node { id, marker: PhantomData }
    }

    /// Add an edge after construction.
    pub fn add_dependency(&mut self, node: impl Into<NodeId>, dependency: impl Into<NodeId>) -> Result<()> {
        let dependency = dependency.into();
        self.slot(dependency)?;
        let index = self.index(node.into())?;
        self.slots[index].dependencies.push(dependency);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.slots.len()).map(NodeId)
    }

    pub fn name(&self, node: impl Into<NodeId>) -> Result<&'static str> {
        Ok(self.slot(node.into())?.name)
    }

    pub fn state(&self, node: impl Into<NodeId>) -> Result<NodeState> {
        Ok(self.slot(node.into())?.state.get())
    }

    pub fn dependencies(&self, node: impl Into<NodeId>) -> Result<&[NodeId]> {
        Ok(&self.slot(node.into())?.dependencies)
    }

    /// Output files of a node that is at least set up.
    pub fn outputs(&self, node: impl Into<NodeId>) -> Result<Vec<PathBuf>> {
        let slot = self.slot(node.into())?;
        if slot.state.get() < NodeState::SetUp {
            return Ok(Vec::new());
        }
        Ok(slot.provider.borrow().outputs())
    }

    /// Drive `node` to `target`, reaching the same state in every dependency first.
    ///
    /// Re-entrant and monotonic: nodes already at or past `target` are left alone, and a
    /// failure leaves the failing node in its previous state. Reaching a node that is still
    /// resolving its own dependencies is a [`LoomError::CycleDetected`].
    pub fn reach(&self, node: impl Into<NodeId>, target: NodeState) -> Result<()> {
        let node = node.into();
        let slot = self.slot(node)?;
        if slot.state.get() >= target {
            return Ok(());
        }
        if slot.visiting.replace(true) {
            return Err(LoomError::CycleDetected {
                stage: slot.name.to_string(),
            }
            .into());
        }
        let result = self.advance(node, slot, target);
        slot.visiting.set(false);
        result
    }

    /// Reach [`NodeState::Installed`] for every node, in construction order.
    pub fn install_all(&self) -> Result<()> {
        for node in self.nodes() {
            self.reach(node, NodeState::Installed)?;
        }
        Ok(())
    }

    fn advance(&self, node: NodeId, slot: &Slot, target: NodeState) -> Result<()> {
        for dependency in &slot.dependencies {
            self.reach(*dependency, target)?;
        }

        let ctx = StageContext::new(self, node);
        if slot.state.get() < NodeState::SetUp {
            let failure = StageFailure {
                stage: slot.name,
                phase: StagePhase::Setup,
            };
            self.is_projectmapped(node).context(failure.clone())?;
            debug!("Setting up stage {}", slot.name);
            let mut provider = slot.provider.borrow_mut();
            provider.setup(&ctx).context(failure.clone())?;
            if self.env.settings.refresh_dependencies {
                for output in provider.outputs() {
                    if remove_path(&output).context(failure.clone())? {
                        debug!("Refreshing {}: removed {}", slot.name, output.display());
                    }
                    remove_path(&etag_path(&output)).context(failure.clone())?;
                }
            }
            slot.state.set(NodeState::SetUp);
        }

        if target == NodeState::Installed && slot.state.get() < NodeState::Installed {
            let failure = StageFailure {
                stage: slot.name,
                phase: StagePhase::Install,
            };
            let mut provider = slot.provider.borrow_mut();
            if provider.is_cached() {
                debug!("Stage {} is up to date", slot.name);
                provider.load(&ctx).context(failure)?;
            } else {
                info!("Installing stage {}", slot.name);
                provider.install(&ctx).context(failure)?;
            }
            slot.state.set(NodeState::Installed);
        }
        Ok(())
    }

    /// Whether `node` or anything it transitively depends on needs project isolation.
    pub fn is_projectmapped(&self, node: impl Into<NodeId>) -> Result<bool> {
        let slot = self.slot(node.into())?;
        if let Some(known) = slot.projectmapped.get() {
            return Ok(known);
        }
        if slot.marking.replace(true) {
            return Err(LoomError::CycleDetected {
                stage: slot.name.to_string(),
            }
            .into());
        }
        let result = self.compute_projectmapped(slot);
        slot.marking.set(false);
        let projectmapped = result?;
        slot.projectmapped.set(Some(projectmapped));
        Ok(projectmapped)
    }

    fn compute_projectmapped(&self, slot: &Slot) -> Result<bool> {
        let mut projectmapped = slot.provider.borrow().needs_isolation(&self.env)?;
        for dependency in &slot.dependencies {
            projectmapped |= self.is_projectmapped(*dependency)?;
        }
        Ok(projectmapped)
    }

    /// Reach [`NodeState::Installed`] for `node`, failing if it still falls short.
    pub fn assert_installed(&self, node: impl Into<NodeId>) -> Result<()> {
        let node = node.into();
        self.reach(node, NodeState::Installed)?;
        self.ensure_installed(node)
    }

    fn ensure_installed(&self, node: NodeId) -> Result<()> {
        let slot = self.slot(node)?;
        if slot.state.get() < NodeState::Installed {
            return Err(LoomError::StageNotInstalled {
                stage: slot.name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Borrow an installed stage.
    pub fn get<P: Provider>(&self, node: Node<P>) -> Result<Ref<'_, P>> {
        self.ensure_installed(node.id)?;
        self.borrow(node)
    }

    pub(crate) fn borrow<P: Provider>(&self, node: Node<P>) -> Result<Ref<'_, P>> {
        let slot = self.slot(node.id)?;
        let provider = slot
            .provider
            .try_borrow()
            .with_context(|| format!("Stage '{}' is busy", slot.name))?;
        Ref::filter_map(provider, |boxed| downcast::<P>(&**boxed))
            .map_err(|_| anyhow::anyhow!("Node handle does not match stage '{}'", slot.name))
    }

    pub(crate) fn cache_key(&self, node: NodeId) -> Result<Option<CacheKey>> {
        let slot = self.slot(node)?;
        if slot.state.get() < NodeState::SetUp {
            return Err(LoomError::StageNotInstalled {
                stage: slot.name.to_string(),
            }
            .into());
        }
        let provider = slot
            .provider
            .try_borrow()
            .with_context(|| format!("Stage '{}' is busy", slot.name))?;
        Ok(provider.cache_key().cloned())
    }

    /// Nodes ordered so that every dependency precedes its dependents.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
        let indices: Vec<NodeIndex> = self.nodes().map(|id| graph.add_node(id)).collect();
        for (index, slot) in self.slots.iter().enumerate() {
            for dependency in &slot.dependencies {
                graph.add_edge(indices[dependency.0], indices[index], ());
            }
        }
        toposort(&graph, None)
            .map(|order| order.into_iter().map(|index| graph[index]).collect())
            .map_err(|cycle| {
                LoomError::CycleDetected {
                    stage: self.slots[graph[cycle.node_id()].0].name.to_string(),
                }
                .into()
            })
    }

    fn index(&self, node: NodeId) -> Result<usize> {
        if node.0 < self.slots.len() {
            Ok(node.0)
        } else {
            Err(anyhow::anyhow!("Unknown node {}", node.0))
        }
    }

    fn slot(&self, node: NodeId) -> Result<&Slot> {
        Ok(&self.slots[self.index(node)?])
    }
}

fn downcast<P: Provider>(provider: &dyn Provider) -> Option<&P> {
    provider.as_any().downcast_ref::<P>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CountingTransport, test_environment};
    use std::rc::Rc;
    use tempfile::TempDir;

    type Log = Rc<RefCell<Vec<String>>>;

    #[derive(Debug)]
    struct Recording {
        name: &'static str,
        isolated: bool,
        fail_install: bool,
        output: Option<PathBuf>,
        log: Log,
        reads: Vec<Node<Recording>>,
    }

    impl Recording {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                isolated: false,
                fail_install: false,
                output: None,
                log: Rc::clone(log),
                reads: Vec::new(),
            }
        }
    }

    impl Provider for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn needs_isolation(&self, _env: &Environment) -> Result<bool> {
            Ok(self.isolated)
        }

        fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
            self.log.borrow_mut().push(format!("setup {}", self.name));
            let key = CacheKey::new().with("stage", self.name);
            self.output = Some(ctx.output_path(&key, &format!("{}-{{hash}}.txt", self.name))?);
            Ok(())
        }

        fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
            self.log.borrow_mut().push(format!("install {}", self.name));
            for node in &self.reads {
                ctx.dependency(*node)?;
            }
            if self.fail_install {
                anyhow::bail!("boom");
            }
            if let Some(output) = &self.output {
                std::fs::write(output, self.name)?;
            }
            Ok(())
        }

        fn load(&mut self, _ctx: &StageContext<'_>) -> Result<()> {
            self.log.borrow_mut().push(format!("load {}", self.name));
            Ok(())
        }

        fn outputs(&self) -> Vec<PathBuf> {
            self.output.iter().cloned().collect()
        }
    }

    fn graph(temp: &TempDir) -> ProviderGraph {
        ProviderGraph::new(test_environment(temp.path(), "", CountingTransport::new()).unwrap())
    }

    #[test]
    fn test_dependencies_install_first() {
        let temp = TempDir::new().unwrap();
        let log = Log::default();
        let mut graph = graph(&temp);
        let a = graph.add(Recording::new("a", &log), []);
        let b = graph.add(Recording::new("b", &log), [a.id()]);
        let c = graph.add(Recording::new("c", &log), [a.id(), b.id()]);

        graph.reach(b, NodeState::SetUp).unwrap();
        assert_eq!(graph.state(a).unwrap(), NodeState::SetUp);
        assert_eq!(graph.state(c).unwrap(), NodeState::Uninitialized);

        graph.reach(c, NodeState::Installed).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["setup a", "setup b", "install a", "install b", "setup c", "install c"]
        );

        // Monotonic: reaching a lower state changes nothing.
        graph.reach(c, NodeState::SetUp).unwrap();
        assert_eq!(graph.state(c).unwrap(), NodeState::Installed);
        assert_eq!(
            graph.topological_order().unwrap(),
            vec![a.id(), b.id(), c.id()]
        );
    }

    #[test]
    fn test_second_build_loads_from_cache() {
        let temp = TempDir::new().unwrap();
        let log = Log::default();
        for _ in 0..2 {
            let mut graph = graph(&temp);
            let a = graph.add(Recording::new("a", &log), []);
            graph.reach(a, NodeState::Installed).unwrap();
        }
        assert_eq!(*log.borrow(), vec!["setup a", "install a", "setup a", "load a"]);
    }

    #[test]
    fn test_projectmapping_propagates_downstream() {
        let temp = TempDir::new().unwrap();
        let log = Log::default();
        let mut graph = graph(&temp);
        let global = graph.add(Recording::new("global", &log), []);
        let mut isolated = Recording::new("isolated", &log);
        isolated.isolated = true;
        let isolated = graph.add(isolated, [global.id()]);
        let downstream = graph.add(Recording::new("downstream", &log), [isolated.id()]);

        assert!(!graph.is_projectmapped(global).unwrap());
        assert!(graph.is_projectmapped(isolated).unwrap());
        assert!(graph.is_projectmapped(downstream).unwrap());

        graph.reach(downstream, NodeState::Installed).unwrap();
        let project_root = graph.env().cache.project_root().to_path_buf();
        assert!(graph.outputs(downstream).unwrap()[0].starts_with(&project_root));
        assert!(!graph.outputs(global).unwrap()[0].starts_with(&project_root));
    }

    #[test]
    fn test_cycle_is_attributed() {
        let temp = TempDir::new().unwrap();
        let log = Log::default();
        let mut graph = graph(&temp);
        let a = graph.add(Recording::new("a", &log), []);
        let b = graph.add(Recording::new("b", &log), [a.id()]);
        graph.add_dependency(a, b).unwrap();

        let err = graph.reach(b, NodeState::Installed).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoomError>(),
            Some(LoomError::CycleDetected { stage }) if stage == "b"
        ));
        assert!(graph.topological_order().is_err());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_failed_install_is_not_installed() {
        let temp = TempDir::new().unwrap();
        let log = Log::default();
        let mut graph = graph(&temp);
        let mut failing = Recording::new("failing", &log);
        failing.fail_install = true;
        let failing = graph.add(failing, []);

        let err = graph.reach(failing, NodeState::Installed).unwrap_err();
        let failure = err.downcast_ref::<StageFailure>().unwrap();
        assert_eq!(failure.stage, "failing");
        assert_eq!(failure.phase, StagePhase::Install);
        assert_eq!(graph.state(failing).unwrap(), NodeState::SetUp);

        let err = graph.get(failing).unwrap_err();
        assert!(matches!(err.downcast_ref::<LoomError>(), Some(LoomError::StageNotInstalled { .. })));
    }

    #[test]
    fn test_assert_installed_drives_the_node() {
        let temp = TempDir::new().unwrap();
        let log = Log::default();
        let mut graph = graph(&temp);
        let a = graph.add(Recording::new("a", &log), []);
        let b = graph.add(Recording::new("b", &log), [a.id()]);

        assert!(graph.get(b).is_err());
        graph.assert_installed(b).unwrap();
        assert_eq!(graph.state(a).unwrap(), NodeState::Installed);
        assert_eq!(graph.state(b).unwrap(), NodeState::Installed);
        assert!(graph.get(b).is_ok());

        let mut failing = Recording::new("failing", &log);
        failing.fail_install = true;
        let failing = graph.add(failing, []);
        assert!(graph.assert_installed(failing).is_err());
        assert_eq!(graph.state(failing).unwrap(), NodeState::SetUp);
    }

    #[test]
    fn test_undeclared_dependency_is_rejected() {
        let temp = TempDir::new().unwrap();
        let log = Log::default();
        let mut graph = graph(&temp);
        let a = graph.add(Recording::new("a", &log), []);
        let mut reader = Recording::new("reader", &log);
        reader.reads.push(a);
        let reader = graph.add(reader, []);
        graph.reach(a, NodeState::Installed).unwrap();

        let err = graph.reach(reader, NodeState::Installed).unwrap_err();
        assert!(matches!(
            find_error(&err),
            Some(LoomError::UndeclaredDependency { stage, dependency }) if stage == "reader" && dependency == "a"
        ));
    }

    #[test]
    fn test_refresh_removes_outputs_at_setup() {
        let temp = TempDir::new().unwrap();
        let log = Log::default();
        {
            let mut graph = graph(&temp);
            let a = graph.add(Recording::new("a", &log), []);
            graph.reach(a, NodeState::Installed).unwrap();
        }
        let env = test_environment(temp.path(), "refresh_dependencies = true", CountingTransport::new()).unwrap();
        let mut graph = ProviderGraph::new(env);
        let a = graph.add(Recording::new("a", &log), []);
        graph.reach(a, NodeState::Installed).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["setup a", "install a", "setup a", "install a"]
        );
    }

    fn find_error(err: &anyhow::Error) -> Option<&LoomError> {
        crate::core::find_loom_error(err)
    }
}
