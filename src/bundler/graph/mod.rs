//! Build dependency graph.
//!
//! Targets are nodes; an edge `A -> B` exists when one of `B`'s declared
//! inputs is `A`'s output (or lies inside it). Ordering edges added with
//! [`BuildGraph::order_after`] only sequence targets that are both selected;
//! they neither pull targets into a run nor propagate staleness.
//!
//! Evaluation walks the graph in topological order, asks the
//! [`StalenessChecker`] about each target and hands stale ones to a
//! [`StageRunner`]. Among targets that are ready at the same time, the one
//! declared first runs first. The graph knows nothing about the tools a stage
//! invokes.
//!
//! # Example
//!
//! ```no_run
//! use kodegen_bundler_pipeline::bundler::graph::{
//!     BuildGraph, Input, StageRunner, StalenessChecker, StalenessPolicy, Target,
//! };
//!
//! struct Touch;
//!
//! impl StageRunner<&'static str> for Touch {
//!     async fn run_stage(
//!         &mut self,
//!         target: &Target<&'static str>,
//!     ) -> kodegen_bundler_pipeline::bundler::Result<()> {
//!         tokio::fs::write(target.output(), b"").await?;
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> kodegen_bundler_pipeline::bundler::Result<()> {
//! let mut graph = BuildGraph::new();
//! graph.add_target(Target::new("gen", "gen.py", vec![Input::file("manifest.qrc")]))?;
//! graph.add_target(Target::new("pkg", "pkg.tar.gz", vec![Input::file("gen.py")]))?;
//!
//! let mut checker = StalenessChecker::new(StalenessPolicy::Mtime, "state.json").await?;
//! let report = graph.run(&["pkg"], &mut checker, &mut Touch).await?;
//! println!("built: {:?}", report.built());
//! # Ok(())
//! # }
//! ```

mod staleness;
mod state;

pub use staleness::{Freshness, StaleReason, StalenessChecker, StalenessPolicy};
pub(crate) use staleness::set_modified;
pub use state::{BuildState, TargetRecord};

use crate::bundler::error::{Context, Error, Result};
use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, HashSet},
    fmt,
    future::Future,
    hash::Hash,
    path::{Path, PathBuf},
};

/// A declared input of a target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// A single file or directory that must exist when the target runs.
    File(PathBuf),
    /// A glob pattern; matching nothing is allowed.
    Glob(String),
}

impl Input {
    /// A file input.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Input::File(path.into())
    }

    /// A glob input.
    pub fn glob(pattern: impl Into<String>) -> Self {
        Input::Glob(pattern.into())
    }
}

/// A build target: inputs, a single output and a key naming its stage.
#[derive(Clone, Debug)]
pub struct Target<K> {
    key: K,
    output: PathBuf,
    inputs: Vec<Input>,
}

impl<K> Target<K> {
    /// Creates a target.
    pub fn new(key: K, output: impl Into<PathBuf>, inputs: Vec<Input>) -> Self {
        Self {
            key,
            output: output.into(),
            inputs,
        }
    }

    /// Stage key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Declared output path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Declared inputs.
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// Expands glob inputs into the paths they currently match.
    ///
    /// The result is sorted and deduplicated; file inputs are kept even if
    /// they do not exist.
    pub fn resolve_inputs(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for input in &self.inputs {
            match input {
                Input::File(path) => paths.push(path.clone()),
                Input::Glob(pattern) => {
                    for entry in glob::glob(pattern)? {
                        match entry {
                            Ok(path) if path != self.output => paths.push(path),
                            Ok(_) => {}
                            Err(e) => log::warn!("Skipping unreadable input: {}", e),
                        }
                    }
                }
            }
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    fn depends_on_output(&self, output: &Path) -> bool {
        self.inputs.iter().any(|input| match input {
            Input::File(path) => path.starts_with(output),
            Input::Glob(_) => false,
        })
    }
}

/// Executes one stale target.
///
/// Implementations must produce [`Target::output`] on success and must not
/// leave a partial output behind on failure.
pub trait StageRunner<K> {
    /// Runs the stage producing `target`.
    fn run_stage(&mut self, target: &Target<K>) -> impl Future<Output = Result<()>>;
}

/// What happened to one target during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The stage ran.
    Built(StaleReason),
    /// The output was up to date; no tool was invoked.
    UpToDate,
}

/// Per-target outcomes of a run, in execution order.
#[derive(Clone, Debug)]
pub struct BuildReport<K> {
    outcomes: Vec<(K, Outcome)>,
}

impl<K: Copy> BuildReport<K> {
    /// All outcomes in execution order.
    pub fn outcomes(&self) -> &[(K, Outcome)] {
        &self.outcomes
    }

    /// Keys of the targets whose stage ran.
    pub fn built(&self) -> Vec<K> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Outcome::Built(_)))
            .map(|(k, _)| *k)
            .collect()
    }

    /// Keys of the targets that were skipped.
    pub fn skipped(&self) -> Vec<K> {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == Outcome::UpToDate)
            .map(|(k, _)| *k)
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Edge {
    /// The dependant reads the dependency's output.
    Data,
    /// Sequencing only.
    Order,
}

/// Directed acyclic graph of build targets.
#[derive(Debug)]
pub struct BuildGraph<K> {
    graph: DiGraph<Target<K>, Edge>,
    index: HashMap<K, NodeIndex>,
}

impl<K> Default for BuildGraph<K> {
    fn default() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }
}

impl<K> BuildGraph<K>
where
    K: Copy + Eq + Hash + fmt::Display,
{
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target and connects it to existing targets by output/input paths.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the key or output is already declared.
    pub fn add_target(&mut self, target: Target<K>) -> Result<()> {
        if self.index.contains_key(target.key()) {
            return Err(Error::Config(format!(
                "target `{}` declared twice",
                target.key()
            )));
        }
        if let Some(other) = self
            .graph
            .node_weights()
            .find(|t| t.output() == target.output())
        {
            return Err(Error::Config(format!(
                "targets `{}` and `{}` both produce {}",
                other.key(),
                target.key(),
                target.output().display()
            )));
        }

        let key = *target.key();
        let node = self.graph.add_node(target);
        self.index.insert(key, node);

        let others: Vec<NodeIndex> = self.graph.node_indices().filter(|&n| n != node).collect();
        for other in others {
            if self.graph[node].depends_on_output(self.graph[other].output()) {
                self.graph.update_edge(other, node, Edge::Data);
            }
            if self.graph[other].depends_on_output(self.graph[node].output()) {
                self.graph.update_edge(node, other, Edge::Data);
            }
        }
        Ok(())
    }

    /// Makes `after` run later than `before` whenever a run selects both.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when either key is undeclared.
    pub fn order_after(&mut self, before: K, after: K) -> Result<()> {
        let from = self.node(before)?;
        let to = self.node(after)?;
        if from != to && self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, Edge::Order);
        }
        Ok(())
    }

    fn node(&self, key: K) -> Result<NodeIndex> {
        self.index
            .get(&key)
            .copied()
            .ok_or_else(|| Error::Config(format!("unknown target `{key}`")))
    }

    /// Looks up a target.
    pub fn target(&self, key: K) -> Option<&Target<K>> {
        self.index.get(&key).map(|&n| &self.graph[n])
    }

    /// Declared keys, in insertion order.
    pub fn keys(&self) -> Vec<K> {
        self.graph.node_weights().map(|t| *t.key()).collect()
    }

    /// Direct dependencies of `key`.
    pub fn dependencies(&self, key: K) -> Vec<K> {
        self.neighbors(key, Direction::Incoming)
    }

    /// Direct dependants of `key`.
    pub fn dependents(&self, key: K) -> Vec<K> {
        self.neighbors(key, Direction::Outgoing)
    }

    fn neighbors(&self, key: K, direction: Direction) -> Vec<K> {
        let Some(&node) = self.index.get(&key) else {
            return Vec::new();
        };
        let mut keys: Vec<K> = self
            .graph
            .edges_directed(node, direction)
            .filter(|e| *e.weight() == Edge::Data)
            .map(|e| {
                let other = if direction == Direction::Incoming {
                    e.source()
                } else {
                    e.target()
                };
                *self.graph[other].key()
            })
            .collect();
        keys.reverse();
        keys
    }

    /// Topological order of `requested` and everything they depend on.
    ///
    /// An empty `requested` selects every target. The order is stable: of
    /// the targets whose dependencies are done, the earliest declared is next.
    pub fn execution_order(&self, requested: &[K]) -> Result<Vec<K>> {
        let selected: HashSet<NodeIndex> = if requested.is_empty() {
            self.graph.node_indices().collect()
        } else {
            let mut selected = HashSet::new();
            let mut stack = Vec::new();
            for key in requested {
                let start = *self
                    .index
                    .get(key)
                    .with_context(|| format!("unknown target `{key}`"))?;
                stack.push(start);
            }
            while let Some(node) = stack.pop() {
                if !selected.insert(node) {
                    continue;
                }
                stack.extend(
                    self.graph
                        .edges_directed(node, Direction::Incoming)
                        .filter(|e| *e.weight() == Edge::Data)
                        .map(|e| e.source()),
                );
            }
            selected
        };

        let mut pending: HashMap<NodeIndex, usize> = selected
            .iter()
            .map(|&node| {
                let waiting = self
                    .graph
                    .neighbors_directed(node, Direction::Incoming)
                    .filter(|n| selected.contains(n))
                    .count();
                (node, waiting)
            })
            .collect();
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = pending
            .iter()
            .filter(|(_, waiting)| **waiting == 0)
            .map(|(&node, _)| Reverse(node))
            .collect();

        let mut order = Vec::with_capacity(selected.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(*self.graph[node].key());
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(waiting) = pending.get_mut(&next) {
                    *waiting -= 1;
                    if *waiting == 0 {
                        ready.push(Reverse(next));
                    }
                }
            }
        }

        if order.len() < selected.len() {
            let stuck = pending
                .iter()
                .filter(|(_, waiting)| **waiting > 0)
                .map(|(&node, _)| node)
                .min()
                .unwrap_or_default();
            return Err(Error::Config(format!(
                "dependency cycle through target `{}`",
                self.graph[stuck].key()
            )));
        }
        Ok(order)
    }

    /// Predicts which targets a run would rebuild, without running anything.
    pub async fn plan(
        &self,
        requested: &[K],
        checker: &StalenessChecker,
    ) -> Result<Vec<(K, Freshness)>> {
        let mut plan: Vec<(K, Freshness)> = Vec::new();
        for key in self.execution_order(requested)? {
            let target = &self.graph[self.index[&key]];
            let mut freshness = checker.check(target).await?;
            if !freshness.is_stale() {
                let upstream = self.dependencies(key).into_iter().find(|dep| {
                    plan.iter()
                        .any(|(k, f)| k == dep && f.is_stale())
                });
                if let Some(dep) = upstream {
                    freshness = Freshness::Stale(StaleReason::Upstream(dep.to_string()));
                }
            }
            plan.push((key, freshness));
        }
        Ok(plan)
    }

    /// Brings `requested` (or every target) up to date.
    ///
    /// Targets run one at a time in topological order. The first failing
    /// stage aborts the run; its error carries the target name.
    pub async fn run<R: StageRunner<K>>(
        &self,
        requested: &[K],
        checker: &mut StalenessChecker,
        runner: &mut R,
    ) -> Result<BuildReport<K>> {
        let mut outcomes = Vec::new();

        for key in self.execution_order(requested)? {
            let target = &self.graph[self.index[&key]];

            let reason = match checker.check(target).await? {
                Freshness::UpToDate => {
                    log::debug!("`{}` is up to date", key);
                    outcomes.push((key, Outcome::UpToDate));
                    continue;
                }
                Freshness::Stale(reason) => reason,
            };

            for input in target.inputs() {
                if let Input::File(path) = input {
                    if tokio::fs::symlink_metadata(path).await.is_err() {
                        return Err(Error::MissingInput {
                            path: path.clone(),
                            reason: format!("declared input of target `{key}`"),
                        });
                    }
                }
            }

            log::info!("Building `{}` ({})", key, reason);
            runner
                .run_stage(target)
                .await
                .with_context(|| format!("target `{key}` failed"))?;

            if tokio::fs::symlink_metadata(target.output()).await.is_err() {
                return Err(Error::GenericError(format!(
                    "stage for `{}` reported success but {} does not exist",
                    key,
                    target.output().display()
                )));
            }

            checker.record(target).await?;
            log::info!("✓ Built `{}`", key);
            outcomes.push((key, Outcome::Built(reason)));
        }

        Ok(BuildReport { outcomes })
    }
}
