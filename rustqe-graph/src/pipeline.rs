//! Planning and execution of quantity requests.

use crate::error::{GraphError, Result};
use crate::provider::{downcast, InputSpec, Inputs, Provider, Value};
use crate::quantity::{NodeKey, Quantity};
use rayon::prelude::*;
use rustqe_core::context::{Axis, AxisValue, BankId, Context, MonitorId, RunKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Tags available for each context axis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Domains {
    pub runs: Vec<RunKind>,
    pub monitors: Vec<MonitorId>,
    pub banks: Vec<BankId>,
}

impl Domains {
    /// Tags of one axis, in insertion order.
    #[must_use]
    pub fn values(&self, axis: Axis) -> Vec<AxisValue> {
        match axis {
            Axis::Run => self.runs.iter().copied().map(AxisValue::Run).collect(),
            Axis::Monitor => self
                .monitors
                .iter()
                .copied()
                .map(AxisValue::Monitor)
                .collect(),
            Axis::Bank => self.banks.iter().copied().map(AxisValue::Bank).collect(),
        }
    }
}

/// A provider instantiation scheduled by a [`Plan`].
#[derive(Debug, Clone)]
struct PlannedNode {
    key: NodeKey,
    /// Dependency keys per declared input.
    dependencies: Vec<Vec<NodeKey>>,
    reduced: Vec<bool>,
}

/// Evaluation order for one or more requested nodes.
///
/// Nodes in the same level are independent of each other; every node's
/// inputs live in earlier levels or are parameters.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    targets: Vec<NodeKey>,
    parameters: Vec<NodeKey>,
    levels: Vec<Vec<PlannedNode>>,
}

impl Plan {
    /// Requested nodes.
    #[must_use]
    pub fn targets(&self) -> &[NodeKey] {
        &self.targets
    }

    /// Parameter nodes the plan reads.
    #[must_use]
    pub fn parameters(&self) -> &[NodeKey] {
        &self.parameters
    }

    /// Provider nodes grouped by level, in execution order.
    #[must_use]
    pub fn levels(&self) -> Vec<Vec<NodeKey>> {
        self.levels
            .iter()
            .map(|level| level.iter().map(|node| node.key).collect())
            .collect()
    }

    /// Number of provider invocations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Registry of providers and parameters plus the context domains.
#[derive(Debug, Default)]
pub struct Pipeline {
    providers: HashMap<&'static str, Provider>,
    params: HashMap<NodeKey, Value>,
    domains: Domains,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider, returning the one it replaces.
    pub fn insert(&mut self, provider: Provider) -> Option<Provider> {
        let replaced = self.providers.insert(provider.output, provider);
        if let Some(old) = &replaced {
            log::debug!("replaced provider for `{}`", old.output_name());
        }
        replaced
    }

    /// Sets a parameter shared by every context of `Q`.
    pub fn set_param<Q: Quantity>(&mut self, value: Q::Value) {
        self.params
            .insert(NodeKey::of::<Q>(Context::GLOBAL), Arc::new(value));
    }

    /// Sets a parameter for one context of `Q`.
    ///
    /// Context-specific parameters take precedence over shared ones.
    pub fn set_param_for<Q: Quantity>(&mut self, context: Context, value: Q::Value) {
        self.params
            .insert(NodeKey::of::<Q>(context), Arc::new(value));
    }

    pub fn set_runs(&mut self, runs: impl IntoIterator<Item = RunKind>) {
        self.domains.runs = runs.into_iter().collect();
    }

    pub fn set_monitors(&mut self, monitors: impl IntoIterator<Item = MonitorId>) {
        self.domains.monitors = monitors.into_iter().collect();
    }

    pub fn set_banks(&mut self, banks: impl IntoIterator<Item = BankId>) {
        self.domains.banks = banks.into_iter().collect();
    }

    #[must_use]
    pub fn domains(&self) -> &Domains {
        &self.domains
    }

    /// Plans the computation of `Q` at `context` without running it.
    ///
    /// # Errors
    /// Returns a configuration error for unbound axes, missing providers,
    /// cycles, or empty reduction domains.
    pub fn plan<Q: Quantity>(&self, context: Context) -> Result<Plan> {
        self.plan_keys(&[target_key::<Q>(context)?])
    }

    /// Computes `Q` at `context`.
    ///
    /// # Errors
    /// Returns planning errors, or [`GraphError::Computation`] tagged with
    /// the failing node.
    pub fn compute<Q: Quantity>(&self, context: Context) -> Result<Arc<Q::Value>> {
        let mut values = self.compute_many::<Q>(&[context])?;
        values.pop().ok_or(GraphError::MissingProvider {
            node: NodeKey::of::<Q>(context),
            path: Vec::new(),
        })
    }

    /// Computes a quantity without context axes.
    ///
    /// # Errors
    /// See [`Pipeline::compute`].
    pub fn compute_global<Q: Quantity>(&self) -> Result<Arc<Q::Value>> {
        self.compute::<Q>(Context::GLOBAL)
    }

    /// Computes `Q` at several contexts, sharing intermediate nodes.
    ///
    /// # Errors
    /// See [`Pipeline::compute`].
    pub fn compute_many<Q: Quantity>(&self, contexts: &[Context]) -> Result<Vec<Arc<Q::Value>>> {
        let keys = contexts
            .iter()
            .map(|&context| target_key::<Q>(context))
            .collect::<Result<Vec<_>>>()?;
        let plan = self.plan_keys(&keys)?;
        let values = self.execute(&plan)?;
        keys.into_iter()
            .map(|key| {
                let value = values.get(&key).cloned().ok_or(GraphError::MissingProvider {
                    node: key,
                    path: Vec::new(),
                })?;
                downcast::<Q>(key, value)
            })
            .collect()
    }

    /// Computes `Q` for every context in the domains of its axes.
    ///
    /// # Errors
    /// Returns [`GraphError::EmptyDomain`] if one of `Q`'s axes has no tags,
    /// otherwise see [`Pipeline::compute`].
    pub fn compute_all<Q: Quantity>(&self) -> Result<BTreeMap<Context, Arc<Q::Value>>> {
        let node = NodeKey::of::<Q>(Context::GLOBAL);
        let contexts = self.expand(node, Context::GLOBAL, Q::AXES)?;
        let values = self.compute_many::<Q>(&contexts)?;
        Ok(contexts.into_iter().zip(values).collect())
    }

    fn plan_keys(&self, targets: &[NodeKey]) -> Result<Plan> {
        let mut planner = Planner::new(self);
        for &key in targets {
            planner.visit(key)?;
        }
        let plan = planner.finish(targets);
        log::debug!(
            "planned {} provider calls in {} levels ({} parameters)",
            plan.len(),
            plan.levels.len(),
            plan.parameters.len()
        );
        Ok(plan)
    }

    fn execute(&self, plan: &Plan) -> Result<HashMap<NodeKey, Value>> {
        let mut values: HashMap<NodeKey, Value> = HashMap::new();
        for key in &plan.parameters {
            if let Some(value) = self.param(key) {
                values.insert(*key, Arc::clone(value));
            }
        }

        for level in &plan.levels {
            let computed: Vec<Result<(NodeKey, Value)>> = level
                .par_iter()
                .map(|node| self.run_node(node, &values))
                .collect();
            for result in computed {
                let (key, value) = result?;
                values.insert(key, value);
            }
        }
        Ok(values)
    }

    fn run_node(
        &self,
        node: &PlannedNode,
        values: &HashMap<NodeKey, Value>,
    ) -> Result<(NodeKey, Value)> {
        let provider = self
            .providers
            .get(node.key.quantity)
            .ok_or(GraphError::MissingProvider {
                node: node.key,
                path: Vec::new(),
            })?;
        let inputs = Inputs {
            output: provider.output,
            context: node.key.context,
            inputs: &provider.inputs,
            dependencies: &node.dependencies,
            reduced: &node.reduced,
            values,
        };
        log::trace!("computing `{}`", node.key);
        provider
            .run(&inputs)
            .map(|value| (node.key, value))
            .map_err(|source| GraphError::Computation {
                node: node.key,
                source,
            })
    }

    /// Context-specific parameter first, then the shared one.
    fn param(&self, key: &NodeKey) -> Option<&Value> {
        self.params.get(key).or_else(|| {
            if key.context == Context::GLOBAL {
                None
            } else {
                self.params.get(&NodeKey {
                    quantity: key.quantity,
                    context: Context::GLOBAL,
                })
            }
        })
    }

    /// Extends `base` with every combination of tags on `axes`.
    fn expand(&self, node: NodeKey, base: Context, axes: &[Axis]) -> Result<Vec<Context>> {
        let mut contexts = vec![base];
        for &axis in axes {
            let values = self.domains.values(axis);
            if values.is_empty() {
                return Err(GraphError::EmptyDomain { node, axis });
            }
            contexts = contexts
                .iter()
                .flat_map(|context| values.iter().map(move |&value| context.with(value)))
                .collect();
        }
        Ok(contexts)
    }

    fn dependency_keys(
        &self,
        output: NodeKey,
        output_axes: &[Axis],
        input: &InputSpec,
    ) -> Result<Vec<NodeKey>> {
        let base = output.context.project(&input.threaded_axes(output_axes));
        let contexts = self.expand(output, base, &input.reduced_axes(output_axes))?;
        Ok(contexts
            .into_iter()
            .map(|context| NodeKey {
                quantity: input.quantity,
                context,
            })
            .collect())
    }
}

fn target_key<Q: Quantity>(context: Context) -> Result<NodeKey> {
    if let Some(&axis) = Q::AXES.iter().find(|&&axis| !context.has(axis)) {
        return Err(GraphError::UnboundAxis {
            quantity: Q::NAME,
            axis,
        });
    }
    Ok(NodeKey::of::<Q>(context))
}

#[derive(Debug, Clone, Copy)]
enum Mark {
    Visiting,
    Done(usize),
}

/// Depth-first resolution with a recursion stack for cycle detection.
struct Planner<'p> {
    pipeline: &'p Pipeline,
    marks: HashMap<NodeKey, Mark>,
    stack: Vec<NodeKey>,
    parameters: BTreeSet<NodeKey>,
    nodes: Vec<(usize, PlannedNode)>,
}

impl<'p> Planner<'p> {
    fn new(pipeline: &'p Pipeline) -> Self {
        Self {
            pipeline,
            marks: HashMap::new(),
            stack: Vec::new(),
            parameters: BTreeSet::new(),
            nodes: Vec::new(),
        }
    }

    /// Returns the node's level: 0 for parameters, 1 + max input level
    /// for provider nodes.
    fn visit(&mut self, key: NodeKey) -> Result<usize> {
        match self.marks.get(&key) {
            Some(Mark::Done(level)) => return Ok(*level),
            Some(Mark::Visiting) => {
                let start = self.stack.iter().position(|k| *k == key).unwrap_or(0);
                let mut cycle = self.stack[start..].to_vec();
                cycle.push(key);
                return Err(GraphError::CyclicDependency { cycle });
            }
            None => {}
        }

        let pipeline = self.pipeline;
        if pipeline.param(&key).is_some() {
            self.parameters.insert(key);
            self.marks.insert(key, Mark::Done(0));
            return Ok(0);
        }

        let provider =
            pipeline
                .providers
                .get(key.quantity)
                .ok_or_else(|| GraphError::MissingProvider {
                    node: key,
                    path: self.stack.clone(),
                })?;

        self.marks.insert(key, Mark::Visiting);
        self.stack.push(key);

        let mut level = 0;
        let mut dependencies = Vec::with_capacity(provider.inputs.len());
        let mut reduced = Vec::with_capacity(provider.inputs.len());
        for input in &provider.inputs {
            let keys = pipeline.dependency_keys(key, provider.output_axes, input)?;
            for &dep in &keys {
                level = level.max(self.visit(dep)?);
            }
            reduced.push(!input.reduced_axes(provider.output_axes).is_empty());
            dependencies.push(keys);
        }

        self.stack.pop();
        let level = level + 1;
        self.marks.insert(key, Mark::Done(level));
        self.nodes.push((
            level,
            PlannedNode {
                key,
                dependencies,
                reduced,
            },
        ));
        Ok(level)
    }

    fn finish(self, targets: &[NodeKey]) -> Plan {
        let depth = self.nodes.iter().map(|(level, _)| *level).max().unwrap_or(0);
        let mut levels: Vec<Vec<PlannedNode>> = vec![Vec::new(); depth];
        for (level, node) in self.nodes {
            levels[level - 1].push(node);
        }
        for level in &mut levels {
            level.sort_by_key(|node| node.key);
        }
        Plan {
            targets: targets.to_vec(),
            parameters: self.parameters.into_iter().collect(),
            levels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{quantity, Inputs};

    quantity!(Seed: u64);
    quantity!(Doubled: u64);
    quantity!(PerBank: u64, [Bank]);
    quantity!(Total: u64);
    quantity!(Loop1: u64);
    quantity!(Loop2: u64);

    fn doubled(inputs: &Inputs<'_>) -> Result<u64> {
        Ok(*inputs.get::<Seed>()? * 2)
    }

    #[test]
    fn test_plan_levels_follow_dependencies() {
        let mut pipeline = Pipeline::new();
        pipeline.insert(Provider::output::<Doubled>().input::<Seed>().compute(doubled));
        pipeline.insert(
            Provider::output::<PerBank>()
                .input::<Doubled>()
                .compute(|inputs: &Inputs<'_>| -> Result<u64> {
                    let bank = inputs.context().bank.map_or(0, |b| u64::from(b.0));
                    Ok(*inputs.get::<Doubled>()? + bank)
                }),
        );
        pipeline.insert(
            Provider::output::<Total>()
                .input::<PerBank>()
                .compute(|inputs: &Inputs<'_>| -> Result<u64> {
                    Ok(inputs.all::<PerBank>()?.iter().map(|(_, v)| **v).sum())
                }),
        );
        pipeline.set_param::<Seed>(5);
        pipeline.set_banks([BankId(1), BankId(2)]);

        let plan = pipeline.plan::<Total>(Context::GLOBAL).unwrap();
        let levels = plan.levels();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec![NodeKey::of::<Doubled>(Context::GLOBAL)]);
        assert_eq!(levels[1].len(), 2);
        assert_eq!(levels[2], vec![NodeKey::of::<Total>(Context::GLOBAL)]);
        assert_eq!(plan.parameters(), &[NodeKey::of::<Seed>(Context::GLOBAL)]);
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn test_cycle_reports_path() {
        let mut pipeline = Pipeline::new();
        pipeline.insert(
            Provider::output::<Loop1>()
                .input::<Loop2>()
                .compute(|inputs: &Inputs<'_>| inputs.get::<Loop2>().map(|v| *v)),
        );
        pipeline.insert(
            Provider::output::<Loop2>()
                .input::<Loop1>()
                .compute(|inputs: &Inputs<'_>| inputs.get::<Loop1>().map(|v| *v)),
        );

        match pipeline.plan::<Loop1>(Context::GLOBAL) {
            Err(GraphError::CyclicDependency { cycle }) => {
                let names: Vec<_> = cycle.iter().map(|k| k.quantity).collect();
                assert_eq!(names, vec!["Loop1", "Loop2", "Loop1"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_param_overrides_provider() {
        let mut pipeline = Pipeline::new();
        pipeline.insert(Provider::output::<Doubled>().input::<Seed>().compute(doubled));
        pipeline.set_param::<Doubled>(100);

        // Seed is never needed because Doubled is supplied directly.
        let plan = pipeline.plan::<Doubled>(Context::GLOBAL).unwrap();
        assert!(plan.is_empty());
        assert_eq!(*pipeline.compute_global::<Doubled>().unwrap(), 100);
    }

    #[test]
    fn test_unbound_axis() {
        let pipeline = Pipeline::new();
        assert!(matches!(
            pipeline.plan::<PerBank>(Context::GLOBAL),
            Err(GraphError::UnboundAxis {
                axis: Axis::Bank,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_reduction_domain() {
        let mut pipeline = Pipeline::new();
        pipeline.insert(
            Provider::output::<Total>()
                .input::<PerBank>()
                .compute(|inputs: &Inputs<'_>| -> Result<u64> {
                    Ok(inputs.all::<PerBank>()?.len() as u64)
                }),
        );
        assert!(matches!(
            pipeline.plan::<Total>(Context::GLOBAL),
            Err(GraphError::EmptyDomain {
                axis: Axis::Bank,
                ..
            })
        ));
    }
}
