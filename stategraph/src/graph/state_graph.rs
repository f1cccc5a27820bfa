//! State graph builder: nodes, edges, routing layers and parallel groups.
//!
//! Add nodes with `add_node` / `add_fn_node`, wire them with `add_edge(from, to)` (using
//! `START` and `END` for entry and exit), conditional edges, routing rules, router
//! functions and parallel groups, then `compile` or `compile_with_checkpointer` to get
//! an immutable `CompiledStateGraph`.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::AgentError;
use crate::graph::compile_error::CompilationError;
use crate::graph::compiled::CompiledStateGraph;
use crate::graph::config::GraphConfig;
use crate::graph::executor::{NodeExecutor, NodeRegistry};
use crate::graph::monitor::ExecutionMonitor;
use crate::graph::node::{FnNode, Node, NodeOutput};
use crate::graph::node_middleware::NodeMiddleware;
use crate::graph::router::{
    Condition, ConditionalEdge, IntelligentRouterFn, LlmRouter, Router, RoutingRule,
};
use crate::graph::RunContext;
use crate::memory::Checkpointer;
use crate::parallel::{GroupRunner, ParallelGroup};
use crate::state::{State, StateSchema, ERRORS_KEY};

/// Sentinel for graph entry: use as `from_id` in `add_edge(START, first_node_id)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: use as `to_id` in `add_edge(last_node_id, END)`.
pub const END: &str = "__end__";

/// State graph: nodes plus routing, built once and compiled into an executable graph.
///
/// **Interaction**: Accepts `Arc<dyn Node>` (or closures via `add_fn_node`); produces
/// `CompiledStateGraph`. Middleware and checkpointer are passed at compile time only.
#[derive(Default)]
pub struct StateGraph {
    registry: NodeRegistry,
    duplicates: Vec<String>,
    /// Unconditional edges (from_id, to_id).
    edges: Vec<(String, String)>,
    conditional: Vec<(String, ConditionalEdge)>,
    rules: Vec<RoutingRule>,
    groups: Vec<ParallelGroup>,
    intelligent: Option<IntelligentRouterFn>,
    llm: Option<Arc<dyn LlmRouter>>,
    default_target: Option<String>,
    schema: StateSchema,
    config: GraphConfig,
    monitor: Option<Arc<dyn ExecutionMonitor>>,
}

impl StateGraph {
    /// Creates an empty graph with an empty (accept-everything) schema and default config.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(self, schema: StateSchema) -> Self {
        Self { schema, ..self }
    }

    pub fn with_config(self, config: GraphConfig) -> Self {
        Self { config, ..self }
    }

    /// Installs a monitor receiving one `NodeEvent` per node attempt.
    pub fn with_monitor(self, monitor: Arc<dyn ExecutionMonitor>) -> Self {
        Self {
            monitor: Some(monitor),
            ..self
        }
    }

    /// Adds a node; id must be unique (a duplicate fails `compile`).
    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node>) -> &mut Self {
        let id = id.into();
        if !self.registry.register(id.clone(), node, None) {
            self.duplicates.push(id);
        }
        self
    }

    /// Adds an async closure `(State, RunContext) -> Result<NodeOutput, AgentError>` as a node.
    pub fn add_fn_node<F, Fut>(&mut self, id: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(State, RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutput, AgentError>> + Send + 'static,
    {
        self.add_node(id, Arc::new(FnNode::new(f)))
    }

    /// Adds a node as a member of the parallel group `group` (declared with
    /// `add_parallel_group`, before or after this call).
    pub fn add_node_in_group(
        &mut self,
        id: impl Into<String>,
        node: Arc<dyn Node>,
        group: impl Into<String>,
    ) -> &mut Self {
        let id = id.into();
        if !self.registry.register(id.clone(), node, Some(group.into())) {
            self.duplicates.push(id);
        }
        self
    }

    /// Adds an unconditional edge. Sources may be START, a node or a group name; targets a
    /// node, a group name or END.
    pub fn add_edge(&mut self, from_id: impl Into<String>, to_id: impl Into<String>) -> &mut Self {
        self.edges.push((from_id.into(), to_id.into()));
        self
    }

    /// Adds a conditional edge. With a path table the condition's key is looked up in it;
    /// without one the key itself is the target id. At most one per source.
    pub fn add_conditional_edges(
        &mut self,
        source: impl Into<String>,
        condition: Condition,
        path_map: Option<HashMap<String, String>>,
    ) -> &mut Self {
        self.conditional.push((
            source.into(),
            ConditionalEdge {
                condition,
                path_map,
            },
        ));
        self
    }

    pub fn add_routing_rule(&mut self, rule: RoutingRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Declares a parallel group. The group name becomes a routing target.
    pub fn add_parallel_group(&mut self, group: ParallelGroup) -> &mut Self {
        self.groups.push(group);
        self
    }

    pub fn set_intelligent_router<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&State, &[String]) -> Option<String> + Send + Sync + 'static,
    {
        self.intelligent = Some(Arc::new(f));
        self
    }

    pub fn set_llm_router(&mut self, router: Arc<dyn LlmRouter>) -> &mut Self {
        self.llm = Some(router);
        self
    }

    /// Target used when no other routing layer produced one.
    pub fn set_default_target(&mut self, target: impl Into<String>) -> &mut Self {
        self.default_target = Some(target.into());
        self
    }

    /// Builds the executable graph.
    ///
    /// Returns `CompilationError` if the graph has no entry, references unknown ids or
    /// declares inconsistent groups. On success, the graph is immutable and ready for `invoke`.
    pub fn compile(self) -> Result<CompiledStateGraph, CompilationError> {
        self.compile_internal(None, None)
    }

    /// Builds the executable graph with a checkpointer; runs with `config.thread_id` are
    /// persisted after every step and can be resumed.
    pub fn compile_with_checkpointer(
        self,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Result<CompiledStateGraph, CompilationError> {
        self.compile_internal(Some(checkpointer), None)
    }

    /// Builds the executable graph with node middleware wrapping every node invocation.
    pub fn compile_with_middleware(
        self,
        middleware: Arc<dyn NodeMiddleware>,
    ) -> Result<CompiledStateGraph, CompilationError> {
        self.compile_internal(None, Some(middleware))
    }

    /// Builds the executable graph with both checkpointer and node middleware.
    pub fn compile_with_checkpointer_and_middleware(
        self,
        checkpointer: Arc<dyn Checkpointer>,
        middleware: Arc<dyn NodeMiddleware>,
    ) -> Result<CompiledStateGraph, CompilationError> {
        self.compile_internal(Some(checkpointer), Some(middleware))
    }

    fn compile_internal(
        self,
        checkpointer: Option<Arc<dyn Checkpointer>>,
        middleware: Option<Arc<dyn NodeMiddleware>>,
    ) -> Result<CompiledStateGraph, CompilationError> {
        let Self {
            mut registry,
            duplicates,
            edges,
            conditional,
            rules,
            mut groups,
            intelligent,
            llm,
            default_target,
            schema,
            config,
            monitor,
        } = self;

        if let Some(id) = duplicates.into_iter().next() {
            return Err(CompilationError::DuplicateNode(id));
        }
        let group_names: HashSet<String> = groups.iter().map(|g| g.name.clone()).collect();
        for id in registry.ids() {
            if id == START || id == END || id == ERRORS_KEY || group_names.contains(id) {
                return Err(CompilationError::ReservedId(id.clone()));
            }
        }

        // Fold members registered with add_node_in_group into their group declarations.
        let mut declared: Vec<(String, String)> = registry
            .memberships()
            .map(|(node, group)| (node.clone(), group.clone()))
            .collect();
        declared.sort();
        for (node, group_name) in declared {
            let Some(group) = groups.iter_mut().find(|g| g.name == group_name) else {
                return Err(CompilationError::InvalidGroup {
                    group: group_name,
                    reason: format!("node `{node}` joins an undeclared group"),
                });
            };
            if !group.members.contains(&node) {
                group.members.push(node);
            }
        }

        let mut group_of: HashMap<String, String> = HashMap::new();
        if group_names.len() != groups.len() {
            let mut seen = HashSet::new();
            let dup = groups
                .iter()
                .find(|g| !seen.insert(g.name.as_str()))
                .map(|g| g.name.clone())
                .unwrap_or_default();
            return Err(CompilationError::InvalidGroup {
                group: dup,
                reason: "declared twice".into(),
            });
        }
        for group in &groups {
            if group.members.is_empty() {
                return Err(CompilationError::InvalidGroup {
                    group: group.name.clone(),
                    reason: "no members".into(),
                });
            }
            for member in &group.members {
                if !registry.contains(member) {
                    return Err(CompilationError::NodeNotFound(member.clone()));
                }
                if let Some(other) = group_of.insert(member.clone(), group.name.clone()) {
                    if other != group.name {
                        return Err(CompilationError::InvalidGroup {
                            group: group.name.clone(),
                            reason: format!("node `{member}` already belongs to `{other}`"),
                        });
                    }
                }
            }
        }
        for (member, group) in &group_of {
            registry.set_group(member, group);
        }

        let is_source = |id: &str| id == START || registry.contains(id) || group_names.contains(id);
        let is_target = |id: &str| id == END || registry.contains(id) || group_names.contains(id);
        let check_source = |id: &str| -> Result<(), CompilationError> {
            if !is_source(id) {
                return Err(CompilationError::NodeNotFound(id.to_string()));
            }
            if let Some(group) = group_of.get(id) {
                return Err(CompilationError::InvalidGroup {
                    group: group.clone(),
                    reason: format!("route from the group, not from member `{id}`"),
                });
            }
            Ok(())
        };
        let check_target = |id: &str| -> Result<(), CompilationError> {
            if is_target(id) {
                Ok(())
            } else {
                Err(CompilationError::NodeNotFound(id.to_string()))
            }
        };

        let mut static_edges: HashMap<String, String> = HashMap::new();
        for (from, to) in edges {
            check_source(&from)?;
            check_target(&to)?;
            if static_edges.contains_key(&from) {
                return Err(CompilationError::DuplicateEdge(from));
            }
            static_edges.insert(from, to);
        }
        let mut conditional_edges: HashMap<String, ConditionalEdge> = HashMap::new();
        for (source, edge) in conditional {
            check_source(&source)?;
            if let Some(map) = &edge.path_map {
                for target in map.values() {
                    check_target(target)?;
                }
            }
            if conditional_edges.contains_key(&source) {
                return Err(CompilationError::DuplicateEdge(source));
            }
            conditional_edges.insert(source, edge);
        }
        if !static_edges.contains_key(START) && !conditional_edges.contains_key(START) {
            return Err(CompilationError::MissingStart);
        }
        for rule in &rules {
            check_source(&rule.source)?;
            check_target(&rule.target)?;
        }
        if let Some(target) = &default_target {
            check_target(target)?;
        }

        let nodes: HashSet<String> = registry.ids().cloned().collect();
        let mut router = Router::new(nodes, group_of).with_rules(rules);
        router.static_edges = static_edges;
        router.conditional = conditional_edges;
        router.intelligent = intelligent;
        router.llm = llm;
        router.llm_config = config.llm_router;
        router.default_target = default_target;

        let runners: HashMap<String, GroupRunner> = groups
            .into_iter()
            .map(|g| (g.name.clone(), GroupRunner::new(g)))
            .collect();

        Ok(CompiledStateGraph {
            executor: NodeExecutor::new(registry, middleware, monitor, config.node_timeout),
            router: Arc::new(router),
            groups: Arc::new(runners),
            schema: Arc::new(schema),
            config,
            checkpointer,
            thread_locks: Arc::new(DashMap::new()),
        })
    }
}
