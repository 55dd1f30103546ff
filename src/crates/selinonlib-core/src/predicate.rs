//! The condition language: a composable predicate tree with leaf, unary and
//! N-ary operators.
//!
//! A predicate must be both *introspectable* (to drive the static checker and
//! emit source ahead of time) and *runnable* (during dispatch). The tree is the
//! single source of truth for both; [`Predicate::to_source`] is not a separate
//! grammar bolted on afterwards — it walks the same variants [`Predicate::evaluate`]
//! matches on.
//!
//! Concrete leaf predicates (field-equals, http-status, ...) are pluggable and
//! out of scope here; this module only specifies the call contract via
//! [`LeafRegistry`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SelinonError};
use crate::ids::{FlowId, NodeRef};

/// Declared shape of a leaf predicate function: its explicit parameter names
/// (excluding the two implicit ones) and whether it consumes `message` and/or
/// `node_args`.
///
/// This is the "registration contract" from the design notes: rather than
/// inspecting a function's source to recover its signature, each leaf predicate
/// registers its signature once, and [`Predicate::check`] consults the registry.
#[derive(Debug, Clone, Default)]
pub struct LeafSignature {
    pub params: BTreeSet<String>,
    pub requires_message: bool,
    pub requires_node_args: bool,
}

/// The arguments passed to a leaf's evaluator at runtime.
pub struct LeafCallArgs<'a> {
    pub message: Option<&'a serde_json::Value>,
    pub node_args: Option<&'a serde_json::Value>,
    pub args: &'a BTreeMap<String, serde_json::Value>,
}

/// A concrete, callable leaf implementation. Optional: a registry entry with no
/// evaluator still supports static checking and source emission, just not
/// [`Predicate::evaluate`].
pub type LeafEvalFn = Arc<dyn Fn(LeafCallArgs) -> bool + Send + Sync>;

/// Maps leaf predicate names to their declared signature and (optionally) a
/// runnable implementation.
#[derive(Default, Clone)]
pub struct LeafRegistry {
    entries: std::collections::HashMap<String, (LeafSignature, Option<LeafEvalFn>)>,
    /// When set, an unregistered leaf name is treated as "declared elsewhere,
    /// trust the caller" instead of a configuration error. Used by tooling
    /// that only validates topology, not an embedding application's own
    /// predicate modules (see `selinonlib-cli`).
    permissive: bool,
}

impl LeafRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that does not reject unregistered leaf names outright —
    /// signature and message-requirement checks are skipped for them.
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    pub fn is_permissive(&self) -> bool {
        self.permissive
    }

    pub fn register(&mut self, name: impl Into<String>, signature: LeafSignature, eval: Option<LeafEvalFn>) {
        self.entries.insert(name.into(), (signature, eval));
    }

    pub fn signature(&self, name: &str) -> Result<&LeafSignature> {
        self.entries
            .get(name)
            .map(|(sig, _)| sig)
            .ok_or_else(|| SelinonError::Configuration(format!("unregistered predicate function '{name}'")))
    }

    pub fn call(&self, name: &str, call_args: LeafCallArgs) -> Result<bool> {
        let (_, eval) = self
            .entries
            .get(name)
            .ok_or_else(|| SelinonError::Configuration(format!("unregistered predicate function '{name}'")))?;
        let eval = eval.as_ref().ok_or_else(|| {
            SelinonError::Request(format!("predicate function '{name}' has no runtime implementation"))
        })?;
        Ok(eval(call_args))
    }
}

/// One leaf call: `(function_ref, node, flow, args)`. `node` is `None` for a
/// leaf bound to a starting edge (the `⊥` sentinel in the design document).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaf {
    pub function: String,
    pub node: Option<NodeRef>,
    pub flow: FlowId,
    pub args: BTreeMap<String, serde_json::Value>,
}

/// A composable predicate tree. `AlwaysTrue` is used when no condition is
/// specified in the YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Predicate {
    Leaf(Leaf),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    AlwaysTrue,
}

/// Read-only access to previously stored task results, keyed by flow and node
/// name, as seen by a leaf predicate that declares `message`.
pub trait ResultDb {
    fn get(&self, flow_name: &str, node_name: &str) -> Option<serde_json::Value>;
}

/// A trivial in-memory `ResultDb`, useful for tests and the in-process
/// simulator.
#[derive(Default, Clone)]
pub struct MemoryDb {
    values: std::collections::HashMap<(String, String), serde_json::Value>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, flow_name: impl Into<String>, node_name: impl Into<String>, value: serde_json::Value) {
        self.values.insert((flow_name.into(), node_name.into()), value);
    }
}

impl ResultDb for MemoryDb {
    fn get(&self, flow_name: &str, node_name: &str) -> Option<serde_json::Value> {
        self.values.get(&(flow_name.to_string(), node_name.to_string())).cloned()
    }
}

/// Resolves a [`NodeRef`] to the name used for `ResultDb` lookups and source
/// emission. A thin seam so this module does not need the full `System`.
pub trait NodeNames {
    fn flow_name(&self, flow: FlowId) -> &str;
    fn node_name(&self, node: NodeRef) -> &str;
}

impl Predicate {
    /// Recursive descent over a tagged YAML mapping with exactly one of the
    /// keys `name`, `and`, `or`, `not`.
    ///
    /// For a leaf: if the mapping specifies `node`, it is resolved against
    /// `nodes_from`; if absent and `nodes_from` has exactly one element, that
    /// element is bound; if absent and `nodes_from` is empty (a starting
    /// edge), the leaf binds to `None`; any other combination is ambiguous and
    /// rejected.
    pub fn construct(
        tree: &serde_yaml::Value,
        nodes_from: &[NodeRef],
        flow: FlowId,
        registry: &LeafRegistry,
        resolve_node: &impl Fn(&str) -> Result<NodeRef>,
    ) -> Result<Self> {
        let mapping = tree.as_mapping().ok_or_else(|| {
            SelinonError::Configuration("a condition must be a mapping".to_string())
        })?;

        let has = |key: &str| mapping.contains_key(&serde_yaml::Value::String(key.to_string()));
        let variant_keys = ["name", "and", "or", "not"];
        let present: Vec<&str> = variant_keys.into_iter().filter(|k| has(k)).collect();

        if present.len() != 1 {
            return Err(SelinonError::Configuration(format!(
                "a condition must have exactly one of {variant_keys:?}, found {present:?}"
            )));
        }

        match present[0] {
            "and" | "or" => {
                let key = present[0];
                let allowed: BTreeSet<&str> = [key].into_iter().collect();
                for (k, _) in mapping.iter() {
                    if let Some(k) = k.as_str() {
                        if !allowed.contains(k) {
                            return Err(SelinonError::Configuration(format!(
                                "unknown key '{k}' beside '{key}' in condition"
                            )));
                        }
                    }
                }
                let children_raw = mapping
                    .get(&serde_yaml::Value::String(key.to_string()))
                    .and_then(|v| v.as_sequence())
                    .ok_or_else(|| {
                        SelinonError::Configuration(format!("'{key}' must be a non-empty list of conditions"))
                    })?;
                if children_raw.is_empty() {
                    return Err(SelinonError::Configuration(format!(
                        "'{key}' must be a non-empty list of conditions"
                    )));
                }
                let children = children_raw
                    .iter()
                    .map(|c| Predicate::construct(c, nodes_from, flow, registry, resolve_node))
                    .collect::<Result<Vec<_>>>()?;
                Ok(if key == "and" {
                    Predicate::And(children)
                } else {
                    Predicate::Or(children)
                })
            }
            "not" => {
                let allowed: BTreeSet<&str> = ["not"].into_iter().collect();
                for (k, _) in mapping.iter() {
                    if let Some(k) = k.as_str() {
                        if !allowed.contains(k) {
                            return Err(SelinonError::Configuration(format!(
                                "unknown key '{k}' beside 'not' in condition"
                            )));
                        }
                    }
                }
                let child = mapping
                    .get(&serde_yaml::Value::String("not".to_string()))
                    .ok_or_else(|| SelinonError::Configuration("'not' must name a single condition".to_string()))?;
                let child = Predicate::construct(child, nodes_from, flow, registry, resolve_node)?;
                Ok(Predicate::Not(Box::new(child)))
            }
            "name" => {
                let allowed: BTreeSet<&str> = ["name", "node", "args"].into_iter().collect();
                for (k, _) in mapping.iter() {
                    if let Some(k) = k.as_str() {
                        if !allowed.contains(k) {
                            return Err(SelinonError::Configuration(format!(
                                "unknown key '{k}' in leaf condition"
                            )));
                        }
                    }
                }
                let function = mapping
                    .get(&serde_yaml::Value::String("name".to_string()))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| SelinonError::Configuration("leaf condition 'name' must be a string".to_string()))?
                    .to_string();

                let node = if let Some(node_val) = mapping.get(&serde_yaml::Value::String("node".to_string())) {
                    let node_name = node_val.as_str().ok_or_else(|| {
                        SelinonError::Configuration("leaf condition 'node' must be a string".to_string())
                    })?;
                    Some(resolve_node(node_name)?)
                } else if nodes_from.len() == 1 {
                    Some(nodes_from[0])
                } else if nodes_from.is_empty() {
                    None
                } else {
                    return Err(SelinonError::Configuration(format!(
                        "leaf condition '{function}' must specify 'node' when nodes_from has more than one entry"
                    )));
                };

                let args: BTreeMap<String, serde_json::Value> = match mapping
                    .get(&serde_yaml::Value::String("args".to_string()))
                {
                    Some(v) => serde_yaml::from_value(v.clone())?,
                    None => BTreeMap::new(),
                };

                Ok(Predicate::Leaf(Leaf {
                    function,
                    node,
                    flow,
                    args,
                }))
            }
            _ => unreachable!(),
        }
    }

    /// Evaluates the tree against a result database and the flow's node
    /// arguments. For a leaf, `message` is injected iff the function declares
    /// it, `node_args` iff the function declares it. And/Or short-circuit in
    /// list order.
    pub fn evaluate(
        &self,
        db: &dyn ResultDb,
        node_args: Option<&serde_json::Value>,
        registry: &LeafRegistry,
        names: &impl NodeNames,
    ) -> Result<bool> {
        match self {
            Predicate::AlwaysTrue => Ok(true),
            Predicate::Not(child) => Ok(!child.evaluate(db, node_args, registry, names)?),
            Predicate::And(children) => {
                for child in children {
                    if !child.evaluate(db, node_args, registry, names)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(children) => {
                for child in children {
                    if child.evaluate(db, node_args, registry, names)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Leaf(leaf) => {
                let sig = registry.signature(&leaf.function)?;
                let message = if sig.requires_message {
                    let node = leaf.node.ok_or_else(|| {
                        SelinonError::NoParentNode(names.flow_name(leaf.flow).to_string())
                    })?;
                    db.get(names.flow_name(leaf.flow), names.node_name(node))
                } else {
                    None
                };
                let node_args = if sig.requires_node_args { node_args } else { None };
                registry.call(
                    &leaf.function,
                    LeafCallArgs {
                        message: message.as_ref(),
                        node_args,
                        args: &leaf.args,
                    },
                )
            }
        }
    }

    /// Union over children; for a leaf, the singleton set of function names
    /// referenced.
    pub fn predicates_used(&self) -> BTreeSet<String> {
        match self {
            Predicate::AlwaysTrue => BTreeSet::new(),
            Predicate::Leaf(leaf) => std::iter::once(leaf.function.clone()).collect(),
            Predicate::Not(child) => child.predicates_used(),
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().flat_map(|c| c.predicates_used()).collect()
            }
        }
    }

    /// Union over children of the nodes a leaf reads from.
    pub fn nodes_used(&self) -> BTreeSet<NodeRef> {
        match self {
            Predicate::AlwaysTrue => BTreeSet::new(),
            Predicate::Leaf(leaf) => leaf.node.into_iter().collect(),
            Predicate::Not(child) => child.nodes_used(),
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().flat_map(|c| c.nodes_used()).collect()
            }
        }
    }

    /// `true` iff any leaf in the tree requires a stored message. Leaves
    /// resolve this through `registry`, since `requires_message` is declared
    /// on the function's signature, not on the call site.
    pub fn requires_message_with(&self, registry: &LeafRegistry) -> Result<bool> {
        match self {
            Predicate::AlwaysTrue => Ok(false),
            Predicate::Leaf(leaf) => match registry.signature(&leaf.function) {
                Ok(sig) => Ok(sig.requires_message),
                Err(_) if registry.is_permissive() => Ok(false),
                Err(e) => Err(e),
            },
            Predicate::Not(child) => child.requires_message_with(registry),
            Predicate::And(children) | Predicate::Or(children) => {
                for c in children {
                    if c.requires_message_with(registry)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Runs the per-leaf parameter check from the invariants: the leaf's
    /// declared explicit parameters must match the args supplied in the YAML.
    pub fn check(&self, registry: &LeafRegistry) -> Result<()> {
        match self {
            Predicate::AlwaysTrue => Ok(()),
            Predicate::Leaf(leaf) => {
                let sig = match registry.signature(&leaf.function) {
                    Ok(sig) => sig,
                    Err(_) if registry.is_permissive() => return Ok(()),
                    Err(e) => return Err(e),
                };
                let supplied: BTreeSet<String> = leaf.args.keys().cloned().collect();
                if supplied != sig.params {
                    return Err(SelinonError::Configuration(format!(
                        "leaf '{}' argument mismatch: declared {:?}, supplied {:?}",
                        leaf.function, sig.params, supplied
                    )));
                }
                if sig.requires_message && leaf.node.is_none() {
                    return Err(SelinonError::Configuration(format!(
                        "leaf '{}' requires a message but is bound to a starting edge",
                        leaf.function
                    )));
                }
                Ok(())
            }
            Predicate::Not(child) => child.check(registry),
            Predicate::And(children) | Predicate::Or(children) => {
                for c in children {
                    c.check(registry)?;
                }
                Ok(())
            }
        }
    }

    /// Emits the language-neutral expression AST for this predicate. The plan
    /// emitter walks this, not a separate grammar, to write the
    /// `_condition_{flow}_{idx}` function body.
    pub fn to_source_expr(&self, names: &impl NodeNames, registry: &LeafRegistry) -> SourceExpr {
        match self {
            Predicate::AlwaysTrue => SourceExpr::True,
            Predicate::Not(child) => SourceExpr::Not(Box::new(child.to_source_expr(names, registry))),
            Predicate::And(children) => {
                SourceExpr::And(children.iter().map(|c| c.to_source_expr(names, registry)).collect())
            }
            Predicate::Or(children) => {
                SourceExpr::Or(children.iter().map(|c| c.to_source_expr(names, registry)).collect())
            }
            Predicate::Leaf(leaf) => {
                let sig = registry.signature(&leaf.function).ok();
                let requires_message = sig.map(|s| s.requires_message).unwrap_or(false);
                let requires_node_args = sig.map(|s| s.requires_node_args).unwrap_or(false);
                let message = if requires_message {
                    leaf.node.map(|n| {
                        SourceExpr::DbGet(names.flow_name(leaf.flow).to_string(), names.node_name(n).to_string())
                    })
                } else {
                    None
                };
                let kwargs = leaf
                    .args
                    .iter()
                    .map(|(k, v)| (k.clone(), SourceExpr::Const(v.clone())))
                    .collect();
                SourceExpr::Call {
                    func: leaf.function.clone(),
                    message: message.map(Box::new),
                    node_args: requires_node_args,
                    kwargs,
                }
            }
        }
    }

    /// Convenience: render straight to source text.
    pub fn to_source(&self, names: &impl NodeNames, registry: &LeafRegistry) -> String {
        self.to_source_expr(names, registry).render()
    }
}

/// A small, language-neutral expression tree: constant, a call to a leaf
/// function, unary not, and short-circuiting and/or. [`SourceExpr::render`]
/// writes Rust source; [`SourceExpr::interpret`] evaluates it directly,
/// without going through text, which is what the round-trip tests exercise.
#[derive(Debug, Clone)]
pub enum SourceExpr {
    True,
    Const(serde_json::Value),
    DbGet(String, String),
    Call {
        func: String,
        message: Option<Box<SourceExpr>>,
        node_args: bool,
        kwargs: Vec<(String, SourceExpr)>,
    },
    Not(Box<SourceExpr>),
    And(Vec<SourceExpr>),
    Or(Vec<SourceExpr>),
}

impl SourceExpr {
    pub fn render(&self) -> String {
        match self {
            SourceExpr::True => "true".to_string(),
            SourceExpr::Const(v) => v.to_string(),
            SourceExpr::DbGet(flow, node) => format!("db.get({flow:?}, {node:?})"),
            SourceExpr::Call {
                func,
                message,
                node_args,
                kwargs,
            } => {
                let message_arg = message
                    .as_ref()
                    .map(|m| m.render())
                    .unwrap_or_else(|| "None".to_string());
                let node_args_arg = if *node_args { "Some(node_args)" } else { "None" };
                let kwargs_str = kwargs
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.render()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{func}(message: {message_arg}, node_args: {node_args_arg}, {kwargs_str})")
            }
            SourceExpr::Not(child) => format!("!({})", child.render()),
            SourceExpr::And(children) => {
                let parts: Vec<_> = children.iter().map(|c| c.render()).collect();
                format!("({})", parts.join(" && "))
            }
            SourceExpr::Or(children) => {
                let parts: Vec<_> = children.iter().map(|c| c.render()).collect();
                format!("({})", parts.join(" || "))
            }
        }
    }

    /// Interprets the expression tree directly against a db/registry, used to
    /// prove that emitted source is observationally equivalent to the tree it
    /// was emitted from (invariant 3 in the testable-properties list).
    pub fn interpret(&self, db: &dyn ResultDb, node_args: Option<&serde_json::Value>, registry: &LeafRegistry) -> Result<bool> {
        match self {
            SourceExpr::True => Ok(true),
            SourceExpr::Const(v) => Ok(v.as_bool().unwrap_or(false)),
            SourceExpr::DbGet(..) => Ok(false),
            SourceExpr::Not(child) => Ok(!child.interpret(db, node_args, registry)?),
            SourceExpr::And(children) => {
                for c in children {
                    if !c.interpret(db, node_args, registry)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            SourceExpr::Or(children) => {
                for c in children {
                    if c.interpret(db, node_args, registry)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            SourceExpr::Call {
                func,
                message,
                node_args: wants_node_args,
                kwargs,
            } => {
                let message_value = match message.as_deref() {
                    Some(SourceExpr::DbGet(flow, node)) => db.get(flow, node),
                    _ => None,
                };
                let args: BTreeMap<String, serde_json::Value> = kwargs
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.clone(),
                            match v {
                                SourceExpr::Const(c) => c.clone(),
                                _ => serde_json::Value::Null,
                            },
                        )
                    })
                    .collect();
                registry.call(
                    func,
                    LeafCallArgs {
                        message: message_value.as_ref(),
                        node_args: if *wants_node_args { node_args } else { None },
                        args: &args,
                    },
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Names;
    impl NodeNames for Names {
        fn flow_name(&self, _flow: FlowId) -> &str {
            "flow1"
        }
        fn node_name(&self, _node: NodeRef) -> &str {
            "Task1"
        }
    }

    fn resolver(_name: &str) -> Result<NodeRef> {
        Ok(NodeRef::Task(crate::ids::TaskId(0)))
    }

    fn always_true_registry() -> LeafRegistry {
        let mut reg = LeafRegistry::new();
        reg.register(
            "fieldEqual",
            LeafSignature {
                params: ["key".to_string(), "value".to_string()].into_iter().collect(),
                requires_message: true,
                requires_node_args: false,
            },
            Some(Arc::new(|call: LeafCallArgs| {
                let message = call.message.cloned().unwrap_or_default();
                let key = call.args.get("key").and_then(|v| v.as_str()).unwrap_or("");
                let value = call.args.get("value").cloned().unwrap_or_default();
                message.get(key).cloned().unwrap_or_default() == value
            })),
        );
        reg
    }

    #[test]
    fn construct_leaf_binds_single_nodes_from() {
        let yaml: serde_yaml::Value = serde_yaml::from_str(
            "name: fieldEqual\nargs:\n  key: k\n  value: v\n",
        )
        .unwrap();
        let nodes_from = vec![NodeRef::Task(crate::ids::TaskId(0))];
        let pred = Predicate::construct(
            &yaml,
            &nodes_from,
            FlowId(0),
            &always_true_registry(),
            &resolver,
        )
        .unwrap();
        match pred {
            Predicate::Leaf(leaf) => assert_eq!(leaf.node, Some(nodes_from[0])),
            _ => panic!("expected leaf"),
        }
    }

    #[test]
    fn construct_rejects_multiple_variant_keys() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("name: a\nand: []\n").unwrap();
        let err = Predicate::construct(&yaml, &[], FlowId(0), &always_true_registry(), &resolver);
        assert!(err.is_err());
    }

    #[test]
    fn evaluate_matches_source_expr_interpretation() {
        let registry = always_true_registry();
        let leaf = Predicate::Leaf(Leaf {
            function: "fieldEqual".to_string(),
            node: Some(NodeRef::Task(crate::ids::TaskId(0))),
            flow: FlowId(0),
            args: BTreeMap::from([
                ("key".to_string(), serde_json::json!("k")),
                ("value".to_string(), serde_json::json!("v")),
            ]),
        });
        let pred = Predicate::And(vec![leaf, Predicate::Not(Box::new(Predicate::AlwaysTrue))]);

        let mut db = MemoryDb::new();
        db.set("flow1", "Task1", serde_json::json!({"k": "v"}));

        let names = Names;
        let direct = pred.evaluate(&db, None, &registry, &names).unwrap();
        let via_source = pred
            .to_source_expr(&names, &registry)
            .interpret(&db, None, &registry)
            .unwrap();

        assert_eq!(direct, via_source);
        assert_eq!(direct, false); // the Not(AlwaysTrue) branch always fails the And
        assert_eq!(pred.requires_message_with(&registry).unwrap(), true);
    }
}
