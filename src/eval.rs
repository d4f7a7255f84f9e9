//! XPath evaluator
//!
//! Walks an [`Expr`] over a single [`Tree`]. Node-sets are vectors of
//! [`NodeRef`] kept in document order without duplicates; since tree ids are
//! assigned in document order, sorting is all that is needed to restore
//! order after a reverse axis or a union.

use crate::ast::{ArithOp, Axis, CompareOp, Expr, Function, NodeTest, Step};
use crate::names::Name;
use crate::tree::{DOCUMENT, NodeId, NodeKind, Tree};
use std::borrow::Cow;
use thiserror::Error;

/// A node or attribute in a tree
///
/// The derived ordering is document order: an element sorts before its
/// attributes, which sort before its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef {
    pub node: NodeId,
    /// Index into the owning element's attributes
    pub attribute: Option<usize>,
}

impl NodeRef {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            attribute: None,
        }
    }

    pub fn attr(node: NodeId, index: usize) -> Self {
        Self {
            node,
            attribute: Some(index),
        }
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nodes(Vec<NodeRef>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// XPath `boolean()`: the effective truth of a query result
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    /// Scalar view used by comparisons; node-sets are resolved by the caller
    fn atom(&self) -> Atom<'_> {
        match self {
            Value::Nodes(nodes) => Atom::Boolean(!nodes.is_empty()),
            Value::Boolean(b) => Atom::Boolean(*b),
            Value::Number(n) => Atom::Number(*n),
            Value::String(s) => Atom::Str(s),
        }
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("{0} requires a node-set")]
    NotANodeSet(&'static str),

    #[error("{0}() is missing argument {1}")]
    MissingArgument(&'static str, usize),
}

#[derive(Clone, Copy)]
enum Atom<'a> {
    Boolean(bool),
    Number(f64),
    Str(&'a str),
}

impl Atom<'_> {
    fn boolean(self) -> bool {
        match self {
            Atom::Boolean(b) => b,
            Atom::Number(n) => n != 0.0 && !n.is_nan(),
            Atom::Str(s) => !s.is_empty(),
        }
    }

    fn number(self) -> f64 {
        match self {
            Atom::Boolean(b) => f64::from(u8::from(b)),
            Atom::Number(n) => n,
            Atom::Str(s) => string_to_number(s),
        }
    }
}

fn compare_atoms(op: CompareOp, lhs: Atom, rhs: Atom) -> bool {
    match op {
        CompareOp::Eq | CompareOp::Ne => {
            let equal = match (lhs, rhs) {
                (Atom::Boolean(_), _) | (_, Atom::Boolean(_)) => lhs.boolean() == rhs.boolean(),
                (Atom::Number(_), _) | (_, Atom::Number(_)) => lhs.number() == rhs.number(),
                (Atom::Str(a), Atom::Str(b)) => a == b,
            };
            (op == CompareOp::Eq) == equal
        }
        CompareOp::Lt => lhs.number() < rhs.number(),
        CompareOp::Le => lhs.number() <= rhs.number(),
        CompareOp::Gt => lhs.number() > rhs.number(),
        CompareOp::Ge => lhs.number() >= rhs.number(),
    }
}

/// Evaluation context: the node plus its position in the current node-set
#[derive(Debug, Clone, Copy)]
struct Context {
    node: NodeRef,
    position: usize,
    size: usize,
}

/// A node test with its name resolved against the tree's name pool
enum ResolvedTest {
    /// `None` when the name never occurs in the pool
    Name(Option<Name>),
    Any,
    Text,
    Node,
}

fn into_nodes(value: Value, what: &'static str) -> Result<Vec<NodeRef>, EvalError> {
    match value {
        Value::Nodes(nodes) => Ok(nodes),
        _ => Err(EvalError::NotANodeSet(what)),
    }
}

/// Evaluate `expr` with `node` as the context node
pub fn evaluate(expr: &Expr, tree: &Tree, node: NodeId) -> Result<Value, EvalError> {
    Evaluator::new(tree).evaluate(expr, node)
}

pub struct Evaluator<'t> {
    tree: &'t Tree,
}

impl<'t> Evaluator<'t> {
    pub fn new(tree: &'t Tree) -> Self {
        Self { tree }
    }

    pub fn evaluate(&self, expr: &Expr, node: NodeId) -> Result<Value, EvalError> {
        let ctx = Context {
            node: NodeRef::new(node),
            position: 1,
            size: 1,
        };
        self.eval(expr, ctx)
    }

    fn eval(&self, expr: &Expr, ctx: Context) -> Result<Value, EvalError> {
        let value = match expr {
            Expr::Or(lhs, rhs) => Value::Boolean(
                self.eval(lhs, ctx)?.to_boolean() || self.eval(rhs, ctx)?.to_boolean(),
            ),
            Expr::And(lhs, rhs) => Value::Boolean(
                self.eval(lhs, ctx)?.to_boolean() && self.eval(rhs, ctx)?.to_boolean(),
            ),
            Expr::Compare(op, lhs, rhs) => {
                let lhs = self.eval(lhs, ctx)?;
                let rhs = self.eval(rhs, ctx)?;
                Value::Boolean(self.compare(*op, &lhs, &rhs))
            }
            Expr::Arith(op, lhs, rhs) => {
                let a = self.number(&self.eval(lhs, ctx)?);
                let b = self.number(&self.eval(rhs, ctx)?);
                Value::Number(match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Mod => a % b,
                })
            }
            Expr::Negate(operand) => Value::Number(-self.number(&self.eval(operand, ctx)?)),
            Expr::Union(lhs, rhs) => {
                let mut nodes = into_nodes(self.eval(lhs, ctx)?, "union")?;
                nodes.extend(into_nodes(self.eval(rhs, ctx)?, "union")?);
                nodes.sort_unstable();
                nodes.dedup();
                Value::Nodes(nodes)
            }
            Expr::Literal(s) => Value::String(s.clone()),
            Expr::Number(n) => Value::Number(*n),
            Expr::Call(function, args) => self.call(*function, args, ctx)?,
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    NodeRef::new(DOCUMENT)
                } else {
                    ctx.node
                };
                Value::Nodes(self.apply_steps(vec![start], steps)?)
            }
            Expr::Filter {
                base,
                predicates,
                steps,
            } => {
                let mut nodes = into_nodes(self.eval(base, ctx)?, "a filter expression")?;
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Value::Nodes(self.apply_steps(nodes, steps)?)
            }
        };
        Ok(value)
    }

    fn apply_steps(&self, mut nodes: Vec<NodeRef>, steps: &[Step]) -> Result<Vec<NodeRef>, EvalError> {
        for step in steps {
            nodes = self.apply_step(&nodes, step)?;
        }
        Ok(nodes)
    }

    fn apply_step(&self, input: &[NodeRef], step: &Step) -> Result<Vec<NodeRef>, EvalError> {
        let test = self.resolve_test(&step.test);
        let mut output = Vec::new();

        for &node in input {
            // Axis order, so positional predicates count outwards on reverse axes
            let mut candidates = self.axis(node, step.axis);
            candidates.retain(|&candidate| self.matches_test(candidate, step.axis, &test));
            for predicate in &step.predicates {
                candidates = self.filter(candidates, predicate)?;
            }
            output.extend(candidates);
        }

        if input.len() > 1 || step.axis.is_reverse() {
            output.sort_unstable();
            output.dedup();
        }
        Ok(output)
    }

    fn filter(&self, nodes: Vec<NodeRef>, predicate: &Expr) -> Result<Vec<NodeRef>, EvalError> {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);

        for (index, node) in nodes.into_iter().enumerate() {
            let ctx = Context {
                node,
                position: index + 1,
                size,
            };
            let keep = match self.eval(predicate, ctx)? {
                Value::Number(n) => n == ctx.position as f64,
                value => value.to_boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn resolve_test(&self, test: &NodeTest) -> ResolvedTest {
        match test {
            NodeTest::Name(name) => ResolvedTest::Name(self.tree.names().lookup(name)),
            NodeTest::Any => ResolvedTest::Any,
            NodeTest::Text => ResolvedTest::Text,
            NodeTest::Node => ResolvedTest::Node,
        }
    }

    /// Nodes along `axis` from `node`, in axis order
    fn axis(&self, node: NodeRef, axis: Axis) -> Vec<NodeRef> {
        let tree = self.tree;
        let id = node.node;
        let on_attribute = node.attribute.is_some();

        match axis {
            Axis::SelfAxis => vec![node],
            Axis::Attribute if on_attribute => Vec::new(),
            Axis::Attribute => (0..tree.nodes[id].attributes().len())
                .map(|index| NodeRef::attr(id, index))
                .collect(),
            Axis::Child if on_attribute => Vec::new(),
            Axis::Child => tree.children(id).iter().map(|&child| NodeRef::new(child)).collect(),
            Axis::Descendant | Axis::DescendantOrSelf => {
                let mut nodes = Vec::new();
                if axis == Axis::DescendantOrSelf {
                    nodes.push(node);
                }
                if !on_attribute {
                    nodes.extend(tree.descendants(id).map(NodeRef::new));
                }
                nodes
            }
            Axis::Parent if on_attribute => vec![NodeRef::new(id)],
            Axis::Parent => tree.parent(id).map(NodeRef::new).into_iter().collect(),
            Axis::Ancestor | Axis::AncestorOrSelf => {
                let mut nodes = Vec::new();
                if axis == Axis::AncestorOrSelf {
                    nodes.push(node);
                }
                let mut current = if on_attribute { Some(id) } else { tree.parent(id) };
                while let Some(ancestor) = current {
                    nodes.push(NodeRef::new(ancestor));
                    current = tree.parent(ancestor);
                }
                nodes
            }
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                if on_attribute {
                    return Vec::new();
                }
                let Some(parent) = tree.parent(id) else {
                    return Vec::new();
                };
                let siblings = tree.children(parent);
                let Some(index) = siblings.iter().position(|&sibling| sibling == id) else {
                    return Vec::new();
                };
                if axis == Axis::FollowingSibling {
                    siblings[index + 1..].iter().map(|&s| NodeRef::new(s)).collect()
                } else {
                    siblings[..index].iter().rev().map(|&s| NodeRef::new(s)).collect()
                }
            }
            Axis::Following => {
                // An attribute's following nodes include its element's children
                let from = if on_attribute {
                    id + 1
                } else {
                    tree.nodes[id].last_descendant + 1
                };
                (from..tree.len()).map(NodeRef::new).collect()
            }
            // Everything before `id` that is not one of its ancestors
            Axis::Preceding => (0..id)
                .rev()
                .filter(|&p| tree.nodes[p].last_descendant < id)
                .map(NodeRef::new)
                .collect(),
        }
    }

    fn matches_test(&self, node: NodeRef, axis: Axis, test: &ResolvedTest) -> bool {
        let target = &self.tree.nodes[node.node];
        match (node.attribute, test) {
            (_, ResolvedTest::Node) => true,
            (Some(_), ResolvedTest::Text) => false,
            (Some(_), ResolvedTest::Any) => axis == Axis::Attribute,
            (Some(index), ResolvedTest::Name(name)) => {
                axis == Axis::Attribute && name.is_some_and(|name| target.attributes()[index].name == name)
            }
            (None, ResolvedTest::Text) => target.is_text(),
            (None, ResolvedTest::Any) => axis != Axis::Attribute && target.is_element(),
            (None, ResolvedTest::Name(name)) => {
                axis != Axis::Attribute
                    && matches!(&target.kind, NodeKind::Element { name: n, .. } if Some(*n) == *name)
            }
        }
    }

    fn string_value(&self, node: NodeRef) -> Cow<'t, str> {
        let tree = self.tree;
        let target = &tree.nodes[node.node];
        match (node.attribute, &target.kind) {
            (Some(index), _) => Cow::Borrowed(&target.attributes()[index].value),
            (None, NodeKind::Text(text) | NodeKind::Comment(text) | NodeKind::Instruction(text)) => {
                Cow::Borrowed(text)
            }
            (None, _) => Cow::Owned(tree.string_value(node.node)),
        }
    }

    fn node_name(&self, node: NodeRef) -> Option<&'t str> {
        let tree = self.tree;
        match node.attribute {
            Some(index) => {
                let name = tree.nodes[node.node].attributes()[index].name;
                Some(tree.names().resolve(name))
            }
            None => tree.name(node.node),
        }
    }

    /// XPath `string()` of a value
    pub fn string(&self, value: &Value) -> String {
        match value {
            Value::Nodes(nodes) => nodes
                .first()
                .map(|&node| self.string_value(node).into_owned())
                .unwrap_or_default(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
        }
    }

    /// XPath `number()` of a value
    pub fn number(&self, value: &Value) -> f64 {
        match value {
            Value::Nodes(_) => string_to_number(&self.string(value)),
            other => other.atom().number(),
        }
    }

    fn compare(&self, op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
        match (lhs, rhs) {
            (Value::Nodes(left), Value::Nodes(right)) => {
                let right: Vec<Cow<str>> = right.iter().map(|&node| self.string_value(node)).collect();
                left.iter().any(|&node| {
                    let left = self.string_value(node);
                    right
                        .iter()
                        .any(|r| compare_atoms(op, Atom::Str(&left), Atom::Str(r)))
                })
            }
            (Value::Nodes(nodes), other) => self.compare_nodes(op, nodes, other),
            (other, Value::Nodes(nodes)) => self.compare_nodes(op.flip(), nodes, other),
            _ => compare_atoms(op, lhs.atom(), rhs.atom()),
        }
    }

    /// Compare a node-set (left) with a scalar (right)
    fn compare_nodes(&self, op: CompareOp, nodes: &[NodeRef], other: &Value) -> bool {
        match other.atom() {
            Atom::Boolean(b) => compare_atoms(op, Atom::Boolean(!nodes.is_empty()), Atom::Boolean(b)),
            atom => nodes
                .iter()
                .any(|&node| compare_atoms(op, Atom::Str(&self.string_value(node)), atom)),
        }
    }

    fn arg(&self, function: Function, args: &[Expr], index: usize, ctx: Context) -> Result<Value, EvalError> {
        let arg = args
            .get(index)
            .ok_or(EvalError::MissingArgument(function.name(), index + 1))?;
        self.eval(arg, ctx)
    }

    fn string_arg(&self, function: Function, args: &[Expr], index: usize, ctx: Context) -> Result<String, EvalError> {
        Ok(self.string(&self.arg(function, args, index, ctx)?))
    }

    fn number_arg(&self, function: Function, args: &[Expr], index: usize, ctx: Context) -> Result<f64, EvalError> {
        Ok(self.number(&self.arg(function, args, index, ctx)?))
    }

    fn nodes_arg(&self, function: Function, args: &[Expr], index: usize, ctx: Context) -> Result<Vec<NodeRef>, EvalError> {
        into_nodes(self.arg(function, args, index, ctx)?, function.name())
    }

    /// String of the single optional argument, defaulting to the context node
    fn string_or_context(&self, function: Function, args: &[Expr], ctx: Context) -> Result<String, EvalError> {
        if args.is_empty() {
            Ok(self.string_value(ctx.node).into_owned())
        } else {
            self.string_arg(function, args, 0, ctx)
        }
    }

    fn call(&self, function: Function, args: &[Expr], ctx: Context) -> Result<Value, EvalError> {
        let value = match function {
            Function::Last => Value::Number(ctx.size as f64),
            Function::Position => Value::Number(ctx.position as f64),
            Function::Count => Value::Number(self.nodes_arg(function, args, 0, ctx)?.len() as f64),
            Function::Name | Function::LocalName => {
                let node = if args.is_empty() {
                    Some(ctx.node)
                } else {
                    self.nodes_arg(function, args, 0, ctx)?.first().copied()
                };
                let name = node.and_then(|node| self.node_name(node)).unwrap_or("");
                let name = match function {
                    Function::LocalName => name.rsplit(':').next().unwrap_or(name),
                    _ => name,
                };
                Value::String(name.to_string())
            }
            Function::String => Value::String(self.string_or_context(function, args, ctx)?),
            Function::Concat => {
                let mut joined = String::new();
                for index in 0..args.len() {
                    joined.push_str(&self.string_arg(function, args, index, ctx)?);
                }
                Value::String(joined)
            }
            Function::StartsWith | Function::Contains => {
                let haystack = self.string_arg(function, args, 0, ctx)?;
                let needle = self.string_arg(function, args, 1, ctx)?;
                Value::Boolean(match function {
                    Function::StartsWith => haystack.starts_with(&needle),
                    _ => haystack.contains(&needle),
                })
            }
            Function::SubstringBefore => {
                let haystack = self.string_arg(function, args, 0, ctx)?;
                let needle = self.string_arg(function, args, 1, ctx)?;
                let before = haystack.find(&needle).map_or("", |at| &haystack[..at]);
                Value::String(before.to_string())
            }
            Function::SubstringAfter => {
                let haystack = self.string_arg(function, args, 0, ctx)?;
                let needle = self.string_arg(function, args, 1, ctx)?;
                let after = haystack
                    .find(&needle)
                    .map_or("", |at| &haystack[at + needle.len()..]);
                Value::String(after.to_string())
            }
            Function::Substring => {
                let s = self.string_arg(function, args, 0, ctx)?;
                let start = self.number_arg(function, args, 1, ctx)?;
                let length = if args.len() > 2 {
                    Some(self.number_arg(function, args, 2, ctx)?)
                } else {
                    None
                };
                Value::String(substring(&s, start, length))
            }
            Function::StringLength => {
                Value::Number(self.string_or_context(function, args, ctx)?.chars().count() as f64)
            }
            Function::NormalizeSpace => {
                Value::String(normalize_space(&self.string_or_context(function, args, ctx)?))
            }
            Function::Translate => {
                let s = self.string_arg(function, args, 0, ctx)?;
                let from = self.string_arg(function, args, 1, ctx)?;
                let to = self.string_arg(function, args, 2, ctx)?;
                Value::String(translate(&s, &from, &to))
            }
            Function::Boolean => Value::Boolean(self.arg(function, args, 0, ctx)?.to_boolean()),
            Function::Not => Value::Boolean(!self.arg(function, args, 0, ctx)?.to_boolean()),
            Function::True => Value::Boolean(true),
            Function::False => Value::Boolean(false),
            Function::Number => Value::Number(if args.is_empty() {
                string_to_number(&self.string_value(ctx.node))
            } else {
                self.number_arg(function, args, 0, ctx)?
            }),
            Function::Sum => Value::Number(
                self.nodes_arg(function, args, 0, ctx)?
                    .into_iter()
                    .map(|node| string_to_number(&self.string_value(node)))
                    .sum(),
            ),
            Function::Floor => Value::Number(self.number_arg(function, args, 0, ctx)?.floor()),
            Function::Ceiling => Value::Number(self.number_arg(function, args, 0, ctx)?.ceil()),
            Function::Round => Value::Number(round(self.number_arg(function, args, 0, ctx)?)),
        };
        Ok(value)
    }
}

fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// XPath number conversion: optional minus, digits, at most one point
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim_matches(is_xml_space);
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    let well_formed = unsigned.chars().any(|c| c.is_ascii_digit())
        && unsigned.chars().all(|c| c.is_ascii_digit() || c == '.')
        && unsigned.matches('.').count() <= 1;
    if well_formed {
        s.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// Round half up, leaving NaN and infinities alone
fn round(n: f64) -> f64 {
    if n.is_finite() { (n + 0.5).floor() } else { n }
}

fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    let first = round(start);
    let end = length.map_or(f64::INFINITY, |length| first + round(length));
    s.chars()
        .enumerate()
        .filter(|&(index, _)| {
            let position = (index + 1) as f64;
            position >= first && position < end
        })
        .map(|(_, c)| c)
        .collect()
}

fn normalize_space(s: &str) -> String {
    s.split(is_xml_space)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn translate(s: &str, from: &str, to: &str) -> String {
    let to: Vec<char> = to.chars().collect();
    s.chars()
        .filter_map(|c| match from.chars().position(|f| f == c) {
            Some(index) => to.get(index).copied(),
            None => Some(c),
        })
        .collect()
}
