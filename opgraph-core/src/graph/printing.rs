//! Textual rendering of subgraphs.

use std::collections::HashSet;

use indexmap::IndexSet;

use super::walk::{applys_between, orphans_between};
use super::{ApplyId, Graph, VarId, VarKind};
use crate::error::Result;
use crate::op::OpRef;

impl Graph {
    /// Short description of a variable: its name, the op output it is,
    /// its constant data, or its type.
    pub fn describe_var(&self, var: VarId) -> String {
        let Ok(v) = self.var(var) else {
            return format!("<unknown {var}>");
        };
        if let Some(name) = v.name() {
            return name.to_string();
        }
        match v.kind() {
            VarKind::Plain { owner: Some(owner) } => {
                let op = self.apply(owner.apply).map(|a| a.op().clone());
                match op {
                    Ok(op) if op.default_output() == Some(owner.index) => format!("{op}.out"),
                    Ok(op) => format!("{op}.{}", owner.index),
                    Err(_) => format!("<{}>", v.ty()),
                }
            }
            VarKind::Constant(value) => {
                let data = value.to_string();
                if data.chars().count() > 20 {
                    let head: String = data.chars().take(10).collect();
                    let tail: String = data.chars().skip(data.chars().count() - 10).collect();
                    format!("{} ... {}", head.trim(), tail.trim())
                } else {
                    data
                }
            }
            VarKind::Nominal(id) => format!("*{id}-<{}>", v.ty()),
            VarKind::Plain { owner: None } | VarKind::Shared(_) => format!("<{}>", v.ty()),
        }
    }
}

/// `op(arg, ...)`.
pub fn default_node_formatter(op: &OpRef, args: &[String]) -> String {
    format!("{}({})", op, args.join(", "))
}

/// One string per output describing how it is computed from `inputs`.
///
/// A node used more than once is written out the first time as
/// `*n -> description` and referred to as `*n` afterwards.
pub fn as_string(graph: &Graph, inputs: &[VarId], outputs: &[VarId]) -> Vec<String> {
    as_string_with(
        graph,
        inputs,
        outputs,
        |g, v| g.describe_var(v),
        default_node_formatter,
    )
}

/// [`as_string`] with custom formatters for leaves and nodes.
pub fn as_string_with<L, N>(
    graph: &Graph,
    inputs: &[VarId],
    outputs: &[VarId],
    leaf: L,
    node: N,
) -> Vec<String>
where
    L: Fn(&Graph, VarId) -> String,
    N: Fn(&OpRef, &[String]) -> String,
{
    let input_set: HashSet<VarId> = inputs.iter().copied().collect();
    let orphans: HashSet<VarId> = orphans_between(graph, inputs, outputs).collect();

    let mut seen: HashSet<ApplyId> = HashSet::new();
    let mut multi: IndexSet<ApplyId> = IndexSet::new();
    for output in outputs {
        if let Some(owner) = graph.owner_of(*output) {
            if !seen.insert(owner.apply) {
                multi.insert(owner.apply);
            }
        }
    }
    for apply in applys_between(graph, inputs, outputs) {
        for input in graph.inputs_of(apply) {
            if input_set.contains(input) || orphans.contains(input) {
                continue;
            }
            if let Some(owner) = graph.owner_of(*input) {
                if !seen.insert(owner.apply) {
                    multi.insert(owner.apply);
                }
            }
        }
    }

    let mut printer = Printer {
        graph,
        inputs: &input_set,
        orphans: &orphans,
        multi: &multi,
        done: HashSet::new(),
        leaf: &leaf,
        node: &node,
    };
    outputs.iter().map(|o| printer.describe(*o)).collect()
}

/// Describe `apply` in terms of `inputs`.
pub fn op_as_string(graph: &Graph, inputs: &[VarId], apply: ApplyId) -> Result<String> {
    let node = graph.apply(apply)?;
    let args = as_string(graph, inputs, node.inputs());
    Ok(default_node_formatter(node.op(), &args))
}

struct Printer<'a, L, N> {
    graph: &'a Graph,
    inputs: &'a HashSet<VarId>,
    orphans: &'a HashSet<VarId>,
    multi: &'a IndexSet<ApplyId>,
    done: HashSet<ApplyId>,
    leaf: &'a L,
    node: &'a N,
}

/// Pending work of [`Printer::describe`].
enum Step {
    Visit(VarId),
    /// Combine the last `nin` descriptions into a call of `op`.
    Finish {
        op: OpRef,
        nin: usize,
        marker: Option<usize>,
    },
}

/// What visiting a variable produced.
enum Entered<'a> {
    Text(String),
    Node {
        op: OpRef,
        inputs: &'a [VarId],
        marker: Option<usize>,
    },
}

impl<'a, L, N> Printer<'a, L, N>
where
    L: Fn(&Graph, VarId) -> String,
    N: Fn(&OpRef, &[String]) -> String,
{
    /// Post-order over the inputs of `var` on an explicit stack; children
    /// are described left to right, as their markers are numbered.
    fn describe(&mut self, var: VarId) -> String {
        let mut steps = vec![Step::Visit(var)];
        let mut texts: Vec<String> = Vec::new();
        while let Some(step) = steps.pop() {
            match step {
                Step::Visit(var) => match self.enter(var) {
                    Entered::Text(text) => texts.push(text),
                    Entered::Node { op, inputs, marker } => {
                        steps.push(Step::Finish {
                            op,
                            nin: inputs.len(),
                            marker,
                        });
                        steps.extend(inputs.iter().rev().map(|i| Step::Visit(*i)));
                    }
                },
                Step::Finish { op, nin, marker } => {
                    let args = texts.split_off(texts.len() - nin);
                    let text = (self.node)(&op, &args);
                    texts.push(match marker {
                        Some(n) => format!("*{n} -> {text}"),
                        None => text,
                    });
                }
            }
        }
        texts.pop().unwrap_or_default()
    }

    fn enter(&mut self, var: VarId) -> Entered<'a> {
        let graph = self.graph;
        let owner = match graph.owner_of(var) {
            Some(owner) if !self.inputs.contains(&var) && !self.orphans.contains(&var) => owner,
            _ => return Entered::Text((self.leaf)(graph, var)),
        };
        let Ok(apply) = graph.apply(owner.apply) else {
            return Entered::Text((self.leaf)(graph, var));
        };
        let marker = self.multi.get_index_of(&owner.apply).map(|i| i + 1);

        if !self.done.insert(owner.apply) {
            if let Some(n) = marker {
                let suffix = if apply.nout() == 1 {
                    String::new()
                } else {
                    format!("::{}", owner.index)
                };
                return Entered::Text(format!("*{n}{suffix}"));
            }
        }
        Entered::Node {
            op: apply.op().clone(),
            inputs: apply.inputs(),
            marker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{add, fscalar, mul, neg};
    use crate::value::{DType, Value};

    #[test]
    fn renders_nested_expression() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), Some("x"));
        let y = graph.variable(fscalar(), Some("y"));
        let xy = add(&mut graph, x, y);
        let out = mul(&mut graph, xy, x);

        assert_eq!(as_string(&graph, &[x, y], &[out]), vec!["mul(add(x, y), x)"]);
    }

    #[test]
    fn shared_nodes_get_markers() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), Some("x"));
        let nx = neg(&mut graph, x);
        let out = add(&mut graph, nx, nx);

        assert_eq!(
            as_string(&graph, &[x], &[out]),
            vec!["add(*1 -> neg(x), *1)"]
        );
    }

    #[test]
    fn leaves_describe_themselves() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let c = graph
            .constant(fscalar(), Value::scalar(DType::Float64, 2.5), None)
            .unwrap();
        let n = graph.nominal(fscalar(), 4);

        assert_eq!(graph.describe_var(x), format!("<{}>", fscalar()));
        assert_eq!(graph.describe_var(c), "2.5");
        assert_eq!(graph.describe_var(n), format!("*4-<{}>", fscalar()));

        let long = graph
            .constant(
                crate::test_utils::f64v(),
                Value::vector(DType::Float64, (0..30).map(f64::from).collect()),
                None,
            )
            .unwrap();
        let text = graph.describe_var(long);
        assert!(text.starts_with("[0, 1, 2,"));
        assert!(text.contains(" ... "));
        assert!(text.ends_with("28, 29]"));
    }

    #[test]
    fn op_outputs_describe_their_position() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let out = neg(&mut graph, x);
        assert_eq!(graph.describe_var(out), "neg.0");
    }

    #[test]
    fn deep_expressions_render() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), Some("x"));
        let mut v = x;
        for _ in 0..50_000 {
            v = neg(&mut graph, v);
        }
        let text = as_string(&graph, &[x], &[v]).remove(0);
        assert!(text.starts_with("neg(neg("));
        assert!(text.ends_with("(x))"));
        assert_eq!(text.matches("neg(").count(), 50_000);
    }

    #[test]
    fn op_as_string_uses_inputs_as_leaves() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), Some("x"));
        let nx = neg(&mut graph, x);
        let out = add(&mut graph, nx, x);
        let apply = graph.var(out).unwrap().owner().unwrap().apply;

        assert_eq!(op_as_string(&graph, &[x], apply).unwrap(), "add(neg(x), x)");
        assert_eq!(op_as_string(&graph, &[nx, x], apply).unwrap(), "add(neg.0, x)");
    }
}
