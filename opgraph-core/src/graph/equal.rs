//! Structural equivalence of computations.

use std::collections::HashSet;

use super::{ApplyId, Graph, VarId};
use crate::error::{GraphError, Result};

/// Whether `xs[i]` and `ys[i]` compute the same function for every `i`.
///
/// `in_xs[i]` and `in_ys[i]` are taken to be the same input. Other roots
/// must be the very same variable, or constants holding equal data. With
/// `strict_dtype == false` constants of different dtypes are compared by
/// value.
///
/// Fails only when `xs` and `ys` differ in length; every other mismatch is
/// `Ok(false)`.
pub fn equal_computations(
    graph: &Graph,
    xs: &[VarId],
    ys: &[VarId],
    in_xs: &[VarId],
    in_ys: &[VarId],
    strict_dtype: bool,
) -> Result<bool> {
    if xs.len() != ys.len() {
        return Err(GraphError::LengthMismatch {
            left: xs.len(),
            right: ys.len(),
        });
    }

    for (&x, &y) in xs.iter().zip(ys) {
        let (xv, yv) = (graph.var(x)?, graph.var(y)?);
        match (xv.owner(), yv.owner()) {
            (Some(ox), Some(oy)) if ox.index != oy.index => return Ok(false),
            (Some(_), None) | (None, Some(_)) => return Ok(false),
            _ => {}
        }
        if !in_xs.contains(&x) && !yv.ty().in_same_class(&**xv.ty()) {
            return Ok(false);
        }
    }

    if in_xs.len() != in_ys.len() {
        return Ok(false);
    }
    for (&x, &y) in in_xs.iter().zip(in_ys) {
        if !graph.var(y)?.ty().in_same_class(&**graph.var(x)?.ty()) {
            return Ok(false);
        }
    }

    let mut checker = Checker {
        graph,
        strict_dtype,
        common: in_xs.iter().copied().zip(in_ys.iter().copied()).collect(),
        different: HashSet::new(),
    };

    for (&x, &y) in xs.iter().zip(ys) {
        if graph.var(x)?.owner().is_some() {
            continue;
        }
        let both_constant = graph.var(x)?.is_constant() && graph.var(y)?.is_constant();
        if both_constant {
            if !checker.constants_equal(x, y, true)? {
                return Ok(false);
            }
        } else if x != y && !checker.common.contains(&(x, y)) {
            return Ok(false);
        }
    }

    for (&x, &y) in xs.iter().zip(ys) {
        if let (Some(ox), Some(oy)) = (graph.var(x)?.owner(), graph.var(y)?.owner()) {
            if !checker.nodes_equal(ox.apply, oy.apply)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Pairs already proven equal (`common`) or unequal (`different`) are
/// remembered so shared subgraphs are compared once.
struct Checker<'g> {
    graph: &'g Graph,
    strict_dtype: bool,
    common: HashSet<(VarId, VarId)>,
    different: HashSet<(VarId, VarId)>,
}

impl Checker<'_> {
    fn constants_equal(&self, x: VarId, y: VarId, strict_dtype: bool) -> Result<bool> {
        let (xv, yv) = (self.graph.var(x)?, self.graph.var(y)?);
        let (Some(a), Some(b)) = (xv.constant_value(), yv.constant_value()) else {
            return Ok(false);
        };
        if xv.ty() == yv.ty() && xv.ty().values_eq(a, b) {
            return Ok(true);
        }
        Ok(!strict_dtype && a.same_data(b))
    }

    /// Answers that need no descent into inputs: identity, op or arity
    /// mismatch, and outputs already known equal or unequal.
    fn shallow(&self, ax: ApplyId, ay: ApplyId) -> Result<Option<bool>> {
        if ax == ay {
            return Ok(Some(true));
        }
        let (nx, ny) = (self.graph.apply(ax)?, self.graph.apply(ay)?);
        if nx.op() != ny.op() || nx.nin() != ny.nin() || nx.nout() != ny.nout() {
            return Ok(Some(false));
        }

        let mut all_common = true;
        for pair in nx.outputs().iter().copied().zip(ny.outputs().iter().copied()) {
            if self.different.contains(&pair) {
                return Ok(Some(false));
            }
            all_common &= self.common.contains(&pair);
        }
        Ok(all_common.then_some(true))
    }

    /// Paired descent from `(ax, ay)` towards the roots on an explicit
    /// stack, so graph depth is bounded by memory only.
    fn nodes_equal(&mut self, ax: ApplyId, ay: ApplyId) -> Result<bool> {
        if let Some(known) = self.shallow(ax, ay)? {
            return Ok(known);
        }
        let graph = self.graph;
        let mut stack = vec![Frame {
            x: ax,
            y: ay,
            via: None,
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let (nx, ny) = (graph.apply(frame.x)?, graph.apply(frame.y)?);
            let Some((&dx, &dy)) = nx.inputs().get(frame.next).zip(ny.inputs().get(frame.next))
            else {
                for pair in nx.outputs().iter().copied().zip(ny.outputs().iter().copied()) {
                    self.common.insert(pair);
                }
                stack.pop();
                continue;
            };
            frame.next += 1;

            if self.common.contains(&(dx, dy)) {
                continue;
            }
            let equal = match (graph.var(dx)?.owner(), graph.var(dy)?.owner()) {
                (Some(ox), Some(oy)) if ox.index == oy.index => {
                    match self.shallow(ox.apply, oy.apply)? {
                        Some(true) => true,
                        Some(false) => {
                            self.different.insert((dx, dy));
                            false
                        }
                        None => {
                            stack.push(Frame {
                                x: ox.apply,
                                y: oy.apply,
                                via: Some((dx, dy)),
                                next: 0,
                            });
                            continue;
                        }
                    }
                }
                (None, None) if dx == dy => true,
                (None, None) => {
                    graph.var(dx)?.is_constant()
                        && graph.var(dy)?.is_constant()
                        && self.constants_equal(dx, dy, self.strict_dtype)?
                }
                _ => false,
            };
            if !equal {
                // Every pair on the path to the mismatch differs too.
                self.different.extend(stack.iter().filter_map(|f| f.via));
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// One pending pair of applies in [`Checker::nodes_equal`].
struct Frame {
    x: ApplyId,
    y: ApplyId,
    /// The input pair whose owners these are.
    via: Option<(VarId, VarId)>,
    /// Index of the next input pair to compare.
    next: usize,
}
