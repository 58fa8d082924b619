use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assignment::{accepts, Assignment};

/// An iterable source of parameter assignments.
pub trait ParamGrid {
    /// Yields every assignment of the grid, in grid order.
    fn assignments(&self) -> Box<dyn Iterator<Item = Assignment> + '_>;

    /// Number of assignments the grid yields.
    fn len(&self) -> usize;

    /// Whether the grid yields nothing.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A grid that can be restricted by a partial assignment.
pub trait ConstrainedGrid: ParamGrid + Sized {
    /// Returns a new grid holding only the assignments consistent with `assign`.
    ///
    /// Keys of `assign` that are not parameters of this grid are ignored.
    #[must_use]
    fn partial(&self, assign: &Assignment) -> Self;
}

/// An explicit list of assignments is a grid.
impl ParamGrid for Vec<Assignment> {
    fn assignments(&self) -> Box<dyn Iterator<Item = Assignment> + '_> {
        Box::new(self.iter().cloned())
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

impl ConstrainedGrid for Vec<Assignment> {
    fn partial(&self, assign: &Assignment) -> Self {
        self.iter()
            .filter(|candidate| candidate.agrees_with(assign))
            .cloned()
            .collect()
    }
}

/// Cross-product grid over named option lists.
///
/// Parameters are kept sorted by name and the last parameter varies fastest,
/// so `{penalty: [l1, l2], C: [0.3, 0.6]}` yields `C=0.3,penalty=l1`,
/// `C=0.3,penalty=l2`, `C=0.6,penalty=l1`, `C=0.6,penalty=l2`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    options: IndexMap<String, Vec<Value>>,
}

impl ParameterGrid {
    /// Creates a grid without parameters (it yields one empty assignment).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a parameter and its options.
    #[must_use]
    pub fn with_param<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.options
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self.options.sort_keys();
        self
    }

    /// Options of a parameter.
    #[must_use]
    pub fn options(&self, name: &str) -> Option<&[Value]> {
        self.options.get(name).map(Vec::as_slice)
    }

    /// Parameter names in grid order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.options.keys().map(String::as_str)
    }

    /// Iterates the grid.
    #[must_use]
    pub fn iter(&self) -> GridIter<'_> {
        GridIter::new(self)
    }
}

impl ParamGrid for ParameterGrid {
    fn assignments(&self) -> Box<dyn Iterator<Item = Assignment> + '_> {
        Box::new(self.iter())
    }

    fn len(&self) -> usize {
        self.options.values().map(Vec::len).product()
    }
}

impl ConstrainedGrid for ParameterGrid {
    fn partial(&self, assign: &Assignment) -> Self {
        let options = self
            .options
            .iter()
            .map(|(name, values)| {
                let kept = match assign.get(name) {
                    Some(wanted) => values
                        .iter()
                        .filter(|value| accepts(wanted, value))
                        .cloned()
                        .collect(),
                    None => values.clone(),
                };
                (name.clone(), kept)
            })
            .collect();
        Self { options }
    }
}

impl<'a> IntoIterator for &'a ParameterGrid {
    type Item = Assignment;
    type IntoIter = GridIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`ParameterGrid`], an odometer over option indices.
#[derive(Debug, Clone)]
pub struct GridIter<'a> {
    grid: &'a ParameterGrid,
    cursor: Vec<usize>,
    done: bool,
}

impl<'a> GridIter<'a> {
    fn new(grid: &'a ParameterGrid) -> Self {
        let done = grid.options.values().any(Vec::is_empty);
        Self {
            grid,
            cursor: vec![0; grid.options.len()],
            done,
        }
    }

    fn advance(&mut self) {
        for (slot, values) in self.cursor.iter_mut().zip(self.grid.options.values()).rev() {
            *slot += 1;
            if *slot < values.len() {
                return;
            }
            *slot = 0;
        }
        self.done = true;
    }
}

impl Iterator for GridIter<'_> {
    type Item = Assignment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self
            .grid
            .options
            .iter()
            .zip(&self.cursor)
            .map(|((name, values), &idx)| (name.clone(), values[idx].clone()))
            .collect();
        self.advance();
        Some(current)
    }
}
