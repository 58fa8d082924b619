use std::{fmt, sync::Arc};

use anyhow::Context;
use folk_grid::{render_value, Assignment, ConstrainedGrid, ParamGrid, ParameterGrid};
use serde::de::DeserializeOwned;

/// Builds an estimator from a parameter assignment.
pub type ModelGetter<M> = Arc<dyn Fn(&Assignment) -> anyhow::Result<M> + Send + Sync>;

/// Names a model variant from its parameter assignment.
pub type ModelIdGetter = Arc<dyn Fn(&Assignment) -> String + Send + Sync>;

/// Default model id: `key=value` pairs in assignment order, joined by `_`.
///
/// `{a: 1, b: "x"}` becomes `a=1_b=x`.
#[must_use]
pub fn default_model_id(params: &Assignment) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={}", render_value(value)))
        .collect::<Vec<_>>()
        .join("_")
}

/// A model factory paired with a parameter grid and an id-naming function.
///
/// When the grid is a [`ConstrainedGrid`] the model also supports
/// [`ParameterizedModel::partial`].
pub struct ParameterizedModel<M, G = ParameterGrid> {
    model_getter: ModelGetter<M>,
    param_grid: Arc<G>,
    model_id_getter: ModelIdGetter,
}

/// A parameterized model over a constrained cross-product grid.
pub type ConstrainedParameterizedModel<M> = ParameterizedModel<M, ParameterGrid>;

impl<M, G: ParamGrid> ParameterizedModel<M, G> {
    /// Creates a parameterized model from an untyped factory, using [`default_model_id`].
    pub fn new<F>(model_getter: F, param_grid: G) -> Self
    where
        F: Fn(&Assignment) -> anyhow::Result<M> + Send + Sync + 'static,
    {
        Self {
            model_getter: Arc::new(model_getter),
            param_grid: Arc::new(param_grid),
            model_id_getter: Arc::new(default_model_id),
        }
    }

    /// Creates a parameterized model whose factory takes a typed record
    /// deserialized from each assignment. Undeclared keys are dropped.
    pub fn typed<T, F>(param_grid: G, build: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(T) -> anyhow::Result<M> + Send + Sync + 'static,
    {
        Self::new(
            move |params: &Assignment| {
                let record = params
                    .extract::<T>()
                    .with_context(|| format!("reading model params {params}"))?;
                build(record)
            },
            param_grid,
        )
    }

    /// Replaces the id-naming function.
    #[must_use]
    pub fn with_id_getter<F>(mut self, model_id_getter: F) -> Self
    where
        F: Fn(&Assignment) -> String + Send + Sync + 'static,
    {
        self.model_id_getter = Arc::new(model_id_getter);
        self
    }

    /// The parameter grid.
    #[must_use]
    pub fn grid(&self) -> &G {
        &self.param_grid
    }

    /// Iterates all realized models, in grid order.
    pub fn iter(&self) -> impl Iterator<Item = anyhow::Result<M>> + '_ {
        self.param_grid
            .assignments()
            .map(move |params| (self.model_getter)(&params))
    }

    /// Iterates `(model, params)` pairs, in grid order.
    pub fn model_n_params_iter(&self) -> impl Iterator<Item = anyhow::Result<(M, Assignment)>> + '_ {
        self.param_grid.assignments().map(move |params| {
            let model = (self.model_getter)(&params)?;
            Ok((model, params))
        })
    }

    /// Realizes the model for the given params.
    pub fn model_by_params(&self, params: &Assignment) -> anyhow::Result<M> {
        (self.model_getter)(params)
    }

    /// Names the model for the given params.
    #[must_use]
    pub fn model_id_by_params(&self, params: &Assignment) -> String {
        (self.model_id_getter)(params)
    }

    /// Whether both models realize and name variants with the very same functions.
    #[must_use]
    pub fn shares_getters_with<H>(&self, other: &ParameterizedModel<M, H>) -> bool {
        Arc::ptr_eq(&self.model_getter, &other.model_getter)
            && Arc::ptr_eq(&self.model_id_getter, &other.model_id_getter)
    }
}

impl<M, G: ConstrainedGrid> ParameterizedModel<M, G> {
    /// Returns a new parameterized model restricted by a, possibly partial,
    /// assignment. Keys that are not parameters of the grid are ignored; the
    /// factory and id function are shared with `self`.
    #[must_use]
    pub fn partial(&self, assign: &Assignment) -> Self {
        Self {
            model_getter: Arc::clone(&self.model_getter),
            param_grid: Arc::new(self.param_grid.partial(assign)),
            model_id_getter: Arc::clone(&self.model_id_getter),
        }
    }
}

impl<M, G> Clone for ParameterizedModel<M, G> {
    fn clone(&self) -> Self {
        Self {
            model_getter: Arc::clone(&self.model_getter),
            param_grid: Arc::clone(&self.param_grid),
            model_id_getter: Arc::clone(&self.model_id_getter),
        }
    }
}

impl<M, G: fmt::Debug> fmt::Debug for ParameterizedModel<M, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterizedModel")
            .field("param_grid", &self.param_grid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folk_learn::{LogisticRegression, Penalty};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct ModelParams {
        penalty: Penalty,
        #[serde(rename = "C")]
        c: f64,
    }

    fn pmodel() -> ConstrainedParameterizedModel<LogisticRegression> {
        let grid = ParameterGrid::new()
            .with_param("penalty", ["l1", "l2"])
            .with_param("C", [0.3, 0.6, 0.9]);
        ParameterizedModel::typed(grid, |params: ModelParams| {
            Ok(LogisticRegression::new(params.penalty, params.c))
        })
    }

    #[test]
    fn realizes_every_variant() {
        let pmodel = pmodel();
        let models: Vec<_> = pmodel.iter().map(Result::unwrap).collect();
        assert_eq!(models.len(), 6);
        assert!(models.iter().all(|model| !model.is_fitted()));
        let model = pmodel
            .model_by_params(&Assignment::new().with("penalty", "l1").with("C", 0.3))
            .unwrap();
        assert_eq!(model.penalty(), Penalty::L1);
        assert!((model.c() - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn point_lookup_and_default_ids_match_iteration() {
        let pmodel = pmodel();
        for item in pmodel.model_n_params_iter() {
            let (model, params) = item.unwrap();
            let looked_up = pmodel.model_by_params(&params).unwrap();
            assert_eq!(looked_up.penalty(), model.penalty());
            assert!((looked_up.c() - model.c()).abs() < f64::EPSILON);
            let expected = params
                .iter()
                .map(|(k, v)| format!("{k}={}", render_value(v)))
                .collect::<Vec<_>>()
                .join("_");
            assert_eq!(pmodel.model_id_by_params(&params), expected);
        }
        let first = pmodel.grid().iter().next().unwrap();
        assert_eq!(pmodel.model_id_by_params(&first), "C=0.3_penalty=l1");
    }

    #[test]
    fn default_id_follows_assignment_order() {
        let params = Assignment::new().with("a", 1).with("b", "x");
        assert_eq!(default_model_id(&params), "a=1_b=x");
        assert_eq!(default_model_id(&Assignment::new()), "");
    }

    #[test]
    fn partial_keeps_getters_and_restricts_grid() {
        let pmodel = pmodel().with_id_getter(|params| format!("logreg-{}", params.len()));
        let assign = Assignment::new()
            .with("penalty", "l2")
            .with("lower", true)
            .with("lbl_col", "rank");
        let restricted = pmodel.partial(&assign);
        assert!(restricted.shares_getters_with(&pmodel));
        assert!(!restricted.shares_getters_with(&self::pmodel()));
        let params: Vec<_> = restricted.grid().iter().collect();
        assert_eq!(params.len(), 3);
        for candidate in &params {
            assert!(candidate.agrees_with(&assign));
            assert!(pmodel.grid().iter().any(|original| &original == candidate));
        }
        assert_eq!(restricted.model_id_by_params(&params[0]), "logreg-2");
        assert_eq!(pmodel.partial(&Assignment::new().with("C", json!([0.6]))).grid().len(), 2);
    }

    #[test]
    fn list_grids_are_constrained_too() {
        let pmodel = ParameterizedModel::new(
            |params: &Assignment| Ok(params.len()),
            vec![
                Assignment::new().with("depth", 1),
                Assignment::new().with("depth", 2),
            ],
        );
        let restricted = pmodel.partial(&Assignment::new().with("depth", 2));
        assert_eq!(restricted.iter().map(Result::unwrap).count(), 1);
    }
}
