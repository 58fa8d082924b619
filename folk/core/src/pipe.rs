use std::{fmt, sync::Arc};

use anyhow::Context;
use folk_grid::{Assignment, ParamGrid, ParameterGrid};
use serde::de::DeserializeOwned;

/// Builds a realized pipeline from a parameter assignment.
pub type PipelineGetter<P> = Arc<dyn Fn(&Assignment) -> anyhow::Result<P> + Send + Sync>;

/// A pipeline factory paired with the grid of assignments it is realized over.
///
/// Written with [`folk_learn::Pipeline`] in mind, but `P` can be anything; the
/// evaluation driver only requires it to implement [`folk_learn::Transform`].
pub struct ParameterizedPipeline<P, G = ParameterGrid> {
    pipeline_getter: PipelineGetter<P>,
    param_grid: Arc<G>,
}

impl<P, G: ParamGrid> ParameterizedPipeline<P, G> {
    /// Creates a parameterized pipeline from an untyped factory.
    ///
    /// The factory receives the full assignment and should ignore keys it does
    /// not recognize.
    pub fn new<F>(pipeline_getter: F, param_grid: G) -> Self
    where
        F: Fn(&Assignment) -> anyhow::Result<P> + Send + Sync + 'static,
    {
        Self::with_shared_grid(Arc::new(pipeline_getter), Arc::new(param_grid))
    }

    /// Creates a parameterized pipeline whose factory takes a typed record.
    ///
    /// The record is deserialized from each assignment; keys it does not
    /// declare are dropped.
    pub fn typed<T, F>(param_grid: G, build: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(T) -> anyhow::Result<P> + Send + Sync + 'static,
    {
        Self::new(
            move |params: &Assignment| {
                let record = params
                    .extract::<T>()
                    .with_context(|| format!("reading pipeline params {params}"))?;
                build(record)
            },
            param_grid,
        )
    }

    /// Creates a parameterized pipeline over a grid shared with other owners.
    #[must_use]
    pub fn with_shared_grid(pipeline_getter: PipelineGetter<P>, param_grid: Arc<G>) -> Self {
        Self {
            pipeline_getter,
            param_grid,
        }
    }

    /// The parameter grid.
    #[must_use]
    pub fn grid(&self) -> &G {
        &self.param_grid
    }

    /// Iterates all realized pipelines, in grid order.
    pub fn iter(&self) -> impl Iterator<Item = anyhow::Result<P>> + '_ {
        self.param_grid
            .assignments()
            .map(move |params| (self.pipeline_getter)(&params))
    }

    /// Iterates `(pipeline, params)` pairs, in grid order.
    pub fn pipe_n_params_iter(&self) -> impl Iterator<Item = anyhow::Result<(P, Assignment)>> + '_ {
        self.param_grid.assignments().map(move |params| {
            let pipeline = (self.pipeline_getter)(&params)?;
            Ok((pipeline, params))
        })
    }

    /// Realizes the pipeline for the given params.
    pub fn pipeline_by_params(&self, params: &Assignment) -> anyhow::Result<P> {
        (self.pipeline_getter)(params)
    }
}

impl<P, G> Clone for ParameterizedPipeline<P, G> {
    fn clone(&self) -> Self {
        Self {
            pipeline_getter: Arc::clone(&self.pipeline_getter),
            param_grid: Arc::clone(&self.param_grid),
        }
    }
}

impl<P, G: fmt::Debug> fmt::Debug for ParameterizedPipeline<P, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterizedPipeline")
            .field("param_grid", &self.param_grid)
            .finish_non_exhaustive()
    }
}
