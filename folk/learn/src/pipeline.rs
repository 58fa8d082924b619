use std::fmt;

use indexmap::IndexMap;

use crate::{
    error::LearnError,
    frame::{Cell, DataFrame},
};

/// Anything that turns a dataframe into a new dataframe.
pub trait Transform {
    /// Applies the transform.
    fn apply(&self, df: DataFrame) -> Result<DataFrame, LearnError>;
}

impl<F> Transform for F
where
    F: Fn(DataFrame) -> Result<DataFrame, LearnError>,
{
    fn apply(&self, df: DataFrame) -> Result<DataFrame, LearnError> {
        self(df)
    }
}

/// Renames columns.
#[derive(Debug, Clone, Default)]
pub struct ColRename {
    mapping: IndexMap<String, String>,
}

impl ColRename {
    /// Creates the stage from `(old, new)` pairs.
    pub fn new<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            mapping: pairs
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .collect(),
        }
    }
}

impl Transform for ColRename {
    fn apply(&self, mut df: DataFrame) -> Result<DataFrame, LearnError> {
        for (from, to) in &self.mapping {
            df.rename_column(from, to.clone())?;
        }
        Ok(df)
    }
}

/// Drops columns.
#[derive(Debug, Clone, Default)]
pub struct ColDrop {
    columns: Vec<String>,
}

impl ColDrop {
    /// Creates the stage.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl Transform for ColDrop {
    fn apply(&self, mut df: DataFrame) -> Result<DataFrame, LearnError> {
        for column in &self.columns {
            df.drop_column(column)?;
        }
        Ok(df)
    }
}

/// Maps every cell of the given columns through a function.
pub struct ApplyByCols {
    columns: Vec<String>,
    func: Box<dyn Fn(&Cell) -> Cell + Send + Sync>,
}

impl ApplyByCols {
    /// Creates the stage.
    pub fn new<I, S, F>(columns: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Cell) -> Cell + Send + Sync + 'static,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for ApplyByCols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplyByCols")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl Transform for ApplyByCols {
    fn apply(&self, mut df: DataFrame) -> Result<DataFrame, LearnError> {
        for column in &self.columns {
            df.map_column(column, &self.func)?;
        }
        Ok(df)
    }
}

/// Ordered sequence of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Transform + Send + Sync>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Transform + Send + Sync + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl Transform for Pipeline {
    fn apply(&self, df: DataFrame) -> Result<DataFrame, LearnError> {
        self.stages
            .iter()
            .try_fold(df, |current, stage| stage.apply(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> DataFrame {
        DataFrame::from_rows(
            ["shleem_count", "rank", "id"],
            vec![
                vec![Cell::Int(23), "A".into(), "e2f".into()],
                vec![Cell::Int(80), "B".into(), "isudgv".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn stages_run_in_order() {
        let pipeline = Pipeline::new()
            .stage(ColRename::new([("shleem_count", "scount")]))
            .stage(ApplyByCols::new(["rank"], |cell: &Cell| {
                cell.as_str()
                    .map_or_else(|| cell.clone(), |text| text.to_lowercase().into())
            }))
            .stage(ColDrop::new(["id"]));
        assert_eq!(pipeline.len(), 3);
        let out = pipeline.apply(raw()).unwrap();
        let names: Vec<_> = out.column_names().collect();
        assert_eq!(names, ["scount", "rank"]);
        assert_eq!(out.column("rank").unwrap()[0], Cell::Text("a".into()));
    }

    #[test]
    fn closures_are_transforms_and_errors_propagate() {
        let failing = |mut df: DataFrame| -> Result<DataFrame, LearnError> {
            df.drop_column("nope")?;
            Ok(df)
        };
        assert!(matches!(
            failing.apply(raw()),
            Err(LearnError::UnknownColumn(_))
        ));
        assert_eq!(Pipeline::new().apply(raw()).unwrap(), raw());
    }
}
