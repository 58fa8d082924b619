use std::{
    fmt,
    io::{self, Write},
    time::Instant,
};

use anyhow::{Context, Result};
use folk_grid::{ConstrainedGrid, ParamGrid};
use folk_learn::{cross_val_score, Classifier, DataFrame, LabelEncoder, StratifiedKFold, Transform};
use folk_logging::LogLevel;
use serde_json::{json, Value};

use crate::{
    error::FolkError,
    metricsdb::{new_run_id, MetricKey, MetricsRegistry, ResultDocument, WriteOutcome},
    model::ParameterizedModel,
    pipe::ParameterizedPipeline,
    telemetry::FolkTelemetry,
};

/// Default number of cross-validation folds.
pub const DEFAULT_N_FOLDS: usize = 5;
/// Default number of cross-validation workers.
pub const DEFAULT_N_JOBS: usize = 1;

/// Knobs of one evaluation call.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Registry name of the db results are written to; `None` writes nothing.
    pub metric_db: Option<String>,
    /// Cross-validation folds.
    pub n_folds: usize,
    /// Cross-validation workers; `1` stays on the calling thread, `0` uses every core.
    pub n_jobs: usize,
    /// Print progress to stdout.
    pub verbose: bool,
    /// Structured run log.
    pub telemetry: Option<FolkTelemetry>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            metric_db: None,
            n_folds: DEFAULT_N_FOLDS,
            n_jobs: DEFAULT_N_JOBS,
            verbose: false,
            telemetry: None,
        }
    }
}

impl EvalOptions {
    /// Options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes results to the named db.
    #[must_use]
    pub fn metric_db(mut self, name: impl Into<String>) -> Self {
        self.metric_db = Some(name.into());
        self
    }

    /// Sets the fold count.
    #[must_use]
    pub const fn n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub const fn n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Toggles progress printing.
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Attaches a telemetry sink.
    #[must_use]
    pub fn telemetry(mut self, telemetry: FolkTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

/// Everything one evaluation call produced.
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    /// Id shared by every document of the call.
    pub run_id: String,
    /// Result documents in evaluation order.
    pub documents: Vec<ResultDocument>,
    /// How many documents a metrics db accepted.
    pub written: usize,
}

/// Progress lines; silent when no writer is attached.
struct Reporter<W> {
    out: Option<W>,
}

impl<W: Write> Reporter<W> {
    fn line(&mut self, args: fmt::Arguments<'_>) {
        let failed = match &mut self.out {
            Some(out) => writeln!(out, "{args}").err(),
            None => None,
        };
        if let Some(err) = failed {
            tracing::debug!(error = %err, "progress output closed");
            self.out = None;
        }
    }
}

/// Telemetry is best effort: a failing sink is reported and the run goes on.
fn record(options: &EvalOptions, message: &str, run_id: &str, metadata: Value) {
    if let Some(telemetry) = &options.telemetry {
        if let Err(err) = telemetry.log(LogLevel::Info, message, Some(run_id), metadata) {
            tracing::warn!(error = %err, event = message, run_id, "telemetry write failed");
        }
    }
}

/// Evaluates every combination of a parameterized pipeline and model.
///
/// Each pipeline variant is applied once to `dataset`; the label column is
/// named by its `lbl_col` parameter. The model grid is then restricted by the
/// pipeline params and every remaining variant is cross-validated on the
/// processed data. Merged params (model params win) land in each result
/// document. The first pipeline, model or cross-validation failure aborts
/// the call; telemetry failures are only logged. Progress goes to stdout when
/// `options.verbose` is set.
pub fn eval_param_pipeline_n_model<P, GP, M, GM>(
    param_pipeline: &ParameterizedPipeline<P, GP>,
    param_model: &ParameterizedModel<M, GM>,
    dataset: &DataFrame,
    registry: &MetricsRegistry,
    options: &EvalOptions,
) -> Result<EvaluationReport>
where
    P: Transform,
    GP: ParamGrid,
    M: Classifier,
    GM: ConstrainedGrid,
{
    evaluate_with_output(
        param_pipeline,
        param_model,
        dataset,
        registry,
        options,
        io::stdout(),
    )
}

fn evaluate_with_output<P, GP, M, GM, W>(
    param_pipeline: &ParameterizedPipeline<P, GP>,
    param_model: &ParameterizedModel<M, GM>,
    dataset: &DataFrame,
    registry: &MetricsRegistry,
    options: &EvalOptions,
    out: W,
) -> Result<EvaluationReport>
where
    P: Transform,
    GP: ParamGrid,
    M: Classifier,
    GM: ConstrainedGrid,
    W: Write,
{
    let mut reporter = Reporter {
        out: options.verbose.then_some(out),
    };
    let run_id = new_run_id();
    let mut report = EvaluationReport {
        run_id: run_id.clone(),
        ..EvaluationReport::default()
    };
    record(
        options,
        "evaluation.start",
        &run_id,
        json!({
            "pipelines": param_pipeline.grid().len(),
            "models": param_model.grid().len(),
            "n_folds": options.n_folds,
            "n_jobs": options.n_jobs,
            "metric_db": options.metric_db,
        }),
    );
    reporter.line(format_args!("============================="));

    for (pipe_idx, item) in param_pipeline.pipe_n_params_iter().enumerate() {
        let (pipeline, pipeline_params) = item?;
        reporter.line(format_args!(
            "Evaluating pipeline {} with params {pipeline_params}...",
            pipe_idx + 1
        ));
        let lbl_col = pipeline_params
            .get_str(MetricKey::LBL_COL)
            .ok_or_else(|| FolkError::MissingLabelColumn(pipeline_params.to_string()))?;
        let df = pipeline
            .apply(dataset.clone())
            .with_context(|| format!("applying pipeline with params {pipeline_params}"))?;
        reporter.line(format_args!("Resulting dataset size: {}", df.len()));
        reporter.line(format_args!("Number of columns: {}", df.n_columns()));

        let (features, labels) = df.split_label(lbl_col)?;
        let x = features.to_feature_matrix()?;
        let encoder = LabelEncoder::fit(&labels);
        let y = encoder.transform(&labels)?;
        let n_classes = encoder.n_classes();
        let cv = StratifiedKFold::new(options.n_folds);
        record(
            options,
            "evaluation.pipeline",
            &run_id,
            json!({
                "params": pipeline_params,
                "dataset_size": df.len(),
                "n_columns": df.n_columns(),
                "n_classes": n_classes,
            }),
        );

        let restricted = param_model.partial(&pipeline_params);
        for item in restricted.model_n_params_iter() {
            let (model, model_params) = item?;
            let model_id = restricted.model_id_by_params(&model_params);
            reporter.line(format_args!("  - Testing {model_id}..."));
            let params = pipeline_params.overridden_by(&model_params);

            let started = Instant::now();
            let scores = cross_val_score(&model, &x, &y, n_classes, &cv, options.n_jobs)
                .with_context(|| format!("cross-validating {model_id}"))?;
            let cv_time = started.elapsed();
            let folds = u32::try_from(cv.n_splits()).unwrap_or(u32::MAX);
            let fold_time = cv_time.checked_div(folds).unwrap_or_default();
            let (acc_mean, acc_std) = (scores.mean(), scores.std());
            reporter.line(format_args!(
                "    Accuracy: {acc_mean:.2} (+/- {:.2})",
                acc_std * 2.0
            ));

            let res_doc = ResultDocument::new()
                .with(MetricKey::RUN_ID, run_id.as_str())
                .with(MetricKey::MODEL_ID, model_id.as_str())
                .with(MetricKey::LBL_COL, lbl_col)
                .with(MetricKey::ACC_MEAN, acc_mean)
                .with(MetricKey::ACC_STD, acc_std)
                .with(MetricKey::N_FOLDS, options.n_folds)
                .with(MetricKey::N_JOBS, options.n_jobs)
                .with(MetricKey::CROSS_VAL_TIME, cv_time.as_secs_f64())
                .with(MetricKey::FOLD_TIME, fold_time.as_secs_f64())
                .with(MetricKey::DATASET_SIZE, df.len())
                .with(MetricKey::N_CLASS, n_classes)
                .with_params(&params);

            if let Some(db_name) = &options.metric_db {
                reporter.line(format_args!("    Writing results to {db_name}..."));
                if registry.write_experiment_res(&res_doc, db_name, Some(&run_id))?
                    == WriteOutcome::Written
                {
                    report.written += 1;
                }
            }
            record(
                options,
                "evaluation.result",
                &run_id,
                json!({
                    "model_identifier": model_id,
                    "accuracy_mean": acc_mean,
                    "accuracy_std": acc_std,
                    "cv_time": cv_time.as_secs_f64(),
                }),
            );
            report.documents.push(res_doc);
        }
    }

    reporter.line(format_args!("=============================\n"));
    record(
        options,
        "evaluation.complete",
        &run_id,
        json!({ "documents": report.documents.len(), "written": report.written }),
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;
    use crate::metricsdb::{MemoryMetricsDb, MetricsDb};
    use folk_grid::{Assignment, ParameterGrid};
    use folk_learn::{
        ApplyByCols, Cell, ColDrop, ColRename, LogisticRegression, Penalty, Pipeline,
    };
    use folk_logging::read_records;
    use serde::Deserialize;
    use tempfile::tempdir;

    const TEST_METRICS_DB: &str = "FOLK_TEST";

    #[derive(Deserialize)]
    struct PipeParams {
        #[serde(default)]
        lower: bool,
    }

    #[derive(Deserialize)]
    struct ModelParams {
        penalty: Penalty,
        #[serde(rename = "C")]
        c: f64,
    }

    fn ppipeline(grid: ParameterGrid) -> ParameterizedPipeline<Pipeline> {
        ParameterizedPipeline::typed(grid, |params: PipeParams| {
            let mut pipeline = Pipeline::new().stage(ColRename::new([("shleem_count", "scount")]));
            if params.lower {
                pipeline = pipeline.stage(ApplyByCols::new(["rank"], |cell: &Cell| {
                    cell.as_str()
                        .map_or_else(|| cell.clone(), |text| Cell::from(text.to_lowercase()))
                }));
            }
            Ok(pipeline.stage(ColDrop::new(["id"])))
        })
    }

    fn pipe_grid() -> ParameterGrid {
        ParameterGrid::new()
            .with_param("lower", [true, false])
            .with_param("lbl_col", ["rank"])
    }

    fn pmodel() -> ParameterizedModel<LogisticRegression> {
        let grid = ParameterGrid::new()
            .with_param("penalty", ["l1", "l2"])
            .with_param("C", [0.3, 0.6, 0.9]);
        ParameterizedModel::typed(grid, |params: ModelParams| {
            Ok(LogisticRegression::new(params.penalty, params.c))
        })
    }

    fn test_df() -> DataFrame {
        let row = |count: i64, rank: &str, ratio: f64, id: &str| {
            vec![Cell::Int(count), rank.into(), Cell::Float(ratio), id.into()]
        };
        DataFrame::from_rows(
            ["shleem_count", "rank", "hizzard_ratio", "id"],
            vec![
                row(23, "A", 4.3, "e2f"),
                row(43, "C", 3.5, "2eqef"),
                row(80, "B", 8.8, "isudgv"),
                row(13, "A", 3.6, "239u8h"),
                row(77, "B", 5.0, "ds9h77"),
                row(103, "B", 5.5, "9hudsg"),
                row(33, "C", 2.2, "3t782"),
                row(42, "C", 3.66, "dh2u"),
            ],
        )
        .unwrap()
    }

    fn memory_registry() -> (Arc<MemoryMetricsDb>, MetricsRegistry) {
        let db = Arc::new(MemoryMetricsDb::new(TEST_METRICS_DB));
        let registry = MetricsRegistry::new().with_db(Arc::clone(&db) as Arc<dyn MetricsDb>);
        (db, registry)
    }

    #[test]
    fn base_eval_writes_every_combination_once() {
        let (db, registry) = memory_registry();
        let options = EvalOptions::new().metric_db(TEST_METRICS_DB).n_folds(2);
        let report =
            eval_param_pipeline_n_model(&ppipeline(pipe_grid()), &pmodel(), &test_df(), &registry, &options)
                .unwrap();

        assert_eq!(report.documents.len(), 12);
        assert_eq!(report.written, 12);
        let stored = db.snapshot();
        assert_eq!(stored.len(), 12);
        assert!(stored
            .iter()
            .all(|doc| doc.get_str(MetricKey::RUN_ID) == Some(report.run_id.as_str())));

        let combos: HashSet<String> = stored
            .iter()
            .map(|doc| {
                format!(
                    "{}-{}-{}",
                    doc.get("lower").unwrap(),
                    doc.get_str("penalty").unwrap(),
                    doc.get_f64("C").unwrap()
                )
            })
            .collect();
        assert_eq!(combos.len(), 12);

        for doc in &stored {
            assert_eq!(doc.get_str(MetricKey::LBL_COL), Some("rank"));
            assert_eq!(doc.get_f64(MetricKey::N_FOLDS), Some(2.0));
            assert_eq!(doc.get_f64(MetricKey::N_JOBS), Some(1.0));
            assert_eq!(doc.get_f64(MetricKey::DATASET_SIZE), Some(8.0));
            assert_eq!(doc.get_f64(MetricKey::N_CLASS), Some(3.0));
            let acc = doc.get_f64(MetricKey::ACC_MEAN).unwrap();
            assert!((0.0..=1.0).contains(&acc));
            assert!((0.0..=1.0).contains(&doc.get_f64(MetricKey::ACC_STD).unwrap()));
            assert!(doc.get_f64(MetricKey::CROSS_VAL_TIME).unwrap() >= 0.0);
            assert!(doc.get(MetricKey::RUN_AT).is_some());
        }
        assert_eq!(
            report.documents[0].get_str(MetricKey::MODEL_ID),
            Some("C=0.3_penalty=l1")
        );
    }

    #[test]
    fn no_metric_db_means_no_writes() {
        let (db, registry) = memory_registry();
        let report = eval_param_pipeline_n_model(
            &ppipeline(pipe_grid()),
            &pmodel(),
            &test_df(),
            &registry,
            &EvalOptions::new().n_folds(2),
        )
        .unwrap();
        assert_eq!(report.documents.len(), 12);
        assert_eq!(report.written, 0);
        assert!(db.is_empty());

        let report = eval_param_pipeline_n_model(
            &ppipeline(pipe_grid()),
            &pmodel(),
            &test_df(),
            &MetricsRegistry::new(),
            &EvalOptions::new().metric_db("UNCONFIGURED").n_folds(2),
        )
        .unwrap();
        assert_eq!(report.documents.len(), 12);
        assert_eq!(report.written, 0);
    }

    #[test]
    fn pipeline_params_restrict_the_model_grid() {
        let grid = pipe_grid().with_param("penalty", ["l2"]);
        let report = eval_param_pipeline_n_model(
            &ppipeline(grid),
            &pmodel(),
            &test_df(),
            &MetricsRegistry::new(),
            &EvalOptions::new().n_folds(2),
        )
        .unwrap();
        assert_eq!(report.documents.len(), 6);
        assert!(report
            .documents
            .iter()
            .all(|doc| doc.get_str("penalty") == Some("l2")));
    }

    #[test]
    fn parallel_folds_score_like_sequential_ones() {
        let run = |n_jobs| {
            eval_param_pipeline_n_model(
                &ppipeline(pipe_grid()),
                &pmodel(),
                &test_df(),
                &MetricsRegistry::new(),
                &EvalOptions::new().n_folds(2).n_jobs(n_jobs),
            )
            .unwrap()
        };
        let sequential = run(1);
        let parallel = run(2);
        for (seq, par) in sequential.documents.iter().zip(&parallel.documents) {
            let diff = seq.get_f64(MetricKey::ACC_MEAN).unwrap()
                - par.get_f64(MetricKey::ACC_MEAN).unwrap();
            assert!(diff.abs() < 1e-12);
            assert_eq!(par.get_f64(MetricKey::N_JOBS), Some(2.0));
        }
    }

    #[test]
    fn missing_label_column_aborts() {
        let grid = ParameterGrid::new().with_param("lower", [true]);
        let err = eval_param_pipeline_n_model(
            &ppipeline(grid),
            &pmodel(),
            &test_df(),
            &MetricsRegistry::new(),
            &EvalOptions::new().n_folds(2),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FolkError>(),
            Some(FolkError::MissingLabelColumn(_))
        ));
    }

    #[test]
    fn factory_and_fold_errors_propagate() {
        let broken = ParameterizedPipeline::<Pipeline, Vec<Assignment>>::new(
            |_: &Assignment| anyhow::bail!("no pipeline today"),
            vec![Assignment::new().with("lbl_col", "rank")],
        );
        let err = eval_param_pipeline_n_model(
            &broken,
            &pmodel(),
            &test_df(),
            &MetricsRegistry::new(),
            &EvalOptions::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no pipeline today"));

        let err = eval_param_pipeline_n_model(
            &ppipeline(pipe_grid()),
            &pmodel(),
            &test_df(),
            &MetricsRegistry::new(),
            &EvalOptions::new().n_folds(9),
        )
        .unwrap_err();
        assert!(err.to_string().contains("cross-validating"));
    }

    #[test]
    fn telemetry_records_the_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("folk.log");
        let telemetry = FolkTelemetry::builder("folk.evaluate")
            .log_path(&path)
            .build()
            .unwrap();
        let report = eval_param_pipeline_n_model(
            &ppipeline(pipe_grid()),
            &pmodel(),
            &test_df(),
            &MetricsRegistry::new(),
            &EvalOptions::new().n_folds(2).verbose(true).telemetry(telemetry),
        )
        .unwrap();

        let records = read_records(&path).unwrap();
        let messages: Vec<_> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages.first(), Some(&"evaluation.start"));
        assert_eq!(messages.last(), Some(&"evaluation.complete"));
        assert_eq!(messages.iter().filter(|m| **m == "evaluation.pipeline").count(), 2);
        assert_eq!(messages.iter().filter(|m| **m == "evaluation.result").count(), 12);
        assert!(records
            .iter()
            .all(|r| r.run_id.as_deref() == Some(report.run_id.as_str())));
    }

    #[test]
    fn integer_pipeline_params_restrict_float_model_options() {
        let grid = pipe_grid().with_param("C", [1]);
        let model = ParameterizedModel::typed(
            ParameterGrid::new()
                .with_param("penalty", ["l2"])
                .with_param("C", [1.0, 2.0]),
            |params: ModelParams| Ok(LogisticRegression::new(params.penalty, params.c)),
        );
        let report = eval_param_pipeline_n_model(
            &ppipeline(grid),
            &model,
            &test_df(),
            &MetricsRegistry::new(),
            &EvalOptions::new().n_folds(2),
        )
        .unwrap();
        assert_eq!(report.documents.len(), 2);
        assert!(report
            .documents
            .iter()
            .all(|doc| doc.get_f64("C") == Some(1.0)));
    }

    #[test]
    fn verbose_progress_goes_to_the_output() {
        let run = |verbose| {
            let mut out = Vec::new();
            evaluate_with_output(
                &ppipeline(pipe_grid()),
                &pmodel(),
                &test_df(),
                &MetricsRegistry::new(),
                &EvalOptions::new().n_folds(2).verbose(verbose),
                &mut out,
            )
            .unwrap();
            String::from_utf8(out).unwrap()
        };

        let printed = run(true);
        assert!(printed.starts_with("=============================\n"));
        assert_eq!(printed.matches("Evaluating pipeline").count(), 2);
        assert_eq!(printed.matches("Resulting dataset size: 8").count(), 2);
        assert!(printed.contains("Number of columns: 3"));
        assert!(printed.contains("  - Testing C=0.3_penalty=l1..."));
        assert_eq!(printed.matches("    Accuracy: ").count(), 12);

        assert!(run(false).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failing_telemetry_does_not_abort_the_run() {
        let telemetry = FolkTelemetry::builder("folk.evaluate")
            .log_path("/dev/full")
            .build()
            .unwrap();
        let (result, logs) = crate::testing::capture_warnings(|| {
            eval_param_pipeline_n_model(
                &ppipeline(pipe_grid()),
                &pmodel(),
                &test_df(),
                &MetricsRegistry::new(),
                &EvalOptions::new().n_folds(2).telemetry(telemetry),
            )
        });
        assert_eq!(result.unwrap().documents.len(), 12);
        assert!(logs.contains("telemetry write failed"));
        assert!(logs.contains("evaluation.start"));
    }
}
