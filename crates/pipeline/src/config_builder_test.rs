use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use transfer_config::{FieldConfig, GlobalConfig, keys};

use super::*;
use crate::testutil::{FilterProcessor, Recorder, RecordingBackend, VecFrontend, json_payload};
use crate::traits::{Backend, DataProcessor, Frontend};

const TIMEOUT: Duration = Duration::from_secs(2);

/// Registry with a `vec` frontend, a `rec` backend per result table and
/// `filter`/`pass` processors
struct Fixture {
    registry: Arc<Registry>,
    recorders: Arc<Mutex<BTreeMap<String, Arc<Recorder>>>>,
    field_lists: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl Fixture {
    fn new(values: Vec<Value>) -> Self {
        let recorders: Arc<Mutex<BTreeMap<String, Arc<Recorder>>>> = Arc::default();
        let field_lists: Arc<Mutex<BTreeMap<String, usize>>> = Arc::default();
        let mut registry = Registry::with_builtins();

        registry.register_frontend("vec", move |_: &BuildScope| -> Result<Box<dyn Frontend>> {
            let payloads = values.iter().map(json_payload_of).collect();
            Ok(Box::new(VecFrontend::new(payloads)))
        });

        let backend_recorders = Arc::clone(&recorders);
        let backend_fields = Arc::clone(&field_lists);
        registry.register_backend("rec", move |scope: &BuildScope| -> Result<Box<dyn Backend>> {
            let table = table_name(scope);
            let fields = scope.result_table().map(|t| t.field_list.len()).unwrap_or_default();
            backend_fields.lock().insert(table.clone(), fields);
            let recorder = Arc::clone(
                backend_recorders
                    .lock()
                    .entry(table.clone())
                    .or_insert_with(Recorder::new),
            );
            Ok(Box::new(RecordingBackend::new(&format!("rec:{table}"), recorder)))
        });

        registry.register_processor("filter", |scope: &BuildScope| -> Result<Box<dyn DataProcessor>> {
            Ok(Box::new(FilterProcessor::matching("table", table_name(scope))))
        });
        registry.register_processor("pass", |_: &BuildScope| -> Result<Box<dyn DataProcessor>> {
            Ok(Box::new(FilterProcessor::pass()))
        });

        Self {
            registry: Arc::new(registry),
            recorders,
            field_lists,
        }
    }

    fn builder(&self, global: GlobalConfig, pipeline: PipelineConfig) -> ConfigBuilder {
        let scope = BuildScope::new(Arc::new(global), pipeline);
        ConfigBuilder::new(scope, Arc::clone(&self.registry), "test")
    }

    fn recorder(&self, table: &str) -> Arc<Recorder> {
        Arc::clone(&self.recorders.lock()[table])
    }
}

fn json_payload_of(value: &Value) -> transfer_protocol::Payload {
    json_payload(value.clone())
}

fn table_name(scope: &BuildScope) -> String {
    scope
        .result_table()
        .map(|t| t.result_table.clone())
        .unwrap_or_default()
}

fn global() -> GlobalConfig {
    GlobalConfig::default()
        .with_channel_size(16)
        .with_connector_concurrency(1)
        .with_frontend_wait_delay(Duration::from_millis(20))
}

fn table(name: &str, shipper: &str) -> ResultTableConfig {
    ResultTableConfig::new(name).with_shipper(ShipperConfig::new(shipper))
}

fn pipeline_with(tables: Vec<ResultTableConfig>) -> PipelineConfig {
    let mut pipeline = PipelineConfig::new(1001).with_mq_config(ShipperConfig::new("vec"));
    pipeline.result_table_list = tables;
    pipeline
}

/// Keeps the payloads of the lane's own result table
fn route_by_table(
    builder: &mut ConfigBuilder,
    scope: &BuildScope,
    from: &NodeRef,
    to: &NodeRef,
) -> Result<()> {
    let filter = builder.data_processor(scope, "filter")?;
    builder.connect_refs(from, &filter);
    builder.connect_refs(&filter, to);
    Ok(())
}

fn pass_through(
    builder: &mut ConfigBuilder,
    scope: &BuildScope,
    from: &NodeRef,
    to: &NodeRef,
) -> Result<()> {
    let pass = builder.data_processor(scope, "pass")?;
    builder.connect_refs(from, &pass);
    builder.connect_refs(&pass, to);
    Ok(())
}

fn fail_on_b(
    builder: &mut ConfigBuilder,
    scope: &BuildScope,
    from: &NodeRef,
    to: &NodeRef,
) -> Result<()> {
    if table_name(scope) == "b" {
        return Err(PipelineError::build("lane rejected"));
    }
    route_by_table(builder, scope, from, to)
}

async fn run(pipeline: &Pipeline) {
    let mut kill = pipeline.start();
    let err = tokio::time::timeout(TIMEOUT, kill.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, PipelineError::FrontendTimeout(_)));
    pipeline.stop(TIMEOUT).await.unwrap();
    pipeline.wait().await.unwrap();
}

fn names(pipeline: &Pipeline) -> Vec<String> {
    pipeline.tails().iter().map(ToString::to_string).collect()
}

// ============================================================================
// Branching
// ============================================================================

#[tokio::test]
async fn test_branch_per_result_table() {
    let fixture = Fixture::new(vec![
        json!({"table": "a", "v": 1}),
        json!({"table": "b", "v": 2}),
    ]);
    let pipeline = fixture
        .builder(global(), pipeline_with(vec![table("a", "rec"), table("b", "rec")]))
        .build_branching(None, false, &mut route_by_table)
        .unwrap();

    let tails = names(&pipeline);
    assert!(tails.len() >= 2);
    assert!(tails.contains(&"$:rec:a".to_string()));
    assert!(tails.contains(&"$:rec:b".to_string()));

    run(&pipeline).await;
    assert_eq!(fixture.recorder("a").values("v"), vec![json!(1)]);
    assert_eq!(fixture.recorder("b").values("v"), vec![json!(2)]);
    assert_eq!(fixture.recorder("a").closed(), 1);
    assert_eq!(fixture.recorder("b").closed(), 1);
}

#[test]
fn test_empty_result_tables() {
    let fixture = Fixture::new(Vec::new());
    let err = fixture
        .builder(global(), pipeline_with(Vec::new()))
        .build_branching(None, false, &mut route_by_table)
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::EmptyResultTables(name) if name == "pipeline:1001"));
}

#[test]
fn test_missing_frontend_config() {
    let fixture = Fixture::new(Vec::new());
    let mut pipeline = pipeline_with(vec![table("a", "rec")]);
    pipeline.mq_config = ShipperConfig::default();

    let err = fixture
        .builder(global(), pipeline)
        .build_branching(None, false, &mut route_by_table)
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::ItemNotFound(_)));
}

#[test]
fn test_unknown_backend_skipped_unless_strict() {
    let fixture = Fixture::new(Vec::new());
    let tables = vec![table("a", "rec"), table("b", "missing")];

    let pipeline = fixture
        .builder(global(), pipeline_with(tables.clone()))
        .build_branching(None, false, &mut route_by_table)
        .unwrap();
    assert_eq!(names(&pipeline), vec!["$:rec:a", "0:filter(table=\"a\")"]);

    let err = fixture
        .builder(global().with_strict_mode(true), pipeline_with(tables))
        .build_branching(None, false, &mut route_by_table)
        .err()
        .unwrap();
    assert!(err.to_string().contains("get result table b backend failed"));
}

#[test]
fn test_failing_lane_skipped_unless_strict() {
    let fixture = Fixture::new(Vec::new());
    let tables = vec![table("a", "rec"), table("b", "rec")];

    let pipeline = fixture
        .builder(global(), pipeline_with(tables.clone()))
        .build_branching(None, false, &mut fail_on_b)
        .unwrap();
    assert_eq!(names(&pipeline), vec!["$:rec:a", "0:filter(table=\"a\")"]);

    let err = fixture
        .builder(global().with_strict_mode(true), pipeline_with(tables))
        .build_branching(None, false, &mut fail_on_b)
        .err()
        .unwrap();
    assert!(err.to_string().contains("create branching by b failed"));
}

#[test]
fn test_table_without_backend() {
    let fixture = Fixture::new(Vec::new());
    let tables = vec![table("a", "rec"), ResultTableConfig::new("b")];

    let pipeline = fixture
        .builder(global(), pipeline_with(tables.clone()))
        .build_branching(None, false, &mut route_by_table)
        .unwrap();
    assert!(!names(&pipeline).contains(&"gluttonous".to_string()));

    let pipeline = fixture
        .builder(global(), pipeline_with(tables))
        .build_branching_with_gluttonous(None, &mut route_by_table)
        .unwrap();
    assert!(names(&pipeline).contains(&"gluttonous".to_string()));
}

#[tokio::test]
async fn test_multi_lane_branch() {
    let values = (0..6).map(|v| json!({"table": "a", "v": v})).collect();
    let fixture = Fixture::new(values);
    let pipeline = fixture
        .builder(global(), pipeline_with(vec![table("a", "rec").with_multi_num(2)]))
        .build_branching(None, false, &mut route_by_table)
        .unwrap();

    let tails = names(&pipeline);
    assert!(tails.contains(&"0:passer".to_string()));
    assert!(tails.contains(&"(2 inputs => $:rec:a)".to_string()));
    assert!(tails.contains(&"(0:passer => 0:filter(table=\"a\"), 1:filter(table=\"a\"))".to_string()));

    run(&pipeline).await;
    let recorder = fixture.recorder("a");
    let mut seen: Vec<i64> = recorder
        .values("v")
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(recorder.closed(), 1);
}

#[test]
fn test_multi_num_option_wins() {
    let table = ResultTableConfig::new("a")
        .with_multi_num(1)
        .with_option(keys::MULTI_NUM, 3);
    assert_eq!(table_multi_num(&table), 3);

    let table = ResultTableConfig::new("a")
        .with_multi_num(2)
        .with_option(keys::MULTI_NUM, 0);
    assert_eq!(table_multi_num(&table), 2);

    let table = ResultTableConfig::new("a").with_option(keys::MULTI_NUM, "many");
    assert_eq!(table_multi_num(&table), 1);
}

#[test]
fn test_init_hooks() {
    let fixture = Fixture::new(Vec::new());
    let pipeline = fixture
        .builder(global(), pipeline_with(vec![table("a", "REC")]))
        .with_shipper_init(|shipper| shipper.cluster_type = shipper.cluster_type.to_lowercase())
        .with_result_table_init(|table| table.result_table = format!("{}_v2", table.result_table))
        .build_branching(None, false, &mut route_by_table)
        .unwrap();

    assert_eq!(names(&pipeline), vec!["$:rec:a_v2", "0:filter(table=\"a_v2\")"]);
}

// ============================================================================
// Log cluster
// ============================================================================

fn log_cluster_tables() -> Vec<ResultTableConfig> {
    let mut raw = table("raw", "rec");
    raw.field_list = vec![
        FieldConfig {
            field_name: "log".into(),
            ..FieldConfig::default()
        },
        FieldConfig {
            field_name: "time".into(),
            tag: "timestamp".into(),
            ..FieldConfig::default()
        },
    ];
    vec![raw, table("pattern", "rec")]
}

#[test]
fn test_log_cluster_off_builds_first_table() {
    let fixture = Fixture::new(Vec::new());
    let pipeline = fixture
        .builder(global(), pipeline_with(log_cluster_tables()))
        .build_branching_for_log_cluster(None, &mut route_by_table, &mut pass_through)
        .unwrap();

    assert_eq!(names(&pipeline), vec!["$:rec:raw", "0:filter(table=\"raw\")"]);
}

#[test]
fn test_log_cluster_needs_two_tables() {
    let fixture = Fixture::new(Vec::new());
    let mut tables = log_cluster_tables();
    tables.push(table("extra", "rec"));
    let config = pipeline_with(tables).with_option(keys::IS_LOG_CLUSTER, true);

    let err = fixture
        .builder(global(), config)
        .build_branching_for_log_cluster(None, &mut route_by_table, &mut pass_through)
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::Build(_)));
}

#[tokio::test]
async fn test_log_cluster_writes_both_backends() {
    let fixture = Fixture::new(vec![json!({"v": 1}), json!({"v": 2})]);
    let config = pipeline_with(log_cluster_tables()).with_option(keys::IS_LOG_CLUSTER, true);
    let pipeline = fixture
        .builder(global(), config)
        .build_branching_for_log_cluster(None, &mut route_by_table, &mut pass_through)
        .unwrap();

    assert!(names(&pipeline).contains(&"{$:rec:raw, $:rec:pattern}".to_string()));
    // the pattern table inherits the raw table's fields
    assert_eq!(fixture.field_lists.lock()["pattern"], 2);

    run(&pipeline).await;
    for table in ["raw", "pattern"] {
        let recorder = fixture.recorder(table);
        assert_eq!(recorder.values("v"), vec![json!(1), json!(2)]);
        assert_eq!(recorder.closed(), 1);
    }
}
