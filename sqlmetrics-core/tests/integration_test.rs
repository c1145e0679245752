//! Integration tests for the collection engine.
//!
//! These tests drive full passes from a parsed metric file through the
//! collectors into the encoded exposition text, using an in-memory data
//! source with scripted answers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sqlmetrics_core::{
    Connection, DataSource, DataSourceError, Exporter, ExporterOptions, MetricFile,
    MetricRegistry, Row,
};

/// How the mock answers one SQL text.
#[derive(Clone)]
enum Answer {
    Rows(Vec<Row>),
    Slow(Duration, Vec<Row>),
    Fail(String),
}

#[derive(Default)]
struct Tracker {
    connects: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Clone)]
struct MockSource {
    answers: Arc<HashMap<String, Answer>>,
    reachable: bool,
    tracker: Arc<Tracker>,
}

struct MockConnection {
    answers: Arc<HashMap<String, Answer>>,
    tracker: Arc<Tracker>,
}

impl MockSource {
    fn new(answers: Vec<(&str, Answer)>) -> Self {
        Self {
            answers: Arc::new(
                answers
                    .into_iter()
                    .map(|(sql, answer)| (sql.to_string(), answer))
                    .collect(),
            ),
            reachable: true,
            tracker: Arc::new(Tracker::default()),
        }
    }

    fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(Vec::new())
        }
    }
}

impl DataSource for MockSource {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, DataSourceError> {
        self.tracker.connects.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(DataSourceError::connection("connection refused"));
        }
        Ok(MockConnection {
            answers: self.answers.clone(),
            tracker: self.tracker.clone(),
        })
    }
}

impl Connection for MockConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, DataSourceError> {
        let now = self.tracker.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.tracker.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let answer = self.answers.get(sql).cloned();
        let result = match answer {
            Some(Answer::Rows(rows)) => Ok(rows),
            Some(Answer::Slow(delay, rows)) => {
                tokio::time::sleep(delay).await;
                Ok(rows)
            }
            Some(Answer::Fail(message)) => Err(DataSourceError::query(message)),
            None => Err(DataSourceError::query(format!("unknown statement: {sql}"))),
        };

        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Helper to find the value of one exact series in exposition text.
fn series_value(body: &str, series: &str) -> Option<f64> {
    body.lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let (name, value) = line.rsplit_once(' ')?;
            let name = name.strip_suffix("{}").unwrap_or(name);
            if name == series { value.parse().ok() } else { None }
        })
}

fn build(file: &str, source: MockSource, options: ExporterOptions) -> Exporter<MockSource> {
    let file = MetricFile::parse(file).unwrap();
    Exporter::build(&file, Arc::new(MetricRegistry::new()), options, |_, _| {
        Ok(source.clone())
    })
    .unwrap()
}

const ROW_COUNT: &str = r#"{
    "Configs": [{
        "DataSource": "mock://main",
        "Queries": [{
            "Name": "row_count",
            "Description": "Rows per table",
            "Query": "SELECT table_name, cnt FROM counts",
            "QueryUsage": "Gauge",
            "Columns": [
                { "Name": "table_name", "ColumnUsage": "GaugeLabel", "Order": 0 },
                { "Name": "cnt", "ColumnUsage": "Gauge" }
            ]
        }]
    }]
}"#;

fn counts(orders: i64, users: i64) -> Vec<Row> {
    vec![
        Row::new().with("table_name", "orders").with("cnt", orders),
        Row::new().with("table_name", "users").with("cnt", users),
    ]
}

#[tokio::test]
async fn test_gauge_rows_become_labeled_series() {
    let source = MockSource::new(vec![(
        "SELECT table_name, cnt FROM counts",
        Answer::Rows(counts(10, 3)),
    )]);
    let exporter = build(ROW_COUNT, source, ExporterOptions::default());

    let body = exporter.scrape().await.unwrap();

    assert!(body.contains("# TYPE row_count gauge"));
    assert_eq!(series_value(&body, r#"row_count{table_name="orders"}"#), Some(10.0));
    assert_eq!(series_value(&body, r#"row_count{table_name="users"}"#), Some(3.0));
}

#[tokio::test]
async fn test_label_values_are_escaped_in_exposition() {
    let source = MockSource::new(vec![(
        "SELECT table_name, cnt FROM counts",
        Answer::Rows(vec![
            Row::new().with("table_name", "we\"ird\nname\\x").with("cnt", 4i64),
            Row::new().with("table_name", "users").with("cnt", 3i64),
        ]),
    )]);
    let exporter = build(ROW_COUNT, source, ExporterOptions::default());

    let body = exporter.scrape().await.unwrap();

    assert_eq!(
        series_value(&body, r#"row_count{table_name="we\"ird\nname\\x"}"#),
        Some(4.0)
    );
    assert_eq!(series_value(&body, r#"row_count{table_name="users"}"#), Some(3.0));
    let samples: Vec<&str> = body.lines().filter(|line| !line.starts_with('#')).collect();
    assert_eq!(samples.len(), 2);
    assert!(samples.iter().all(|line| line.starts_with("row_count{")));
}

#[tokio::test]
async fn test_series_missing_from_later_scrape_keeps_last_value() {
    let first = MockSource::new(vec![(
        "SELECT table_name, cnt FROM counts",
        Answer::Rows(counts(10, 3)),
    )]);
    let file = MetricFile::parse(ROW_COUNT).unwrap();
    let registry = Arc::new(MetricRegistry::new());

    let exporter = Exporter::build(&file, registry.clone(), ExporterOptions::default(), |_, _| {
        Ok(first.clone())
    })
    .unwrap();
    exporter.collect().await;

    // A second exporter sharing the registry sees only one table.
    let second = MockSource::new(vec![(
        "SELECT table_name, cnt FROM counts",
        Answer::Rows(vec![Row::new().with("table_name", "orders").with("cnt", 12i64)]),
    )]);
    let exporter = Exporter::build(&file, registry, ExporterOptions::default(), |_, _| {
        Ok(second.clone())
    })
    .unwrap();
    let body = exporter.scrape().await.unwrap();

    assert_eq!(series_value(&body, r#"row_count{table_name="orders"}"#), Some(12.0));
    assert_eq!(series_value(&body, r#"row_count{table_name="users"}"#), Some(3.0));
}

#[tokio::test]
async fn test_counter_and_generic_queries() {
    let file = r#"{
        "Configs": [{
            "DataSource": "mock://main",
            "Queries": [
                {
                    "Name": "wait_time_ms",
                    "Query": "SELECT wait_type, ms FROM waits",
                    "QueryUsage": "Counter",
                    "Columns": [
                        { "Name": "wait_type", "ColumnUsage": "CounterLabel" },
                        { "Name": "ms", "ColumnUsage": "Counter" }
                    ]
                },
                {
                    "Name": "database_status",
                    "Query": "SELECT 1 AS is_online",
                    "QueryUsage": "Empty",
                    "Columns": [
                        { "Name": "is_online", "ColumnUsage": "Gauge", "Label": "up", "DefaultValue": 0 }
                    ]
                }
            ]
        }]
    }"#;
    let source = MockSource::new(vec![
        (
            "SELECT wait_type, ms FROM waits",
            Answer::Rows(vec![Row::new().with("wait_type", "LCK_M_X").with("ms", 250i64)]),
        ),
        (
            "SELECT 1 AS is_online",
            Answer::Rows(vec![Row::new().with("is_online", 1i64)]),
        ),
    ]);
    let exporter = build(file, source, ExporterOptions::default());

    let body = exporter.scrape().await.unwrap();

    assert!(body.contains("# TYPE wait_time_ms counter"));
    assert_eq!(
        series_value(&body, r#"wait_time_ms_total{wait_type="LCK_M_X"}"#),
        Some(250.0)
    );
    assert_eq!(series_value(&body, "up"), Some(1.0));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_only_skips_the_slow_query() {
    let file = r#"{
        "MillisecondTimeout": 1000,
        "Configs": [{
            "DataSource": "mock://main",
            "Queries": [
                {
                    "Name": "slow",
                    "Query": "SELECT slow",
                    "QueryUsage": "Empty",
                    "MillisecondTimeout": 100,
                    "Columns": [{ "Name": "v", "ColumnUsage": "Gauge", "Label": "slow_value" }]
                },
                {
                    "Name": "fast",
                    "Query": "SELECT fast",
                    "QueryUsage": "Empty",
                    "Columns": [{ "Name": "v", "ColumnUsage": "Gauge", "Label": "fast_value" }]
                }
            ]
        }]
    }"#;
    let source = MockSource::new(vec![
        (
            "SELECT slow",
            Answer::Slow(Duration::from_secs(60), vec![Row::new().with("v", 1i64)]),
        ),
        ("SELECT fast", Answer::Rows(vec![Row::new().with("v", 2i64)])),
    ]);
    let tracker = source.tracker.clone();
    let exporter = build(
        file,
        source,
        ExporterOptions { self_metrics: true },
    );

    let started = tokio::time::Instant::now();
    let reports = exporter.collect().await;
    let body = exporter.registry().encode().unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].queries_succeeded, 1);
    assert_eq!(reports[0].queries_failed, 1);
    assert!(reports[0].connected);
    // The timed-out session is discarded and a fresh one opened.
    assert_eq!(tracker.connects.load(Ordering::SeqCst), 2);
    assert_eq!(series_value(&body, "fast_value"), Some(2.0));
    assert_eq!(series_value(&body, "slow_value"), None);
    assert_eq!(
        series_value(
            &body,
            r#"sqlmetrics_query_errors_total{data_source="config-0",query="slow",kind="timeout"}"#
        ),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_failed_query_does_not_stop_the_pass() {
    let file = r#"{
        "Configs": [{
            "Name": "main",
            "DataSource": "mock://main",
            "Queries": [
                {
                    "Name": "broken",
                    "Query": "SELECT nonsense",
                    "QueryUsage": "Gauge",
                    "Columns": [{ "Name": "v", "ColumnUsage": "Gauge" }]
                },
                {
                    "Name": "row_count",
                    "Query": "SELECT table_name, cnt FROM counts",
                    "QueryUsage": "Gauge",
                    "Columns": [
                        { "Name": "table_name", "ColumnUsage": "GaugeLabel" },
                        { "Name": "cnt", "ColumnUsage": "Gauge" }
                    ]
                }
            ]
        }]
    }"#;
    let source = MockSource::new(vec![
        ("SELECT nonsense", Answer::Fail("syntax error".into())),
        ("SELECT table_name, cnt FROM counts", Answer::Rows(counts(1, 2))),
    ]);
    let tracker = source.tracker.clone();
    let exporter = build(file, source, ExporterOptions { self_metrics: true });

    let reports = exporter.collect().await;
    let body = exporter.registry().encode().unwrap();

    assert_eq!(reports[0].queries_failed, 1);
    assert_eq!(reports[0].queries_succeeded, 1);
    // Statement errors keep the session.
    assert_eq!(tracker.connects.load(Ordering::SeqCst), 1);
    assert_eq!(series_value(&body, r#"row_count{table_name="users"}"#), Some(2.0));
    assert_eq!(
        series_value(
            &body,
            r#"sqlmetrics_query_errors_total{data_source="main",query="broken",kind="query"}"#
        ),
        Some(1.0)
    );
    assert_eq!(series_value(&body, r#"sqlmetrics_up{data_source="main"}"#), Some(1.0));
}

#[tokio::test]
async fn test_unreachable_source_does_not_affect_others() {
    let file = r#"{
        "Configs": [
            {
                "Name": "down",
                "DataSource": "mock://down",
                "Queries": [{
                    "Name": "down_rows",
                    "Query": "SELECT table_name, cnt FROM counts",
                    "QueryUsage": "Gauge",
                    "Columns": [
                        { "Name": "table_name", "ColumnUsage": "GaugeLabel" },
                        { "Name": "cnt", "ColumnUsage": "Gauge" }
                    ]
                }]
            },
            {
                "Name": "up",
                "DataSource": "mock://up",
                "Queries": [{
                    "Name": "up_rows",
                    "Query": "SELECT table_name, cnt FROM counts",
                    "QueryUsage": "Gauge",
                    "Columns": [
                        { "Name": "table_name", "ColumnUsage": "GaugeLabel" },
                        { "Name": "cnt", "ColumnUsage": "Gauge" }
                    ]
                }]
            }
        ]
    }"#;
    let file = MetricFile::parse(file).unwrap();
    let healthy = MockSource::new(vec![(
        "SELECT table_name, cnt FROM counts",
        Answer::Rows(counts(5, 6)),
    )]);
    let exporter = Exporter::build(
        &file,
        Arc::new(MetricRegistry::new()),
        ExporterOptions { self_metrics: true },
        |_, url| {
            if url == "mock://down" {
                Ok(MockSource::unreachable())
            } else {
                Ok(healthy.clone())
            }
        },
    )
    .unwrap();

    let mut reports = exporter.collect().await;
    reports.sort_by(|a, b| a.data_source.cmp(&b.data_source));
    let body = exporter.registry().encode().unwrap();

    assert_eq!(reports.len(), 2);
    assert!(!reports[0].connected);
    assert_eq!(reports[0].queries_skipped, 1);
    assert!(reports[1].is_clean());
    assert_eq!(series_value(&body, r#"up_rows{table_name="orders"}"#), Some(5.0));
    assert_eq!(series_value(&body, r#"sqlmetrics_up{data_source="down"}"#), Some(0.0));
    assert_eq!(series_value(&body, r#"sqlmetrics_up{data_source="up"}"#), Some(1.0));
}

#[tokio::test]
async fn test_invalid_configs_and_queries_are_skipped() {
    let file = r#"{
        "Configs": [
            { "DataSource": "   ", "Queries": [] },
            {
                "DataSource": "mock://main",
                "Queries": [
                    { "Name": "bad", "Query": "SELECT 1", "QueryUsage": "Bogus", "Columns": [] },
                    {
                        "Name": "row_count",
                        "Query": "SELECT table_name, cnt FROM counts",
                        "QueryUsage": "Gauge",
                        "Columns": [
                            { "Name": "table_name", "ColumnUsage": "GaugeLabel" },
                            { "Name": "cnt", "ColumnUsage": "Gauge" }
                        ]
                    }
                ]
            }
        ]
    }"#;
    let source = MockSource::new(vec![(
        "SELECT table_name, cnt FROM counts",
        Answer::Rows(counts(10, 3)),
    )]);
    let exporter = build(file, source, ExporterOptions::default());

    assert_eq!(exporter.collector_count(), 1);
    assert_eq!(exporter.collectors()[0].name(), "config-1");
    assert_eq!(exporter.collectors()[0].query_count(), 1);

    let body = exporter.scrape().await.unwrap();
    assert_eq!(series_value(&body, r#"row_count{table_name="orders"}"#), Some(10.0));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_scrapes_are_serialized_per_collector() {
    let source = MockSource::new(vec![(
        "SELECT table_name, cnt FROM counts",
        Answer::Slow(Duration::from_millis(50), counts(1, 1)),
    )]);
    let tracker = source.tracker.clone();
    let exporter = build(ROW_COUNT, source, ExporterOptions::default());

    let (first, second) = tokio::join!(exporter.collect(), exporter.collect());

    assert!(first[0].is_clean());
    assert!(second[0].is_clean());
    assert_eq!(tracker.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unconvertible_rows_are_counted() {
    let source = MockSource::new(vec![(
        "SELECT table_name, cnt FROM counts",
        Answer::Rows(vec![
            Row::new().with("table_name", "orders").with("cnt", "many"),
            Row::new().with("table_name", "users").with("cnt", 4i64),
        ]),
    )]);
    let exporter = build(ROW_COUNT, source, ExporterOptions { self_metrics: true });

    let reports = exporter.collect().await;
    let body = exporter.registry().encode().unwrap();

    assert_eq!(reports[0].rows_skipped, 1);
    assert_eq!(series_value(&body, r#"row_count{table_name="orders"}"#), None);
    assert_eq!(series_value(&body, r#"row_count{table_name="users"}"#), Some(4.0));
    assert_eq!(
        series_value(
            &body,
            r#"sqlmetrics_rows_skipped_total{data_source="config-0",query="row_count"}"#
        ),
        Some(1.0)
    );
}
