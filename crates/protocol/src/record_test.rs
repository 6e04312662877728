//! Tests for EtlRecord

use serde_json::{Value, json};

use crate::{EtlRecord, METRIC_KEY_FIELD, METRIC_VALUE_FIELD};

#[test]
fn test_deserialize_partial_record() {
    let record: EtlRecord = serde_json::from_value(json!({
        "time": 1700000000,
        "metrics": {"usage": 1.5}
    }))
    .unwrap();

    assert_eq!(record.time, Some(1700000000));
    assert!(record.dimensions.is_empty());
    assert_eq!(record.metrics["usage"], json!(1.5));
}

#[test]
fn test_split_metrics() {
    let record: EtlRecord = serde_json::from_value(json!({
        "time": 10,
        "dimensions": {"host": "a"},
        "metrics": {"cpu": 1, "mem": 2}
    }))
    .unwrap();

    let split = record.split_metrics(|v| Some(v.clone()));
    assert_eq!(split.len(), 2);

    for item in &split {
        assert_eq!(item.time, Some(10));
        assert_eq!(item.dimensions["host"], json!("a"));
        assert_eq!(item.metrics.len(), 1);
    }

    let names: Vec<&Value> = split
        .iter()
        .map(|r| &r.dimensions[METRIC_KEY_FIELD])
        .collect();
    assert!(names.contains(&&json!("cpu")));
    assert!(names.contains(&&json!("mem")));
}

#[test]
fn test_split_metrics_skips_rejected_values() {
    let record: EtlRecord = serde_json::from_value(json!({
        "metrics": {"ok": 1, "bad": null}
    }))
    .unwrap();

    let split = record.split_metrics(|v| if v.is_null() { None } else { Some(v.clone()) });
    assert_eq!(split.len(), 1);
    assert_eq!(split[0].metrics[METRIC_VALUE_FIELD], json!(1));
}
