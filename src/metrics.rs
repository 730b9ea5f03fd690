// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, register_histogram_vec, register_int_counter_vec, HistogramVec,
    IntCounterVec,
};

pub static SCHEMADB_ITER_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        // metric name
        "pagebound_schemadb_iter_latency_seconds",
        // metric description
        "Schemadb iter latency in seconds",
        // metric labels (dimensions)
        &["cf_name"],
        exponential_buckets(/*start=*/ 1e-6, /*factor=*/ 2.0, /*count=*/ 22).unwrap(),
    )
    .unwrap()
});

pub static SCHEMADB_ITER_BYTES: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pagebound_schemadb_iter_bytes",
        "Schemadb iter size in bytes",
        &["cf_name"]
    )
    .unwrap()
});

pub static SCHEMADB_GET_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pagebound_schemadb_get_latency_seconds",
        "Schemadb get latency in seconds",
        &["cf_name"],
        exponential_buckets(/*start=*/ 1e-6, /*factor=*/ 2.0, /*count=*/ 22).unwrap(),
    )
    .unwrap()
});

pub static SCHEMADB_GET_BYTES: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pagebound_schemadb_get_bytes",
        "Schemadb get call returned data size in bytes",
        &["cf_name"]
    )
    .unwrap()
});

pub static SCHEMADB_BATCH_COMMIT_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pagebound_schemadb_batch_commit_latency_seconds",
        "Schemadb schema batch commit latency in seconds",
        &["db_name"],
        exponential_buckets(/*start=*/ 1e-3, /*factor=*/ 2.0, /*count=*/ 20).unwrap(),
    )
    .unwrap()
});

pub static SCHEMADB_BATCH_COMMIT_BYTES: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pagebound_schemadb_batch_commit_bytes",
        "Schemadb schema batch commit size in bytes",
        &["db_name"]
    )
    .unwrap()
});

pub static SCHEMADB_PUT_BYTES: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pagebound_schemadb_put_bytes",
        "Schemadb put call puts data size in bytes",
        &["cf_name"]
    )
    .unwrap()
});

pub static SCHEMADB_DELETES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pagebound_schemadb_deletes",
        "Schemadb delete calls",
        &["cf_name"]
    )
    .unwrap()
});

pub static PAGINATION_PAGE_ITEMS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pagebound_pagination_page_items",
        "Number of records returned per page",
        &["direction"],
        vec![0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0]
    )
    .unwrap()
});

pub static RESPONSE_CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pagebound_response_cache_lookups",
        "Response cache lookups by outcome",
        &["outcome"]
    )
    .unwrap()
});

pub static RESPONSE_CACHE_EVICTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pagebound_response_cache_evictions",
        "Response cache keys removed by writes",
        &["resource"]
    )
    .unwrap()
});
