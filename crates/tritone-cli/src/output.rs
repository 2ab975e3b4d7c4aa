//! JSON output formatting

use serde::Serialize;
use tritone_core::{QueryOutcome, QueryResult};

#[derive(Serialize)]
struct MatchOutput<'a> {
    query_path: &'a str,
    detections: usize,
    cancelled: bool,
    results: &'a [QueryResult],
}

/// Print a query outcome as a JSON document with a detection count.
pub fn print_json_outcome(query_path: &str, outcome: &QueryOutcome) {
    let output = MatchOutput {
        query_path,
        detections: outcome.results.len(),
        cancelled: outcome.cancelled,
        results: &outcome.results,
    };
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results: {}", e),
    }
}

/// Print a bare JSON value, used for stats and store summaries.
pub fn print_json_value(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}
