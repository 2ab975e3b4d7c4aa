//! Matching: near-hash lookup, per-resource hit lists, a robust time-offset
//! regression and coverage gating, with an optional histogram fallback.

use crate::config::Config;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::Deadline;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tritone_store::Storage;


/// One identified stretch of a reference resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Path (or window label) of the query
    pub query_path: String,
    /// Start of match in query (seconds)
    pub query_start: f64,
    /// End of match in query (seconds)
    pub query_stop: f64,

    /// Path of the reference, when its metadata is known
    pub ref_path: Option<String>,
    /// Identifier of the reference
    pub ref_identifier: Option<i32>,
    /// Start of match in reference (seconds)
    pub ref_start: f64,
    /// End of match in reference (seconds)
    pub ref_stop: f64,

    /// Number of fingerprints supporting the match
    pub score: i32,
    /// 1.0 means no time stretch
    pub time_factor: f64,
    /// Reserved; always 1.0 for this strategy
    pub frequency_factor: f64,
    /// Fraction of reference seconds containing at least one match
    pub percent_seconds_with_match: f64,
}

/// Results of a query, with `cancelled` set when a deadline cut it short.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub results: Vec<QueryResult>,
    pub cancelled: bool,
}

/// A single query fingerprint matched against a stored posting.
#[derive(Debug, Clone, Copy)]
struct MatchHit {
    match_time: i32,
    query_time: i32,
    #[allow(dead_code)]
    original_hash: u64,
    #[allow(dead_code)]
    matched_near_hash: u64,
}

impl MatchHit {
    fn delta_t(&self) -> i32 {
        self.match_time - self.query_time
    }
}

/// Matches query fingerprints against a posting store.
pub struct Matcher<'a> {
    config: &'a Config,
    store: &'a dyn Storage,
}

impl<'a> Matcher<'a> {
    pub fn new(config: &'a Config, store: &'a dyn Storage) -> Self {
        Self { config, store }
    }

    /// Run the full matching pipeline over the query's fingerprints.
    pub fn query(
        &self,
        query_path: &str,
        prints: &[Fingerprint],
        max_results: usize,
        avoid: &HashSet<i32>,
        deadline: Deadline,
    ) -> Result<QueryOutcome> {
        // Step 1: near-hash lookup, grouped per resource.
        let mut hits_per_id: BTreeMap<i32, Vec<MatchHit>> = BTreeMap::new();
        for print in prints {
            if deadline.expired() {
                return Ok(QueryOutcome {
                    results: Vec::new(),
                    cancelled: true,
                });
            }
            for hit in self.store.query(print.hash, self.config.query_range)? {
                if avoid.contains(&hit.resource_id) {
                    continue;
                }
                hits_per_id.entry(hit.resource_id).or_default().push(MatchHit {
                    match_time: hit.t1,
                    query_time: print.t1,
                    original_hash: print.hash,
                    matched_near_hash: hit.matched_hash,
                });
            }
        }

        log::info!(
            "Query '{}': {} prints hit {} resources",
            query_path,
            prints.len(),
            hits_per_id.len()
        );

        // Step 2: drop undersized groups, order the rest by query time.
        hits_per_id.retain(|_, hits| hits.len() >= self.config.min_hits_unfiltered);
        for hits in hits_per_id.values_mut() {
            hits.sort_by_key(|hit| (hit.query_time, hit.match_time));
        }

        let mut results = Vec::new();
        let mut cancelled = false;

        // Steps 3-7 per resource.
        for (&identifier, hitlist) in &hits_per_id {
            if deadline.expired() {
                cancelled = true;
                break;
            }
            if let Some(result) = self.fit_and_filter(query_path, identifier, hitlist)? {
                results.push(result);
            }
        }

        // Fallback to the plain delta-t histogram.
        if results.is_empty() && !cancelled && self.config.match_fallback_to_hist {
            for (&identifier, hitlist) in &hits_per_id {
                if deadline.expired() {
                    cancelled = true;
                    break;
                }
                if let Some(result) = self.histogram_fallback(query_path, identifier, hitlist)? {
                    results.push(result);
                }
            }
        }

        // Ranking: best score first, bounded result count.
        results.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.ref_identifier.cmp(&b.ref_identifier))
        });
        results.truncate(max_results);

        Ok(QueryOutcome { results, cancelled })
    }

    /// Steps 3-5: fit (slope, offset) for delta-t over query time from the
    /// head and tail of the hit list, gate on the implied time factor, then
    /// keep only hits near the predicted delta-t.
    fn fit_and_filter(
        &self,
        query_path: &str,
        identifier: i32,
        hitlist: &[MatchHit],
    ) -> Result<Option<QueryResult>> {
        let part_len = self
            .config
            .hit_part_max_size
            .min(
                self.config
                    .min_hits_unfiltered
                    .max(hitlist.len() / self.config.hit_part_divider),
            )
            .min(hitlist.len());
        let first_hits = &hitlist[..part_len];
        let last_hits = &hitlist[hitlist.len() - part_len..];

        let y1 = most_common_delta_t(first_hits);
        let x1 = first_hits
            .iter()
            .find(|hit| hit.delta_t() == y1)
            .map(|hit| hit.query_time)
            .unwrap_or(0);
        let y2 = most_common_delta_t(last_hits);
        let x2 = last_hits
            .iter()
            .rev()
            .find(|hit| hit.delta_t() == y2)
            .map(|hit| hit.query_time)
            .unwrap_or(0);

        let slope = if x1 == x2 {
            0.0
        } else {
            (y2 - y1) as f64 / (x2 - x1) as f64
        };
        let offset = y1 as f64 - slope * x1 as f64;
        let time_factor = 1.0 - slope;

        if !(time_factor > self.config.min_time_factor
            && time_factor < self.config.max_time_factor)
        {
            log::debug!(
                "Resource {}: time factor {:.3} outside ({}, {})",
                identifier,
                time_factor,
                self.config.min_time_factor,
                self.config.max_time_factor
            );
            return Ok(None);
        }

        let threshold = self.config.query_range as f64;
        let filtered: Vec<&MatchHit> = hitlist
            .iter()
            .filter(|hit| {
                let predicted = slope * hit.query_time as f64 + offset;
                (hit.delta_t() as f64 - predicted).abs() <= threshold
            })
            .collect();

        self.coverage_gate(query_path, identifier, &filtered, time_factor)
    }

    /// Fallback: a delta-t histogram with 5-frame buckets. When one bucket
    /// dominates, admit every hit near the bucket centre and report a time
    /// factor of 1.0.
    fn histogram_fallback(
        &self,
        query_path: &str,
        identifier: i32,
        hitlist: &[MatchHit],
    ) -> Result<Option<QueryResult>> {
        const BIN_SIZE: i32 = 5;

        let mut count_per_bucket: BTreeMap<i32, usize> = BTreeMap::new();
        for hit in hitlist {
            *count_per_bucket.entry(hit.delta_t() / BIN_SIZE).or_insert(0) += 1;
        }
        let mut top_bucket = 0;
        let mut top_count = 0;
        for (&bucket, &count) in &count_per_bucket {
            if count > top_count {
                top_count = count;
                top_bucket = bucket;
            }
        }
        if top_count <= self.config.min_hits_unfiltered {
            return Ok(None);
        }

        let centre = top_bucket * BIN_SIZE;
        let filtered: Vec<&MatchHit> = hitlist
            .iter()
            .filter(|hit| (centre - hit.delta_t()).abs() <= BIN_SIZE)
            .collect();

        self.coverage_gate(query_path, identifier, &filtered, 1.0)
    }

    /// Steps 6-7: enough filtered hits, long enough in query time, dense
    /// enough over the reference seconds; then emit.
    fn coverage_gate(
        &self,
        query_path: &str,
        identifier: i32,
        filtered: &[&MatchHit],
        time_factor: f64,
    ) -> Result<Option<QueryResult>> {
        if filtered.len() <= self.config.min_hits_filtered {
            return Ok(None);
        }

        let seconds = |t: i32| self.config.frame_to_seconds(t) as f64;
        let query_start = seconds(filtered[0].query_time);
        let query_stop = seconds(filtered[filtered.len() - 1].query_time);
        if query_stop - query_start < self.config.min_match_duration {
            return Ok(None);
        }

        let ref_start = seconds(filtered[0].match_time);
        let ref_stop = seconds(filtered[filtered.len() - 1].match_time);

        // One histogram bin per whole second of matched reference time; the
        // last bin may cover a partial second.
        let mut seconds_with_match: HashSet<i32> = HashSet::new();
        for hit in filtered {
            seconds_with_match.insert((seconds(hit.match_time) - ref_start) as i32);
        }
        let matching_seconds = (ref_stop - ref_start).ceil().max(1.0);
        let empty_seconds = matching_seconds - seconds_with_match.len() as f64;
        let percent_seconds_with_match = 1.0 - empty_seconds / matching_seconds;
        if percent_seconds_with_match < self.config.min_sec_with_match {
            return Ok(None);
        }

        let metadata = self.store.get_metadata(identifier)?;
        Ok(Some(QueryResult {
            query_path: query_path.to_string(),
            query_start,
            query_stop,
            ref_path: metadata.map(|meta| meta.path),
            ref_identifier: Some(identifier),
            ref_start,
            ref_stop,
            score: filtered.len() as i32,
            time_factor,
            frequency_factor: 1.0,
            percent_seconds_with_match,
        }))
    }
}

/// The most frequent delta-t in a hit list; ties go to the smallest value.
fn most_common_delta_t(hits: &[MatchHit]) -> i32 {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for hit in hits {
        *counts.entry(hit.delta_t()).or_insert(0) += 1;
    }
    let mut best = 0;
    let mut best_count = 0;
    for (&delta, &count) in &counts {
        if count > best_count {
            best_count = count;
            best = delta;
        }
    }
    best
}
