//! End-to-end tests: synthetic audio through store, query, delete and
//! monitor against real backends.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;
use tritone_core::{Config, Deadline, Engine, QueryOutcome, StorageBackendKind};
use tritone_store::{KvStorage, MemoryStorage, Storage};

/// Deterministic pseudo-random stream for tone walks.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

/// Write a clip made of 100 ms tone bursts whose frequency performs a
/// bounded random walk over `[low_hz, high_hz]` in 25 Hz steps. Every burst
/// leaves one strong, isolated spectral peak, and consecutive peaks stay
/// within the fingerprint geometry windows.
fn write_tone_walk(path: &Path, seconds: u32, seed: u64, low_hz: u32, high_hz: u32) {
    let sample_rate = 16_000u32;
    let burst_len = (sample_rate / 10) as usize;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();

    let low = (low_hz / 25) as i64;
    let high = (high_hz / 25) as i64;
    let mut lcg = Lcg(seed);
    let mut unit = (low + high) / 2;

    for _burst in 0..(seconds * 10) {
        // 100..1000 Hz per step, reflected at the band edges.
        let step = 4 + (lcg.next() % 37) as i64;
        let direction = if lcg.next() % 2 == 0 { 1 } else { -1 };
        unit += direction * step;
        if unit < low {
            unit = low + (low - unit);
        }
        if unit > high {
            unit = high - (unit - high);
        }
        let freq = unit as f32 * 25.0;

        for i in 0..burst_len {
            let phase = std::f32::consts::TAU * freq * i as f32 / sample_rate as f32;
            let envelope =
                0.5 * (1.0 - (std::f32::consts::TAU * i as f32 / burst_len as f32).cos());
            let value = phase.sin() * envelope * 0.8;
            writer
                .write_sample((value * i16::MAX as f32) as i16)
                .unwrap();
        }
    }
    writer.finalize().unwrap();
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    reference: PathBuf,
    unrelated: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let reference = root.join("reference-clip.wav");
    let unrelated = root.join("unrelated-clip.wav");
    // Disjoint frequency bands keep the anchor-frequency hash fields of the
    // two clips far apart.
    write_tone_walk(&reference, 30, 0x5EED, 1_000, 3_500);
    write_tone_walk(&unrelated, 10, 0xFACE, 4_000, 6_500);
    Fixture {
        _dir: dir,
        root,
        reference,
        unrelated,
    }
}

fn engine_with(fixture: &Fixture, store: Arc<dyn Storage>) -> Engine {
    let mut config = Config::default();
    config.report_folder = fixture.root.join("reports").display().to_string();
    config.cache_folder = fixture.root.join("cache").display().to_string();
    Engine::with_store(config, store).unwrap()
}

fn query_all(engine: &Engine, path: &Path) -> QueryOutcome {
    engine
        .query(path, 10, &HashSet::new(), Deadline::none())
        .unwrap()
}

#[test]
fn self_match_round_trip() {
    let fixture = fixture();
    let engine = engine_with(&fixture, Arc::new(MemoryStorage::new()));

    let duration = engine.store(&fixture.reference).unwrap();
    assert!(duration > 28.0 && duration <= 30.5);
    assert!(engine.has_resource(&fixture.reference).unwrap());

    let outcome = query_all(&engine, &fixture.reference);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.results.len(), 1);

    let result = &outcome.results[0];
    assert_eq!(
        result.ref_path.as_deref(),
        Some(fixture.reference.display().to_string().as_str())
    );
    assert!(result.time_factor > 0.99 && result.time_factor < 1.01);
    assert!(result.score >= 200, "score was {}", result.score);
    assert!(result.ref_start < 1.0);
    assert!(result.ref_stop > 28.0);
    assert!(result.percent_seconds_with_match > 0.9);
}

#[test]
fn snippet_matches_at_the_right_offset() {
    let fixture = fixture();
    let engine = engine_with(&fixture, Arc::new(MemoryStorage::new()));
    engine.store(&fixture.reference).unwrap();

    let outcome = engine
        .query_window(
            &fixture.reference,
            10.0,
            10.0,
            10,
            &HashSet::new(),
            Deadline::none(),
        )
        .unwrap();
    assert_eq!(outcome.results.len(), 1);

    let result = &outcome.results[0];
    assert!(result.time_factor > 0.99 && result.time_factor < 1.01);
    assert!(result.query_start < 1.0);
    assert!(result.query_stop > 9.0 && result.query_stop < 11.0);
    assert!(result.ref_start > 9.0 && result.ref_start < 11.0);
    assert!(result.ref_stop > 19.0 && result.ref_stop < 21.0);
}

#[test]
fn unrelated_audio_is_rejected() {
    let fixture = fixture();
    let engine = engine_with(&fixture, Arc::new(MemoryStorage::new()));
    engine.store(&fixture.reference).unwrap();

    let outcome = query_all(&engine, &fixture.unrelated);
    assert!(outcome.results.is_empty());
}

#[test]
fn delete_round_trip_and_idempotence() {
    let fixture = fixture();
    let engine = engine_with(&fixture, Arc::new(MemoryStorage::new()));

    engine.store(&fixture.reference).unwrap();
    assert_eq!(query_all(&engine, &fixture.reference).results.len(), 1);

    engine.delete(&fixture.reference).unwrap();
    assert!(query_all(&engine, &fixture.reference).results.is_empty());
    assert!(!engine.has_resource(&fixture.reference).unwrap());
    assert_eq!(engine.stats().unwrap().posting_count, 0);

    // Deleting again is a no-op.
    engine.delete(&fixture.reference).unwrap();
    assert_eq!(engine.stats().unwrap().posting_count, 0);
}

#[test]
fn avoided_resource_is_not_reported() {
    let fixture = fixture();
    let engine = engine_with(&fixture, Arc::new(MemoryStorage::new()));
    engine.store(&fixture.reference).unwrap();

    let identifier = tritone_core::resource::resource_id(&fixture.reference);
    let avoid: HashSet<i32> = [identifier].into_iter().collect();
    let outcome = engine
        .query(&fixture.reference, 10, &avoid, Deadline::none())
        .unwrap();
    assert!(outcome.results.is_empty());
}

#[test]
fn backends_agree_on_results() {
    let fixture = fixture();
    let kv_dir = tempdir().unwrap();
    let file_dir = tempdir().unwrap();

    let memory = engine_with(&fixture, Arc::new(MemoryStorage::new()));
    let kv = engine_with(
        &fixture,
        Arc::new(KvStorage::open(&kv_dir.path().join("postings.db")).unwrap()),
    );
    let file = engine_with(
        &fixture,
        Arc::new(tritone_store::FileStorage::open(file_dir.path()).unwrap()),
    );

    for engine in [&memory, &kv, &file] {
        engine.store(&fixture.reference).unwrap();
    }

    let outcomes: Vec<QueryOutcome> = [&memory, &kv, &file]
        .iter()
        .map(|engine| query_all(engine, &fixture.reference))
        .collect();

    for outcome in &outcomes {
        assert_eq!(outcome.results.len(), 1);
    }
    let first = &outcomes[0].results[0];
    for outcome in &outcomes[1..] {
        let other = &outcome.results[0];
        assert_eq!(other.ref_identifier, first.ref_identifier);
        assert_eq!(other.score, first.score);
        assert_eq!(other.time_factor, first.time_factor);
        assert_eq!(other.query_start, first.query_start);
        assert_eq!(other.ref_start, first.ref_start);
        assert_eq!(
            other.percent_seconds_with_match,
            first.percent_seconds_with_match
        );
    }
}

#[test]
fn store_writes_the_fingerprint_report() {
    let fixture = fixture();
    let engine = engine_with(&fixture, Arc::new(MemoryStorage::new()));
    engine.store(&fixture.reference).unwrap();

    let report = fixture.root.join("reports").join("reference-clip.txt");
    let contents = std::fs::read_to_string(&report).unwrap();
    let mut lines = contents.lines();

    assert!(lines.next().unwrap().starts_with("Duration: "));
    let prints_line = lines.next().unwrap();
    let count: usize = prints_line
        .strip_prefix("Number of Prints: ")
        .unwrap()
        .parse()
        .unwrap();
    assert!(count > 0);
    assert_eq!(
        lines.next().unwrap(),
        "Fingerprint format: Hash, t1, f1, m1, t2, f2, m2, t3, f3, m3, ts"
    );
    assert_eq!(lines.next().unwrap(), "Fingerprints:");
    // Each fingerprint line carries 11 fields.
    let first = lines.next().unwrap();
    assert_eq!(first.split_whitespace().count(), 11);
}

#[test]
fn file_cache_feeds_a_fresh_store() {
    let fixture = fixture();

    // First engine: memory store with a write-through file cache.
    let mut config = Config::default();
    config.storage_backend = StorageBackendKind::Memory;
    config.cache_to_file = true;
    config.cache_folder = fixture.root.join("cache").display().to_string();
    config.report_folder = fixture.root.join("reports").display().to_string();
    let engine = Engine::new(config.clone()).unwrap();
    engine.store(&fixture.reference).unwrap();

    let identifier = tritone_core::resource::resource_id(&fixture.reference);
    let tdb = fixture.root.join("cache").join(format!("{}.tdb", identifier));
    assert!(tdb.exists());

    // Second engine: fresh memory store, fed from the cache folder, with
    // query-side extraction also reading cached prints.
    config.cache_to_file = false;
    config.use_cached_prints = true;
    let fresh = Engine::new(config).unwrap();
    assert_eq!(fresh.stats().unwrap().posting_count, 0);

    let loaded = fresh.load_cache_into_store().unwrap();
    assert_eq!(loaded, 1);
    assert!(fresh.has_resource(&fixture.reference).unwrap());

    let outcome = query_all(&fresh, &fixture.reference);
    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].score >= 200);
}

#[test]
fn monitor_finds_embedded_snippets() {
    let fixture = fixture();
    let engine = engine_with(&fixture, Arc::new(MemoryStorage::new()));
    engine.store(&fixture.reference).unwrap();

    // The reference is 30 s, so monitoring it directly launches a window at
    // [0, 25) only.
    let outcome = engine
        .monitor(&fixture.reference, 10, &HashSet::new(), Deadline::none())
        .unwrap();
    assert!(!outcome.cancelled);
    assert_eq!(outcome.results.len(), 1);
    let result = &outcome.results[0];
    assert!(result.query_path.ends_with("-0_25"));
    assert!(result.ref_start < 1.0);
    assert!(result.time_factor > 0.99 && result.time_factor < 1.01);
}
