//! The engine ties extraction, storage and matching together: store,
//! delete, query and monitor operations over a configured backend.

use crate::audio::{self, decode_audio};
use crate::config::{Config, StorageBackendKind};
use crate::error::{Error, Result};
use crate::eventpoint::{EventPoint, EventPointExtractor};
use crate::fingerprint::{fingerprints_from_samples, Fingerprint};
use crate::matching::{Matcher, QueryOutcome};
use crate::monitor;
use crate::resource::resource_id;
use crate::spectral::SpectralFrontEnd;
use crate::Deadline;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tritone_fmt as fmt;
use tritone_store::{
    CachingStorage, FileStorage, KvStorage, MemoryStorage, ResourceMetadata, Storage, StorageStats,
};

/// Queries never look further than this many seconds into a resource.
const MAX_TIME_S: f64 = 5_000_000.0;

/// A fingerprinting engine bound to one storage backend. The backend is the
/// only shared mutable state; `&self` operations may run concurrently from
/// multiple threads.
pub struct Engine {
    config: Config,
    store: Arc<dyn Storage>,
}

impl Engine {
    /// Build the backend described by the configuration, wrapping it in a
    /// file cache when `cache_to_file` asks for one.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let primary: Arc<dyn Storage> = match config.storage_backend {
            StorageBackendKind::Memory => Arc::new(MemoryStorage::new()),
            StorageBackendKind::Kv => Arc::new(KvStorage::open(
                &Path::new(&config.db_folder).join("postings.db"),
            )?),
            StorageBackendKind::File => {
                Arc::new(FileStorage::open(Path::new(&config.cache_folder))?)
            }
        };
        let store: Arc<dyn Storage> =
            if config.cache_to_file && config.storage_backend != StorageBackendKind::File {
                log::info!(
                    "Using {:?} storage with a file cache in front",
                    config.storage_backend
                );
                let cache = FileStorage::open(Path::new(&config.cache_folder))?;
                Arc::new(CachingStorage::new(cache, primary))
            } else {
                log::info!("Using {:?} storage", config.storage_backend);
                primary
            };
        Ok(Self { config, store })
    }

    /// Run against a caller-provided backend.
    pub fn with_store(config: Config, store: Arc<dyn Storage>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extract a resource's fingerprints, index them and record its
    /// metadata. Returns the resource duration in seconds; zero (and no
    /// metadata) when nothing could be extracted.
    pub fn store(&self, path: &Path) -> Result<f32> {
        let prints = self.fingerprints(path, Deadline::none())?;
        let identifier = resource_id(path);

        if prints.is_empty() {
            log::warn!("No prints extracted for '{}'", path.display());
            return Ok(0.0);
        }

        let mut unique: HashSet<(u64, i32)> = HashSet::new();
        for print in &prints {
            if unique.insert((print.hash, print.t1)) {
                self.store.add(print.hash, identifier, print.t1);
            }
        }

        if let Err(flush_error) = self.store.flush_store() {
            // Compensating delete for whatever part of the batch landed.
            for &(hash, t1) in &unique {
                self.store.delete(hash, identifier, t1);
            }
            if let Err(rollback_error) = self.store.flush_delete() {
                log::warn!(
                    "Rollback after failed flush also failed: {}",
                    rollback_error
                );
            }
            return Err(flush_error.into());
        }

        let duration = self.config.frame_to_seconds(prints[prints.len() - 1].t3);
        self.store.put_metadata(&ResourceMetadata {
            identifier,
            path: path.display().to_string(),
            duration,
            num_fingerprints: unique.len() as i32,
        })?;

        self.write_report(path, duration, &prints)?;

        log::info!(
            "Stored {} fingerprints for '{}', id: {}",
            unique.len(),
            path.display(),
            identifier
        );
        Ok(duration)
    }

    /// Remove a resource's postings and metadata. Deleting an absent
    /// resource is a no-op.
    pub fn delete(&self, path: &Path) -> Result<f32> {
        let prints = self.fingerprints(path, Deadline::none())?;
        let identifier = resource_id(path);

        let mut unique: HashSet<(u64, i32)> = HashSet::new();
        for print in &prints {
            if unique.insert((print.hash, print.t1)) {
                self.store.delete(print.hash, identifier, print.t1);
            }
        }
        self.store.flush_delete()?;

        let duration = if prints.is_empty() {
            log::warn!("No prints extracted for '{}'", path.display());
            0.0
        } else {
            self.config.frame_to_seconds(prints[prints.len() - 1].t3)
        };
        self.store.delete_metadata(identifier)?;
        Ok(duration)
    }

    /// Identify a whole clip against the index.
    pub fn query(
        &self,
        path: &Path,
        max_results: usize,
        avoid: &HashSet<i32>,
        deadline: Deadline,
    ) -> Result<QueryOutcome> {
        let prints = match self.fingerprints(path, deadline) {
            Ok(prints) => prints,
            Err(Error::Cancelled) => return Ok(cancelled_outcome()),
            Err(e) => return Err(e),
        };
        let label = path.display().to_string();
        Matcher::new(&self.config, self.store.as_ref())
            .query(&label, &prints, max_results, avoid, deadline)
    }

    /// Identify `[start_s, start_s + len_s)` of a longer recording.
    pub fn query_window(
        &self,
        path: &Path,
        start_s: f64,
        len_s: f64,
        max_results: usize,
        avoid: &HashSet<i32>,
        deadline: Deadline,
    ) -> Result<QueryOutcome> {
        let prints = match self.fingerprints_window(path, start_s, len_s, deadline) {
            Ok(prints) => prints,
            Err(Error::Cancelled) => return Ok(cancelled_outcome()),
            Err(e) => return Err(e),
        };
        let label = format!("{}-{}_{}", path.display(), start_s, start_s + len_s);
        Matcher::new(&self.config, self.store.as_ref())
            .query(&label, &prints, max_results, avoid, deadline)
    }

    /// Slide fixed windows with overlap across a long query and run one
    /// independent sub-query per window. The audio is decoded once and
    /// sliced per window.
    pub fn monitor(
        &self,
        path: &Path,
        max_results: usize,
        avoid: &HashSet<i32>,
        deadline: Deadline,
    ) -> Result<QueryOutcome> {
        let audio = decode_audio(path, self.config.sample_rate)?;
        let samples = audio.to_mono();
        let duration_s = audio.duration_ms as f64 / 1000.0;

        let mut outcome = QueryOutcome::default();
        for window in monitor::windows(
            duration_s,
            self.config.monitor_step,
            self.config.monitor_overlap,
        ) {
            if deadline.expired() {
                outcome.cancelled = true;
                break;
            }
            let clip = audio::clip(
                &samples,
                self.config.sample_rate,
                window.start_s,
                window.len_s(),
            );
            let prints = match fingerprints_from_samples(clip, &self.config, deadline) {
                Ok(prints) => prints,
                Err(Error::Cancelled) => {
                    outcome.cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            let label = window.label(&path.display().to_string());
            let sub = Matcher::new(&self.config, self.store.as_ref())
                .query(&label, &prints, max_results, avoid, deadline)?;
            outcome.results.extend(sub.results);
            if sub.cancelled {
                outcome.cancelled = true;
                break;
            }
        }
        Ok(outcome)
    }

    /// Whether metadata exists for the resource at `path`.
    pub fn has_resource(&self, path: &Path) -> Result<bool> {
        Ok(self.store.get_metadata(resource_id(path))?.is_some())
    }

    /// Render a resource's stored metadata as a one-line summary.
    pub fn metadata(&self, path: &Path) -> Result<String> {
        let identifier = resource_id(path);
        let meta = self
            .store
            .get_metadata(identifier)?
            .ok_or(Error::NotFound(identifier))?;
        Ok(format!(
            "{} ; {} ; {:.3} (s) ; {} (#) ; {:.3} (#/s)",
            meta.identifier,
            meta.path,
            meta.duration,
            meta.num_fingerprints,
            meta.prints_per_second()
        ))
    }

    pub fn clear(&self) -> Result<()> {
        Ok(self.store.clear()?)
    }

    pub fn stats(&self) -> Result<StorageStats> {
        Ok(self.store.stats()?)
    }

    /// Event points of a resource, one `(t, f, m)` entry per peak.
    pub fn event_points(&self, path: &Path) -> Result<Vec<EventPoint>> {
        let samples = audio::decode_clip(path, self.config.sample_rate, 0.0, MAX_TIME_S)?;
        let mut front_end = SpectralFrontEnd::new(self.config.frame_size);
        let mut extractor = EventPointExtractor::new(&self.config);
        let mut points = Vec::new();
        for frame in audio::frames(&samples, self.config.frame_size, self.config.hop) {
            points.extend(extractor.process(front_end.magnitudes(frame)));
        }
        Ok(points)
    }

    /// Fingerprints for a whole resource, honouring the print cache.
    pub fn fingerprints(&self, path: &Path, deadline: Deadline) -> Result<Vec<Fingerprint>> {
        self.fingerprints_window(path, 0.0, MAX_TIME_S, deadline)
    }

    fn fingerprints_window(
        &self,
        path: &Path,
        start_s: f64,
        len_s: f64,
        deadline: Deadline,
    ) -> Result<Vec<Fingerprint>> {
        if self.config.use_cached_prints {
            if let Some(prints) = self.cached_prints(path, start_s, len_s)? {
                return Ok(prints);
            }
        }
        let samples = audio::decode_clip(path, self.config.sample_rate, start_s, len_s)?;
        fingerprints_from_samples(&samples, &self.config, deadline)
    }

    /// Cached prints for the window, or `None` when no cache file exists.
    fn cached_prints(
        &self,
        path: &Path,
        start_s: f64,
        len_s: f64,
    ) -> Result<Option<Vec<Fingerprint>>> {
        let identifier = resource_id(path);
        let tdb = Path::new(&self.config.cache_folder).join(fmt::tdb_file_name(identifier));
        if !tdb.exists() {
            log::info!(
                "No cached fingerprints at '{}' for '{}'",
                tdb.display(),
                path.display()
            );
            return Ok(None);
        }

        let records = fmt::read_print_file(&tdb).map_err(|e| Error::io(&tdb, e))?;
        let start_frame = self.config.seconds_to_frame(start_s);
        let mut prints = Vec::new();
        for record in records {
            let t1_seconds = self.config.frame_to_seconds(record.t1) as f64;
            if t1_seconds > start_s + len_s {
                break;
            }
            if t1_seconds >= start_s {
                // Rebase to the window start so cached prints line up with
                // freshly extracted ones.
                prints.push(Fingerprint::from_cached(record.hash, record.t1 - start_frame));
            }
        }
        log::info!(
            "Read {} cached fingerprints from '{}' for '{}'",
            prints.len(),
            tdb.display(),
            path.display()
        );
        Ok(Some(prints))
    }

    /// Replay every cached `.tdb` file (with its metadata sidecar) into the
    /// configured store, skipping resources already present. Returns the
    /// number of resources loaded.
    pub fn load_cache_into_store(&self) -> Result<usize> {
        let folder = Path::new(&self.config.cache_folder);
        let mut tdb_files: Vec<PathBuf> = std::fs::read_dir(folder)
            .map_err(|e| Error::io(folder, e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(fmt::TDB_EXTENSION))
            .collect();
        tdb_files.sort();

        let mut loaded = 0;
        for tdb in &tdb_files {
            let identifier: i32 = match tdb
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
            {
                Some(id) => id,
                None => {
                    log::warn!("Skipping cache file with non-numeric name: {}", tdb.display());
                    continue;
                }
            };
            if self.store.get_metadata(identifier)?.is_some() {
                log::info!(
                    "Skipped {}, store already contains resource {}",
                    tdb.display(),
                    identifier
                );
                continue;
            }

            let records = fmt::read_print_file(tdb).map_err(|e| Error::io(tdb, e))?;
            for record in &records {
                self.store.add(record.hash, record.resource_id, record.t1);
            }

            let meta_path = folder.join(fmt::meta_file_name(identifier));
            let meta = if meta_path.exists() {
                fmt::read_meta_file(&meta_path).map_err(|e| Error::io(&meta_path, e))?
            } else {
                None
            };
            match meta {
                Some(meta) => {
                    self.store.flush_store()?;
                    self.store.put_metadata(&ResourceMetadata {
                        identifier,
                        path: meta.path,
                        duration: meta.duration,
                        num_fingerprints: meta.num_fingerprints,
                    })?;
                    log::info!(
                        "Stored {} fingerprints and metadata for resource {}",
                        records.len(),
                        identifier
                    );
                    loaded += 1;
                }
                None => {
                    self.store.clear_store_queue();
                    log::warn!(
                        "Did not store fingerprints for {}: missing metadata sidecar at {}",
                        identifier,
                        meta_path.display()
                    );
                }
            }
        }
        Ok(loaded)
    }

    fn write_report(&self, path: &Path, duration: f32, prints: &[Fingerprint]) -> Result<()> {
        let folder = Path::new(&self.config.report_folder);
        std::fs::create_dir_all(folder).map_err(|e| Error::io(folder, e))?;
        let basename = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("resource");
        let report_path = folder.join(format!("{}.txt", basename));

        let entries: Vec<fmt::ReportEntry> = prints
            .iter()
            .map(|fp| fmt::ReportEntry {
                hash: fp.hash,
                t1: fp.t1,
                f1: fp.f1,
                m1: fp.m1,
                t2: fp.t2,
                f2: fp.f2,
                m2: fp.m2,
                t3: fp.t3,
                f3: fp.f3,
                m3: fp.m3,
                ts_ms: (self.config.frame_to_seconds(fp.min_time()) * 1000.0) as i32,
            })
            .collect();
        fmt::write_report(&report_path, duration, &entries)
            .map_err(|e| Error::io(&report_path, e))?;
        log::info!("Saved fingerprint report to '{}'", report_path.display());
        Ok(())
    }
}

fn cancelled_outcome() -> QueryOutcome {
    QueryOutcome {
        results: Vec::new(),
        cancelled: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn memory_engine(mut config: Config) -> Engine {
        config.storage_backend = StorageBackendKind::Memory;
        Engine::new(config).unwrap()
    }

    fn write_silence(path: &Path, seconds: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(seconds * 16_000.0) as usize {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn silent_audio_stores_nothing() {
        let dir = tempdir().unwrap();
        let clip = dir.path().join("silence.wav");
        write_silence(&clip, 2.0);

        let mut config = Config::default();
        config.report_folder = dir.path().join("reports").display().to_string();
        let engine = memory_engine(config);

        let duration = engine.store(&clip).unwrap();
        assert_eq!(duration, 0.0);
        assert!(!engine.has_resource(&clip).unwrap());
        assert_eq!(engine.stats().unwrap().posting_count, 0);
    }

    #[test]
    fn metadata_lookup_without_store_is_not_found() {
        let dir = tempdir().unwrap();
        let engine = memory_engine(Config::default());
        let missing = dir.path().join("1234.wav");
        assert!(matches!(
            engine.metadata(&missing),
            Err(Error::NotFound(1234))
        ));
    }

    #[test]
    fn cached_prints_bypass_decoding() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.use_cached_prints = true;
        config.cache_folder = dir.path().display().to_string();
        let engine = memory_engine(config);

        // Cache file for resource 77; the audio file itself does not exist.
        std::fs::write(dir.path().join("77.tdb"), "900 77 10\n901 77 50\n902 77 400\n").unwrap();

        let prints = engine
            .fingerprints(Path::new("77.wav"), Deadline::none())
            .unwrap();
        assert_eq!(prints.len(), 3);
        assert_eq!(prints[0].hash, 900);
        assert_eq!(prints[2].t1, 400);
    }

    #[test]
    fn cached_prints_respect_the_window_and_rebase() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.use_cached_prints = true;
        config.cache_folder = dir.path().display().to_string();
        let engine = memory_engine(config);

        // Prints at 0 s, 2 s and 6 s (125 frames per second).
        std::fs::write(
            dir.path().join("5.tdb"),
            "900 5 0\n901 5 250\n902 5 750\n",
        )
        .unwrap();

        let prints = engine
            .fingerprints_window(Path::new("5.wav"), 2.0, 3.0, Deadline::none())
            .unwrap();
        assert_eq!(prints.len(), 1);
        assert_eq!(prints[0].hash, 901);
        // 2 s into the resource becomes the window origin.
        assert_eq!(prints[0].t1, 0);
    }

    #[test]
    fn cache_load_requires_the_metadata_sidecar() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.cache_folder = dir.path().display().to_string();
        let engine = memory_engine(config);

        std::fs::write(dir.path().join("7.tdb"), "100 7 0\n101 7 40\n").unwrap();
        std::fs::write(dir.path().join("8.tdb"), "200 8 0\n201 8 40\n").unwrap();
        std::fs::write(dir.path().join("8_meta_data.txt"), "eight.wav\t4.5\t2\n").unwrap();

        let loaded = engine.load_cache_into_store().unwrap();
        assert_eq!(loaded, 1);

        // Resource 8 is queryable, resource 7 was dropped with its queue.
        assert_eq!(engine.stats().unwrap().posting_count, 2);
        assert!(engine.has_resource(Path::new("8.flac")).unwrap());
        assert!(!engine.has_resource(Path::new("7.flac")).unwrap());

        // A second load skips the resource that is already present.
        let loaded = engine.load_cache_into_store().unwrap();
        assert_eq!(loaded, 0);
    }
}
