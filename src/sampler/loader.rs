// Sample loader - Asynchronous decoding on worker threads
//
// Requests go out over a crossbeam channel shared by the workers; results
// come back over a second channel and are polled by the session. A failed
// load is reported once and leaves the sample unloaded, so its triggers
// stay silent.

use crate::sampler::SampleError;
use crate::sampler::data_url::{DataUrl, is_data_url};
use crate::sampler::sample::Sample;
use crate::sequencer::pattern::SampleRef;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolve a sample URL (data URL, absolute path, or path relative to `root`) and decode it
pub fn load_sample(sample: &SampleRef, root: &Path) -> Result<Sample, SampleError> {
    if sample.is_empty() {
        return Err(SampleError::NotFound(sample.name.clone()));
    }
    if is_data_url(&sample.url) {
        let data = DataUrl::parse(&sample.url)?;
        let extension = data.extension();
        return Sample::decode(sample.name.clone(), data.bytes, extension);
    }
    let path = PathBuf::from(&sample.url);
    let path = if path.is_absolute() { path } else { root.join(path) };
    let mut decoded = Sample::load(&path)?;
    decoded.name = sample.name.clone();
    Ok(decoded)
}

/// Outcome of one asynchronous load, keyed by sample identity
#[derive(Debug)]
pub struct LoadResult {
    pub key: String,
    pub result: Result<Arc<Sample>, SampleError>,
}

struct LoadRequest {
    sample: SampleRef,
}

pub struct SampleLoader {
    requests: Option<Sender<LoadRequest>>,
    results: Receiver<LoadResult>,
    workers: Vec<JoinHandle<()>>,
    pending: HashSet<String>,
}

impl SampleLoader {
    pub fn new(worker_count: usize, root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let (request_tx, request_rx) = unbounded::<LoadRequest>();
        let (result_tx, result_rx) = unbounded::<LoadResult>();

        let workers = (0..worker_count.max(1))
            .map(|index| {
                let requests = request_rx.clone();
                let results = result_tx.clone();
                let root = root.clone();
                std::thread::Builder::new()
                    .name(format!("sample-loader-{index}"))
                    .spawn(move || worker_loop(requests, results, root))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "failed to spawn sample loader worker");
                    None
                }
            })
            .collect();

        Self {
            requests: Some(request_tx),
            results: result_rx,
            workers,
            pending: HashSet::new(),
        }
    }

    /// Queue a sample; returns false if it is empty or already being loaded
    pub fn request(&mut self, sample: &SampleRef) -> bool {
        if sample.is_empty() || self.pending.contains(sample.key()) {
            return false;
        }
        let Some(requests) = &self.requests else {
            return false;
        };
        if requests
            .send(LoadRequest {
                sample: sample.clone(),
            })
            .is_err()
        {
            return false;
        }
        self.pending.insert(sample.key().to_string());
        true
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains(key)
    }

    /// Results that are ready now, without blocking
    pub fn poll(&mut self) -> Vec<LoadResult> {
        let ready: Vec<LoadResult> = self.results.try_iter().collect();
        for result in &ready {
            self.pending.remove(&result.key);
        }
        ready
    }

    /// Block until one result arrives or `timeout` elapses
    pub fn wait(&mut self, timeout: Duration) -> Option<LoadResult> {
        if self.pending.is_empty() {
            return None;
        }
        match self.results.recv_timeout(timeout) {
            Ok(result) => {
                self.pending.remove(&result.key);
                Some(result)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Block until every queued load has finished or `timeout` elapses per result
    pub fn wait_all(&mut self, timeout: Duration) -> Vec<LoadResult> {
        let mut results = Vec::new();
        while let Some(result) = self.wait(timeout) {
            results.push(result);
        }
        results
    }
}

impl Drop for SampleLoader {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loops
        self.requests.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(requests: Receiver<LoadRequest>, results: Sender<LoadResult>, root: PathBuf) {
    for LoadRequest { sample } in requests {
        let key = sample.key().to_string();
        let result = load_sample(&sample, &root).map(Arc::new);
        match &result {
            Ok(decoded) => debug!(sample = %sample.name, frames = decoded.frame_count(), "sample loaded"),
            Err(e) => warn!(sample = %sample.name, error = %e, "sample failed to load"),
        }
        if results.send(LoadResult { key, result }).is_err() {
            break;
        }
    }
}

/// Decoded samples by identity
#[derive(Debug, Clone, Default)]
pub struct SampleCache {
    samples: HashMap<String, Arc<Sample>>,
}

impl SampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, sample: Arc<Sample>) -> Option<Arc<Sample>> {
        self.samples.insert(key.into(), sample)
    }

    pub fn get(&self, key: &str) -> Option<&Arc<Sample>> {
        self.samples.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.samples.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Arc<Sample>> {
        self.samples.remove(key)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Store every successful result, returning the failures
    pub fn absorb(&mut self, results: Vec<LoadResult>) -> Vec<(String, SampleError)> {
        let mut failures = Vec::new();
        for LoadResult { key, result } in results {
            match result {
                Ok(sample) => {
                    self.samples.insert(key, sample);
                }
                Err(e) => failures.push((key, e)),
            }
        }
        failures
    }

    /// Load everything not yet cached, synchronously (offline rendering)
    pub fn load_missing<'a>(
        &mut self,
        samples: impl IntoIterator<Item = &'a SampleRef>,
        root: &Path,
    ) -> Vec<(String, SampleError)> {
        let mut failures = Vec::new();
        for sample in samples {
            if sample.is_empty() || self.contains(sample.key()) {
                continue;
            }
            match load_sample(sample, root) {
                Ok(decoded) => {
                    self.samples.insert(sample.key().to_string(), Arc::new(decoded));
                }
                Err(e) => {
                    warn!(sample = %sample.name, error = %e, "sample failed to load");
                    failures.push((sample.key().to_string(), e));
                }
            }
        }
        failures
    }
}
