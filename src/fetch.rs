use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::RunId;
use crate::error::KiraError;
use crate::fs_util;
use crate::store::SigStore;
use crate::wort::WortClient;

pub const DEFAULT_MAX_DOWNLOADERS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum FetchOutcome {
    Fetched(Utf8PathBuf),
    NotFound,
    TransientFailure(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub id: RunId,
    #[serde(flatten)]
    pub outcome: FetchOutcome,
}

/// Downloads missing signatures with at most `max_downloaders` transfers
/// in flight. Every identifier yields exactly one report; failures are
/// values, never errors.
pub struct Fetcher<'a, W: WortClient> {
    client: &'a W,
    store: &'a SigStore,
    max_downloaders: usize,
}

impl<'a, W: WortClient> Fetcher<'a, W> {
    pub fn new(client: &'a W, store: &'a SigStore, max_downloaders: usize) -> Self {
        Self {
            client,
            store,
            max_downloaders: max_downloaders.max(1),
        }
    }

    pub fn fetch_all(&self, missing: &[RunId], sink: &dyn ProgressSink) -> Vec<FetchReport> {
        if missing.is_empty() {
            return Vec::new();
        }
        let workers = self.max_downloaders.min(missing.len());
        info!(total = missing.len(), workers, "starting signature downloads");

        let (job_tx, job_rx) = mpsc::channel::<RunId>();
        for id in missing {
            // receiver is alive until the scope below ends
            let _ = job_tx.send(id.clone());
        }
        drop(job_tx);
        let jobs = Mutex::new(job_rx);
        let (result_tx, result_rx) = mpsc::channel::<FetchReport>();

        let start = Instant::now();
        let mut reports = Vec::with_capacity(missing.len());
        thread::scope(|scope| {
            for worker_id in 0..workers {
                let jobs = &jobs;
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    debug!(worker_id, "download worker started");
                    loop {
                        let next = match jobs.lock() {
                            Ok(receiver) => receiver.recv(),
                            Err(_) => break,
                        };
                        let Ok(id) = next else {
                            break;
                        };
                        let outcome = self.fetch_one(&id);
                        if result_tx.send(FetchReport { id, outcome }).is_err() {
                            break;
                        }
                    }
                    debug!(worker_id, "download worker stopped");
                });
            }
            drop(result_tx);

            for report in result_rx {
                sink.event(ProgressEvent {
                    message: format!(
                        "fetch {}/{}: {} {}",
                        reports.len() + 1,
                        missing.len(),
                        report.id,
                        describe(&report.outcome)
                    ),
                    elapsed: Some(start.elapsed()),
                });
                reports.push(report);
            }
        });

        let fetched = reports
            .iter()
            .filter(|report| matches!(report.outcome, FetchOutcome::Fetched(_)))
            .count();
        info!(
            fetched,
            total = reports.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "signature downloads finished"
        );
        reports
    }

    pub fn fetch_one(&self, id: &RunId) -> FetchOutcome {
        match self.try_fetch(id) {
            Ok(Some(path)) => {
                debug!(%id, %path, "signature fetched");
                FetchOutcome::Fetched(path)
            }
            Ok(None) => {
                debug!(%id, "signature not in wort");
                FetchOutcome::NotFound
            }
            Err(err) => {
                warn!(%id, error = %err, "signature download failed");
                FetchOutcome::TransientFailure(err.to_string())
            }
        }
    }

    fn try_fetch(&self, id: &RunId) -> Result<Option<Utf8PathBuf>, KiraError> {
        let Some(location) = self.client.locate(id)? else {
            return Ok(None);
        };
        // dropped (and deleted) on every early return below
        let mut partial = self.store.partial_file(id)?;
        self.client.download(&location, partial.as_file_mut())?;
        partial
            .as_file()
            .sync_all()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs_util::validate_signature(partial.path())?;
        self.store.publish(partial, id).map(Some)
    }
}

fn describe(outcome: &FetchOutcome) -> String {
    match outcome {
        FetchOutcome::Fetched(_) => "fetched".to_string(),
        FetchOutcome::NotFound => "not found".to_string(),
        FetchOutcome::TransientFailure(cause) => format!("failed ({cause})"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::output::JsonOutput;

    struct MapWort {
        objects: HashMap<String, Vec<u8>>,
    }

    impl WortClient for MapWort {
        fn locate(&self, id: &RunId) -> Result<Option<String>, KiraError> {
            Ok(self
                .objects
                .contains_key(id.as_str())
                .then(|| id.as_str().to_string()))
        }

        fn download(
            &self,
            location: &str,
            destination: &mut dyn Write,
        ) -> Result<u64, KiraError> {
            let bytes = &self.objects[location];
            destination
                .write_all(bytes)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            Ok(bytes.len() as u64)
        }
    }

    #[test]
    fn outcomes_cover_every_identifier() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = SigStore::new(&root).unwrap();
        let client = MapWort {
            objects: HashMap::from([
                ("SRR2".to_string(), b"sig-2".to_vec()),
                ("SRR4".to_string(), Vec::new()),
            ]),
        };
        let missing = ["SRR2", "SRR3", "SRR4"]
            .iter()
            .map(|value| value.parse().unwrap())
            .collect::<Vec<RunId>>();

        let mut reports = Fetcher::new(&client, &store, 2).fetch_all(&missing, &JsonOutput);
        reports.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(reports.len(), 3);
        assert_eq!(
            reports[0].outcome,
            FetchOutcome::Fetched(store.sig_path(&missing[0]))
        );
        assert_eq!(reports[1].outcome, FetchOutcome::NotFound);
        // empty payloads are never published
        assert!(matches!(reports[2].outcome, FetchOutcome::TransientFailure(_)));
        assert!(!store.contains(&missing[2]));
        assert!(store.sweep_partials().unwrap().is_empty());
    }
}
