use crate::config::{DuplicatePolicy, UploaderConfig};
use crate::error::{Result, UploadError};
use crate::models::{FileHandle, UploadRecord, UploadState, UploadView};
use crate::services::authorization::Authorizer;
use crate::services::transfer::{TransferEvent, Transport};
use crate::utils::validation::{destination_key, suffixed_name};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Outcome of admitting one file
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted {
        file_name: String,
        destination_key: String,
    },
    Rejected {
        file_name: String,
        error: UploadError,
    },
}

/// One record plus the things only the orchestrator may touch.
/// Invariant: `cancel_token` is `Some` exactly while the state is `InFlight`.
struct TrackedUpload {
    id: Uuid,
    record: UploadRecord,
    cancel_token: Option<CancellationToken>,
}

impl TrackedUpload {
    fn start(&mut self) -> Option<CancellationToken> {
        if self.record.state != UploadState::Pending {
            return None;
        }
        let token = CancellationToken::new();
        self.record.state = UploadState::InFlight;
        self.cancel_token = Some(token.clone());
        Some(token)
    }

    fn complete(&mut self) {
        self.record.progress = 100.0;
        self.record.state = UploadState::Completed;
        self.cancel_token = None;
    }

    fn fail(&mut self, err: &UploadError) {
        self.record.state = UploadState::Failed;
        self.record.failure = Some(err.into());
        self.cancel_token = None;
    }

    fn cancel(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if self.record.state.is_active() {
            self.record.state = UploadState::Cancelled;
        }
    }
}

#[derive(Default)]
struct UploadSet {
    uploads: Vec<TrackedUpload>,
    completed_paths: BTreeMap<String, String>,
    revision: u64,
}

impl UploadSet {
    fn touch(&mut self) {
        self.revision += 1;
    }

    fn position(&self, file_name: &str) -> Option<usize> {
        self.uploads
            .iter()
            .position(|u| u.record.file_name == file_name)
    }

    fn get_mut(&mut self, id: Uuid) -> Option<&mut TrackedUpload> {
        self.uploads.iter_mut().find(|u| u.id == id)
    }

    fn remove_at(&mut self, idx: usize) -> UploadRecord {
        let mut upload = self.uploads.remove(idx);
        upload.cancel();
        self.completed_paths.remove(&upload.record.file_name);
        self.touch();
        upload.record
    }

    fn view(&self) -> UploadView {
        UploadView {
            revision: self.revision,
            records: self.uploads.iter().map(|u| u.record.clone()).collect(),
            completed_paths: self.completed_paths.clone(),
        }
    }
}

struct Inner {
    config: UploaderConfig,
    authorizer: Arc<dyn Authorizer>,
    transport: Arc<dyn Transport>,
    set: Mutex<UploadSet>,
    view_tx: watch::Sender<UploadView>,
}

/// Drives one authorization and one transfer per staged file.
///
/// The handle is cheap to clone; all clones share the same upload set.
/// `admit` spawns onto the current Tokio runtime and must be called from
/// within one.
#[derive(Clone)]
pub struct UploadOrchestrator {
    inner: Arc<Inner>,
}

impl UploadOrchestrator {
    pub fn new(
        config: UploaderConfig,
        authorizer: Arc<dyn Authorizer>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.check()?;
        let (view_tx, _) = watch::channel(UploadView::default());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                authorizer,
                transport,
                set: Mutex::new(UploadSet::default()),
                view_tx,
            }),
        })
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.inner.config
    }

    /// Stages files and starts their uploads.
    ///
    /// In single-file mode the current record is discarded (its transfer is
    /// cancelled) and only the first file of the batch is admitted.
    pub fn admit(&self, files: impl IntoIterator<Item = FileHandle>) -> Vec<Admission> {
        let mut started = Vec::new();

        let admissions = self.with_set(|set| {
            let mut admissions = Vec::new();
            let mut files = files.into_iter();

            if !self.inner.config.multiple {
                let Some(first) = files.next() else {
                    return admissions;
                };
                while !set.uploads.is_empty() {
                    let discarded = set.remove_at(0);
                    tracing::info!("♻️  Replacing staged file {}", discarded.file_name);
                }
                admissions.push(self.admit_one(set, first, &mut started));
                for skipped in files {
                    let file_name = skipped.name().to_string();
                    tracing::warn!("Single-file mode, skipping {}", file_name);
                    admissions.push(Admission::Rejected {
                        error: UploadError::SingleFileMode(file_name.clone()),
                        file_name,
                    });
                }
            } else {
                for file in files {
                    admissions.push(self.admit_one(set, file, &mut started));
                }
            }

            admissions
        });

        for (id, file, key) in started {
            let span = tracing::info_span!("upload", file = %file.name(), key = %key);
            let orchestrator = self.clone();
            tokio::spawn(async move { orchestrator.drive(id, file, key).await }.instrument(span));
        }

        admissions
    }

    fn admit_one(
        &self,
        set: &mut UploadSet,
        mut file: FileHandle,
        started: &mut Vec<(Uuid, FileHandle, String)>,
    ) -> Admission {
        let mut replace = None;

        if let Some(idx) = set.position(file.name()) {
            if set.uploads[idx].record.is_failed() {
                // Re-admitting a failed file is how it gets retried
                replace = Some(idx);
            } else {
                match self.inner.config.duplicate_policy {
                    DuplicatePolicy::Reject => {
                        tracing::warn!("⚠️  Rejecting duplicate file name {}", file.name());
                        return Admission::Rejected {
                            file_name: file.name().to_string(),
                            error: UploadError::DuplicateFileName(file.name().to_string()),
                        };
                    }
                    DuplicatePolicy::AutoSuffix => {
                        let mut n = 1;
                        let name = loop {
                            let candidate = suffixed_name(file.name(), n);
                            if set.position(&candidate).is_none() {
                                break candidate;
                            }
                            n += 1;
                        };
                        tracing::info!("Staging duplicate {} as {}", file.name(), name);
                        file = file.renamed(name);
                    }
                }
            }
        }

        let key = destination_key(&self.inner.config.destination_path_prefix, file.name());
        let upload = TrackedUpload {
            id: Uuid::new_v4(),
            record: UploadRecord::pending(file.name().to_string(), key.clone(), file.len()),
            cancel_token: None,
        };
        let id = upload.id;

        match replace {
            Some(idx) => set.uploads[idx] = upload,
            None => set.uploads.push(upload),
        }
        set.touch();

        tracing::info!("📥 Staged {} ({} bytes) -> {}", file.name(), file.len(), key);
        let file_name = file.name().to_string();
        started.push((id, file, key.clone()));

        Admission::Admitted {
            file_name,
            destination_key: key,
        }
    }

    async fn drive(self, id: Uuid, file: FileHandle, key: String) {
        let signed = match self.inner.authorizer.authorize(&key).await {
            Ok(url) => url,
            Err(e) => {
                self.fail(id, e);
                return;
            }
        };

        let Some(token) = self.with_set(|set| {
            let token = set.get_mut(id).and_then(|u| u.start());
            if token.is_some() {
                set.touch();
            }
            token
        }) else {
            tracing::debug!("Record removed before authorization returned, not starting transfer");
            return;
        };

        tracing::info!("📤 Uploading {}", key);
        let mut events = self.inner.transport.transfer(file, signed, token);
        let mut settled = false;

        while let Some(event) = events.next().await {
            settled = event.is_terminal();
            match event {
                TransferEvent::Progress(value) => {
                    if !self.apply_progress(id, value) {
                        break;
                    }
                }
                TransferEvent::Completed => {
                    self.apply_progress(id, 100.0);
                    break;
                }
                TransferEvent::Cancelled => {
                    tracing::debug!("Transfer aborted");
                    break;
                }
                TransferEvent::Failed(e) => {
                    self.fail(id, e);
                    break;
                }
            }
        }

        // A stream that stops early must not leave the record in flight
        if !settled {
            self.fail(
                id,
                UploadError::Transfer {
                    status: None,
                    message: "transfer ended without a result".to_string(),
                },
            );
        }
    }

    /// Records progress for a staged file. Reaching 100 completes it.
    ///
    /// Returns `false` when the file is not currently uploading, in which case
    /// nothing changes.
    pub fn on_progress(&self, file_name: &str, value: f64) -> bool {
        let id = {
            let set = self.lock();
            match set.position(file_name) {
                Some(idx) => set.uploads[idx].id,
                None => return false,
            }
        };
        self.apply_progress(id, value)
    }

    /// Returns whether the record is still in flight afterwards
    fn apply_progress(&self, id: Uuid, value: f64) -> bool {
        self.with_set(|set| {
            let Some(upload) = set.get_mut(id) else {
                return false;
            };
            if upload.record.state != UploadState::InFlight {
                return false;
            }

            let value = value.clamp(0.0, 100.0);
            if value.is_nan() || value <= upload.record.progress {
                return true;
            }
            upload.record.progress = value;

            let still_in_flight = if value >= 100.0 {
                upload.complete();
                let name = upload.record.file_name.clone();
                let key = upload.record.destination_key.clone();
                tracing::info!("✅ Uploaded {} to {}", name, key);
                set.completed_paths.insert(name, key);
                false
            } else {
                true
            };

            set.touch();
            still_in_flight
        })
    }

    fn fail(&self, id: Uuid, err: UploadError) {
        self.with_set(|set| {
            if let Some(upload) = set.get_mut(id) {
                if upload.record.state.is_active() {
                    tracing::error!("❌ Upload of {} failed: {}", upload.record.file_name, err);
                    upload.fail(&err);
                    set.touch();
                }
            }
        });
    }

    /// Removes a staged file at once and aborts its transfer if one is running.
    /// Returns the removed record.
    pub fn cancel(&self, file_name: &str) -> Option<UploadRecord> {
        self.with_set(|set| {
            let idx = set.position(file_name)?;
            let record = set.remove_at(idx);
            tracing::warn!("🛑 Cancelled {}", record.file_name);
            Some(record)
        })
    }

    /// Removes every staged file
    pub fn cancel_all(&self) -> Vec<UploadRecord> {
        self.with_set(|set| {
            let mut removed = Vec::with_capacity(set.uploads.len());
            while !set.uploads.is_empty() {
                removed.push(set.remove_at(0));
            }
            if !removed.is_empty() {
                tracing::warn!("🛑 Cancelled {} staged file(s)", removed.len());
            }
            removed
        })
    }

    /// Staged files in admission order
    pub fn snapshot(&self) -> Vec<UploadRecord> {
        self.lock()
            .uploads
            .iter()
            .map(|u| u.record.clone())
            .collect()
    }

    /// `file name -> destination key` for every completed upload
    pub fn completed_paths(&self) -> BTreeMap<String, String> {
        self.lock().completed_paths.clone()
    }

    /// Receives a fresh view after every change
    pub fn subscribe(&self) -> watch::Receiver<UploadView> {
        self.inner.view_tx.subscribe()
    }

    /// Resolves once no staged file is pending or in flight
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        loop {
            let busy = rx
                .borrow_and_update()
                .records
                .iter()
                .any(|r| !r.state.is_terminal());
            if !busy || rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, UploadSet> {
        self.inner
            .set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn with_set<R>(&self, f: impl FnOnce(&mut UploadSet) -> R) -> R {
        let mut set = self.lock();
        let before = set.revision;
        let out = f(&mut *set);
        if set.revision != before {
            self.inner.view_tx.send_replace(set.view());
        }
        out
    }
}
