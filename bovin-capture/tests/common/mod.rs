//! Shared fixtures for bovin-capture integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bovin_capture::capture::{CaptureSettings, SelectedFile, SourceSelector};
use bovin_capture::models::{
    AnimalId, CaptureResult, Measurement, Measurements, MorphologyRecord, NewMorphologyRecord,
};
use bovin_capture::services::{
    Collaborators, IdentificationResponse, IdentificationService, InMemoryRecordStore,
    MorphologyResponse, MorphologyService, PersistenceError, ProcessingError, RecordStore,
};
use uuid::Uuid;
use bovin_capture::workflow::{WorkflowServices, WorkflowSettings};
use bovin_common::events::EventBus;

pub const JPEG_MAGIC: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];
pub const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// JPEG-looking bytes of exactly `size` bytes; `seed` varies the payload
pub fn jpeg_bytes(size: usize, seed: u8) -> Vec<u8> {
    let mut bytes = JPEG_MAGIC.to_vec();
    bytes.resize(size.max(JPEG_MAGIC.len()), seed);
    bytes
}

pub fn jpeg_file(size: usize, seed: u8) -> SelectedFile {
    SelectedFile::new(jpeg_bytes(size, seed)).with_name(format!("cow-{}.jpg", seed))
}

pub fn reference_measurements() -> Measurements {
    Measurements {
        hauteur_au_garrot: Measurement::cm(124.5),
        largeur_du_corps: Measurement::cm(57.2),
        longueur_du_corps: Measurement::cm(142.0),
    }
}

/// Identification collaborator with a fixed answer, adjustable latency and
/// a log of every image it was sent
pub struct ScriptedIdentification {
    response: Mutex<Result<IdentificationResponse, ProcessingError>>,
    delay_ms: AtomicU64,
    calls: AtomicUsize,
    seen: Mutex<Vec<Bytes>>,
}

impl ScriptedIdentification {
    pub fn answering(cow_id: &str, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Ok(IdentificationResponse {
                cow_id: cow_id.to_string(),
                confidence,
            })),
            delay_ms: AtomicU64::new(0),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_with(&self, error: ProcessingError) {
        *self.response.lock().unwrap() = Err(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Bytes> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentificationService for ScriptedIdentification {
    async fn process_identification(
        &self,
        image: &CaptureResult,
    ) -> Result<IdentificationResponse, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(image.encoded_image.clone());
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.response.lock().unwrap().clone()
    }

    async fn capture_from_camera(
        &self,
        _camera_id: &str,
    ) -> Result<IdentificationResponse, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.lock().unwrap().clone()
    }
}

/// Morphology collaborator with a fixed answer
pub struct ScriptedMorphology {
    response: Mutex<Result<MorphologyResponse, ProcessingError>>,
    delay_ms: AtomicU64,
    calls: AtomicUsize,
    cow_ids: Mutex<Vec<AnimalId>>,
}

impl ScriptedMorphology {
    pub fn answering(measurements: Measurements, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Ok(MorphologyResponse {
                measurements,
                confidence,
            })),
            delay_ms: AtomicU64::new(0),
            calls: AtomicUsize::new(0),
            cow_ids: Mutex::new(Vec::new()),
        })
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cow_ids(&self) -> Vec<AnimalId> {
        self.cow_ids.lock().unwrap().clone()
    }
}

#[async_trait]
impl MorphologyService for ScriptedMorphology {
    async fn process_morphology(
        &self,
        cow_id: &AnimalId,
        _image: &CaptureResult,
    ) -> Result<MorphologyResponse, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cow_ids.lock().unwrap().push(cow_id.clone());
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.response.lock().unwrap().clone()
    }

    async fn capture_morphology_from_camera(
        &self,
        _camera_id: &str,
        cow_id: &AnimalId,
    ) -> Result<MorphologyResponse, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cow_ids.lock().unwrap().push(cow_id.clone());
        self.response.lock().unwrap().clone()
    }
}

/// In-memory store whose next `create` calls fail as unreachable
pub struct FlakyRecordStore {
    inner: Arc<InMemoryRecordStore>,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyRecordStore {
    pub fn new(inner: Arc<InMemoryRecordStore>) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FlakyRecordStore {
    async fn create_morphology_record(
        &self,
        record: &NewMorphologyRecord,
    ) -> Result<MorphologyRecord, PersistenceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PersistenceError::Unreachable("connection refused".to_string()));
        }
        self.inner.create_morphology_record(record).await
    }

    async fn get_morphology_record(
        &self,
        id: Uuid,
    ) -> Result<Option<MorphologyRecord>, PersistenceError> {
        self.inner.get_morphology_record(id).await
    }

    async fn delete_morphology_record(&self, id: Uuid) -> Result<bool, PersistenceError> {
        self.inner.delete_morphology_record(id).await
    }
}

/// Scripted collaborators wired into shared workflow services
pub struct Harness {
    pub identification: Arc<ScriptedIdentification>,
    pub morphology: Arc<ScriptedMorphology>,
    pub records: Arc<InMemoryRecordStore>,
    /// Wraps `records`; the store the workflow actually talks to
    pub store: Arc<FlakyRecordStore>,
    pub event_bus: EventBus,
    pub services: Arc<WorkflowServices>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            SourceSelector::upload_only(CaptureSettings::default()),
            WorkflowSettings::default(),
        )
    }

    pub fn build(selector: SourceSelector, settings: WorkflowSettings) -> Self {
        Self::with_collaborators(
            ScriptedIdentification::answering("FR000000001", 0.95),
            ScriptedMorphology::answering(reference_measurements(), 0.9),
            selector,
            settings,
        )
    }

    pub fn with_collaborators(
        identification: Arc<ScriptedIdentification>,
        morphology: Arc<ScriptedMorphology>,
        selector: SourceSelector,
        settings: WorkflowSettings,
    ) -> Self {
        let records = Arc::new(InMemoryRecordStore::new());
        let store = Arc::new(FlakyRecordStore::new(records.clone()));
        let event_bus = EventBus::new(64);
        let collaborators = Collaborators {
            identification: identification.clone(),
            morphology: morphology.clone(),
            records: store.clone(),
        };
        let services = Arc::new(WorkflowServices::new(
            collaborators,
            selector,
            settings,
            event_bus.clone(),
        ));
        Self {
            identification,
            morphology,
            records,
            store,
            event_bus,
            services,
        }
    }
}
