//! Voice model catalog and lifecycle.
//!
//! The manager owns every resident model. A model loads lazily on
//! first resolve; concurrent resolves for the same voice collapse into
//! one load (single-flight) and all callers observe the same terminal
//! state. Idle models beyond the residency limit are evicted in
//! least-recently-used order, never while references are in flight.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::Device;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use voxserve_core::{SynthError, SynthResult};

/// A loaded voice model, resident on its device.
#[derive(Debug)]
pub struct VoiceModel {
    voice_id: String,
    sample_rate: u32,
    embedding: Vec<f32>,
    device: Device,
}

impl VoiceModel {
    /// Construct a model from already-materialized parts.
    pub fn new(voice_id: String, sample_rate: u32, embedding: Vec<f32>, device: Device) -> Self {
        Self {
            voice_id,
            sample_rate,
            embedding,
            device,
        }
    }

    /// Voice identifier this model was loaded for.
    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    /// Native output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Speaker embedding vector.
    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    /// Device the weights are resident on.
    pub fn device(&self) -> &Device {
        &self.device
    }
}

/// Source of model weights.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Whether the catalog contains this voice.
    async fn exists(&self, voice_id: &str) -> bool;

    /// Load the model for this voice.
    async fn load(&self, voice_id: &str) -> SynthResult<VoiceModel>;

    /// List all voices in the catalog.
    async fn list(&self) -> SynthResult<Vec<String>>;
}

/// On-disk per-voice metadata, read from `config.json`.
#[derive(Debug, Deserialize)]
struct VoiceSpec {
    #[serde(default = "default_spec_sample_rate")]
    sample_rate: u32,
    #[serde(default = "default_embedding_tensor")]
    embedding_tensor: String,
}

fn default_spec_sample_rate() -> u32 {
    24000
}

fn default_embedding_tensor() -> String {
    "speaker_embedding".to_string()
}

/// Filesystem loader: one subdirectory per voice, holding
/// `config.json` and `model.safetensors`.
pub struct FsLoader {
    dir: PathBuf,
    device: Device,
}

impl FsLoader {
    /// Create a loader over a catalog directory.
    pub fn new(dir: impl Into<PathBuf>, device: Device) -> Self {
        Self {
            dir: dir.into(),
            device,
        }
    }

    fn voice_dir(&self, voice_id: &str) -> PathBuf {
        self.dir.join(voice_id)
    }

    fn load_sync(dir: &Path, voice_id: &str, device: &Device) -> SynthResult<VoiceModel> {
        let config_path = dir.join("config.json");
        let config_text = std::fs::read_to_string(&config_path)
            .map_err(|e| SynthError::model_load(voice_id, format!("read config.json: {e}")))?;
        let spec: VoiceSpec = serde_json::from_str(&config_text)
            .map_err(|e| SynthError::model_load(voice_id, format!("parse config.json: {e}")))?;

        let weights_path = dir.join("model.safetensors");
        let tensors = candle_core::safetensors::load(&weights_path, device)
            .map_err(|e| SynthError::model_load(voice_id, format!("load weights: {e}")))?;

        let embedding = tensors
            .get(&spec.embedding_tensor)
            .ok_or_else(|| {
                SynthError::model_load(
                    voice_id,
                    format!("missing tensor '{}'", spec.embedding_tensor),
                )
            })?
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| SynthError::model_load(voice_id, format!("read embedding: {e}")))?;

        Ok(VoiceModel::new(
            voice_id.to_string(),
            spec.sample_rate,
            embedding,
            device.clone(),
        ))
    }
}

#[async_trait]
impl ModelLoader for FsLoader {
    async fn exists(&self, voice_id: &str) -> bool {
        // Separators or dot components would escape the catalog root.
        // Dots inside a name are fine (cosyvoice2-0.5b).
        if voice_id.is_empty()
            || voice_id.contains(['/', '\\'])
            || voice_id == "."
            || voice_id == ".."
        {
            return false;
        }
        self.voice_dir(voice_id).join("config.json").is_file()
    }

    #[instrument(skip(self))]
    async fn load(&self, voice_id: &str) -> SynthResult<VoiceModel> {
        let dir = self.voice_dir(voice_id);
        let voice = voice_id.to_string();
        let device = self.device.clone();
        let started = Instant::now();

        let model =
            tokio::task::spawn_blocking(move || Self::load_sync(&dir, &voice, &device))
                .await
                .map_err(|e| SynthError::internal(format!("load task panicked: {e}")))??;

        info!(
            voice_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "voice model loaded"
        );
        Ok(model)
    }

    async fn list(&self) -> SynthResult<Vec<String>> {
        let mut voices = Vec::new();
        let entries = std::fs::read_dir(&self.dir)?;
        for entry in entries {
            let entry = entry?;
            if entry.path().join("config.json").is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    voices.push(name.to_string());
                }
            }
        }
        voices.sort();
        Ok(voices)
    }
}

/// A load failure shared by every caller of the same single-flight
/// load. Sticky until the slot is evicted.
#[derive(Debug, Clone)]
struct LoadFailure {
    voice: String,
    reason: String,
}

impl LoadFailure {
    fn to_error(&self) -> SynthError {
        SynthError::model_load(self.voice.clone(), self.reason.clone())
    }
}

type SlotState = Result<Arc<VoiceModel>, LoadFailure>;

/// Per-voice cache slot.
#[derive(Debug)]
struct ModelSlot {
    cell: OnceCell<SlotState>,
    refs: AtomicUsize,
    last_used: Mutex<Instant>,
}

impl ModelSlot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            refs: AtomicUsize::new(0),
            last_used: Mutex::new(Instant::now()),
        }
    }

    fn is_ready(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }
}

/// Owns the lifecycle of every voice model in the process.
pub struct ModelManager {
    loader: Arc<dyn ModelLoader>,
    slots: DashMap<String, Arc<ModelSlot>>,
    max_resident: usize,
}

impl ModelManager {
    /// Create a manager over the given weight source.
    pub fn new(loader: Arc<dyn ModelLoader>, max_resident: usize) -> Self {
        Self {
            loader,
            slots: DashMap::new(),
            max_resident,
        }
    }

    /// Resolve a voice to a loaded model, loading it on first use.
    ///
    /// Concurrent calls for the same unseen voice perform exactly one
    /// load; every caller receives the same Ready model or the same
    /// load error.
    #[instrument(skip(self))]
    pub async fn resolve(&self, voice_id: &str) -> SynthResult<ModelHandle> {
        if !self.loader.exists(voice_id).await {
            return Err(SynthError::ModelNotFound(voice_id.to_string()));
        }

        let slot = self
            .slots
            .entry(voice_id.to_string())
            .or_insert_with(|| Arc::new(ModelSlot::new()))
            .clone();

        let state = slot
            .cell
            .get_or_init(|| async {
                match self.loader.load(voice_id).await {
                    Ok(model) => Ok(Arc::new(model)),
                    Err(e) => {
                        warn!(voice_id, error = %e, "voice model load failed");
                        Err(LoadFailure {
                            voice: voice_id.to_string(),
                            reason: e.to_string(),
                        })
                    }
                }
            })
            .await;

        let model = match state {
            Ok(model) => Arc::clone(model),
            Err(failure) => return Err(failure.to_error()),
        };

        slot.refs.fetch_add(1, Ordering::SeqCst);
        *slot.last_used.lock() = Instant::now();
        self.evict_idle();

        Ok(ModelHandle { model, slot })
    }

    /// List all voices in the catalog, loaded or not.
    pub async fn list_voices(&self) -> SynthResult<Vec<String>> {
        self.loader.list().await
    }

    /// Number of models currently resident and ready.
    pub fn resident_count(&self) -> usize {
        self.slots.iter().filter(|e| e.value().is_ready()).count()
    }

    /// Drop a voice from the cache. A no-op while references are in
    /// flight; returns whether the slot was removed.
    pub fn evict(&self, voice_id: &str) -> bool {
        let removed = self
            .slots
            .remove_if(voice_id, |_, slot| slot.refs.load(Ordering::SeqCst) == 0);
        if removed.is_some() {
            info!(voice_id, "voice model evicted");
            true
        } else {
            false
        }
    }

    /// Evict least-recently-used idle models beyond the residency limit.
    fn evict_idle(&self) {
        loop {
            let resident = self.resident_count();
            if resident <= self.max_resident {
                return;
            }

            // Oldest idle ready slot; occupied slots are ineligible.
            let victim = self
                .slots
                .iter()
                .filter(|e| e.value().is_ready() && e.value().refs.load(Ordering::SeqCst) == 0)
                .min_by_key(|e| *e.value().last_used.lock())
                .map(|e| e.key().clone());

            let Some(voice_id) = victim else {
                debug!(resident, "over residency limit but all models busy");
                return;
            };
            if !self.evict(&voice_id) {
                // Re-referenced between selection and removal.
                return;
            }
        }
    }
}

/// A borrowed reference to a loaded model.
///
/// Holding a handle pins the model against eviction; the reference
/// count drops when the handle does.
#[derive(Debug)]
pub struct ModelHandle {
    model: Arc<VoiceModel>,
    slot: Arc<ModelSlot>,
}

impl ModelHandle {
    /// In-flight reference count for this model, self included.
    pub fn ref_count(&self) -> usize {
        self.slot.refs.load(Ordering::SeqCst)
    }
}

impl std::ops::Deref for ModelHandle {
    type Target = VoiceModel;

    fn deref(&self) -> &VoiceModel {
        &self.model
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        self.slot.refs.fetch_sub(1, Ordering::SeqCst);
        *self.slot.last_used.lock() = Instant::now();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    /// In-memory loader counting how many loads actually ran.
    pub(crate) struct StubLoader {
        pub voices: Vec<String>,
        pub fail: bool,
        pub loads: AtomicU64,
        pub delay_ms: u64,
    }

    impl StubLoader {
        pub fn new(voices: &[&str]) -> Self {
            Self {
                voices: voices.iter().map(|v| v.to_string()).collect(),
                fail: false,
                loads: AtomicU64::new(0),
                delay_ms: 0,
            }
        }
    }

    #[async_trait]
    impl ModelLoader for StubLoader {
        async fn exists(&self, voice_id: &str) -> bool {
            self.voices.iter().any(|v| v == voice_id)
        }

        async fn load(&self, voice_id: &str) -> SynthResult<VoiceModel> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail {
                return Err(SynthError::model_load(voice_id, "corrupt weights"));
            }
            Ok(VoiceModel::new(
                voice_id.to_string(),
                24000,
                vec![0.1, 0.2, 0.3],
                Device::Cpu,
            ))
        }

        async fn list(&self) -> SynthResult<Vec<String>> {
            Ok(self.voices.clone())
        }
    }

    #[tokio::test]
    async fn test_fs_loader_id_filter() {
        let root = std::env::temp_dir().join(format!("voxserve-catalog-{}", std::process::id()));
        let voice_dir = root.join("cosyvoice2-0.5b");
        std::fs::create_dir_all(&voice_dir).unwrap();
        std::fs::write(voice_dir.join("config.json"), "{}").unwrap();

        let loader = FsLoader::new(root.clone(), Device::Cpu);
        // Dotted names resolve; traversal components do not.
        assert!(loader.exists("cosyvoice2-0.5b").await);
        assert!(!loader.exists("..").await);
        assert!(!loader.exists(".").await);
        assert!(!loader.exists("a/b").await);
        assert!(!loader.exists("..\\up").await);
        assert!(!loader.exists("").await);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_resolve_unknown_voice() {
        let manager = ModelManager::new(Arc::new(StubLoader::new(&["alloy"])), 4);
        let err = manager.resolve("nope").await.unwrap_err();
        assert_eq!(err.code(), "ModelNotFound");
    }

    #[tokio::test]
    async fn test_resolve_loads_once() {
        let loader = Arc::new(StubLoader::new(&["alloy"]));
        let manager = ModelManager::new(loader.clone(), 4);

        let a = manager.resolve("alloy").await.unwrap();
        let b = manager.resolve("alloy").await.unwrap();
        assert_eq!(a.voice_id(), "alloy");
        assert_eq!(b.ref_count(), 2);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_single_flight() {
        let loader = Arc::new(StubLoader {
            delay_ms: 20,
            ..StubLoader::new(&["alloy"])
        });
        let manager = Arc::new(ModelManager::new(loader.clone(), 4));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.resolve("alloy").await.map(|h| h.sample_rate())
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 24000);
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_failure() {
        let loader = Arc::new(StubLoader {
            fail: true,
            delay_ms: 20,
            ..StubLoader::new(&["broken"])
        });
        let manager = Arc::new(ModelManager::new(loader.clone(), 4));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { manager.resolve("broken").await }));
        }
        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err.code(), "ModelLoadError");
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_sticky_until_eviction() {
        let loader = Arc::new(StubLoader {
            fail: true,
            ..StubLoader::new(&["flaky"])
        });
        let manager = ModelManager::new(loader.clone(), 4);

        assert!(manager.resolve("flaky").await.is_err());
        assert!(manager.resolve("flaky").await.is_err());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        // Eviction clears the failed slot so the next resolve retries.
        assert!(manager.evict("flaky"));
        assert!(manager.resolve("flaky").await.is_err());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_eviction_defers_to_references() {
        let manager = ModelManager::new(Arc::new(StubLoader::new(&["a", "b"])), 1);

        let held = manager.resolve("a").await.unwrap();
        let _other = manager.resolve("b").await.unwrap();

        // Both are referenced, so both stay despite max_resident = 1.
        assert_eq!(manager.resident_count(), 2);
        assert!(!manager.evict("a"));

        drop(held);
        assert!(manager.evict("a"));
        assert_eq!(manager.resident_count(), 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_on_overflow() {
        let manager = ModelManager::new(Arc::new(StubLoader::new(&["a", "b", "c"])), 2);

        drop(manager.resolve("a").await.unwrap());
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        drop(manager.resolve("b").await.unwrap());
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        drop(manager.resolve("c").await.unwrap());

        // "a" was least recently used and got evicted.
        assert_eq!(manager.resident_count(), 2);
        assert!(!manager.slots.contains_key("a"));
        assert!(manager.slots.contains_key("b"));
        assert!(manager.slots.contains_key("c"));
    }
}
