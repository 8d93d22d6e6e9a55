use std::{
    fs,
    future::Future,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use cutout::{
    CommandOutcome, Document, DocumentCommand, EngineConfig, Inversion, LayerId, LayeredExport,
    Segmentation, decode_image, derive_fill_prompt, match_labels,
};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    error::{Result, ServiceError, SessionError},
    rate_limit::{RateLimitConfig, RateLimiter},
    retry::RetryPolicy,
    services::{InpaintRequest, Inpainter, KeywordPromptParser, PromptParser, Segmenter},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
}

impl SessionConfig {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Result of an async task that may have been overtaken by a reset or edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit<T> {
    Applied(T),
    /// The document moved on while the task was in flight; nothing was changed
    Discarded,
}

impl<T> Commit<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Discarded => None,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    document: Document,
    segmentation: Option<Segmentation>,
}

/// Owns the document and drives the remote collaborators around it.
///
/// Document mutations are serialized through one async mutex. Remote calls
/// run without holding it; their results are committed only if the session
/// generation (bumped on reset) and the document content revision are unchanged.
pub struct Session<S, I, P = KeywordPromptParser> {
    state: Mutex<SessionState>,
    generation: AtomicU64,
    segmenter: S,
    inpainter: I,
    prompt_parser: P,
    limiter: RateLimiter,
    config: SessionConfig,
}

impl<S: Segmenter, I: Inpainter> Session<S, I, KeywordPromptParser> {
    pub fn new(image: RgbaImage, segmenter: S, inpainter: I, config: SessionConfig) -> Self {
        Session::with_prompt_parser(image, segmenter, inpainter, KeywordPromptParser, config)
    }
}

impl<S: Segmenter, I: Inpainter, P: PromptParser> Session<S, I, P> {
    pub fn with_prompt_parser(
        image: RgbaImage,
        segmenter: S,
        inpainter: I,
        prompt_parser: P,
        config: SessionConfig,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState {
                document: Document::with_config(image, config.engine.clone()),
                segmentation: None,
            }),
            generation: AtomicU64::new(0),
            segmenter,
            inpainter,
            prompt_parser,
            limiter: RateLimiter::from_config(&config.rate_limit),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start over with a new image; in-flight results from before are dropped
    pub async fn reset(&self, image: RgbaImage) {
        let mut state = self.state.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        state.document = Document::with_config(image, self.config.engine.clone());
        state.segmentation = None;
        tracing::info!(generation, "Session reset");
    }

    pub async fn reset_from_bytes(&self, bytes: &[u8]) -> Result<()> {
        let image = decode_image(bytes)?;
        self.reset(image).await;
        Ok(())
    }

    /// Read-only access to the current document
    pub async fn with_document<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.state.lock().await.document)
    }

    pub async fn segmentation(&self) -> Option<Segmentation> {
        self.state.lock().await.segmentation.clone()
    }

    async fn call_service<T, F, Fut>(&self, operation: &'static str, mut call: F) -> std::result::Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ServiceError>>,
    {
        self.config
            .retry
            .run(operation, |_| {
                let request = call();
                async move {
                    self.limiter.acquire().await;
                    request.await
                }
            })
            .await
    }

    /// Identifies the state an async task started from. Presentation-only
    /// edits (visibility, opacity, names, locks) do not invalidate it.
    fn checkpoint(&self, state: &SessionState) -> (u64, u64) {
        (self.generation(), state.document.content_revision())
    }

    fn is_stale(&self, started: (u64, u64), state: &SessionState, operation: &str) -> bool {
        let current = self.checkpoint(state);
        if current != started {
            tracing::debug!(
                operation,
                started_generation = started.0,
                generation = current.0,
                "Discarding stale result"
            );
            return true;
        }
        false
    }

    /// Segment the current base image and keep the regions for extraction
    pub async fn segment(&self) -> Result<Commit<Segmentation>> {
        let (image, started) = {
            let state = self.state.lock().await;
            (
                state.document.base_image().clone(),
                self.checkpoint(&state),
            )
        };

        let segmentation = self
            .call_service("segment", || self.segmenter.segment(&image))
            .await?;

        let mut state = self.state.lock().await;
        if self.is_stale(started, &state, "segment") {
            return Ok(Commit::Discarded);
        }
        tracing::info!(
            regions = segmentation.regions.len(),
            image_type = %segmentation.image_type,
            "Segmentation ready"
        );
        state.document.invalidate_region_masks();
        state.segmentation = Some(segmentation.clone());
        Ok(Commit::Applied(segmentation))
    }

    pub async fn extract_region(&self, label: &str, inversion: Inversion) -> Result<LayerId> {
        let mut state = self.state.lock().await;
        let region = state
            .segmentation
            .as_ref()
            .ok_or(SessionError::NotSegmented)?
            .find(label)
            .cloned()
            .ok_or_else(|| SessionError::UnknownRegion(label.to_string()))?;
        Ok(state.document.extract_region(&region, inversion)?)
    }

    /// Extract every region a free-text prompt refers to. The prompt parser
    /// is consulted first; keyword matching takes over when it fails.
    pub async fn extract_by_prompt(&self, text: &str) -> Result<Commit<Vec<LayerId>>> {
        let (labels, started) = {
            let state = self.state.lock().await;
            let labels = state
                .segmentation
                .as_ref()
                .ok_or(SessionError::NotSegmented)?
                .labels();
            (labels, self.checkpoint(&state))
        };

        let matched = match self.prompt_parser.parse_prompt(text, &labels).await {
            Ok(matched) if !matched.is_empty() => matched,
            Ok(_) => match_labels(text, &labels),
            Err(err) => {
                tracing::warn!(error = %err, "Prompt parser unavailable, using keyword matching");
                match_labels(text, &labels)
            }
        };
        if matched.is_empty() {
            return Err(SessionError::NoMatchingRegion(text.to_string()));
        }

        let mut state = self.state.lock().await;
        if self.is_stale(started, &state, "extract_by_prompt") {
            return Ok(Commit::Discarded);
        }
        let regions = matched
            .labels
            .iter()
            .map(|label| {
                state
                    .segmentation
                    .as_ref()
                    .and_then(|s| s.find(label))
                    .cloned()
                    .ok_or_else(|| SessionError::UnknownRegion(label.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let ids = state.document.extract_regions(&regions, Inversion::Auto)?;
        tracing::info!(confidence = matched.confidence, layers = ids.len(), "Extracted prompt matches");
        Ok(Commit::Applied(ids))
    }

    pub async fn extract_lasso(&self, points: &[[f32; 2]], view: &cutout::ViewTransform) -> Result<LayerId> {
        Ok(self.state.lock().await.document.extract_lasso(points, view)?)
    }

    pub async fn fill_local(&self) -> Result<()> {
        Ok(self.state.lock().await.document.fill_local()?)
    }

    /// Inpaint the holes of the base image remotely and composite the answer.
    ///
    /// Without an explicit prompt one is derived from the detected labels.
    pub async fn fill_ai(&self, prompt: Option<String>) -> Result<Commit<()>> {
        let (preparation, labels, started) = {
            let state = self.state.lock().await;
            let labels = state
                .segmentation
                .as_ref()
                .map(Segmentation::labels)
                .unwrap_or_default();
            (
                state.document.inpaint_preparation(),
                labels,
                self.checkpoint(&state),
            )
        };
        if !preparation.has_holes() {
            return Err(SessionError::NothingToFill);
        }

        let prompt = prompt.unwrap_or_else(|| derive_fill_prompt(&labels));
        let request = InpaintRequest::new(&preparation, prompt)?;
        let bytes = self
            .call_service("inpaint", || self.inpainter.inpaint(&request))
            .await?;
        let result = decode_image(&bytes)?;

        let mut state = self.state.lock().await;
        if self.is_stale(started, &state, "fill_ai") {
            return Ok(Commit::Discarded);
        }
        state.document.apply_inpaint_result(&preparation, &result)?;
        Ok(Commit::Applied(()))
    }

    pub async fn execute(&self, command: DocumentCommand) -> Result<CommandOutcome> {
        let name: &'static str = (&command).into();
        let result = self.state.lock().await.document.execute(command);
        if let Err(err) = &result {
            if err.is_user_error() {
                tracing::debug!(command = name, error = %err, "Command rejected");
            } else {
                tracing::warn!(command = name, error = %err, "Command failed");
            }
        }
        Ok(result?)
    }

    pub async fn render(&self) -> Arc<RgbaImage> {
        self.state.lock().await.document.render()
    }

    pub async fn export(&self) -> LayeredExport {
        LayeredExport::from_document(&self.state.lock().await.document)
    }
}
