//! # Cutout Session
//!
//! Async orchestration around a [`cutout::Document`]: calls out to
//! segmentation, inpainting and prompt-parsing collaborators, retries the
//! transient failures, rate-limits outbound calls and makes sure a result
//! that arrives after a reset or a conflicting edit is dropped instead of
//! applied.
//!
//! ```rust,no_run
//! use cutout::Inversion;
//! use cutout_session::{Session, Segmenter, Inpainter};
//!
//! async fn cut_person<S: Segmenter, I: Inpainter>(session: &Session<S, I>) -> cutout_session::Result<()> {
//!     session.segment().await?;
//!     session.extract_region("person", Inversion::Auto).await?;
//!     session.fill_ai(None).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod rate_limit;
pub mod retry;
pub mod services;
pub mod session;

pub use error::{Result, ServiceError, ServiceErrorKind, SessionError};
pub use rate_limit::{Clock, RateLimitConfig, RateLimiter, TokioClock};
pub use retry::RetryPolicy;
pub use services::{InpaintRequest, Inpainter, KeywordPromptParser, PromptParser, Segmenter};
pub use session::{Commit, Session, SessionConfig};
