//! `ea-client`: async client runtime for the image editor API.
//!
//! An [`EditorContext`] authenticates (renewing its bearer token on `401`),
//! submits skills, and learns when they finish by consuming one long-lived,
//! auto-reconnecting server-sent-events stream. A single pump task routes
//! each push event to the [`FuturesRegistry`] entry of the state it names;
//! callers race that entry against the pump dying and fall back to polling
//! `state/meta` when nothing arrives in time.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use ea_client::{EditorContext, EraseMode, SegmentTarget, SkillOutcome};
//! use ea_domain::config::EditorConfig;
//!
//! # async fn example(image: Vec<u8>) -> ea_domain::error::Result<()> {
//! let mut cfg = EditorConfig::default();
//! cfg.apply_env();
//! let ctx = EditorContext::new(cfg)?;
//!
//! let erased = ctx
//!     .run_one(|ctx| async move {
//!         let input = ctx.upload_image(image, "input.png").await?;
//!         let skills = ctx.skills();
//!         let mask = skills
//!             .segment(&input, SegmentTarget::Prompt("glass of water".into()), None, None)
//!             .await?
//!             .into_result()?;
//!         skills
//!             .erase(&input, &mask.state_id, EraseMode::Standard, None, None)
//!             .await
//!     })
//!     .await?;
//!
//! if let SkillOutcome::Failed(e) = erased {
//!     eprintln!("erase failed: {}", e.error);
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod context;
pub mod event_source;
pub mod registry;
pub mod retry;
pub mod skills;
pub mod sse;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use connection::{from_reqwest, ClientLease, SharedClient};
pub use context::{EditorContext, ImageSource};
pub use event_source::{ResilientEventSource, Subscription, SubscriptionAuth};
pub use registry::{FuturesRegistry, Resolution, StateFuture};
pub use retry::{BackoffPolicy, RetryContext};
pub use skills::{
    BlendParams, BoxOutput, DetectOutput, DetectedObject, EraseMode, MaskQuality, MergeOperation,
    ProductName, SegmentTarget, ShadowParams, Skills, StateOutput,
};
pub use types::{
    BBox, ErrorResult, ImageFormat, ImageOutParams, ImageResolution, JobStatus, PushEvent, SkillOutcome,
    StateId, UserInfo,
};
