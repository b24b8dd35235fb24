//! The governed generation path.
//!
//! Composes the rate limiter, the usage ledger, the response cache and the
//! retry executor around a [`ContentGenerator`](crate::upstream::ContentGenerator).
//! Policy refusals are values ([`GovernedResponse::Denied`]), never errors.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod maintenance;
pub mod models;
pub mod service;

pub use maintenance::{spawn_sweeper, sweep_once};
pub use models::{
    Denial, DenialReason, GeneratedContent, GenerationMetadata, GenerationRequest,
    GovernedResponse, SweepReport,
};
pub use service::GovernedGenerationService;
