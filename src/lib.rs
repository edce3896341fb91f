//! Sorts mail into folders by asking a text classifier for a category.
//!
//! - [`pipeline`] runs pending inbox messages through the rate limiter,
//!   classifier and router, moving each at most once
//! - [`mail`] holds the message model, the [`MailStore`] trait and its IMAP backend
//! - [`classify`] holds the [`Classifier`] trait and the Gemini backend
//! - [`config`] and [`credentials`] cover the files the binary reads at startup

pub mod classify;
pub mod config;
pub mod credentials;
pub mod error;
pub mod limiter;
pub mod mail;
pub mod pipeline;
pub mod router;

pub use classify::{ClassificationResult, Classifier, GeminiClassifier};
pub use config::Config;
pub use credentials::{CredentialStore, Credentials};
pub use error::{ClassifyError, PipelineError, StoreError};
pub use limiter::{Clock, RateLimiter, SystemClock};
pub use mail::{imap::ImapStore, MailStore, Message, MessageId};
pub use pipeline::{FailurePolicy, Pipeline, RunOptions, RunStats};
pub use router::CategoryRouter;
