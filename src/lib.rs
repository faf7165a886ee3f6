//! Quill - long-form serial fiction orchestrator.
//!
//! A session plans, drafts, reviews and commits one unit (chapter) at a time
//! against an external generation service. Continuity lives in a bounded
//! two-tier store: a hot working set for the volume in progress and a cold
//! archive of compressed volume summaries, so context stays the same size
//! whether the story is at unit 5 or unit 500.

pub mod audit;
pub mod checkpoint;
pub mod compaction;
pub mod config;
pub mod continuity;
pub mod errors;
pub mod orchestrator;
pub mod parse;
pub mod review;
pub mod service;
pub mod stages;
pub mod story;
pub mod ui;
pub mod util;

pub use config::{QuillToml, SessionConfig};
pub use errors::SessionError;
pub use orchestrator::{Orchestrator, UnitSink};
pub use story::StorySeed;
