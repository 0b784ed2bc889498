//! shorts-cutter - video ingestion and clip generation
//!
//! Acquires a source video (yt-dlp for hosted platforms, a streaming HTTP
//! fetch for direct links), finds highlights from scene cuts and audio
//! activity, cuts clips with ffmpeg and fills in their titles and hashtags.

pub mod acquire;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod highlight;
pub mod media;
pub mod metadata;
pub mod model;
pub mod parse;
pub mod process;
pub mod segment;
pub mod setup;
pub mod store;
pub mod workflow;
