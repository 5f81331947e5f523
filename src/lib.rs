//! Studyplayer: experiment resolution and session recording upload
//!
//! Resolves declarative experiment structures (frames, groups, randomizers and
//! parameter placeholders) into a concrete frame sequence, and uploads session
//! video through a chunked, retrying multipart pipeline.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod parser;
pub mod randomizer;
pub mod recorder;
pub mod types;
pub mod upload;
