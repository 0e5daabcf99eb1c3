//! Media handling for the conversion pipeline.
//!
//! This crate provides:
//! - FFmpeg command building and execution behind the [`Transcoder`] trait
//! - A Reddit client that canonicalizes post URLs, reads post metadata and
//!   downloads stream files
//! - Streaming MD5 hashing of finished files

pub mod command;
pub mod error;
pub mod hash;
pub mod reddit;
pub mod transcoder;

pub use command::{FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use hash::md5_file;
pub use reddit::{HttpClientConfig, RedditClient, SourceFetcher, UrlResolver, VideoMetadata};
pub use transcoder::{FfmpegTranscoder, Transcoder};
