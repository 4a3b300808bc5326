//! # Text-to-image demo harness
//!
//! A small harness around a pretrained Stable Diffusion pipeline, run through
//! the [diffusers](https://github.com/LaurentMazare/diffusers-rs) crate on
//! Torch via [tch-rs](https://github.com/LaurentMazare/tch-rs).
//!
//! This library includes:
//! - Prompt to image generation, with a worker thread for serving requests.
//! - A web page taking a prompt, with a placeholder image when the model is
//!   unavailable.
//! - Dummy text/image datasets and a fine-tuning walkthrough.
//! - Simulated evaluation metrics appended to a log file. These values are
//!   random draws, not real FID or Inception Score computations.

pub mod config;
pub mod dataset;
pub mod error;
pub mod fine_tuning;
pub mod generation;
pub mod metrics;
pub mod pipeline;
pub mod placeholder;
pub mod ui;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};
