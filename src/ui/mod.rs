//! # Web user interface
//!
//! A single page with a prompt box. Prompts are sent to the image generator
//! when one is loaded; any failure, or a missing generator, produces the
//! placeholder image instead so the page always shows something.

pub mod routes;

pub use routes::{configure, run_server, AppState, ImageSource, IMAGE_SOURCE_HEADER};
