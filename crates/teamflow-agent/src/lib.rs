//! External collaborator seams for Teamflow agent steps.
//!
//! Agent steps never talk to an API directly: they go through the
//! [`TextGenerator`], [`ImageGenerator`] and [`SearchProvider`] traits bundled
//! in a [`Toolbox`]. Every call made through a toolbox is bounded by an
//! explicit timeout.
//!
//! Concrete HTTP backends live in [`backends`].

pub mod backends;
pub mod config;
pub mod tools;

pub use backends::openai::OpenAiBackend;
pub use backends::search::WebSearchBackend;
pub use config::{ImageConfig, LlmProvider, ModelConfig, SearchConfig};
pub use tools::{
    with_timeout, GeneratedImage, ImageGenerator, SearchHit, SearchProvider, TextGenerator,
    Toolbox, Unconfigured,
};
