//! Streaming G-code post-processor for dual-carriage (IDEX) 3D printers.
//!
//! The pipeline reads a G-code file forward, once, through a bounded sliding
//! [`window`] and an [`actions`] dispatch sequence, then applies a small set
//! of in-place byte-range rewrites ("retro-patches") recorded via
//! [`bookmark`] during the forward pass. [`facade`] ties the pieces together
//! behind three entry points: inspect, analyse, transform.

pub mod actions;
pub mod analysis;
pub mod bookmark;
pub mod cancel;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod facade;
pub mod identification;
pub mod metadata;
pub mod state;
pub mod warning;
pub mod window;

pub use analysis::AnalysisResult;
pub use error::{PostProcessError, Result, Warning};
pub use facade::{FacadeOpts, InspectResult, PostProcessor, Printability};
pub use identification::{Flavour, GeneratorIdentification};
pub use state::ProcessingConfig;
