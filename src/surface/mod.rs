//! Presentation surface.
//!
//! The surface is the sandboxed side of the panel. It owns the transcript
//! and the single-flight guard, and only talks to the host through
//! boundary messages.
//!
//! # Example
//!
//! ```rust
//! use air_chat::surface::PresentationSurface;
//!
//! let mut surface = PresentationSurface::new();
//! let outbound = surface.submit("hello").unwrap();
//! assert!(outbound.is_some());
//! assert!(surface.is_busy());
//!
//! // Blocked until the host answers.
//! assert!(surface.submit("again").unwrap().is_none());
//! ```

mod render;
mod state;

pub use render::{RenderedSurface, escape_html, render_transcript};
pub use state::{PresentationSurface, SurfaceState};
