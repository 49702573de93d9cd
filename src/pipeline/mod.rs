//! Per-page pipeline stages used by the controller.
//!
//! ```text
//! input ──▶ render ──▶ classify ──▶ describe ──▶ (accumulator)
//! (stage)   (pdfium)   (yes/no)     (VLM + retry)
//! ```
//!
//! 1. [`input`]   : copy the source object to a scratch dir, check `%PDF`
//! 2. [`render`]  : rasterise every page; runs in `spawn_blocking`
//! 3. [`classify`]: table-continuity questions for page boundaries
//! 4. [`describe`]: transcription under the retry/resize policy
//!
//! [`encode`] and [`llm`] sit underneath: PNG/base64 encoding, image
//! shrinking, and the [`llm::VisionModel`] boundary.

pub mod classify;
pub mod describe;
pub mod encode;
pub mod input;
pub mod llm;
pub mod render;
