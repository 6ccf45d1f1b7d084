//! The analysis pipeline, stage by stage.
//!
//! ```text
//! image bytes
//!  │
//!  ├─ 1. optimize  decode → colour rule → bounded downscale → JPEG
//!  ├─ 2. chat      base64 attachment + prompts → /api/chat (retries)
//!  └─ 3. extract   fence strip → JSON parse → schema validation
//! ```
//!
//! Each stage is independently usable and independently tested; the
//! [`crate::analyze`] module wires them together.

pub mod chat;
pub mod extract;
pub mod optimize;
