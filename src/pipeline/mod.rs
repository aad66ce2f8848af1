//! Pipeline stages shared by the extraction chains.
//!
//! Each submodule implements one transformation step and is testable on
//! its own; [`crate::chain`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ client ──▶ normalize ──▶ filter ──▶ client ──▶ normalize
//! (URL/path) (base64)  (VLM)     (JSON text)   (words)    (LLM)     (+ parse)
//!                        ▲
//!                    ratelimit
//! ```
//!
//! 1. [`input`]     canonicalise the user-supplied path or URL to a local file
//! 2. [`encode`]    base64-wrap the image bytes for the multimodal request body
//! 3. [`client`]    the [`client::ModelClient`] seam and its provider-backed implementation
//! 4. [`ratelimit`] token bucket gating every call
//! 5. [`normalize`] deterministic reply cleanup plus the recovery parser
//! 6. [`filter`]    vocabulary candidates via [`stopwords`] and [`tagger`]

pub mod client;
pub mod encode;
pub mod filter;
pub mod input;
pub mod normalize;
pub mod ratelimit;
pub mod stopwords;
pub mod tagger;
