//! # Rune Engine
//!
//! A multimodal ingestion-and-fusion pipeline that turns one input file
//! (text, image, audio or video) into a **rune**: a fixed nine-field
//! semantic record plus one averaged embedding vector.
//!
//! Model calls go through an [`gateway::UnderstandingGateway`]; the
//! default implementation talks to the bundled same-origin [`proxy`],
//! which forwards to the provider. Every stage degrades instead of
//! aborting, and the rune's `fallback` flag records that it did.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌────────────┐   ┌─────────┐   ┌─────────┐
//! │ extract  │──▶│ interpret │──▶│ normalize  │──▶│  fuse   │──▶│  store  │
//! │ per MIME │   │ composite │   │ nine-field │   │ mean of │   │ fs/JSON │
//! └────┬─────┘   └─────┬─────┘   └────────────┘   └────┬────┘   └─────────┘
//!      │               │                               │
//!      └───────────────┴──────── gateway ──────────────┘
//!                                   │ HTTP
//!                              ┌────▼────┐
//!                              │  proxy  │──▶ provider
//!                              └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rune serve proxy                       # start the proxy (needs GEMINI_API_KEY)
//! rune generate ./photo.jpg              # build and save a rune
//! rune show ./myrune/rune/<id>.json      # print a saved rune
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Pipeline error taxonomy |
//! | [`models`] | Rune and nine-field record types |
//! | [`media`] | Input files and MIME detection |
//! | [`text`] | Language, keyword and sentiment heuristics |
//! | [`frame`] | Still-frame capture for video |
//! | [`gateway`] | Model gateway abstraction |
//! | [`extract`] | Per-modality extraction |
//! | [`normalize`] | Schema normalization |
//! | [`fuse`] | Embedding fusion |
//! | [`assemble`] | Pipeline orchestration |
//! | [`store`] | Persistence backends |
//! | [`proxy`] | Provider proxy HTTP server |
//! | [`smoke`] | Diagnostic smoke calls |

pub mod assemble;
pub mod config;
pub mod error;
pub mod extract;
pub mod frame;
pub mod fuse;
pub mod gateway;
pub mod media;
pub mod models;
pub mod normalize;
pub mod proxy;
pub mod smoke;
pub mod store;
pub mod text;
