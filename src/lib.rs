//! # enote
//!
//! Markdown round-trip, duplicate detection and attachment tooling for a
//! remote note service.
//!
//! Notes live on the service as ENML, an XHTML dialect rooted at
//! `<en-note>`. Locally they are Markdown documents with an optional
//! metadata header. Every uploaded note carries a base64 copy of its source
//! text in a comment, so downloading it gives back the exact document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  encode   ┌──────────────┐         ┌──────────────┐
//! │   Markdown   │──────────▶│     ENML     │────────▶│  NoteStore   │
//! │ + header     │◀──────────│ + source     │◀────────│ http/sandbox │
//! └──────────────┘  decode   └──────────────┘         └──────┬───────┘
//!                                                            │
//!                                               ┌────────────┤
//!                                               ▼            ▼
//!                                         ┌──────────┐ ┌──────────┐
//!                                         │   dups   │ │   CLI    │
//!                                         │  scanner │ │ (enote)  │
//!                                         └──────────┘ └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! enote new > plan.md           # header snippet
//! enote send plan.md            # create the note, bind the file
//! enote save plan.md            # push edits
//! enote dups                    # titles used more than once
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Service error taxonomy and explanations |
//! | [`models`] | Notes, notebooks, tags, resources |
//! | [`store`] | The `NoteStore` trait and its backends |
//! | [`session`] | Store plus notebook/tag caches |
//! | [`metadata`] | Metadata header parsing |
//! | [`render`] | Markdown to XHTML |
//! | [`textify`] | ENML to Markdown |
//! | [`enml`] | Envelope and embedded source comment |
//! | [`codec`] | Document encode/decode |
//! | [`scan`] | Duplicate-title scan |
//! | [`notes`] | Send, save, open, revert, delete, search |
//! | [`attachments`] | Attach, list, fetch, detach |
//! | [`links`] | Note links |
//! | [`catalog`] | Notebook and tag listings |
//! | [`binding`] | File to note sidecars |
//! | [`tasks`] | Background tasks with progress |
//! | [`progress`] | Progress reporting |

pub mod attachments;
pub mod binding;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod enml;
pub mod error;
pub mod links;
pub mod metadata;
pub mod models;
pub mod notes;
pub mod progress;
pub mod render;
pub mod scan;
pub mod session;
pub mod store;
pub mod tasks;
pub mod textify;
