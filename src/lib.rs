//! # drl-migrate
//!
//! One-shot migration of items from the legacy digital repository workflow
//! into a Fedora 3 repository.
//!
//! Every item of a collection is looked up in the legacy workflow database,
//! given a base object (MODS, DC, thumbnail) under its collection's namespace,
//! and then dressed according to its type: large images and maps get a TIFF
//! master plus a JP2 derivative, texts and manuscripts are split into page
//! objects labelled from their METS structural map.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │ LegacyStore  │──▶│  Walker  │──▶│ ObjectRouter │──▶│Repository│
//! │   (SQLite)   │   │          │   │  + Assembler │   │ (Fedora) │
//! └──────────────┘   └────┬─────┘   └──────┬───────┘   └──────────┘
//!                         │                │
//!                         ▼                ▼
//!                    ┌─────────┐   ┌───────────────┐
//!                    │ Summary │   │ METS · OCR zip│
//!                    └─────────┘   │ JP2 encoder   │
//!                                  └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`catalog`] | Collection → namespace, type → content model tables |
//! | [`models`] | Legacy records, pids, object and datastream specs |
//! | [`error`] | Typed migration errors |
//! | [`labels`] | Raw page label normalization |
//! | [`structure`] | METS structural map → page label map |
//! | [`archive`] | Per-item OCR zip access |
//! | [`derivative`] | External JP2 encoder |
//! | [`assembler`] | Page objects for books |
//! | [`legacy`] | Legacy workflow database |
//! | [`repository`] | Fedora REST client and in-memory repository |
//! | [`router`] | Per-item routing and type handlers |
//! | [`walker`] | Collection walk |
//! | [`summary`] | Run summary |
//! | [`progress`] | Walk progress on stderr |
//! | [`migrate`] | `migrate` command |
//! | [`check`] | `check` command |

pub mod archive;
pub mod assembler;
pub mod catalog;
pub mod check;
pub mod config;
pub mod derivative;
pub mod error;
pub mod labels;
pub mod legacy;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod repository;
pub mod router;
pub mod structure;
pub mod summary;
pub mod walker;
