//! Code agent — prompt-to-project generation back-end.
//!
//! ## Overview
//!
//! The agent subsystem turns a natural-language request into a persisted,
//! multi-file software project: a run is triggered over HTTP, a
//! code-generation model produces the project as structured JSON, the files
//! are materialized safely on local disk and (optionally) into a remote
//! sandbox, and everything is recorded in SQLite for later inspection.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐  HTTP  ┌───────────────────────────────────────────────────┐
//! │  Client  │ ─────> │  server.rs  (axum Router, ServerConfig)           │
//! └──────────┘        │    └─ api.rs  (route handlers, AppState)          │
//!                     │         │                                         │
//!                     │         │ RunWorkflow::run()  (tokio::spawn)      │
//!                     │         v                                         │
//!                     │  workflow.rs  (ordered steps + run ledger)        │
//!                     │     │          │           │                      │
//!                     │     v          v           v                      │
//!                     │  llm.rs    fsstore.rs   sandbox.rs                │
//!                     │  (model)   (local fs)   (remote sandbox)          │
//!                     └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module    | Responsibility                                           |
//! |-----------|----------------------------------------------------------|
//! | `models`  | Shared types: `Project`, `ProjectStatus`, `FileRecord`   |
//! | `store`   | SQLite access via `StoreHandle` (thin `Arc<Mutex<_>>`)   |
//! | `extract` | JSON extraction, shape validation, language inference    |
//! | `prompt`  | Model prompt contract (generation + modification)        |
//!
//! ## Typical Request Flow (`POST /api/invoke`)
//!
//! 1. `api::invoke` spawns `RunWorkflow::run()` in the background and
//!    immediately returns a receipt; the caller polls
//!    `GET /api/projects/{id}` for progress.
//! 2. The workflow creates the project record (status `generating`), then
//!    walks its named steps, checkpointing each in the `run_steps` ledger:
//!    generate-code, save-files, the three sandbox steps when a sandbox is
//!    configured, save-file-records, update-project-status.
//! 3. Any step failure marks the project `failed` with the error recorded;
//!    no run ever ends in `generating`. An interrupted run can be replayed
//!    with `RunWorkflow::resume()`, which skips steps already in the ledger.

pub mod api;
pub mod extract;
pub mod fsstore;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod sandbox;
pub mod server;
pub mod store;
pub mod workflow;
