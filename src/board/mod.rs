//! Project board back-end: projects, tasks, the dependency graph and the
//! pending-action store, served over HTTP with live WebSocket events.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, CORS, graceful stop)   │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘ WebSocket│         │                   │                    │
//!                       │         v                   v                    │
//!                       │  repository.rs        approval::ApprovalQueue    │
//!                       │  (read-through cache,       │                    │
//!                       │   awaited invalidation)     │                    │
//!                       │         │                   │                    │
//!                       │         v                   v                    │
//!                       │  db.rs + dependencies.rs + actions.rs  (SQLite)  │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation that changes what a client sees is broadcast through
//! `ws::broadcast_message` after the write and cache invalidation finish.
//!
//! | Module         | Responsibility                                          |
//! |----------------|---------------------------------------------------------|
//! | `models`       | `Project`, `Task`, `TaskDependency`, `PendingAction`    |
//! | `db`           | `BoardDb` schema + task CRUD, `DbHandle` async wrapper  |
//! | `dependencies` | Edge CRUD, BFS cycle check, "dependencies met"          |
//! | `actions`      | Pending-action rows and conditional status transitions  |
//! | `cache`        | `TaskCache` trait and its `DashMap` implementation      |
//! | `ws`           | `WsMessage` enum, envelope, `broadcast_message()`       |

pub mod actions;
pub mod api;
pub mod cache;
pub mod db;
pub mod dependencies;
pub mod models;
pub mod repository;
pub mod server;
pub mod ws;
