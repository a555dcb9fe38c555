//! # Adaptive RAG
//!
//! Routed, multi-stage retrieval-augmented answering with per-thread
//! conversation memory.
//!
//! The pipeline itself lives in [`adaptive_rag_core`]; this crate supplies
//! the production adapters (an OpenAI-compatible chat client, embedding
//! providers, SQLite-backed vector and conversation stores), configuration,
//! the `arag` CLI commands, and the HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌────────────────────┐
//! │   CLI    │──▶│ WorkflowOrchestrator │──▶│ LLM / Embeddings   │
//! │  (arag)  │   │  route → refine →    │   │ (OpenAI-compatible)│
//! └──────────┘   │  generate → persist  │   └────────────────────┘
//! ┌──────────┐   │                      │   ┌────────────────────┐
//! │   HTTP   │──▶│                      │──▶│ SQLite             │
//! │ (axum)   │   └──────────────────────┘   │ chunks + turns     │
//! └──────────┘                              └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! arag init                              # create database
//! arag ask "What is our refund policy?"  # one turn
//! arag chat                              # interactive
//! arag serve                             # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`llm`] | OpenAI-compatible chat client |
//! | [`embedding`] | Embedding providers |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`sqlite_memory`] | SQLite conversation memory |
//! | [`pipeline`] | Config → orchestrator wiring |
//! | [`chat`] | `ask`, `chat`, `history`, `threads` commands |
//! | [`stats`] | `stats` command |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod llm;
pub mod migrate;
pub mod pipeline;
pub mod server;
pub mod sqlite_memory;
pub mod sqlite_store;
pub mod stats;
