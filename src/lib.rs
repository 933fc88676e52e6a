//! Chameleon is a terminal chat client that swaps between interchangeable
//! text-generation backends.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`backend`] is the reusable core: the [`backend::ResponseGenerator`]
//!   contract, four adapters (OpenAI-compatible, Gemini, in-process local
//!   model, Ollama), and the validating factory that builds them.
//! - [`core`] owns session state: the message model, the conversation
//!   transcript, and persisted configuration defaults.
//! - [`ui`] renders the terminal interface and runs the interactive event
//!   loop that drives user input and display updates.
//! - [`api`] defines the OpenAI-style chat payloads shared by the adapters
//!   that speak `{role, content}` message lists.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which dispatches into
//! [`ui::chat_loop`] for interactive sessions.

pub mod api;
pub mod backend;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
