//! # QuizArena
//!
//! Real-time multiplayer quiz and code-battle coordinator.
//!
//! QuizArena runs synchronized rounds of competition — multiple-choice
//! quiz questions or coding challenges — between players connected over
//! WebSockets, with server-authoritative timing, scoring, tie-breaking,
//! and progression. Persistence, code execution, and question
//! generation are external collaborators injected behind the
//! [`RoomStore`](quizarena_store::RoomStore),
//! [`JudgeClient`](quizarena_judge::JudgeClient), and
//! [`QuestionSource`](quizarena_store::QuestionSource) traits.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use quizarena::{PlainAuth, QuizArenaServerBuilder};
//! use quizarena_judge::SimJudge;
//! use quizarena_store::{FixedSource, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = QuizArenaServerBuilder::new()
//!         .bind("0.0.0.0:8080")
//!         .build(
//!             Arc::new(MemoryStore::new()),
//!             Arc::new(FixedSource::default()),
//!             Arc::new(SimJudge),
//!             PlainAuth,
//!         )
//!         .await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

mod auth;
mod error;
mod gateway;
mod server;

pub use auth::{AuthError, Authenticator, PlainAuth};
pub use error::QuizArenaError;
pub use server::{QuizArenaServer, QuizArenaServerBuilder};
