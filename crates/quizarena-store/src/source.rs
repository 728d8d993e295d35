//! Question supply for quiz rooms.
//!
//! The match engine only needs one call: give me `count` questions for a
//! topic at a difficulty. Behind that seam sits whatever the deployment
//! has — an external AI generator, a curated database pool, or both
//! chained with [`FallbackSource`] so generator outages degrade to the
//! pool instead of failing `start_game`.

use quizarena_protocol::Difficulty;

use crate::records::QuestionRecord;
use crate::SourceError;

/// Supplies quiz questions. Implementations must return exactly `count`
/// questions or an error; callers never silently run short rounds.
#[async_trait::async_trait]
pub trait QuestionSource: Send + Sync + 'static {
    async fn next_batch(
        &self,
        topic: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<QuestionRecord>, SourceError>;
}

/// A static question pool. Used in tests and as the local fallback when
/// no generator is configured. Ignores `topic` — the pool is assumed to
/// be pre-filtered.
#[derive(Debug, Clone, Default)]
pub struct FixedSource {
    questions: Vec<QuestionRecord>,
}

impl FixedSource {
    pub fn new(questions: Vec<QuestionRecord>) -> Self {
        Self { questions }
    }
}

#[async_trait::async_trait]
impl QuestionSource for FixedSource {
    async fn next_batch(
        &self,
        _topic: &str,
        _difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<QuestionRecord>, SourceError> {
        if self.questions.len() < count {
            return Err(SourceError::Insufficient {
                wanted: count,
                got: self.questions.len(),
            });
        }
        Ok(self.questions[..count].to_vec())
    }
}

/// Tries `primary` first; on failure or a short batch, falls back to
/// `fallback`. Mirrors the batch-then-individual generation ladder the
/// quiz service runs in production.
#[derive(Debug, Clone)]
pub struct FallbackSource<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackSource<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait::async_trait]
impl<P: QuestionSource, F: QuestionSource> QuestionSource for FallbackSource<P, F> {
    async fn next_batch(
        &self,
        topic: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<QuestionRecord>, SourceError> {
        match self.primary.next_batch(topic, difficulty, count).await {
            Ok(batch) if batch.len() >= count => Ok(batch),
            Ok(short) => {
                tracing::warn!(
                    wanted = count,
                    got = short.len(),
                    "primary question source ran short, using fallback"
                );
                self.fallback.next_batch(topic, difficulty, count).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "primary question source failed, using fallback");
                self.fallback.next_batch(topic, difficulty, count).await
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
