pub mod clinic_docs;

use async_trait::async_trait;

/// The FAQ retrieval collaborator. `Ok(None)` means no document matched;
/// the state machine then offers a staff follow-up instead of fabricating
/// an answer.
#[async_trait]
pub trait FaqProvider: Send + Sync {
    async fn answer(&self, question: &str) -> anyhow::Result<Option<String>>;
}
