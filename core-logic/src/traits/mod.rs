use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpammerStats {
    pub success: u64,
    pub failed: u64,
}

#[async_trait]
pub trait Spammer: Send + Sync {
    /// Human-readable label used in logs
    fn name(&self) -> &str;

    /// Run the spamming loop until it stops on its own or a stop is requested.
    /// Returns `None` when the spammer was already running.
    async fn start(&self) -> Result<Option<SpammerStats>>;

    /// Ask a running loop to stop at its next checkpoint.
    fn request_stop(&self);
}
