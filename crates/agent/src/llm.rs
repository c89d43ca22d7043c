use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Generate a reply, retrying once on failure, then falling back to the
/// caller-supplied canned response. A reply failure must never corrupt the
/// audit trail, so this never errors.
pub async fn generate_or_fallback(client: &dyn LlmClient, prompt: &str, fallback: &str) -> String {
    match client.complete(prompt).await {
        Ok(text) => text,
        Err(first_error) => {
            tracing::warn!(
                event_name = "agent.generation_retry",
                error = %first_error,
                "language generation failed, retrying once"
            );
            match client.complete(prompt).await {
                Ok(text) => text,
                Err(second_error) => {
                    tracing::warn!(
                        event_name = "agent.generation_fallback",
                        error = %second_error,
                        "language generation failed twice, using canned reply"
                    );
                    fallback.to_string()
                }
            }
        }
    }
}

/// Deterministic client for tests and demos: pops scripted replies in order,
/// then repeats the last one.
#[derive(Default)]
pub struct StaticReplyClient {
    queued: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
}

impl StaticReplyClient {
    pub fn with_replies(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            queued: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
        }
    }

    pub fn always(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self { queued: Mutex::new(VecDeque::new()), last: Mutex::new(Some(reply)) }
    }
}

#[async_trait]
impl LlmClient for StaticReplyClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let mut queued = self.queued.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(next) = queued.pop_front() {
            let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            *last = Some(next.clone());
            return Ok(next);
        }
        drop(queued);

        let last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(last.clone().unwrap_or_else(|| "How else can I help you today?".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::{generate_or_fallback, LlmClient, StaticReplyClient};

    struct FailingClient {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl LlmClient for FailingClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(anyhow!("model unavailable"))
            } else {
                Ok("recovered".to_string())
            }
        }
    }

    #[tokio::test]
    async fn scripted_replies_pop_in_order_then_repeat() {
        let client = StaticReplyClient::with_replies(["first", "second"]);
        assert_eq!(client.complete("p").await.expect("reply"), "first");
        assert_eq!(client.complete("p").await.expect("reply"), "second");
        assert_eq!(client.complete("p").await.expect("reply"), "second");
    }

    #[tokio::test]
    async fn one_failure_is_retried_transparently() {
        let client = FailingClient { calls: AtomicU32::new(0), fail_first: 1 };
        let reply = generate_or_fallback(&client, "prompt", "canned").await;
        assert_eq!(reply, "recovered");
    }

    #[tokio::test]
    async fn repeated_failure_falls_back_to_canned_reply() {
        let client = FailingClient { calls: AtomicU32::new(0), fail_first: 10 };
        let reply = generate_or_fallback(&client, "prompt", "canned").await;
        assert_eq!(reply, "canned");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2, "exactly one retry");
    }
}
