use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct InvokeError {
    message: String,
}

impl InvokeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Fire-and-forget hand-off of a serialized batch payload to the worker.
///
/// `Ok` means the invocation request was accepted; the worker's own result is
/// never observed.
#[async_trait]
pub trait WorkerInvoker: Send + Sync {
    async fn invoke_worker_async(&self, payload: &[u8]) -> Result<(), InvokeError>;
}
