use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::Sampler;

/// Starts and stops the single sampling task.
pub struct SamplerController {
    handle: Option<JoinHandle<Sampler>>,
    cancel_token: Option<CancellationToken>,
}

impl SamplerController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, sampler: Sampler) -> Result<()> {
        if self.handle.is_some() {
            bail!("sampler already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sampler.run(cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Signals the loop and waits for it. The loop only observes the signal between cycles,
    /// so this returns within one sample interval plus the in-flight cycle.
    ///
    /// Returns the stopped sampler, or `None` if nothing was running.
    pub async fn stop(&mut self) -> Result<Option<Sampler>> {
        if let Some(token) = self.cancel_token.take() {
            info!("Stop signal sent to sampler loop");
            token.cancel();
        }

        match self.handle.take() {
            Some(handle) => {
                let sampler = handle.await.context("sampler loop task failed to join")?;
                Ok(Some(sampler))
            }
            None => Ok(None),
        }
    }
}

impl Default for SamplerController {
    fn default() -> Self {
        Self::new()
    }
}
