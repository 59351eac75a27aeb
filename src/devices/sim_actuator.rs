use std::sync::atomic::{AtomicBool, Ordering};

use log::info;

use crate::error::ActuatorError;
use crate::ports::{Actuator, BoxFuture};

/// In-memory relay. Failures can be injected to exercise the loop's isolation paths.
pub struct SimulatedLightActuator {
    id: String,
    state: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl SimulatedLightActuator {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn is_on(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Actuator for SimulatedLightActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn get_state(&self) -> BoxFuture<'_, Result<bool, ActuatorError>> {
        Box::pin(async move {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(ActuatorError::Unreachable(self.id.clone(), "simulated read failure".into()));
            }
            Ok(self.state.load(Ordering::SeqCst))
        })
    }

    fn set_state<'a>(&'a self, on: bool, reason: &'a str) -> BoxFuture<'a, Result<(), ActuatorError>> {
        Box::pin(async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ActuatorError::Unreachable(self.id.clone(), "simulated write failure".into()));
            }
            self.state.store(on, Ordering::SeqCst);
            info!("LIGHT {} set_state={} reason={}", self.id, on, reason);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let relay = SimulatedLightActuator::new("light_sim_01");
        assert!(!relay.get_state().await.unwrap());
        relay.set_state(true, "test").await.unwrap();
        assert!(relay.get_state().await.unwrap());
        assert!(relay.is_on());
    }

    #[tokio::test]
    async fn injected_failures_leave_state_untouched() {
        let relay = SimulatedLightActuator::new("light_sim_01");
        relay.set_fail_writes(true);
        assert!(relay.set_state(true, "test").await.is_err());
        assert!(!relay.is_on());

        relay.set_fail_reads(true);
        assert!(matches!(
            relay.get_state().await,
            Err(ActuatorError::Unreachable(..))
        ));
    }
}
