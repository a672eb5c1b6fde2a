use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::button::classifier::PressEvent;
use crate::system::{ProcessControl, SystemControl};

/// Per-session dispatch bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchState {
    pub shutdown_triggered: bool,
}

/// Turns press events into process-kill and power-off actions.
///
/// Every action is fire-and-forget: failures are logged and swallowed, never
/// retried, so the daemon always keeps moving towards shutdown.
pub struct ActionDispatcher {
    process_names: Vec<String>,
    processes: Box<dyn ProcessControl>,
    system: Box<dyn SystemControl>,
    state: DispatchState,
}

impl ActionDispatcher {
    pub fn new(
        process_names: Vec<String>,
        processes: Box<dyn ProcessControl>,
        system: Box<dyn SystemControl>,
    ) -> Self {
        Self {
            process_names,
            processes,
            system,
            state: DispatchState::default(),
        }
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    pub fn handle(&mut self, event: &PressEvent) {
        let stamp = Local::now().format("%H:%M:%S.%3f");
        match event {
            PressEvent::Pressed(_) => {
                info!("Kill switch pressed at {}", stamp);
                self.state.shutdown_triggered = false;
                self.terminate_emulators();
            }
            PressEvent::HeldThreshold(held) => {
                info!(
                    "Kill switch held {:.1}s at {}",
                    held.as_secs_f64(),
                    stamp
                );
                self.trigger_shutdown();
            }
            PressEvent::Released(_) => {
                debug!("Kill switch released at {}", stamp);
            }
        }
    }

    fn terminate_emulators(&mut self) {
        let mut total = 0;
        for name in &self.process_names {
            match self.processes.terminate_by_name(name) {
                Ok(count) => total += count,
                Err(e) => warn!("Could not terminate {}: {}", name, e),
            }
        }
        info!("Terminated {} emulator process(es)", total);
    }

    fn trigger_shutdown(&mut self) {
        if self.state.shutdown_triggered {
            debug!("Shutdown already triggered for this press");
            return;
        }
        self.state.shutdown_triggered = true;

        match self.system.shutdown() {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!("Shutdown failed, not retrying: {}", e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::system::{PowerError, ProcessError};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Shared record of what the fake collaborators were asked to do
    #[derive(Debug, Default)]
    pub(crate) struct Calls {
        pub(crate) terminated: Vec<String>,
        pub(crate) shutdowns: usize,
    }

    pub(crate) struct FakeProcesses {
        calls: Arc<Mutex<Calls>>,
        fail: bool,
    }

    impl ProcessControl for FakeProcesses {
        fn terminate_by_name(&mut self, name: &str) -> Result<usize, ProcessError> {
            self.calls.lock().unwrap().terminated.push(name.to_string());
            if self.fail {
                return Err(ProcessError::Signal {
                    pid: 1,
                    signal: nix::sys::signal::Signal::SIGTERM,
                    errno: nix::errno::Errno::EPERM,
                });
            }
            Ok(1)
        }
    }

    pub(crate) struct FakeSystem {
        calls: Arc<Mutex<Calls>>,
        fail: bool,
    }

    impl SystemControl for FakeSystem {
        fn shutdown(&mut self) -> Result<(), PowerError> {
            self.calls.lock().unwrap().shutdowns += 1;
            if self.fail {
                return Err(PowerError::EmptyCommand);
            }
            Ok(())
        }
    }

    pub(crate) fn recording_dispatcher(fail: bool) -> (ActionDispatcher, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let dispatcher = ActionDispatcher::new(
            vec!["advmame".into(), "daphne".into(), "mame".into()],
            Box::new(FakeProcesses {
                calls: calls.clone(),
                fail,
            }),
            Box::new(FakeSystem {
                calls: calls.clone(),
                fail,
            }),
        );
        (dispatcher, calls)
    }

    #[test]
    fn press_terminates_every_configured_process() {
        let (mut dispatcher, calls) = recording_dispatcher(false);
        dispatcher.handle(&PressEvent::Pressed(Instant::now()));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.terminated, vec!["advmame", "daphne", "mame"]);
        assert_eq!(calls.shutdowns, 0);
    }

    #[test]
    fn shutdown_fires_once_per_session() {
        let (mut dispatcher, calls) = recording_dispatcher(false);
        dispatcher.handle(&PressEvent::Pressed(Instant::now()));
        dispatcher.handle(&PressEvent::HeldThreshold(Duration::from_secs(3)));
        dispatcher.handle(&PressEvent::HeldThreshold(Duration::from_secs(4)));
        assert!(dispatcher.state().shutdown_triggered);
        assert_eq!(calls.lock().unwrap().shutdowns, 1);

        dispatcher.handle(&PressEvent::Released(Instant::now()));
        assert!(dispatcher.state().shutdown_triggered);

        dispatcher.handle(&PressEvent::Pressed(Instant::now()));
        assert!(!dispatcher.state().shutdown_triggered);
        dispatcher.handle(&PressEvent::HeldThreshold(Duration::from_secs(3)));
        assert_eq!(calls.lock().unwrap().shutdowns, 2);
    }

    #[test]
    fn release_does_nothing() {
        let (mut dispatcher, calls) = recording_dispatcher(false);
        dispatcher.handle(&PressEvent::Released(Instant::now()));
        let calls = calls.lock().unwrap();
        assert!(calls.terminated.is_empty());
        assert_eq!(calls.shutdowns, 0);
    }

    #[test]
    fn failures_are_swallowed() {
        let (mut dispatcher, calls) = recording_dispatcher(true);
        dispatcher.handle(&PressEvent::Pressed(Instant::now()));
        dispatcher.handle(&PressEvent::HeldThreshold(Duration::from_secs(3)));
        dispatcher.handle(&PressEvent::HeldThreshold(Duration::from_secs(3)));

        let calls = calls.lock().unwrap();
        // Every name is still attempted after the first failure
        assert_eq!(calls.terminated.len(), 3);
        // A failed shutdown is not retried
        assert_eq!(calls.shutdowns, 1);
    }
}
