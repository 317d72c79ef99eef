//! Device output manager
//!
//! Owns the single shared output for the lifetime of an engine. The output is
//! built on the first activation (a user gesture), resumed on later ones and
//! closed exactly once on teardown. If it cannot be built the manager stays
//! `Unavailable` for good.

use crate::audio::output::{DeviceState, OutputDevice, OutputFactory};
use crate::events::{EventBus, PreviewEvent};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// No activation yet
    Uninitialized,
    Ready,
    /// Construction failed; the engine is inert
    Unavailable,
    /// Torn down
    Closed,
}

enum Slot {
    Uninitialized,
    Ready(Arc<dyn OutputDevice>),
    Unavailable,
    Closed,
}

pub struct DeviceOutputManager {
    factory: OutputFactory,
    slot: Mutex<Slot>,
    events: EventBus,
}

impl DeviceOutputManager {
    pub fn new(factory: OutputFactory, events: EventBus) -> Self {
        Self {
            factory,
            slot: Mutex::new(Slot::Uninitialized),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the output on first call, resume it on later calls.
    ///
    /// Returns `None` when no output can be used (construction failed or the
    /// manager was torn down). Never fails.
    pub fn activate(&self) -> Option<Arc<dyn OutputDevice>> {
        let output = {
            let mut slot = self.lock();
            match &*slot {
                Slot::Ready(output) => Arc::clone(output),
                Slot::Unavailable | Slot::Closed => return None,
                Slot::Uninitialized => match (self.factory)() {
                    Ok(output) => {
                        info!(
                            "Preview output ready: {} at {}Hz",
                            output.name(),
                            output.sample_rate()
                        );
                        self.events.emit(PreviewEvent::Activated {
                            device: output.name(),
                            sample_rate: output.sample_rate(),
                        });
                        *slot = Slot::Ready(Arc::clone(&output));
                        output
                    }
                    Err(e) => {
                        warn!("Audio output unavailable, previews disabled: {}", e);
                        self.events.emit(PreviewEvent::ActivationFailed {
                            reason: e.to_string(),
                        });
                        *slot = Slot::Unavailable;
                        return None;
                    }
                },
            }
        };

        self.resume(&output);
        Some(output)
    }

    /// Resume `output` if the platform left it suspended.
    pub fn resume(&self, output: &Arc<dyn OutputDevice>) {
        if output.state() != DeviceState::Suspended {
            return;
        }
        match output.resume() {
            Ok(()) => {
                debug!("Resumed suspended output");
                self.events.emit(PreviewEvent::Resumed);
            }
            Err(e) => warn!("Failed to resume output: {}", e),
        }
    }

    /// The output, if one has been built and not torn down
    pub fn output(&self) -> Option<Arc<dyn OutputDevice>> {
        match &*self.lock() {
            Slot::Ready(output) => Some(Arc::clone(output)),
            _ => None,
        }
    }

    /// Close and release the output. Safe to call repeatedly.
    pub fn teardown(&self) {
        let previous = std::mem::replace(&mut *self.lock(), Slot::Closed);
        if let Slot::Ready(output) = previous {
            info!("Closing preview output {}", output.name());
            output.close();
        }
    }

    pub fn state(&self) -> ManagerState {
        match &*self.lock() {
            Slot::Uninitialized => ManagerState::Uninitialized,
            Slot::Ready(_) => ManagerState::Ready,
            Slot::Unavailable => ManagerState::Unavailable,
            Slot::Closed => ManagerState::Closed,
        }
    }

    pub fn is_inert(&self) -> bool {
        self.state() == ManagerState::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::headless::HeadlessOutput;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_factory(suspended: bool) -> (OutputFactory, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let factory: OutputFactory = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let output = if suspended {
                HeadlessOutput::suspended(8000)
            } else {
                HeadlessOutput::new(8000)
            };
            Ok(Arc::new(output) as Arc<dyn OutputDevice>)
        });
        (factory, built)
    }

    #[test]
    fn test_output_built_once() {
        let (factory, built) = counting_factory(false);
        let manager = DeviceOutputManager::new(factory, EventBus::default());
        assert_eq!(manager.state(), ManagerState::Uninitialized);
        assert!(manager.output().is_none());

        let first = manager.activate().unwrap();
        let second = manager.activate().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ManagerState::Ready);
    }

    #[test]
    fn test_activation_resumes_suspended_output() {
        let (factory, _) = counting_factory(true);
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let manager = DeviceOutputManager::new(factory, events);

        let output = manager.activate().unwrap();
        assert_eq!(output.state(), DeviceState::Running);

        assert!(matches!(rx.try_recv(), Ok(PreviewEvent::Activated { .. })));
        assert_eq!(rx.try_recv().ok(), Some(PreviewEvent::Resumed));
    }

    #[test]
    fn test_construction_failure_is_permanent() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let factory: OutputFactory = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::AudioOutput("no device".to_string()))
        });
        let manager = DeviceOutputManager::new(factory, EventBus::default());

        assert!(manager.activate().is_none());
        assert!(manager.activate().is_none());
        assert!(manager.is_inert());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_closes_once_and_blocks_reactivation() {
        let (factory, built) = counting_factory(false);
        let manager = DeviceOutputManager::new(factory, EventBus::default());
        let output = manager.activate().unwrap();

        manager.teardown();
        manager.teardown();

        assert_eq!(output.state(), DeviceState::Closed);
        assert_eq!(manager.state(), ManagerState::Closed);
        assert!(manager.activate().is_none());
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_before_activation() {
        let (factory, built) = counting_factory(false);
        let manager = DeviceOutputManager::new(factory, EventBus::default());
        manager.teardown();
        assert!(manager.activate().is_none());
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }
}
