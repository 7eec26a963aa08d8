//! Observer interface used by the optional GUI collaborator (spec.md §6).
//! The core makes no assumption about what the observer does with updates;
//! it only guarantees delivery after each dispatch that changed something.

use crate::audio_handler::{AudioHandler, RecentUnit};
use crate::listener::AudioListener;
use crate::source::AudioSource;

/// A point-in-time snapshot handed to observers, decoupled from the
/// handler's internal maps so an observer can hold onto it after the
/// scene has moved on.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    SourceUpdated(AudioSource),
    ListenerUpdated(AudioListener),
}

pub trait Observer: Send {
    fn notify(&mut self, event: ObserverEvent);
}

/// Builds the event for whatever was most recently modified, if anything,
/// and clears the handler's pointer. Returns `None` when the last dispatch
/// didn't touch the scene (e.g. TEST, or an operation on an unknown handle).
pub fn drain_observer_event(handler: &mut AudioHandler) -> Option<ObserverEvent> {
    match handler.take_recently_modified()? {
        RecentUnit::Source(handle) => handler.source(handle).cloned().map(ObserverEvent::SourceUpdated),
        RecentUnit::Listener => Some(ObserverEvent::ListenerUpdated(handler.listener)),
    }
}

/// Stand-in for the external GUI collaborator: the default observer used
/// when no GUI is configured, or in tests. Mirrors the teacher's habit of
/// routing otherwise-unconsumed events through `log` rather than dropping
/// them silently.
pub struct LoggingObserver;

impl Observer for LoggingObserver {
    fn notify(&mut self, event: ObserverEvent) {
        match event {
            ObserverEvent::SourceUpdated(source) => {
                log::debug!("source {} updated: state={:?} gain={}", source.handle, source.state(), source.gain)
            }
            ObserverEvent::ListenerUpdated(listener) => {
                log::debug!("listener updated: gain={} position={:?}", listener.gain, listener.position)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MockAudioBackend;

    #[test]
    fn no_recent_modification_yields_no_event() {
        let mut handler = AudioHandler::new();
        assert!(drain_observer_event(&mut handler).is_none());
    }

    #[test]
    fn listener_mutation_produces_listener_event() {
        let mut backend = MockAudioBackend::new();
        backend.expect_set_listener_gain().returning(|_| Ok(()));

        let mut handler = AudioHandler::new();
        handler.set_listener_gain(&mut backend, 0.5).unwrap();

        match drain_observer_event(&mut handler) {
            Some(ObserverEvent::ListenerUpdated(listener)) => assert_eq!(listener.gain, 0.5),
            other => panic!("unexpected event: {:?}", other),
        }

        assert!(drain_observer_event(&mut handler).is_none());
    }
}
