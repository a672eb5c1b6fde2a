//! Press classifier
//!
//! Turns the debounced signal into discrete [`PressEvent`]s. The two states are
//! modelled with statum so that only `Held` can observe elapsed hold time and
//! only `Idle` can start a session.
//!
//! ```text
//!          active / Pressed
//!   Idle ───────────────────► Held ──┐ elapsed >= threshold
//!    ▲                          │    │ HeldThreshold (once)
//!    └──────────────────────────┘ ◄──┘
//!          inactive / Released
//! ```

use statum::{machine, state};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::button::sampler::DebouncedSignal;

/// Classified button event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PressEvent {
    Pressed(Instant),
    Released(Instant),
    HeldThreshold(Duration),
}

#[derive(Debug, Clone)]
pub struct HeldSession {
    pub since: Instant,
}

// Classifier settings
#[derive(Clone, Debug)]
pub struct ClassifierSettings {
    pub long_press_threshold: Duration,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            long_press_threshold: Duration::from_secs(3),
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum PressState {
    Idle,
    Held(HeldSession),
}

#[machine]
#[derive(Debug)]
pub struct PressClassifier<S: PressState> {
    settings: ClassifierSettings,

    // Edge trigger for HeldThreshold, cleared on every Idle -> Held
    long_press_fired: bool,
}

impl<S: PressState> PressClassifier<S> {
    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }
}

impl PressClassifier<Idle> {
    pub fn create(settings: Option<ClassifierSettings>) -> Self {
        let settings = settings.unwrap_or_default();
        debug!("Creating press classifier with settings: {:?}", settings);
        Self::new(settings, false)
    }

    /// Enter a held session
    pub fn press(mut self, now: Instant) -> PressClassifier<Held> {
        self.long_press_fired = false;
        self.transition_with(HeldSession { since: now })
    }
}

impl PressClassifier<Held> {
    pub fn held_for(&self, now: Instant) -> Duration {
        match self.get_state_data() {
            Some(session) => now.saturating_duration_since(session.since),
            None => {
                warn!("Held state without session data");
                Duration::ZERO
            }
        }
    }

    /// Returns the hold duration the first time it crosses the threshold
    pub fn check_threshold(&mut self, now: Instant) -> Option<Duration> {
        if self.long_press_fired {
            return None;
        }

        let elapsed = self.held_for(now);
        if elapsed >= self.settings.long_press_threshold {
            self.long_press_fired = true;
            Some(elapsed)
        } else {
            None
        }
    }

    pub fn long_press_fired(&self) -> bool {
        self.long_press_fired
    }

    /// Leave the held session
    pub fn release(self) -> PressClassifier<Idle> {
        self.transition()
    }
}

/// Runtime wrapper over the two typestates
#[derive(Debug)]
pub enum Classifier {
    Idle(PressClassifier<Idle>),
    Held(PressClassifier<Held>),
}

impl Classifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Classifier::Idle(PressClassifier::create(Some(settings)))
    }

    /// Advance by one tick. At most one event is produced per tick.
    pub fn step(self, signal: &DebouncedSignal, now: Instant) -> (Self, Option<PressEvent>) {
        match self {
            Classifier::Idle(idle) if signal.level => {
                debug!("Button pressed");
                (Classifier::Held(idle.press(now)), Some(PressEvent::Pressed(now)))
            }
            Classifier::Idle(idle) => (Classifier::Idle(idle), None),
            Classifier::Held(held) if !signal.level => {
                let held_for = held.held_for(now);
                debug!("Button released after {:.1}s", held_for.as_secs_f64());
                (Classifier::Idle(held.release()), Some(PressEvent::Released(now)))
            }
            Classifier::Held(mut held) => {
                let event = held.check_threshold(now).map(|elapsed| {
                    debug!("Button held for {:.1}s", elapsed.as_secs_f64());
                    PressEvent::HeldThreshold(elapsed)
                });
                (Classifier::Held(held), event)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(100);

    fn signal(level: bool, since: Instant) -> DebouncedSignal {
        DebouncedSignal { level, since }
    }

    /// Run a logical level per tick and collect (tick index, event)
    fn run(levels: &[bool], threshold: Duration) -> Vec<(usize, PressEvent)> {
        let start = Instant::now();
        let mut classifier = Classifier::new(ClassifierSettings {
            long_press_threshold: threshold,
        });
        let mut events = Vec::new();
        for (i, level) in levels.iter().enumerate() {
            let now = start + TICK * i as u32;
            let (next, event) = classifier.step(&signal(*level, now), now);
            classifier = next;
            if let Some(event) = event {
                events.push((i, event));
            }
        }
        events
    }

    fn held(ticks: usize) -> Vec<bool> {
        let mut levels = vec![false];
        levels.extend(std::iter::repeat(true).take(ticks));
        levels.push(false);
        levels
    }

    #[test]
    fn pressed_once_per_session() {
        let events = run(&held(20), Duration::from_secs(3));
        let pressed = events
            .iter()
            .filter(|(_, e)| matches!(e, PressEvent::Pressed(_)))
            .count();
        assert_eq!(pressed, 1);
        assert!(matches!(events[0], (1, PressEvent::Pressed(_))));
        assert!(matches!(events.last(), Some((21, PressEvent::Released(_)))));
    }

    #[test]
    fn long_hold_emits_threshold_once() {
        // 10s hold with a 3s threshold
        let events = run(&held(100), Duration::from_secs(3));
        let thresholds: Vec<_> = events
            .iter()
            .filter(|(_, e)| matches!(e, PressEvent::HeldThreshold(_)))
            .collect();
        assert_eq!(thresholds.len(), 1);
        let (tick, event) = thresholds[0];
        assert_eq!(*tick, 31);
        assert_eq!(*event, PressEvent::HeldThreshold(Duration::from_secs(3)));
    }

    #[test]
    fn short_press_never_reaches_threshold() {
        let events = run(&held(10), Duration::from_secs(3));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].1, PressEvent::Pressed(_)));
        assert!(matches!(events[1].1, PressEvent::Released(_)));
    }

    #[test]
    fn every_session_rearms_the_threshold() {
        let mut levels = held(40);
        levels.extend(held(40));
        let events = run(&levels, Duration::from_secs(3));
        let kinds: Vec<_> = events
            .iter()
            .map(|(_, e)| match e {
                PressEvent::Pressed(_) => "pressed",
                PressEvent::HeldThreshold(_) => "held",
                PressEvent::Released(_) => "released",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["pressed", "held", "released", "pressed", "held", "released"]
        );
    }

    #[test]
    fn typestate_tracks_hold_duration() {
        let start = Instant::now();
        let idle = PressClassifier::create(None);
        let mut held = idle.press(start);
        assert_eq!(held.held_for(start + Duration::from_secs(2)), Duration::from_secs(2));
        assert_eq!(held.check_threshold(start + Duration::from_secs(2)), None);
        assert!(!held.long_press_fired());
        assert_eq!(
            held.check_threshold(start + Duration::from_secs(4)),
            Some(Duration::from_secs(4))
        );
        assert!(held.long_press_fired());
        assert_eq!(held.check_threshold(start + Duration::from_secs(5)), None);

        let held_again = held.release().press(start + Duration::from_secs(6));
        assert!(!held_again.long_press_fired());
    }
}
