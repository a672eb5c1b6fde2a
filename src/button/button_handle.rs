//! Kill Switch Handle - polling loop and lifecycle
//!
//! Wires the sampler, classifier and dispatcher into a single cooperative
//! task. Each tick runs the whole pipeline synchronously:
//!
//! ```text
//! interval tick ─► InputSampler::poll ─► Classifier::step ─► ActionDispatcher::handle
//! ```
//!
//! The only suspension points are the startup delay and the interval tick,
//! both raced against a [`CancellationToken`].

use chrono::Local;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::button::classifier::{Classifier, ClassifierSettings, PressEvent};
use crate::button::dispatcher::ActionDispatcher;
use crate::button::gpio::{GpioError, InputLine};
use crate::button::sampler::{InputSampler, SamplerSettings};
use crate::config::{ActiveLevel, KillSwitchConfig};

/// Settings for the complete kill-switch pipeline
///
/// Split into [`SamplerSettings`] and [`ClassifierSettings`] when spawned.
#[derive(Clone, Debug)]
pub struct KillSwitchSettings {
    /// Time between samples of the input line
    pub poll_interval: Duration,

    /// Consecutive agreeing samples before a level change is trusted.
    /// One sample trusts every reading, as a plain sleep-and-read loop does.
    pub stability_samples: u32,

    /// Electrical level that means pressed
    pub active_level: ActiveLevel,

    /// Hold time before the host is powered off
    pub long_press_threshold: Duration,

    /// Wait before the first sample so the pull resistor settles
    pub startup_delay: Duration,
}

impl Default for KillSwitchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            stability_samples: 1,
            active_level: ActiveLevel::Low,
            long_press_threshold: Duration::from_secs(3),
            startup_delay: Duration::from_secs(1),
        }
    }
}

impl From<&KillSwitchConfig> for KillSwitchSettings {
    fn from(config: &KillSwitchConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            stability_samples: config.button.stability_samples,
            active_level: config.button.active_level,
            long_press_threshold: config.long_press_threshold(),
            startup_delay: config.startup_delay(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KillSwitchError {
    /// The line can no longer be trusted; the daemon must stop
    #[error("GPIO error: {0}")]
    GpioError(#[from] GpioError),

    #[error("Polling task failed: {0}")]
    TaskError(String),
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopStats {
    pub ticks: u64,
    pub presses: u64,
    pub long_presses: u64,
    pub releases: u64,
}

impl LoopStats {
    fn record(&mut self, event: &PressEvent) {
        match event {
            PressEvent::Pressed(_) => self.presses += 1,
            PressEvent::HeldThreshold(_) => self.long_presses += 1,
            PressEvent::Released(_) => self.releases += 1,
        }
    }
}

/// One sampler, classifier and dispatcher advanced tick by tick
pub struct KillSwitch<L: InputLine> {
    sampler: InputSampler<L>,
    classifier: Classifier,
    dispatcher: ActionDispatcher,
}

impl<L: InputLine> KillSwitch<L> {
    pub fn new(
        settings: &KillSwitchSettings,
        line: L,
        dispatcher: ActionDispatcher,
        start: Instant,
    ) -> Self {
        let sampler_settings = SamplerSettings {
            active_level: settings.active_level,
            stability_samples: settings.stability_samples,
        };
        let classifier_settings = ClassifierSettings {
            long_press_threshold: settings.long_press_threshold,
        };
        debug!(
            "Split settings: sampler={:?}, classifier={:?}",
            sampler_settings, classifier_settings
        );

        Self {
            sampler: InputSampler::new(line, sampler_settings, start),
            classifier: Classifier::new(classifier_settings),
            dispatcher,
        }
    }

    /// Sample, classify and dispatch once
    pub fn tick(self, now: Instant) -> Result<(Self, Option<PressEvent>), KillSwitchError> {
        let Self {
            mut sampler,
            classifier,
            mut dispatcher,
        } = self;

        let signal = sampler.poll(now)?;
        let (classifier, event) = classifier.step(&signal, now);
        if let Some(event) = &event {
            dispatcher.handle(event);
        }

        Ok((
            Self {
                sampler,
                classifier,
                dispatcher,
            },
            event,
        ))
    }
}

/// Handle to the spawned polling task
pub struct KillSwitchHandle {
    task: JoinHandle<Result<LoopStats, KillSwitchError>>,
}

impl KillSwitchHandle {
    /// Spawn the polling loop. It runs until `cancel` fires or the line fails.
    pub fn spawn<L: InputLine + 'static>(
        settings: Option<KillSwitchSettings>,
        line: L,
        dispatcher: ActionDispatcher,
        cancel: CancellationToken,
    ) -> Self {
        let settings = settings.unwrap_or_default();
        info!("Spawning kill switch with settings: {:?}", settings);

        let task = tokio::spawn(run_poll_loop(settings, line, dispatcher, cancel));
        Self { task }
    }

    /// Wait for the loop to finish
    pub async fn join(self) -> Result<LoopStats, KillSwitchError> {
        self.task
            .await
            .map_err(|e| KillSwitchError::TaskError(e.to_string()))?
    }
}

async fn run_poll_loop<L: InputLine>(
    settings: KillSwitchSettings,
    line: L,
    dispatcher: ActionDispatcher,
    cancel: CancellationToken,
) -> Result<LoopStats, KillSwitchError> {
    let mut stats = LoopStats::default();

    if !settings.startup_delay.is_zero() {
        debug!("Waiting {:?} for the input to settle", settings.startup_delay);
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Cancelled before polling started");
                return Ok(stats);
            }
            _ = tokio::time::sleep(settings.startup_delay) => {}
        }
    }

    let mut switch = KillSwitch::new(&settings, line, dispatcher, Instant::now());

    let mut interval_timer = tokio::time::interval(settings.poll_interval);
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(60);

    info!(
        "Polling every {} ms, long press at {:.1}s",
        settings.poll_interval.as_millis(),
        settings.long_press_threshold.as_secs_f64()
    );
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Polling loop cancelled");
                break;
            }
            _ = interval_timer.tick() => {}
        }

        let (next, event) = match switch.tick(Instant::now()) {
            Ok(advanced) => advanced,
            Err(e) => {
                error!("Input line failed, stopping: {}", e);
                return Err(e);
            }
        };
        switch = next;
        stats.ticks += 1;
        if let Some(event) = &event {
            stats.record(event);
        }

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            debug!(
                "Kill switch stats: {} ticks, {} presses, {} long presses",
                stats.ticks, stats.presses, stats.long_presses
            );
            last_stats_time = now;
        }
    }

    info!(
        "Kill switch stopped after {} ticks ({} presses)",
        stats.ticks, stats.presses
    );
    Ok(stats)
}
