use tokio::time::Instant;
use tracing::{debug, info};

use crate::button::gpio::{GpioError, InputLine};
use crate::config::ActiveLevel;

/// One reading of the input line, already mapped to pressed/released
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub timestamp: Instant,
    pub level: bool,
}

/// Confirmed logical level of the button and when it was confirmed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebouncedSignal {
    pub level: bool,
    pub since: Instant,
}

// Sampler settings
#[derive(Clone, Debug)]
pub struct SamplerSettings {
    pub active_level: ActiveLevel,
    pub stability_samples: u32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            active_level: ActiveLevel::Low,
            stability_samples: 1,
        }
    }
}

/// Counting debouncer.
///
/// A level different from the stable one becomes a candidate; the candidate
/// is adopted once it has been seen `stability_samples` times in a row. Any
/// sample agreeing with the stable level discards the candidate.
#[derive(Debug, Clone)]
pub struct Debouncer {
    stability_samples: u32,
    stable: DebouncedSignal,
    candidate: Option<(bool, u32)>,
}

impl Debouncer {
    /// Start out released; a button held at boot registers on the first samples
    pub fn new(stability_samples: u32, start: Instant) -> Self {
        Self {
            stability_samples: stability_samples.max(1),
            stable: DebouncedSignal {
                level: false,
                since: start,
            },
            candidate: None,
        }
    }

    /// Feed one sample, returning the (possibly unchanged) debounced signal
    pub fn feed(&mut self, sample: RawSample) -> DebouncedSignal {
        if sample.level == self.stable.level {
            if self.candidate.take().is_some() {
                debug!("Discarded transient level change");
            }
            return self.stable;
        }

        let seen = match self.candidate {
            Some((level, count)) if level == sample.level => count + 1,
            _ => 1,
        };

        if seen >= self.stability_samples {
            self.stable = DebouncedSignal {
                level: sample.level,
                since: sample.timestamp,
            };
            self.candidate = None;
        } else {
            self.candidate = Some((sample.level, seen));
        }

        self.stable
    }

    pub fn current(&self) -> DebouncedSignal {
        self.stable
    }
}

/// Reads the input line and debounces it
pub struct InputSampler<L: InputLine> {
    line: L,
    settings: SamplerSettings,
    debouncer: Debouncer,
}

impl<L: InputLine> InputSampler<L> {
    pub fn new(line: L, settings: SamplerSettings, start: Instant) -> Self {
        info!(
            "Sampling BCM pin {} (active {:?}, stability {} samples)",
            line.pin(),
            settings.active_level,
            settings.stability_samples
        );
        let debouncer = Debouncer::new(settings.stability_samples, start);
        Self {
            line,
            settings,
            debouncer,
        }
    }

    /// Current logical level of the line, `true` when pressed
    pub fn sample(&mut self) -> Result<bool, GpioError> {
        let high = self.line.read_level()?;
        Ok(self.settings.active_level.is_active(high))
    }

    /// Take one sample and run it through the debouncer
    pub fn poll(&mut self, now: Instant) -> Result<DebouncedSignal, GpioError> {
        let sample = RawSample {
            timestamp: now,
            level: self.sample()?,
        };

        let before = self.debouncer.current();
        let after = self.debouncer.feed(sample);
        if after.level != before.level {
            debug!(
                "Debounced level changed to {}",
                if after.level { "active" } else { "inactive" }
            );
        }
        Ok(after)
    }
}
