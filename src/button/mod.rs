//! Button subsystem for the physical kill switch
//!
//! Implements a three-stage pipeline driven by one polling task:
//!
//! 1. [`sampler`] - GPIO sampling and debouncing
//! 2. [`classifier`] - Press/hold/release classification
//! 3. [`dispatcher`] - Emulator termination and host power-off
//!
//! [`button_handle`] owns the loop and its cancellation.
//!
//! # Architecture
//!
//! ```text
//! GPIO ──► Sampler ──► Classifier ──► Dispatcher ──► ProcessControl / SystemControl
//!          (level)     (PressEvent)
//! ```

pub mod button_handle;
pub mod classifier;
pub mod dispatcher;
pub mod gpio;
pub mod sampler;

pub use button_handle::{KillSwitch, KillSwitchError, KillSwitchHandle, KillSwitchSettings, LoopStats};
pub use classifier::{Classifier, ClassifierSettings, PressEvent};
pub use dispatcher::{ActionDispatcher, DispatchState};
pub use gpio::{GpioError, InputLine, RppalInput};
pub use sampler::{DebouncedSignal, Debouncer, InputSampler, RawSample, SamplerSettings};
