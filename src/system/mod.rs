//! Host-side collaborators: process termination, power-off and OS signals

pub mod power;
pub mod process;
pub mod signals;

pub use power::{CommandShutdown, DryRunSystemControl, PowerError, SystemControl};
pub use process::{DryRunProcessControl, ProcessControl, ProcessError, ProcfsProcessControl};
