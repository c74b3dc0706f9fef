use embedded_time::{clock, ConversionError};

/// A condition that stops the coordinator for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("safety monitor is fatal active")]
    SafetyFatal,

    #[error("idle timeout fired while a task was running")]
    TimeoutWithTaskActive,

    #[error("idle timeout fired without an armed timer")]
    IdleTimerNotArmed,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("clock error: {0:?}")]
    Clock(clock::Error),

    #[error("time conversion error: {0:?}")]
    Time(ConversionError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("could not form bond with the safety monitor")]
    SafetyBond,

    #[error(transparent)]
    Fault(#[from] Fault),
}

impl From<clock::Error> for Error {
    fn from(clock_error: clock::Error) -> Self {
        Error::Clock(clock_error)
    }
}

impl From<ConversionError> for Error {
    fn from(time_error: ConversionError) -> Self {
        Error::Time(time_error)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
