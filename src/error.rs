//! Helpers for call sites that log a failure and carry on.

use std::fmt::Display;

pub trait ResultOkLogExt<T> {
    /// Converts into an [`Option`], logging the error at `error` level.
    fn ok_log(self) -> Option<T>;

    /// Converts into an [`Option`], logging the error at `warn` level after `context`.
    fn ok_warn(self, context: impl Display) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }

    fn ok_warn(self, context: impl Display) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{context}: {err}");
                None
            }
        }
    }
}
