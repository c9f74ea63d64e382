use std::time::Duration;

use crate::board::{Clock, DigitalIo, Level};
use crate::error::Result;

/// Measure the length of a pulse on `pin`, in microseconds.
///
/// Waits for any pulse already in progress to finish, then for the pin to
/// reach `level`, and times how long it stays there. Returns 0 when
/// `timeout` (counted from the call) runs out first. With no timeout the
/// wait is unbounded.
pub fn pulse_in<B>(
    board: &mut B,
    pin: u8,
    level: Level,
    timeout: Option<Duration>,
) -> Result<u32>
where
    B: Clock + DigitalIo + ?Sized,
{
    let start = board.micros();
    let limit = timeout.map(|t| u64::try_from(t.as_micros()).unwrap_or(u64::MAX));
    let expired = |board: &B| match limit {
        Some(limit) => board.micros().wrapping_sub(start) >= limit,
        None => false,
    };

    while board.digital_read(pin)? == level {
        if expired(&*board) {
            return Ok(0);
        }
    }

    while board.digital_read(pin)? != level {
        if expired(&*board) {
            return Ok(0);
        }
    }

    let rise = board.micros();
    while board.digital_read(pin)? == level {
        if expired(&*board) {
            return Ok(0);
        }
    }

    let width = board.micros().wrapping_sub(rise);
    Ok(u32::try_from(width).unwrap_or(u32::MAX))
}
