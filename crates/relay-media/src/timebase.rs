//! Rational timebases and timestamp rescaling

/// A rational unit of time, `num / den` seconds per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    /// Milliseconds, the FLV tag clock
    pub const MILLISECONDS: TimeBase = TimeBase::new(1, 1_000);
    /// Microseconds, used for wall-clock pacing
    pub const MICROSECONDS: TimeBase = TimeBase::new(1, 1_000_000);
    /// 90 kHz, the usual RTP/MPEG-TS video clock
    pub const MPEG: TimeBase = TimeBase::new(1, 90_000);

    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }
}

impl std::fmt::Display for TimeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Convert `value` ticks of `from` into ticks of `to`.
///
/// Rounds to the nearest tick with halves away from zero. The result saturates
/// at the `i64` range. A degenerate timebase leaves the value untouched.
pub fn rescale(value: i64, from: TimeBase, to: TimeBase) -> i64 {
    if from == to || !from.is_valid() || !to.is_valid() {
        return value;
    }

    let num = value as i128 * from.num as i128 * to.den as i128;
    let den = from.den as i128 * to.num as i128;

    let magnitude = (num.abs() + den / 2) / den;
    let scaled = if num < 0 { -magnitude } else { magnitude };

    scaled.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
