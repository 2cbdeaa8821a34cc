//! Fixed-size values that are stored inline in a table.

use crate::error::{CodecError, CodecResult};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A fixed-size value stored inline at its slot, little-endian.
pub trait Scalar: Copy + Sized {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Value surfaced when the slot is absent.
    const DEFAULT: Self;

    /// Writes the value into `out`, which is exactly `SIZE` bytes.
    fn write_le(self, out: &mut [u8]);

    /// Reads the value from `bytes`, which is exactly `SIZE` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty => $default:expr),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();
                const DEFAULT: Self = $default;

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => 0,
    i16 => 0,
    i32 => 0,
    i64 => 0,
    u8 => 0,
    u16 => 0,
    u32 => 0,
    u64 => 0,
    f32 => 0.0,
    f64 => 0.0,
}

impl Scalar for bool {
    const SIZE: usize = 1;
    const DEFAULT: Self = false;

    #[inline]
    fn write_le(self, out: &mut [u8]) {
        out[0] = u8::from(self);
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Converts a point in time to signed milliseconds since the Unix epoch.
///
/// # Errors
///
/// Returns `IllegalArgument` if the value does not fit into an `i64`.
pub fn to_unix_millis(time: SystemTime) -> CodecResult<i64> {
    signed_since_epoch(time, |d| d.as_millis())
}

/// Converts a point in time to signed nanoseconds since the Unix epoch.
///
/// # Errors
///
/// Returns `IllegalArgument` if the value does not fit into an `i64`
/// (roughly years 1677 to 2262).
pub fn to_unix_nanos(time: SystemTime) -> CodecResult<i64> {
    signed_since_epoch(time, |d| d.as_nanos())
}

/// Inverse of [`to_unix_millis`].
#[must_use]
pub fn from_unix_millis(millis: i64) -> SystemTime {
    let magnitude = Duration::from_millis(millis.unsigned_abs());
    if millis >= 0 {
        UNIX_EPOCH + magnitude
    } else {
        UNIX_EPOCH - magnitude
    }
}

/// Inverse of [`to_unix_nanos`].
#[must_use]
pub fn from_unix_nanos(nanos: i64) -> SystemTime {
    let magnitude = Duration::from_nanos(nanos.unsigned_abs());
    if nanos >= 0 {
        UNIX_EPOCH + magnitude
    } else {
        UNIX_EPOCH - magnitude
    }
}

fn signed_since_epoch(time: SystemTime, unit: impl Fn(Duration) -> u128) -> CodecResult<i64> {
    let out_of_range = || CodecError::illegal_argument(format!("{time:?} does not fit into i64"));
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(unit(after)).map_err(|_| out_of_range()),
        Err(before) => {
            let magnitude = unit(before.duration());
            let magnitude = i128::try_from(magnitude).map_err(|_| out_of_range())?;
            i64::try_from(-magnitude).map_err(|_| out_of_range())
        }
    }
}
