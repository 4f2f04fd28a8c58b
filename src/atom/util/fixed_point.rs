use std::fmt;

/// Signed 16.16 fixed point number, kept in its stored form so re-encoding is lossless
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fixed16x16(pub i32);

/// Signed 8.8 fixed point number, kept in its stored form so re-encoding is lossless
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fixed8x8(pub i16);

pub const FIXED_POINT_16X16_SCALE: f64 = 65536.0;
pub const FIXED_POINT_8X8_SCALE: f64 = 256.0;

impl Fixed16x16 {
    pub const ONE: Self = Self(0x0001_0000);

    pub fn from_f64(value: f64) -> Self {
        Self((value * FIXED_POINT_16X16_SCALE).round() as i32)
    }

    pub fn to_f64(self) -> f64 {
        f64::from(self.0) / FIXED_POINT_16X16_SCALE
    }
}

impl Fixed8x8 {
    pub const ONE: Self = Self(0x0100);

    pub fn from_f64(value: f64) -> Self {
        Self((value * FIXED_POINT_8X8_SCALE).round() as i16)
    }

    pub fn to_f64(self) -> f64 {
        f64::from(self.0) / FIXED_POINT_8X8_SCALE
    }
}

impl fmt::Debug for Fixed16x16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_f64(), f)
    }
}

impl fmt::Debug for Fixed8x8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_f64(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_conversions() {
        assert_eq!(Fixed16x16::from_f64(1920.0).0, 1920 << 16);
        assert_eq!(Fixed16x16(0x0001_8000).to_f64(), 1.5);
        assert_eq!(Fixed16x16::from_f64(-1.0).0, -65536);
        assert_eq!(Fixed8x8::ONE.to_f64(), 1.0);
        assert_eq!(Fixed8x8::from_f64(0.5).0, 0x80);
    }
}
