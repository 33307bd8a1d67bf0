use core::fmt::Display;

use num_bigint::BigInt;
use num_traits::Signed;

/// Number of planks in one Dot.
pub const PLANK_PER_DOT: u64 = 1_000_000_000_000;

/// Amount of Dot, stored in planks. Formats with the largest fitting unit
/// and three decimals, e.g. `1.500 KDot`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Dot(BigInt);

impl Dot {
    pub fn from_plank(plank: impl Into<BigInt>) -> Self {
        Self(plank.into())
    }

    pub fn plank(&self) -> &BigInt {
        &self.0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }
}

impl Display for Dot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let units: [(BigInt, &str); 6] = [
            (BigInt::from(PLANK_PER_DOT) * 1_000_000u32, "MDot"),
            (BigInt::from(PLANK_PER_DOT) * 1_000u32, "KDot"),
            (BigInt::from(PLANK_PER_DOT), "Dot"),
            (BigInt::from(PLANK_PER_DOT / 1_000), "mDot"),
            (BigInt::from(PLANK_PER_DOT / 1_000_000), "uDot"),
            (BigInt::from(1u8), "Plank"),
        ];

        let abs = self.0.abs();
        for (thresh, unit) in units {
            if abs >= thresh {
                // Round half away from zero on the third decimal.
                let milli: BigInt = (&abs * 1000u32 * 2u32 + &thresh) / (thresh * 2u32);
                let sign = if self.0.is_negative() { "-" } else { "" };
                let (int, frac) = (&milli / 1000u32, &milli % 1000u32);
                return write!(f, "{}{}.{:0>3} {}", sign, int, frac.to_string(), unit);
            }
        }
        f.write_str("0 Plank")
    }
}
