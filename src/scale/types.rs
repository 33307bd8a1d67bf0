use core::fmt::Debug;

use codec::{Decode, Encode};
use rand::{distributions::Standard, prelude::Distribution};

macro_rules! impl_hex_debug {
    ($T:ident) => {
        impl Debug for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("0x")?;
                for b in self.0 {
                    f.write_fmt(format_args!("{:02x}", b))?;
                }
                Ok(())
            }
        }
    };
}

/// Fixed size byte array that is SCALE encoded without a length prefix.
macro_rules! bytesN {
    ( $(#[$meta:meta])* $T:ident, $N:literal ) => {
        $(#[$meta])*
        #[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Copy, Clone, Encode, Decode)]
        pub struct $T(pub [u8; $N]);

        impl $T {
            pub const LEN: usize = $N;

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl TryFrom<&[u8]> for $T {
            type Error = core::array::TryFromSliceError;

            fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
                Ok(Self(value.try_into()?))
            }
        }

        impl AsRef<[u8]> for $T {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Distribution<$T> for Standard {
            fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> $T {
                $T(rng.gen())
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self([0; $N])
            }
        }

        impl_hex_debug!($T);
    };
}

bytesN!(
    /// Keccak-256 digest.
    Hash,
    32
);
bytesN!(
    /// Channel nonce as stored on-chain.
    Nonce,
    32
);
bytesN!(
    /// Off-chain participant identity (sr25519 public key).
    OffIdentity,
    32
);
bytesN!(
    /// On-chain account identity (sr25519 public key).
    OnIdentity,
    32
);
bytesN!(
    /// sr25519 signature.
    Signature,
    64
);

/// Identifies a channel, Keccak-256 of the SCALE encoded on-chain params.
pub type ChannelId = Hash;
/// Identifies one participant's deposit in one channel.
pub type FundingId = Hash;
/// Account id of the chain, the same bytes as an [OnIdentity].
pub type AccountId = OnIdentity;
/// Hash of a block header.
pub type BlockHash = Hash;
