use super::types::Hash;

use codec::Encode;
use sha3::{
    digest::{core_api::CoreWrapper, Output},
    Digest, Keccak256, Keccak256Core,
};

/// [codec::Output] that feeds everything written to it into Keccak-256, so
/// values can be hashed without materializing their encoding.
pub struct Keccak256Writer {
    hasher: CoreWrapper<Keccak256Core>,
}

impl Default for Keccak256Writer {
    fn default() -> Self {
        Self {
            hasher: Keccak256::new(),
        }
    }
}

impl codec::Output for Keccak256Writer {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}

impl Keccak256Writer {
    pub fn finalize(self) -> Output<Keccak256> {
        self.hasher.finalize()
    }
}

/// Keccak-256 of the SCALE encoding of `value`.
pub fn to_hash<T>(value: &T) -> Hash
where
    T: Encode + ?Sized,
{
    let mut writer = Keccak256Writer::default();
    value.encode_to(&mut writer);
    Hash(writer.finalize().into())
}
