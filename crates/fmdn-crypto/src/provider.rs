//! Symmetric and elliptic-curve primitives behind a trait seam.
//!
//! Accessories usually have an AES accelerator and a vendor EC library; the
//! core only sees this trait. [`crate::RustCryptoProvider`] is the portable
//! software implementation.

use fmdn_proto::EcCurve;

use crate::{
    CryptoError, IdentityKey,
    eid::{EID_SEED_SIZE, eid_seed},
};

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// Result of reducing an encrypted seed onto the identifier curve.
#[derive(Clone, PartialEq, Eq)]
pub struct CurveReduction {
    /// Ephemeral identifier: x coordinate of `r·G`, curve-sized
    pub eid: Vec<u8>,
    /// Reduced scalar `r`, source of the hashed flags mask
    pub scalar: Vec<u8>,
}

impl std::fmt::Debug for CurveReduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurveReduction")
            .field("eid_len", &self.eid.len())
            .finish_non_exhaustive()
    }
}

/// Primitives the accessory core treats as black boxes.
///
/// Block operations work in place on whole 16-byte blocks (ECB). All methods
/// take `&self`: a provider carries no per-call state.
pub trait CryptoProvider {
    /// AES-128-ECB encrypt `data` in place.
    fn aes128_ecb_encrypt(&self, key: &[u8; 16], data: &mut [u8]) -> Result<(), CryptoError>;

    /// AES-128-ECB decrypt `data` in place.
    fn aes128_ecb_decrypt(&self, key: &[u8; 16], data: &mut [u8]) -> Result<(), CryptoError>;

    /// AES-256-ECB encrypt `data` in place.
    fn aes256_ecb_encrypt(&self, key: &[u8; 32], data: &mut [u8]) -> Result<(), CryptoError>;

    /// Reduce `r'` modulo the curve order to `r`, and return `r` together
    /// with the x coordinate of `r·G`.
    fn reduce_to_curve(
        &self,
        curve: EcCurve,
        input: &[u8; EID_SEED_SIZE],
    ) -> Result<CurveReduction, CryptoError>;

    /// Whether [`CryptoProvider::reduce_to_curve`] implements `curve`.
    fn supports(&self, _curve: EcCurve) -> bool {
        true
    }

    /// Derive the identifier for the window containing `clock`.
    ///
    /// # Errors
    ///
    /// - Any primitive failure
    /// - `CryptoError::InvalidOutputLength` if the provider returns an
    ///   identifier that does not match the curve size
    fn compute_eid(
        &self,
        curve: EcCurve,
        identity_key: &IdentityKey,
        clock: u32,
    ) -> Result<CurveReduction, CryptoError> {
        let mut block = eid_seed(clock);
        self.aes256_ecb_encrypt(identity_key.as_bytes(), &mut block)?;
        let reduction = self.reduce_to_curve(curve, &block)?;

        if reduction.eid.len() != curve.eid_len() {
            return Err(CryptoError::InvalidOutputLength {
                operation: "reduce_to_curve",
                expected: curve.eid_len(),
                actual: reduction.eid.len(),
            });
        }
        Ok(reduction)
    }
}

impl<P: CryptoProvider + ?Sized> CryptoProvider for &P {
    fn aes128_ecb_encrypt(&self, key: &[u8; 16], data: &mut [u8]) -> Result<(), CryptoError> {
        (**self).aes128_ecb_encrypt(key, data)
    }

    fn aes128_ecb_decrypt(&self, key: &[u8; 16], data: &mut [u8]) -> Result<(), CryptoError> {
        (**self).aes128_ecb_decrypt(key, data)
    }

    fn aes256_ecb_encrypt(&self, key: &[u8; 32], data: &mut [u8]) -> Result<(), CryptoError> {
        (**self).aes256_ecb_encrypt(key, data)
    }

    fn reduce_to_curve(
        &self,
        curve: EcCurve,
        input: &[u8; EID_SEED_SIZE],
    ) -> Result<CurveReduction, CryptoError> {
        (**self).reduce_to_curve(curve, input)
    }

    fn supports(&self, curve: EcCurve) -> bool {
        (**self).supports(curve)
    }
}

/// Reject inputs that are not a whole number of AES blocks.
pub(crate) fn check_blocks(data: &[u8]) -> Result<(), CryptoError> {
    if data.len() % AES_BLOCK_SIZE == 0 {
        Ok(())
    } else {
        Err(CryptoError::InvalidBlockLength { block: AES_BLOCK_SIZE, actual: data.len() })
    }
}
