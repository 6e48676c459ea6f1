//! Software [`CryptoProvider`] on the RustCrypto crates.

use aes::{
    Aes128, Aes256,
    cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray},
};
use fmdn_proto::EcCurve;
use p256::{
    FieldBytes, ProjectivePoint, Scalar, U256,
    elliptic_curve::{ff::PrimeField, ops::Reduce, point::AffineCoordinates},
};

use crate::{
    CryptoError,
    eid::EID_SEED_SIZE,
    provider::{AES_BLOCK_SIZE, CryptoProvider, CurveReduction, check_blocks},
};

/// Pure-software provider.
///
/// Supports secp256r1 only. Accessories configured for secp160r1 need a
/// provider backed by a library that implements that curve.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCryptoProvider;

impl RustCryptoProvider {
    /// Create a provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for RustCryptoProvider {
    fn aes128_ecb_encrypt(&self, key: &[u8; 16], data: &mut [u8]) -> Result<(), CryptoError> {
        check_blocks(data)?;
        let cipher = Aes128::new(GenericArray::from_slice(key));
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }

    fn aes128_ecb_decrypt(&self, key: &[u8; 16], data: &mut [u8]) -> Result<(), CryptoError> {
        check_blocks(data)?;
        let cipher = Aes128::new(GenericArray::from_slice(key));
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }

    fn aes256_ecb_encrypt(&self, key: &[u8; 32], data: &mut [u8]) -> Result<(), CryptoError> {
        check_blocks(data)?;
        let cipher = Aes256::new(GenericArray::from_slice(key));
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }

    fn reduce_to_curve(
        &self,
        curve: EcCurve,
        input: &[u8; EID_SEED_SIZE],
    ) -> Result<CurveReduction, CryptoError> {
        match curve {
            EcCurve::Secp256r1 => {
                let bytes = FieldBytes::clone_from_slice(input);
                let scalar = <Scalar as Reduce<U256>>::reduce_bytes(&bytes);
                let point = (ProjectivePoint::GENERATOR * scalar).to_affine();

                Ok(CurveReduction { eid: point.x().to_vec(), scalar: scalar.to_repr().to_vec() })
            },
            EcCurve::Secp160r1 => Err(CryptoError::UnsupportedCurve(curve)),
        }
    }

    fn supports(&self, curve: EcCurve) -> bool {
        curve == EcCurve::Secp256r1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // FIPS-197 appendix C.1
    #[test]
    fn aes128_known_answer() {
        let key: [u8; 16] = hex::decode("000102030405060708090a0b0c0d0e0f")
            .unwrap()
            .try_into()
            .unwrap();
        let mut block = hex::decode("00112233445566778899aabbccddeeff").unwrap();

        RustCryptoProvider.aes128_ecb_encrypt(&key, &mut block).unwrap();
        assert_eq!(hex::encode(&block), "69c4e0d86a7b0430d8cdb78070b4c55a");

        RustCryptoProvider.aes128_ecb_decrypt(&key, &mut block).unwrap();
        assert_eq!(hex::encode(&block), "00112233445566778899aabbccddeeff");
    }

    // FIPS-197 appendix C.3
    #[test]
    fn aes256_known_answer() {
        let key: [u8; 32] =
            hex::decode("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
                .unwrap()
                .try_into()
                .unwrap();
        let mut block = hex::decode("00112233445566778899aabbccddeeff").unwrap();

        RustCryptoProvider.aes256_ecb_encrypt(&key, &mut block).unwrap();
        assert_eq!(hex::encode(&block), "8ea2b7ca516745bfeafc49904b496089");
    }

    #[test]
    fn partial_block_rejected() {
        let mut data = [0u8; 20];
        assert_eq!(
            RustCryptoProvider.aes128_ecb_encrypt(&[0; 16], &mut data),
            Err(CryptoError::InvalidBlockLength { block: 16, actual: 20 })
        );
    }

    #[test]
    fn scalar_one_yields_generator() {
        let mut input = [0u8; 32];
        input[31] = 1;
        let reduction = RustCryptoProvider.reduce_to_curve(EcCurve::Secp256r1, &input).unwrap();

        assert_eq!(
            hex::encode(&reduction.eid),
            "6b17d1f2e12c4247f8bce6e563a440f277037d812deb33a0f4a13945d898c296"
        );
        assert_eq!(reduction.scalar, input.to_vec());
    }

    #[test]
    fn secp160r1_unsupported() {
        assert!(RustCryptoProvider.supports(EcCurve::Secp256r1));
        assert!(!RustCryptoProvider.supports(EcCurve::Secp160r1));
        assert_eq!(
            RustCryptoProvider.reduce_to_curve(EcCurve::Secp160r1, &[1; 32]),
            Err(CryptoError::UnsupportedCurve(EcCurve::Secp160r1))
        );
    }
}
