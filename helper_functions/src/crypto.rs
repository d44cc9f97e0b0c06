use bls::{AggregatePublicKey, PublicKey, PublicKeyBytes, Signature, SignatureBytes};
use ring::digest::{digest, SHA256};
use ssz::DecodeError;
use std::convert::TryInto as _;
use tree_hash::TreeHash;
use types::primitives::{Domain, H256};

pub fn hash(input: &[u8]) -> Vec<u8> {
    digest(&SHA256, input).as_ref().to_vec()
}

pub fn bls_verify(
    pubkey: &PublicKeyBytes,
    message: &[u8],
    signature: &SignatureBytes,
    domain: Domain,
) -> Result<bool, DecodeError> {
    let public_key: PublicKey = pubkey.try_into()?;
    let signature: Signature = signature.try_into()?;

    Ok(signature.verify(message, domain.to_integer(), &public_key))
}

pub fn bls_aggregate_pubkeys(pubkeys: &[PublicKey]) -> AggregatePublicKey {
    let mut aggregated = AggregatePublicKey::new();
    for pubkey in pubkeys {
        aggregated.add(pubkey);
    }
    aggregated
}

pub fn hash_tree_root<T: TreeHash>(object: &T) -> H256 {
    H256::from_slice(&object.tree_hash_root()[0..32])
}

#[cfg(test)]
mod tests {
    use bls::SecretKey;

    use super::*;

    #[test]
    fn test_hashing() {
        let input = b"lorem ipsum";
        let output = hash(input.as_ref());

        let expected_bytes = [
            0x5e, 0x2b, 0xf5, 0x7d, 0x3f, 0x40, 0xc4, 0xb6, 0xdf, 0x69, 0xda, 0xf1, 0x93, 0x6c,
            0xb7, 0x66, 0xf8, 0x32, 0x37, 0x4b, 0x4f, 0xc0, 0x25, 0x9a, 0x7c, 0xbf, 0xf0, 0x6e,
            0x2f, 0x70, 0xf2, 0x69,
        ];

        assert_eq!(expected_bytes, output.as_slice());
    }

    #[test]
    fn test_bls_verify_round_trip() {
        let secret_key = SecretKey::random();
        let public_key = PublicKey::from_secret_key(&secret_key);

        let message = b"test123";
        let domain = Domain::from(2);
        let signature = Signature::new(message, domain.to_integer(), &secret_key);

        let pk_bytes = PublicKeyBytes::from_bytes(&public_key.as_bytes())
            .expect("the public key should round-trip through bytes");
        let sg_bytes = SignatureBytes::from_bytes(&signature.as_bytes())
            .expect("the signature should round-trip through bytes");

        assert_eq!(bls_verify(&pk_bytes, message, &sg_bytes, domain), Ok(true));
        assert_eq!(
            bls_verify(&pk_bytes, b"test124", &sg_bytes, domain),
            Ok(false),
        );
    }

    #[test]
    fn test_bls_aggregate_pubkeys_empty() {
        assert_eq!(
            bls_aggregate_pubkeys(&[]).as_raw().as_bytes(),
            AggregatePublicKey::new().as_raw().as_bytes(),
        );
    }
}
