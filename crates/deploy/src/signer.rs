//! Transaction signing for contract creations.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use k256::ecdsa::SigningKey;

use crate::DeployError;

/// The account that pays for and signs deployments.
#[derive(Debug, Clone)]
pub enum Signer {
    /// A local private key; transactions are signed here and sent raw.
    PrivateKey(PrivateKeySigner),
    /// An account managed by the node itself (anvil, hardhat node).
    Unlocked(Address),
}

impl Signer {
    /// Parse a hex encoded private key, with or without `0x` prefix.
    pub fn from_private_key(key: &str) -> Result<Self, DeployError> {
        let bytes = hex::decode(key.trim().trim_start_matches("0x"))
            .map_err(|e| DeployError::Signing(format!("private key is not hex: {e}")))?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| DeployError::Signing(format!("invalid private key: {e}")))?;

        Ok(Self::PrivateKey(PrivateKeySigner::from_signing_key(signing_key)))
    }

    pub fn address(&self) -> Address {
        match self {
            Self::PrivateKey(key) => key.address(),
            Self::Unlocked(address) => *address,
        }
    }
}

/// Unsigned EIP-155 legacy contract creation.
pub fn creation_tx(
    chain_id: u64,
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    input: Bytes,
) -> TxLegacy {
    TxLegacy {
        chain_id: Some(chain_id),
        nonce,
        gas_price,
        gas_limit,
        to: TxKind::Create,
        value: U256::ZERO,
        input,
    }
}

/// Raw signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCreation {
    pub raw: Bytes,
    pub hash: B256,
}

/// Sign `tx` with `key` and encode it for broadcast.
pub fn sign_creation(key: &PrivateKeySigner, tx: TxLegacy) -> Result<SignedCreation, DeployError> {
    let signature = key
        .sign_hash_sync(&tx.signature_hash())
        .map_err(|e| DeployError::Signing(e.to_string()))?;
    let envelope = TxEnvelope::from(tx.into_signed(signature));

    Ok(SignedCreation {
        raw: envelope.encoded_2718().into(),
        hash: *envelope.tx_hash(),
    })
}

#[cfg(test)]
mod tests {
    use alloy_eips::eip2718::Decodable2718;

    use super::*;

    /// First anvil / hardhat development account.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn dev_key() -> PrivateKeySigner {
        match Signer::from_private_key(DEV_KEY).unwrap() {
            Signer::PrivateKey(key) => key,
            Signer::Unlocked(_) => unreachable!(),
        }
    }

    #[test]
    fn test_address_derivation() {
        assert_eq!(
            Signer::from_private_key(DEV_KEY).unwrap().address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
        // Surrounding whitespace and a missing prefix are accepted.
        assert_eq!(
            Signer::from_private_key(&format!(" {} ", &DEV_KEY[2..]))
                .unwrap()
                .address(),
            dev_key().address()
        );
    }

    #[test]
    fn test_invalid_keys() {
        assert!(Signer::from_private_key("0x1234").is_err());
        assert!(Signer::from_private_key("not-hex").is_err());
        let zero = format!("0x{}", "00".repeat(32));
        assert!(Signer::from_private_key(&zero).is_err());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let debug = format!("{:?}", Signer::from_private_key(DEV_KEY).unwrap());
        assert!(!debug.contains("ac0974bec39a17e3"));
    }

    #[test]
    fn test_signed_creation_decodes() {
        let key = dev_key();

        for chain_id in [1, 31337, 11155111] {
            for nonce in [0, 1, 200] {
                let tx = creation_tx(
                    chain_id,
                    nonce,
                    1_000_000_000,
                    100_000,
                    Bytes::from_static(&[0x60, 0x00]),
                );
                let signed = sign_creation(&key, tx.clone()).unwrap();

                let TxEnvelope::Legacy(decoded) =
                    TxEnvelope::decode_2718(&mut signed.raw.as_ref()).unwrap()
                else {
                    panic!("expected a legacy transaction");
                };
                assert_eq!(decoded.tx(), &tx);
                assert_eq!(*decoded.hash(), signed.hash);
                assert_eq!(decoded.tx().to, TxKind::Create);
                assert_eq!(
                    decoded
                        .signature()
                        .recover_address_from_prehash(&tx.signature_hash())
                        .unwrap(),
                    key.address()
                );
            }
        }
    }

    #[test]
    fn test_signing_is_deterministic() {
        let key = dev_key();
        let tx = creation_tx(31337, 0, 1, 21_000, Bytes::new());

        // RFC 6979 nonces.
        assert_eq!(
            sign_creation(&key, tx.clone()).unwrap(),
            sign_creation(&key, tx.clone()).unwrap()
        );

        let other_chain = creation_tx(1, 0, 1, 21_000, Bytes::new());
        assert_ne!(
            sign_creation(&key, tx).unwrap().hash,
            sign_creation(&key, other_chain).unwrap().hash
        );
    }
}
