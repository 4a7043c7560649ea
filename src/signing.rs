// Cryptographic signing module
// This file handles the hash-to-sign derivation and signature attachment
// for externally signed EIP-1559 transactions

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{keccak256, Bytes, Signature, B256};

/// The 32-byte digest the external signer must produce an r/s/v triple for.
pub fn hash_to_sign(tx: &TxEip1559) -> B256 {
    tx.signature_hash()
}

/// Attach a validated signature and wrap into a broadcastable envelope.
/// Signature recovery is not performed here; the node rejects mismatches.
pub fn into_envelope(tx: TxEip1559, signature: Signature) -> TxEnvelope {
    TxEnvelope::from(tx.into_signed(signature))
}

/// EIP-2718 encoding as submitted via `eth_sendRawTransaction`.
pub fn raw_transaction(envelope: &TxEnvelope) -> Bytes {
    envelope.encoded_2718().into()
}

/// Transaction hash of the raw encoding.
pub fn transaction_hash(raw: &[u8]) -> B256 {
    keccak256(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, TxKind, U256};

    #[test]
    fn signed_envelope_round_trip() {
        let tx = TxEip1559 {
            chain_id: 1,
            nonce: 7,
            gas_limit: 21_000,
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
            to: TxKind::Call(Address::repeat_byte(0x11)),
            value: U256::from(1u64),
            ..Default::default()
        };
        let digest = hash_to_sign(&tx);
        assert_ne!(digest, B256::ZERO);

        let sig = Signature::new(U256::from(1u64), U256::from(2u64), false);
        let envelope = into_envelope(tx, sig);
        let raw = raw_transaction(&envelope);
        assert!(!raw.is_empty());
        assert_eq!(transaction_hash(&raw), keccak256(&raw));
    }
}
