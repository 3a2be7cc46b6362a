// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Legacy Ethereum transaction signing (EIP-155).
//!
//! The unsigned transaction is RLP encoded as
//! `[nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]`, hashed with
//! keccak-256 and signed with a recoverable secp256k1 signature. Without a
//! chain id the pre-EIP-155 form `[nonce, …, data]` and `v = 27 + recid` is used.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use thiserror::Error;
use tracing::debug;

use crate::domain::identity::Algorithm;
use crate::domain::transaction::{SignedTransaction, TransactionError, UnsignedTransaction};
use crate::infrastructure::crypto::{PublicKey, SecretKey};

#[derive(Debug, Error)]
pub enum LedgerSigningError {
    #[error("Ledger transactions are signed with ES256K keys, not {0}")]
    NotSecp256k1(Algorithm),

    #[error("Transaction signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

fn rlp_length_prefix(len: usize, short_base: u8, long_base: u8, out: &mut Vec<u8>) {
    if len <= 55 {
        out.push(short_base + len as u8);
    } else {
        let len_bytes = trim_leading_zeros(&len.to_be_bytes()).to_vec();
        out.push(long_base + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn rlp_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return bytes.to_vec();
    }
    let mut out = Vec::with_capacity(bytes.len() + 9);
    rlp_length_prefix(bytes.len(), 0x80, 0xb7, &mut out);
    out.extend_from_slice(bytes);
    out
}

fn rlp_uint(value: u128) -> Vec<u8> {
    rlp_bytes(trim_leading_zeros(&value.to_be_bytes()))
}

fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = items.concat();
    let mut out = Vec::with_capacity(payload.len() + 9);
    rlp_length_prefix(payload.len(), 0xc0, 0xf7, &mut out);
    out.extend_from_slice(&payload);
    out
}

pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    Keccak256::digest(bytes).into()
}

fn hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Ledger account address: the last 20 bytes of keccak-256 over the
/// uncompressed public point without its `0x04` tag.
pub fn ethereum_address(key: &PublicKey) -> Result<String, LedgerSigningError> {
    let verifying_key = match key {
        PublicKey::Es256k(key) => key,
        other => return Err(LedgerSigningError::NotSecp256k1(other.algorithm())),
    };
    let point = verifying_key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    Ok(hex_prefixed(&digest[12..]))
}

/// Sign `tx` with `key`. `fallback_chain_id` applies when the service omitted one.
pub fn sign_transaction(
    tx: &UnsignedTransaction,
    key: &SecretKey,
    fallback_chain_id: Option<u64>,
) -> Result<SignedTransaction, LedgerSigningError> {
    let signing_key = match key {
        SecretKey::Es256k(key) => key,
        other => return Err(LedgerSigningError::NotSecp256k1(other.algorithm())),
    };

    let chain_id = tx.chain_id.or(fallback_chain_id);
    if chain_id.is_none() {
        debug!("No chain id available, signing without replay protection");
    }

    let fields = vec![
        rlp_uint(tx.nonce.unwrap_or_default()),
        rlp_uint(tx.gas_price.unwrap_or_default()),
        rlp_uint(tx.gas_limit.unwrap_or_default()),
        rlp_bytes(&tx.to_bytes()?),
        rlp_uint(tx.value.unwrap_or_default()),
        rlp_bytes(&tx.data_bytes()?),
    ];

    let mut preimage = fields.clone();
    if let Some(id) = chain_id {
        preimage.extend([rlp_uint(u128::from(id)), rlp_uint(0), rlp_uint(0)]);
    }
    let signing_hash = keccak256(&rlp_list(&preimage));

    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(&signing_hash)
        .map_err(|e| LedgerSigningError::Signing(e.to_string()))?;

    let recid = u128::from(recovery_id.to_byte());
    let v = match chain_id {
        Some(id) => recid + 35 + 2 * u128::from(id),
        None => recid + 27,
    };
    let r = signature.r().to_bytes();
    let s = signature.s().to_bytes();

    let mut signed_fields = fields;
    signed_fields.extend([
        rlp_uint(v),
        rlp_bytes(trim_leading_zeros(&r)),
        rlp_bytes(trim_leading_zeros(&s)),
    ]);
    let raw = rlp_list(&signed_fields);

    Ok(SignedTransaction {
        r: hex_prefixed(&r),
        s: hex_prefixed(&s),
        v: format!("0x{:x}", v),
        hash: hex_prefixed(&keccak256(&raw)),
        raw: hex_prefixed(&raw),
    })
}
