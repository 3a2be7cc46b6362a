// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Identities and the Identity Store
//!
//! A test identity ([`Client`]) is a decentralized identifier plus at most one
//! [`KeySet`] per signature [`Algorithm`]. Identities are created by the
//! `using user` command and live in a per-scenario [`IdentityStore`].
//!
//! ## Invariants
//!
//! - The algorithm set is closed: `ES256K`, `ES256`, `RS256`, `EdDSA`.
//! - A client holds at most one key set per algorithm.
//! - Clients are never mutated after registration; re-registering a DID
//!   replaces the previous client wholesale.
//!
//! The [`Capability`] table decides which algorithm can drive which flow for
//! which kind of identity. Flows consult it once, before any network call.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base58::ToBase58;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::crypto::{Jwk, KeyError, PublicKey, SecretKey};

/// JOSE signature algorithms supported by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "ES256K")]
    Es256k,
    #[serde(rename = "ES256")]
    Es256,
    #[serde(rename = "RS256")]
    Rs256,
    #[serde(rename = "EdDSA")]
    EdDsa,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Es256k,
        Algorithm::Es256,
        Algorithm::Rs256,
        Algorithm::EdDsa,
    ];

    /// JOSE `alg` header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Es256k => "ES256K",
            Algorithm::Es256 => "ES256",
            Algorithm::Rs256 => "RS256",
            Algorithm::EdDsa => "EdDSA",
        }
    }

    /// Human-readable key pair type, used in capability errors.
    pub fn key_type(&self) -> &'static str {
        match self {
            Algorithm::Es256k => "EC secp256k1",
            Algorithm::Es256 => "EC P-256",
            Algorithm::Rs256 => "RSA",
            Algorithm::EdDsa => "OKP Ed25519",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| IdentityError::UnknownAlgorithm(s.to_string()))
    }
}

/// Kind of subject an identity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Organisation identity, `did:ebsi:` identifiers (`did1`).
    LegalEntity,
    /// Natural person identity, `did:key:` identifiers (`did2`).
    NaturalPerson,
}

impl IdentityKind {
    /// Map a DID method version from the command surface.
    pub fn from_did_method(method: &str) -> Option<Self> {
        match method {
            "did1" => Some(IdentityKind::LegalEntity),
            "did2" => Some(IdentityKind::NaturalPerson),
            _ => None,
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKind::LegalEntity => f.write_str("legal entity"),
            IdentityKind::NaturalPerson => f.write_str("natural person"),
        }
    }
}

/// Protocol flows gated by the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Ake,
    Siop,
    LedgerSigning,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Ake => f.write_str("authenticated key exchange"),
            Flow::Siop => f.write_str("SIOP presentation"),
            Flow::LedgerSigning => f.write_str("ledger transaction signing"),
        }
    }
}

/// Capability table: {flow × algorithm × identity kind} → supported.
pub struct Capability;

impl Capability {
    pub fn supports(flow: Flow, algorithm: Algorithm, kind: IdentityKind) -> bool {
        match flow {
            // The presentation library cannot build RSA key pairs for natural persons.
            Flow::Siop => !(algorithm == Algorithm::Rs256 && kind == IdentityKind::NaturalPerson),
            // The encrypted AKE payload needs ECDH.
            Flow::Ake => matches!(algorithm, Algorithm::Es256k | Algorithm::Es256),
            Flow::LedgerSigning => algorithm == Algorithm::Es256k,
        }
    }

    /// Fail with [`IdentityError::UnsupportedKeyType`] when the combination is not supported.
    pub fn require(flow: Flow, algorithm: Algorithm, kind: IdentityKind) -> Result<(), IdentityError> {
        if Self::supports(flow, algorithm, kind) {
            Ok(())
        } else {
            Err(IdentityError::UnsupportedKeyType { flow, algorithm, kind })
        }
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Unknown signature algorithm: '{0}' (expected one of ES256K, ES256, RS256, EdDSA)")]
    UnknownAlgorithm(String),

    #[error("No key for algorithm {algorithm} provisioned for {did}")]
    NoKeyForAlgorithm { did: String, algorithm: Algorithm },

    #[error("Unsupported key type for {flow}: key pair generation for {} is not supported for {kind} identities ({algorithm})", .algorithm.key_type())]
    UnsupportedKeyType {
        flow: Flow,
        algorithm: Algorithm,
        kind: IdentityKind,
    },

    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Key material for one algorithm.
#[derive(Debug, Clone)]
pub struct KeySet {
    pub algorithm: Algorithm,
    pub secret: SecretKey,
    pub public: PublicKey,
    /// `<did>#<jwk thumbprint>`
    pub kid: String,
}

impl KeySet {
    pub fn new(did: &str, secret: SecretKey) -> Result<Self, KeyError> {
        let public = secret.public_key();
        let thumbprint = public.to_jwk().thumbprint()?;
        Ok(Self {
            algorithm: secret.algorithm(),
            secret,
            public,
            kid: format!("{did}#{thumbprint}"),
        })
    }

    pub fn jwk(&self) -> Jwk {
        self.public.to_jwk()
    }
}

/// A test identity.
#[derive(Debug, Clone)]
pub struct Client {
    pub did: String,
    pub kind: IdentityKind,
    keys: BTreeMap<Algorithm, KeySet>,
}

impl Client {
    /// Build a client from freshly generated or imported secrets.
    ///
    /// When `did` is `None` the identifier is derived: a random `did:ebsi:`
    /// for legal entities, a `did:key:` over the first secret's JWK for
    /// natural persons.
    pub fn new(kind: IdentityKind, did: Option<String>, secrets: Vec<SecretKey>) -> Result<Self, IdentityError> {
        let first = secrets
            .first()
            .ok_or_else(|| IdentityError::Key(KeyError::InvalidKey("no key material supplied".into())))?;

        let did = match did {
            Some(did) => did,
            None => match kind {
                IdentityKind::LegalEntity => generate_legal_entity_did(),
                IdentityKind::NaturalPerson => natural_person_did(&first.public_key().to_jwk())?,
            },
        };

        let mut keys = BTreeMap::new();
        for secret in secrets {
            let set = KeySet::new(&did, secret)?;
            keys.insert(set.algorithm, set);
        }

        Ok(Self { did, kind, keys })
    }

    pub fn keys(&self, algorithm: Algorithm) -> Result<&KeySet, IdentityError> {
        self.keys.get(&algorithm).ok_or_else(|| IdentityError::NoKeyForAlgorithm {
            did: self.did.clone(),
            algorithm,
        })
    }

    pub fn algorithms(&self) -> impl Iterator<Item = Algorithm> + '_ {
        self.keys.keys().copied()
    }

    /// Key set whose `kid` matches, if any.
    pub fn key_by_kid(&self, kid: &str) -> Option<&KeySet> {
        self.keys.values().find(|set| set.kid == kid)
    }
}

/// Per-scenario registry of identities, keyed by DID.
#[derive(Debug, Default, Clone)]
pub struct IdentityStore {
    clients: HashMap<String, Arc<Client>>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a client. Re-registration overwrites.
    pub fn register(&mut self, client: Client) -> Arc<Client> {
        let client = Arc::new(client);
        self.clients.insert(client.did.clone(), client.clone());
        client
    }

    pub fn get(&self, did: &str) -> Result<Arc<Client>, IdentityError> {
        self.clients
            .get(did)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownIdentity(did.to_string()))
    }

    pub fn get_keys(&self, did: &str, algorithm: Algorithm) -> Result<KeySet, IdentityError> {
        self.get(did)?.keys(algorithm).cloned()
    }

    /// Public key for `did`, selected by `kid` when given, else by algorithm.
    pub fn resolve_public_key(
        &self,
        did: &str,
        kid: Option<&str>,
        algorithm: Algorithm,
    ) -> Result<PublicKey, IdentityError> {
        let client = self.get(did)?;
        if let Some(set) = kid.and_then(|kid| client.key_by_kid(kid)) {
            return Ok(set.public.clone());
        }
        Ok(client.keys(algorithm)?.public.clone())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clear(&mut self) {
        self.clients.clear();
    }
}

/// `did:ebsi:z` + base58btc(0x01 || 16 random bytes)
fn generate_legal_entity_did() -> String {
    let mut bytes = [0u8; 17];
    bytes[0] = 0x01;
    OsRng.fill_bytes(&mut bytes[1..]);
    format!("did:ebsi:z{}", bytes.to_base58())
}

/// `did:key:z` + base58btc(jwk_jcs-pub multicodec || canonical JWK)
fn natural_person_did(jwk: &Jwk) -> Result<String, KeyError> {
    // varint(0xeb51)
    let mut bytes = vec![0xd1, 0xd6, 0x03];
    bytes.extend_from_slice(jwk.canonical_json()?.as_bytes());
    Ok(format!("did:key:z{}", bytes.to_base58()))
}
