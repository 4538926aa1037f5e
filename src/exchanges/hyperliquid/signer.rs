use super::types::{Action, HyperliquidError, Signature, SignedAction};
use crate::core::errors::ExchangeError;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::Serialize;
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const AGENT_TYPE: &str = "Agent(string source,bytes32 connectionId)";
const DOMAIN_NAME: &str = "Exchange";
const DOMAIN_VERSION: &str = "1";
const DOMAIN_CHAIN_ID: u64 = 1337;

/// Hyperliquid L1 action signer (secp256k1, EIP-712 phantom agent)
///
/// Every action is hashed as `keccak(msgpack(action) ‖ nonce ‖ vault)`,
/// wrapped into an `Agent` struct whose `source` tells mainnet from testnet
/// and signed as typed data under the fixed `Exchange` domain.
#[derive(Clone)]
pub struct HyperliquidSigner {
    secret_key: SecretKey,
    wallet_address: String,
    is_mainnet: bool,
    secp: Secp256k1<secp256k1::All>,
}

impl std::fmt::Debug for HyperliquidSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperliquidSigner")
            .field("wallet_address", &self.wallet_address)
            .field("is_mainnet", &self.is_mainnet)
            .finish_non_exhaustive()
    }
}

impl HyperliquidSigner {
    /// Build a signer from a hex private key, `0x` prefix optional.
    pub fn from_private_key(private_key: &str, is_mainnet: bool) -> Result<Self, ExchangeError> {
        let bytes = Zeroizing::new(
            hex::decode(private_key.trim().trim_start_matches("0x"))
                .map_err(HyperliquidError::invalid_key)?,
        );
        let secret_key = SecretKey::from_slice(&bytes).map_err(HyperliquidError::invalid_key)?;

        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);

        Ok(Self {
            secret_key,
            wallet_address: public_key_to_address(&public_key),
            is_mainnet,
            secp,
        })
    }

    /// EIP-55 checksummed account address
    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    pub const fn is_mainnet(&self) -> bool {
        self.is_mainnet
    }

    /// Sign `action` with `nonce` and wrap it into the request envelope.
    pub fn sign_action(&self, action: Action, nonce: u64) -> Result<SignedAction, ExchangeError> {
        let signature = self.sign_l1_action(&action, None, nonce)?;
        Ok(SignedAction {
            action,
            nonce,
            signature,
            vault_address: None,
        })
    }

    pub fn sign_l1_action<T: Serialize>(
        &self,
        action: &T,
        vault_address: Option<&str>,
        nonce: u64,
    ) -> Result<Signature, ExchangeError> {
        let connection_id = action_hash(action, vault_address, nonce)?;
        let digest = typed_data_digest(&agent_struct_hash(self.is_mainnet, &connection_id));
        Ok(self.sign_digest(digest))
    }

    fn sign_digest(&self, digest: [u8; 32]) -> Signature {
        let message = Message::from_digest(digest);
        let (recovery_id, compact) = self
            .secp
            .sign_ecdsa_recoverable(&message, &self.secret_key)
            .serialize_compact();

        Signature {
            r: format!("0x{}", hex::encode(&compact[..32])),
            s: format!("0x{}", hex::encode(&compact[32..])),
            // recovery ids are 0..=3
            v: 27 + recovery_id.to_i32() as u8,
        }
    }
}

/// `keccak(msgpack(action) ‖ nonce (u64 BE) ‖ 0x00 | 0x01 ‖ vault)`
pub fn action_hash<T: Serialize>(
    action: &T,
    vault_address: Option<&str>,
    nonce: u64,
) -> Result<[u8; 32], ExchangeError> {
    let mut data = rmp_serde::to_vec_named(action)?;
    data.extend_from_slice(&nonce.to_be_bytes());
    match vault_address {
        None => data.push(0x00),
        Some(vault) => {
            data.push(0x01);
            let bytes = hex::decode(vault.trim_start_matches("0x")).map_err(|e| {
                ExchangeError::InvalidParameters(format!("invalid vault address: {}", e))
            })?;
            data.extend_from_slice(&bytes);
        }
    }
    Ok(keccak256(&data))
}

fn agent_struct_hash(is_mainnet: bool, connection_id: &[u8; 32]) -> [u8; 32] {
    let source = if is_mainnet { "a" } else { "b" };
    let mut encoded = Vec::with_capacity(32 * 3);
    encoded.extend_from_slice(&keccak256(AGENT_TYPE.as_bytes()));
    encoded.extend_from_slice(&keccak256(source.as_bytes()));
    encoded.extend_from_slice(connection_id);
    keccak256(&encoded)
}

fn domain_separator() -> [u8; 32] {
    let mut chain_id = [0u8; 32];
    chain_id[24..].copy_from_slice(&DOMAIN_CHAIN_ID.to_be_bytes());

    let mut encoded = Vec::with_capacity(32 * 5);
    encoded.extend_from_slice(&keccak256(DOMAIN_TYPE.as_bytes()));
    encoded.extend_from_slice(&keccak256(DOMAIN_NAME.as_bytes()));
    encoded.extend_from_slice(&keccak256(DOMAIN_VERSION.as_bytes()));
    encoded.extend_from_slice(&chain_id);
    // verifyingContract is the zero address
    encoded.extend_from_slice(&[0u8; 32]);
    keccak256(&encoded)
}

fn typed_data_digest(struct_hash: &[u8; 32]) -> [u8; 32] {
    let mut encoded = Vec::with_capacity(2 + 64);
    encoded.extend_from_slice(&[0x19, 0x01]);
    encoded.extend_from_slice(&domain_separator());
    encoded.extend_from_slice(struct_hash);
    keccak256(&encoded)
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

fn public_key_to_address(public_key: &PublicKey) -> String {
    // drop the 0x04 uncompressed marker
    let hash = keccak256(&public_key.serialize_uncompressed()[1..]);
    to_checksum_address(&hash[12..])
}

/// EIP-55 mixed case encoding of a 20 byte address
fn to_checksum_address(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(2 + lower.len());
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}
