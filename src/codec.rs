//! State-key encoding and the validated `Address`/`Amount` newtypes.
//!
//! Keys must be byte-identical to the FSM's own encoder, so every joiner
//! and integer encoding here is fixed by the wire format, not by taste.

use crate::error::{PluginError, PluginErrorKind};

const ACCOUNT_PREFIX: u8 = 0x01;
const POOL_PREFIX: u8 = 0x02;
const PARAMS_PREFIX: u8 = 0x07;
const PARAMS_SUFFIX: &[u8] = b"/f/";

pub const ADDRESS_LEN: usize = 20;

/// A validated, immutable 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PluginError> {
        if bytes.len() != ADDRESS_LEN {
            return Err(PluginError::new(PluginErrorKind::InvalidAddress));
        }
        let mut buf = [0u8; ADDRESS_LEN];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A validated, strictly-positive unsigned amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(u64);

impl Amount {
    pub fn new(value: u64) -> Result<Self, PluginError> {
        if value == 0 {
            return Err(PluginError::new(PluginErrorKind::InvalidAmount));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// `true` iff `value` coerces to exactly [`ADDRESS_LEN`] bytes.
pub fn validate_address(value: &[u8]) -> bool {
    value.len() == ADDRESS_LEN
}

/// `true` iff `value` is a non-zero unsigned 64-bit integer.
pub fn validate_amount(value: u64) -> bool {
    value > 0
}

/// `8` big-endian bytes for `v`.
pub fn format_uint64(v: u64) -> [u8; 8] {
    v.to_be_bytes()
}

/// Joins `(len, bytes)` pairs as `len(item) || item` for each non-empty
/// item, skipping empty items entirely (writing nothing for them).
fn join_length_prefixed(items: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for item in items {
        if item.is_empty() {
            continue;
        }
        out.push(item.len() as u8);
        out.extend_from_slice(item);
    }
    out
}

/// `len(ACCOUNT_PREFIX) || ACCOUNT_PREFIX || len(addr) || addr`
pub fn key_for_account(addr: &Address) -> Vec<u8> {
    join_length_prefixed(&[&[ACCOUNT_PREFIX], addr.as_bytes()])
}

/// `len(POOL_PREFIX) || POOL_PREFIX || 8 || bigEndianU64(chainID)`
pub fn key_for_fee_pool(chain_id: u64) -> Vec<u8> {
    let be = format_uint64(chain_id);
    join_length_prefixed(&[&[POOL_PREFIX], &be])
}

/// `len(PARAMS_PREFIX) || PARAMS_PREFIX || 3 || "/f/"`
pub fn key_for_fee_params() -> Vec<u8> {
    join_length_prefixed(&[&[PARAMS_PREFIX], PARAMS_SUFFIX])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_key_is_byte_stable() {
        let addr = Address::from_slice(&[0x01; 20]).unwrap();
        let key = key_for_account(&addr);
        let mut expected = vec![1, ACCOUNT_PREFIX, 20];
        expected.extend_from_slice(&[0x01; 20]);
        assert_eq!(key, expected);
    }

    #[test]
    fn fee_pool_key_is_byte_stable() {
        let key = key_for_fee_pool(1);
        let mut expected = vec![1, POOL_PREFIX, 8];
        expected.extend_from_slice(&1u64.to_be_bytes());
        assert_eq!(key, expected);
    }

    #[test]
    fn fee_params_key_is_byte_stable() {
        let key = key_for_fee_params();
        let mut expected = vec![1, PARAMS_PREFIX, 3];
        expected.extend_from_slice(b"/f/");
        assert_eq!(key, expected);
    }

    #[test]
    fn validate_address_checks_length_only() {
        assert!(validate_address(&[0u8; 20]));
        assert!(!validate_address(&[0u8; 19]));
        assert!(!validate_address(&[0u8; 21]));
    }

    #[test]
    fn validate_amount_rejects_zero() {
        assert!(validate_amount(1));
        assert!(validate_amount(u64::MAX));
        assert!(!validate_amount(0));
    }

    #[test]
    fn format_uint64_is_big_endian() {
        assert_eq!(format_uint64(1), [0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn different_addresses_yield_different_account_keys() {
        let a = Address::from_slice(&[0x01; 20]).unwrap();
        let b = Address::from_slice(&[0x02; 20]).unwrap();
        assert_ne!(key_for_account(&a), key_for_account(&b));
    }
}
