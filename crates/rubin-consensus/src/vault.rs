//! CORE_VAULT_V1 covenant_data: `owner_lock_id(32) || threshold(1) || key_count(1) ||
//! keys[key_count](32 each, sorted) || whitelist_count(2 LE) || whitelist[](32 each, sorted)`.

use crate::{
    compact_size_encode, TxOutput, TX_ERR_VAULT_KEYS_NOT_CANONICAL, TX_ERR_VAULT_MALFORMED,
    TX_ERR_VAULT_OWNER_DESTINATION_FORBIDDEN, TX_ERR_VAULT_PARAMS_INVALID,
    TX_ERR_VAULT_WHITELIST_NOT_CANONICAL, VAULT_MAX_KEYS,
};
use rubin_crypto::CryptoProvider;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VaultCovenant {
    pub owner_lock_id: [u8; 32],
    pub threshold: u8,
    pub keys: Vec<[u8; 32]>,
    pub whitelist: Vec<[u8; 32]>,
}

pub fn parse_vault_covenant_data(data: &[u8]) -> Result<VaultCovenant, String> {
    if data.len() < 34 {
        return Err(TX_ERR_VAULT_MALFORMED.into());
    }
    let mut owner_lock_id = [0u8; 32];
    owner_lock_id.copy_from_slice(&data[0..32]);
    let threshold = data[32];
    let key_count = data[33] as usize;
    if key_count == 0 || key_count > VAULT_MAX_KEYS {
        return Err(TX_ERR_VAULT_PARAMS_INVALID.into());
    }
    if threshold == 0 || threshold as usize > key_count {
        return Err(TX_ERR_VAULT_PARAMS_INVALID.into());
    }

    let keys_end = 34 + 32 * key_count;
    if data.len() < keys_end + 2 {
        return Err(TX_ERR_VAULT_MALFORMED.into());
    }
    let mut keys = Vec::with_capacity(key_count);
    for i in 0..key_count {
        let start = 34 + i * 32;
        let mut key = [0u8; 32];
        key.copy_from_slice(&data[start..start + 32]);
        keys.push(key);
    }
    for pair in keys.windows(2) {
        if pair[0] >= pair[1] {
            return Err(TX_ERR_VAULT_KEYS_NOT_CANONICAL.into());
        }
    }

    let whitelist_count = u16::from_le_bytes([data[keys_end], data[keys_end + 1]]) as usize;
    let whitelist_start = keys_end + 2;
    let whitelist_end = whitelist_start + 32 * whitelist_count;
    if data.len() != whitelist_end {
        return Err(TX_ERR_VAULT_MALFORMED.into());
    }
    let mut whitelist = Vec::with_capacity(whitelist_count);
    for i in 0..whitelist_count {
        let start = whitelist_start + i * 32;
        let mut entry = [0u8; 32];
        entry.copy_from_slice(&data[start..start + 32]);
        whitelist.push(entry);
    }
    for pair in whitelist.windows(2) {
        if pair[0] >= pair[1] {
            return Err(TX_ERR_VAULT_WHITELIST_NOT_CANONICAL.into());
        }
    }
    if whitelist.binary_search(&owner_lock_id).is_ok() {
        return Err(TX_ERR_VAULT_OWNER_DESTINATION_FORBIDDEN.into());
    }

    Ok(VaultCovenant {
        owner_lock_id,
        threshold,
        keys,
        whitelist,
    })
}

pub fn encode_vault_covenant_data(covenant: &VaultCovenant) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&covenant.owner_lock_id);
    out.push(covenant.threshold);
    out.push(covenant.keys.len() as u8);
    for key in &covenant.keys {
        out.extend_from_slice(key);
    }
    out.extend_from_slice(&(covenant.whitelist.len() as u16).to_le_bytes());
    for entry in &covenant.whitelist {
        out.extend_from_slice(entry);
    }
    out
}

/// `SHA3-256(u16le(covenant_type) || cs(len(covenant_data)) || covenant_data)`. Value is
/// excluded so a whitelist entry binds a spend destination's shape, not its amount.
pub fn output_descriptor_hash(
    provider: &dyn CryptoProvider,
    output: &TxOutput,
) -> Result<[u8; 32], String> {
    let mut preimage = Vec::new();
    preimage.extend_from_slice(&output.covenant_type.to_le_bytes());
    preimage.extend_from_slice(&compact_size_encode(output.covenant_data.len() as u64));
    preimage.extend_from_slice(&output.covenant_data);
    provider.sha3_256(&preimage)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestProvider;
    impl CryptoProvider for TestProvider {
        fn sha3_256(&self, input: &[u8]) -> Result<[u8; 32], String> {
            use sha3::Digest;
            let mut h = sha3::Sha3_256::new();
            h.update(input);
            let out = h.finalize();
            let mut r = [0u8; 32];
            r.copy_from_slice(&out);
            Ok(r)
        }
        fn verify_mldsa87(&self, _: &[u8], _: &[u8], _: &[u8; 32]) -> Result<bool, String> {
            Ok(false)
        }
        fn verify_slhdsa_shake_256f(&self, _: &[u8], _: &[u8], _: &[u8; 32]) -> Result<bool, String> {
            Ok(false)
        }
    }

    fn key(b: u8) -> [u8; 32] {
        [b; 32]
    }

    #[test]
    fn roundtrip_sorted_keys_and_whitelist() {
        let covenant = VaultCovenant {
            owner_lock_id: key(0xaa),
            threshold: 2,
            keys: vec![key(1), key(2), key(3)],
            whitelist: vec![key(10), key(20)],
        };
        let encoded = encode_vault_covenant_data(&covenant);
        let decoded = parse_vault_covenant_data(&encoded).unwrap();
        assert_eq!(covenant, decoded);
    }

    #[test]
    fn rejects_unsorted_keys() {
        let data = encode_vault_covenant_data(&VaultCovenant {
            owner_lock_id: key(0xaa),
            threshold: 1,
            keys: vec![key(2), key(1)],
            whitelist: vec![],
        });
        assert!(parse_vault_covenant_data(&data).is_err());
    }

    #[test]
    fn rejects_unsorted_whitelist() {
        let data = encode_vault_covenant_data(&VaultCovenant {
            owner_lock_id: key(0xaa),
            threshold: 1,
            keys: vec![key(1)],
            whitelist: vec![key(20), key(10)],
        });
        assert!(parse_vault_covenant_data(&data).is_err());
    }

    #[test]
    fn rejects_owner_in_whitelist() {
        let data = encode_vault_covenant_data(&VaultCovenant {
            owner_lock_id: key(0xaa),
            threshold: 1,
            keys: vec![key(1)],
            whitelist: vec![key(0xaa)],
        });
        assert!(parse_vault_covenant_data(&data).is_err());
    }

    #[test]
    fn rejects_threshold_above_key_count() {
        let data = encode_vault_covenant_data(&VaultCovenant {
            owner_lock_id: key(0xaa),
            threshold: 3,
            keys: vec![key(1), key(2)],
            whitelist: vec![],
        });
        assert!(parse_vault_covenant_data(&data).is_err());
    }

    #[test]
    fn rejects_truncated_data() {
        assert!(parse_vault_covenant_data(&[0u8; 10]).is_err());
    }

    #[test]
    fn output_descriptor_hash_ignores_value() {
        let provider = TestProvider;
        let a = TxOutput {
            value: 1,
            covenant_type: crate::CORE_P2PK,
            covenant_data: vec![1, 2, 3],
        };
        let b = TxOutput {
            value: 999,
            covenant_type: crate::CORE_P2PK,
            covenant_data: vec![1, 2, 3],
        };
        assert_eq!(
            output_descriptor_hash(&provider, &a).unwrap(),
            output_descriptor_hash(&provider, &b).unwrap()
        );
    }
}
