//! CORE_MULTISIG covenant_data: `threshold(1) || key_count(1) || keys[](32 each, sorted)`.

use crate::{MULTISIG_MAX_KEYS, MULTISIG_MIN_KEYS};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigCovenant {
    pub threshold: u8,
    pub keys: Vec<[u8; 32]>,
}

pub fn parse_multisig_covenant_data(data: &[u8]) -> Result<MultisigCovenant, String> {
    if data.len() < 2 {
        return Err("TX_ERR_PARSE".into());
    }
    let threshold = data[0];
    let key_count = data[1] as usize;
    if key_count < MULTISIG_MIN_KEYS || key_count > MULTISIG_MAX_KEYS {
        return Err("TX_ERR_PARSE".into());
    }
    if threshold == 0 || threshold as usize > key_count {
        return Err("TX_ERR_PARSE".into());
    }
    if data.len() != 2 + 32 * key_count {
        return Err("TX_ERR_PARSE".into());
    }
    let mut keys = Vec::with_capacity(key_count);
    for i in 0..key_count {
        let start = 2 + i * 32;
        let mut key = [0u8; 32];
        key.copy_from_slice(&data[start..start + 32]);
        keys.push(key);
    }
    for pair in keys.windows(2) {
        if pair[0] >= pair[1] {
            return Err("TX_ERR_PARSE".into());
        }
    }
    Ok(MultisigCovenant { threshold, keys })
}

pub fn encode_multisig_covenant_data(covenant: &MultisigCovenant) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 32 * covenant.keys.len());
    out.push(covenant.threshold);
    out.push(covenant.keys.len() as u8);
    for key in &covenant.keys {
        out.extend_from_slice(key);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> [u8; 32] {
        [b; 32]
    }

    #[test]
    fn roundtrip_sorted_keys() {
        let covenant = MultisigCovenant {
            threshold: 2,
            keys: vec![key(1), key(2), key(3)],
        };
        let encoded = encode_multisig_covenant_data(&covenant);
        let decoded = parse_multisig_covenant_data(&encoded).unwrap();
        assert_eq!(covenant, decoded);
    }

    #[test]
    fn rejects_unsorted_keys() {
        let data = encode_multisig_covenant_data(&MultisigCovenant {
            threshold: 1,
            keys: vec![key(2), key(1)],
        });
        assert!(parse_multisig_covenant_data(&data).is_err());
    }

    #[test]
    fn rejects_threshold_above_key_count() {
        let data = encode_multisig_covenant_data(&MultisigCovenant {
            threshold: 3,
            keys: vec![key(1), key(2)],
        });
        assert!(parse_multisig_covenant_data(&data).is_err());
    }

    #[test]
    fn rejects_truncated_data() {
        assert!(parse_multisig_covenant_data(&[2, 3]).is_err());
    }
}
