use std::cmp::min;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rubin_crypto::CryptoProvider;

use crate::encode::block_header_bytes;
use crate::{
    BlockHeader, EMISSION_SPEED_FACTOR, MAX_TARGET, MAX_TIMESTAMP_STEP_PER_BLOCK, MINEABLE_CAP,
    TAIL_EMISSION_PER_BLOCK, TARGET_BLOCK_INTERVAL, WINDOW_SIZE,
};

pub fn block_header_hash(
    provider: &dyn CryptoProvider,
    header: &BlockHeader,
) -> Result<[u8; 32], String> {
    provider.sha3_256(&block_header_bytes(header))
}

/// Target a block at `height` must carry, given its ancestor chain ordered oldest to
/// newest with the parent last. Only heights on a `WINDOW_SIZE` boundary retarget;
/// all others must keep the parent's target unchanged.
pub fn block_expected_target(
    ancestor_headers: &[BlockHeader],
    height: u64,
    claimed_target: &[u8; 32],
) -> Result<[u8; 32], String> {
    let _ = claimed_target;
    if height == 0 {
        return Err("BLOCK_ERR_TARGET_INVALID".into());
    }
    let parent = ancestor_headers
        .last()
        .ok_or_else(|| "BLOCK_ERR_LINKAGE_INVALID".to_string())?;
    if height % WINDOW_SIZE != 0 || height < WINDOW_SIZE {
        return Ok(parent.target);
    }
    if (ancestor_headers.len() as u64) < WINDOW_SIZE {
        return Err("BLOCK_ERR_LINKAGE_INVALID".into());
    }
    let window_timestamps: Vec<u64> = ancestor_headers[ancestor_headers.len() - WINDOW_SIZE as usize..]
        .iter()
        .map(|h| h.timestamp)
        .collect();
    retarget_v1(parent.target, &window_timestamps)
}

/// Clamps each timestamp in `window_timestamps` (oldest to newest) to
/// `[prev+1, prev+MAX_TIMESTAMP_STEP_PER_BLOCK]` of its clamped predecessor, then
/// retargets from the elapsed time between the clamped first and last entries.
pub fn retarget_v1(target_old: [u8; 32], window_timestamps: &[u64]) -> Result<[u8; 32], String> {
    let pow_limit = BigUint::from_bytes_be(&MAX_TARGET);
    let t_old = BigUint::from_bytes_be(&target_old);
    if t_old.is_zero() {
        return Err("retarget: target_old is zero".into());
    }
    if t_old > pow_limit {
        return Err("retarget: target_old above pow_limit".into());
    }
    if window_timestamps.is_empty() {
        return Err("retarget: empty window".into());
    }

    let mut clamped_first = window_timestamps[0];
    let mut clamped_prev = clamped_first;
    for &raw in &window_timestamps[1..] {
        let lower = clamped_prev.saturating_add(1);
        let upper = clamped_prev.saturating_add(MAX_TIMESTAMP_STEP_PER_BLOCK);
        clamped_prev = raw.clamp(lower, upper);
    }
    let clamped_last = clamped_prev;
    if window_timestamps.len() == 1 {
        clamped_first = clamped_last;
    }

    let t_actual = if clamped_last <= clamped_first {
        1u64
    } else {
        clamped_last - clamped_first
    };

    let t_expected = TARGET_BLOCK_INTERVAL
        .checked_mul(WINDOW_SIZE)
        .ok_or_else(|| "retarget: t_expected overflow".to_string())?;
    if t_expected == 0 {
        return Err("retarget: t_expected is zero".into());
    }

    // floor(target_old * T_actual / T_expected)
    let mut t_new = (&t_old * BigUint::from(t_actual)) / BigUint::from(t_expected);

    // clamp lower = max(1, floor(target_old / 4))
    let mut lower = &t_old >> 2;
    if lower < BigUint::one() {
        lower = BigUint::one();
    }
    // upper = min(target_old * 4, pow_limit)
    let upper_unclamped = &t_old << 2;
    let upper = core::cmp::min(upper_unclamped, pow_limit);

    if t_new < lower {
        t_new = lower;
    }
    if t_new > upper {
        t_new = upper;
    }

    biguint_to_bytes32(&t_new)
}

/// Median of up to the last 11 ancestor timestamps (oldest to newest, parent last).
pub fn median_past_timestamp(ancestor_headers: &[BlockHeader], height: u64) -> Result<u64, String> {
    if height == 0 {
        return Ok(0);
    }
    let take = min(11, ancestor_headers.len());
    if take == 0 {
        return Err("BLOCK_ERR_LINKAGE_INVALID".into());
    }
    let mut window: Vec<u64> = ancestor_headers[ancestor_headers.len() - take..]
        .iter()
        .map(|h| h.timestamp)
        .collect();
    window.sort_unstable();
    Ok(window[window.len() / 2])
}

/// Coinbase subsidy owed at `height` given cumulative subsidy-only generation over
/// heights `1..height` (fees excluded). Decays geometrically toward a fixed tail.
pub fn block_reward_for_height(height: u64, already_generated: u64) -> u64 {
    if height == 0 {
        return 0;
    }
    if already_generated >= MINEABLE_CAP {
        return TAIL_EMISSION_PER_BLOCK;
    }
    let remaining = MINEABLE_CAP - already_generated;
    let base_reward = remaining >> EMISSION_SPEED_FACTOR;
    if base_reward < TAIL_EMISSION_PER_BLOCK {
        TAIL_EMISSION_PER_BLOCK
    } else {
        base_reward
    }
}

fn biguint_to_bytes32(x: &BigUint) -> Result<[u8; 32], String> {
    let b = x.to_bytes_be();
    if b.len() > 32 {
        return Err("u256: overflow".into());
    }
    let mut out = [0u8; 32];
    out[32 - b.len()..].copy_from_slice(&b);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retarget_clamps_to_quarter_and_quadruple() {
        let target = [0x10u8; 32];
        let t_expected = TARGET_BLOCK_INTERVAL * WINDOW_SIZE;
        let too_fast = retarget_v1(target, &[0, 1]).unwrap();
        assert!(BigUint::from_bytes_be(&too_fast) >= BigUint::from_bytes_be(&target) >> 2);

        // Construct a window whose per-step clamp still lets elapsed time blow past
        // 4x t_expected, to exercise the upper-clamp path under clamped semantics.
        let steps = (4 * t_expected / MAX_TIMESTAMP_STEP_PER_BLOCK) + 10;
        let window_timestamps: Vec<u64> = (0..=steps)
            .map(|i| i * MAX_TIMESTAMP_STEP_PER_BLOCK)
            .collect();
        let too_slow = retarget_v1(target, &window_timestamps).unwrap();
        assert!(BigUint::from_bytes_be(&too_slow) <= BigUint::from_bytes_be(&target) << 2);
    }

    #[test]
    fn block_reward_floors_to_tail_once_cap_reached() {
        assert_eq!(
            block_reward_for_height(1, MINEABLE_CAP),
            TAIL_EMISSION_PER_BLOCK
        );
        assert_eq!(
            block_reward_for_height(1, 0),
            MINEABLE_CAP >> EMISSION_SPEED_FACTOR
        );
        // Near the cap the geometric term underflows the tail and the tail wins.
        assert_eq!(
            block_reward_for_height(1, MINEABLE_CAP - (1 << EMISSION_SPEED_FACTOR)),
            TAIL_EMISSION_PER_BLOCK
        );
    }

    #[test]
    fn median_past_timestamp_uses_last_eleven() {
        let headers: Vec<BlockHeader> = (0..20)
            .map(|i| BlockHeader {
                version: 1,
                prev_block_hash: [0u8; 32],
                merkle_root: [0u8; 32],
                timestamp: i,
                target: [0u8; 32],
                nonce: 0,
            })
            .collect();
        let median = median_past_timestamp(&headers, 20).unwrap();
        assert_eq!(median, 14);
    }
}
