use std::collections::{HashMap, HashSet};

use rubin_crypto::CryptoProvider;

use crate::encode::{da_core_fields_bytes, tx_bytes, tx_no_witness_bytes, witness_bytes};
use crate::multisig::parse_multisig_covenant_data;
use crate::pow::{
    block_expected_target, block_header_hash, block_reward_for_height, median_past_timestamp,
};
use crate::sighash::sighash_v1_digest;
use crate::util::{
    add_u64, is_coinbase_tx, is_script_sig_zero_len, is_zero_outpoint, parse_u64_le, sub_u64,
    validate_coinbase_tx_inputs,
};
use crate::vault::{output_descriptor_hash, parse_vault_covenant_data, VaultCovenant};
use crate::{
    BLOCK_ERR_ANCHOR_BYTES_EXCEEDED, BLOCK_ERR_COINBASE_INVALID, BLOCK_ERR_DA_CHUNK_HASH_INVALID,
    BLOCK_ERR_DA_INCOMPLETE, BLOCK_ERR_DA_SET_INVALID, BLOCK_ERR_LINKAGE_INVALID,
    BLOCK_ERR_MERKLE_INVALID, BLOCK_ERR_POW_INVALID, BLOCK_ERR_SUBSIDY_EXCEEDED,
    BLOCK_ERR_TARGET_INVALID, BLOCK_ERR_TIMESTAMP_FUTURE, BLOCK_ERR_TIMESTAMP_OLD,
    BLOCK_ERR_WEIGHT_EXCEEDED, BLOCK_ERR_WITNESS_COMMITMENT, Block, BlockValidationContext,
    COINBASE_MATURITY, CORE_ANCHOR, CORE_DA_COMMIT, CORE_HTLC_V1, CORE_HTLC_V2, CORE_MULTISIG,
    CORE_P2PK, CORE_RESERVED_FUTURE, CORE_TIMELOCK_V1, CORE_VAULT_V1, DAChunkFields, DACommitFields,
    MAX_ANCHOR_BYTES_PER_BLOCK, MAX_ANCHOR_PAYLOAD_SIZE, MAX_BLOCK_WEIGHT, MAX_FUTURE_DRIFT,
    MAX_TX_INPUTS, MAX_TX_OUTPUTS, MAX_WITNESS_BYTES_PER_TX, MAX_WITNESS_ITEMS, ML_DSA_PUBKEY_BYTES,
    ML_DSA_SIG_BYTES, SLH_DSA_PUBKEY_BYTES, SLH_DSA_SIG_MAX_BYTES, SUITE_ID_ML_DSA,
    SUITE_ID_SENTINEL, SUITE_ID_SLH_DSA, TIMELOCK_MODE_HEIGHT, TIMELOCK_MODE_TIMESTAMP,
    TX_COINBASE_PREVOUT_VOUT, TX_ERR_COINBASE_IMMATURE, TX_ERR_NONCE_REPLAY,
    TX_ERR_SEQUENCE_INVALID, TX_ERR_TX_NONCE_INVALID, TX_ERR_VAULT_FEE_SPONSOR_FORBIDDEN,
    TX_ERR_VAULT_MALFORMED, TX_ERR_VAULT_MULTI_INPUT_FORBIDDEN, TX_ERR_VAULT_OUTPUT_NOT_WHITELISTED,
    TX_ERR_VAULT_OWNER_AUTH_REQUIRED, TX_ERR_VAULT_PARAMS_INVALID, TX_ERR_WITNESS_OVERFLOW,
    TX_KIND_DA_CHUNK, TX_KIND_DA_COMMIT, TX_MAX_SEQUENCE, TX_NONCE_ZERO, Tx, TxOutPoint, TxOutput,
    UtxoEntry, WitnessItem,
};

pub fn compute_key_id(provider: &dyn CryptoProvider, pubkey: &[u8]) -> Result<[u8; 32], String> {
    provider.sha3_256(pubkey)
}

fn check_witness_format(
    item: &WitnessItem,
    suite_activation_slh_active: bool,
) -> Result<(), String> {
    if item.suite_id == SUITE_ID_SENTINEL {
        if !item.pubkey.is_empty() || !item.signature.is_empty() {
            return Err("TX_ERR_PARSE".into());
        }
        return Ok(());
    }
    if item.suite_id == SUITE_ID_ML_DSA {
        if item.pubkey.len() != ML_DSA_PUBKEY_BYTES || item.signature.len() != ML_DSA_SIG_BYTES {
            return Err("TX_ERR_SIG_NONCANONICAL".into());
        }
        return Ok(());
    }
    if item.suite_id == SUITE_ID_SLH_DSA {
        if !suite_activation_slh_active {
            return Err("TX_ERR_DEPLOYMENT_INACTIVE".into());
        }
        if item.pubkey.len() != SLH_DSA_PUBKEY_BYTES
            || item.signature.is_empty()
            || item.signature.len() > SLH_DSA_SIG_MAX_BYTES
        {
            return Err("TX_ERR_SIG_NONCANONICAL".into());
        }
        return Ok(());
    }
    Err("TX_ERR_SIG_ALG_INVALID".into())
}

/// The HTLC path-selector witness item (slot 0): which of the two spend paths an
/// input is exercising, and the claim preimage if so.
enum HtlcPath {
    Refund,
    Claim(Vec<u8>),
}

fn parse_htlc_path_item(item: &WitnessItem) -> Result<HtlcPath, String> {
    if item.suite_id != SUITE_ID_SENTINEL || item.pubkey.len() != 32 {
        return Err("TX_ERR_PARSE".into());
    }
    if item.signature.as_slice() == [0x01] {
        return Ok(HtlcPath::Refund);
    }
    if item.signature.len() >= 3 && item.signature[0] == 0x00 {
        let preimage_len = u16::from_le_bytes([item.signature[1], item.signature[2]]) as usize;
        if item.signature.len() != 3 + preimage_len || !(16..=256).contains(&preimage_len) {
            return Err("TX_ERR_PARSE".into());
        }
        return Ok(HtlcPath::Claim(item.signature[3..].to_vec()));
    }
    Err("TX_ERR_PARSE".into())
}

/// Verifies a single witness item's signature over the input's sighash digest.
fn verify_single_signature(
    provider: &dyn CryptoProvider,
    chain_id: &[u8; 32],
    tx: &Tx,
    input_index: usize,
    prev_value: u64,
    witness: &WitnessItem,
) -> Result<(), String> {
    let digest = sighash_v1_digest(provider, chain_id, tx, input_index as u32, prev_value)?;
    match witness.suite_id {
        SUITE_ID_ML_DSA => {
            let valid = provider
                .verify_mldsa87(&witness.pubkey, &witness.signature, &digest)
                .map_err(|_| "TX_ERR_SIG_INVALID".to_string())?;
            if valid {
                Ok(())
            } else {
                Err("TX_ERR_SIG_INVALID".into())
            }
        }
        SUITE_ID_SLH_DSA => {
            let valid = provider
                .verify_slhdsa_shake_256f(&witness.pubkey, &witness.signature, &digest)
                .map_err(|_| "TX_ERR_SIG_INVALID".to_string())?;
            if valid {
                Ok(())
            } else {
                Err("TX_ERR_SIG_INVALID".into())
            }
        }
        SUITE_ID_SENTINEL => Ok(()),
        _ => Err("TX_ERR_SIG_ALG_INVALID".into()),
    }
}

/// Verifies each witness item independently over the same shared sighash digest
/// (MULTISIG/VAULT: N independent signatures, not a threshold/aggregate scheme).
fn verify_threshold_signatures(
    provider: &dyn CryptoProvider,
    chain_id: &[u8; 32],
    tx: &Tx,
    input_index: usize,
    prev_value: u64,
    witnesses: &[WitnessItem],
) -> Result<(), String> {
    for w in witnesses {
        verify_single_signature(provider, chain_id, tx, input_index, prev_value, w)?;
    }
    Ok(())
}

fn satisfy_lock(lock_mode: u8, lock_value: u64, height: u64, timestamp: u64) -> Result<(), String> {
    match lock_mode {
        TIMELOCK_MODE_HEIGHT => {
            if height >= lock_value {
                Ok(())
            } else {
                Err("TX_ERR_TIMELOCK_NOT_MET".into())
            }
        }
        TIMELOCK_MODE_TIMESTAMP => {
            if timestamp >= lock_value {
                Ok(())
            } else {
                Err("TX_ERR_TIMELOCK_NOT_MET".into())
            }
        }
        _ => Err("TX_ERR_PARSE".into()),
    }
}

fn validate_output_covenant_constraints(output: &TxOutput) -> Result<(), String> {
    match output.covenant_type {
        CORE_P2PK => {
            if output.covenant_data.len() != 33 {
                return Err("TX_ERR_PARSE".into());
            }
        }
        CORE_TIMELOCK_V1 => {
            if output.covenant_data.len() != 9 {
                return Err("TX_ERR_PARSE".into());
            }
        }
        CORE_ANCHOR => {
            if output.value != 0 {
                return Err("TX_ERR_COVENANT_TYPE_INVALID".into());
            }
            if output.covenant_data.is_empty()
                || output.covenant_data.len() > MAX_ANCHOR_PAYLOAD_SIZE
            {
                return Err("TX_ERR_COVENANT_TYPE_INVALID".into());
            }
        }
        CORE_HTLC_V1 => {
            if output.covenant_data.len() != 105 {
                return Err("TX_ERR_PARSE".into());
            }
        }
        CORE_HTLC_V2 => {
            if output.covenant_data.len() != 105 {
                return Err("TX_ERR_PARSE".into());
            }
            let claim_key_id = &output.covenant_data[41..73];
            let refund_key_id = &output.covenant_data[73..105];
            if claim_key_id == refund_key_id {
                return Err("TX_ERR_PARSE".into());
            }
        }
        CORE_VAULT_V1 => {
            parse_vault_covenant_data(&output.covenant_data).map_err(|_| TX_ERR_VAULT_MALFORMED.to_string())?;
        }
        CORE_DA_COMMIT => {
            if output.value != 0 {
                return Err("TX_ERR_COVENANT_TYPE_INVALID".into());
            }
            if output.covenant_data.len() != 32 {
                return Err("TX_ERR_PARSE".into());
            }
        }
        CORE_MULTISIG => {
            parse_multisig_covenant_data(&output.covenant_data).map_err(|_| "TX_ERR_PARSE".to_string())?;
        }
        CORE_RESERVED_FUTURE => return Err("TX_ERR_COVENANT_TYPE_INVALID".into()),
        _ => return Err("TX_ERR_COVENANT_TYPE_INVALID".into()),
    }
    Ok(())
}

/// Number of witness items an input spending a covenant of this type consumes
/// from the transaction's flat witness list. `CORE_MULTISIG`/`CORE_VAULT_V1`
/// consume their covenant's `threshold` items; HTLC consumes a path-selector
/// item plus one signature item; everything else consumes exactly one.
fn witness_items_needed(covenant_type: u16, covenant_data: &[u8]) -> Result<usize, String> {
    match covenant_type {
        CORE_MULTISIG => {
            let covenant = parse_multisig_covenant_data(covenant_data)?;
            Ok(covenant.threshold as usize)
        }
        CORE_VAULT_V1 => {
            let covenant = parse_vault_covenant_data(covenant_data)?;
            Ok(covenant.threshold as usize)
        }
        CORE_HTLC_V1 | CORE_HTLC_V2 => Ok(2),
        _ => Ok(1),
    }
}

pub fn tx_weight(tx: &Tx) -> Result<u64, String> {
    let base = tx_no_witness_bytes(tx).len();
    let witness = witness_bytes(&tx.witness).len();
    let mut sig_cost: u64 = 0;
    for item in tx.witness.witnesses.iter() {
        match item.suite_id {
            SUITE_ID_ML_DSA => sig_cost = sig_cost.saturating_add(crate::VERIFY_COST_ML_DSA),
            SUITE_ID_SLH_DSA => sig_cost = sig_cost.saturating_add(crate::VERIFY_COST_SLH_DSA),
            _ => {}
        }
    }
    let base_weight = (base as u64)
        .checked_mul(4)
        .ok_or_else(|| "TX_ERR_PARSE".to_string())?;
    add_u64(add_u64(base_weight, witness as u64)?, sig_cost)
}

pub fn txid(provider: &dyn CryptoProvider, tx: &Tx) -> Result<[u8; 32], String> {
    provider.sha3_256(&tx_no_witness_bytes(tx))
}

/// Builds a binary merkle tree over `leaf_ids` with tagged leaves (0x00) and
/// internal nodes (0x01), shared by the txid and witness-commitment trees.
fn merkle_root_of_leaves(
    provider: &dyn CryptoProvider,
    leaf_ids: &[[u8; 32]],
) -> Result<[u8; 32], String> {
    if leaf_ids.is_empty() {
        return Err(BLOCK_ERR_MERKLE_INVALID.into());
    }
    let mut level: Vec<[u8; 32]> = Vec::with_capacity(leaf_ids.len());
    for id in leaf_ids {
        let mut leaf = Vec::with_capacity(1 + 32);
        leaf.push(0x00);
        leaf.extend_from_slice(id);
        level.push(provider.sha3_256(&leaf)?);
    }
    while level.len() > 1 {
        let mut next: Vec<[u8; 32]> = Vec::with_capacity(level.len().div_ceil(2));
        let mut i = 0;
        while i < level.len() {
            if i + 1 == level.len() {
                next.push(level[i]);
                i += 1;
                continue;
            }
            let mut concat = Vec::with_capacity(1 + 32 + 32);
            concat.push(0x01);
            concat.extend_from_slice(&level[i]);
            concat.extend_from_slice(&level[i + 1]);
            next.push(provider.sha3_256(&concat)?);
            i += 2;
        }
        level = next;
    }
    Ok(level[0])
}

fn merkle_root_txids(provider: &dyn CryptoProvider, txs: &[Tx]) -> Result<[u8; 32], String> {
    let ids = txs
        .iter()
        .map(|tx| txid(provider, tx))
        .collect::<Result<Vec<_>, _>>()?;
    merkle_root_of_leaves(provider, &ids)
}

/// Witness merkle root over `wtxid = SHA3-256(tx_bytes(tx))`, with the coinbase's
/// slot zeroed (its witness, if any, carries no spend authorization to commit to).
fn witness_merkle_root_wtxids(provider: &dyn CryptoProvider, txs: &[Tx]) -> Result<[u8; 32], String> {
    let mut ids: Vec<[u8; 32]> = Vec::with_capacity(txs.len());
    for (i, tx) in txs.iter().enumerate() {
        if i == 0 {
            ids.push([0u8; 32]);
        } else {
            ids.push(provider.sha3_256(&tx_bytes(tx))?);
        }
    }
    merkle_root_of_leaves(provider, &ids)
}

/// Verifies DA-set integrity across a block's transactions: every DA_COMMIT has
/// exactly one matching set of chunks, each chunk's payload hashes to its declared
/// `chunk_hash`, and the concatenation of chunk hashes 0..N-1 hashes to the commit's
/// declared payload commitment.
fn validate_da_set(provider: &dyn CryptoProvider, txs: &[Tx]) -> Result<(), String> {
    struct CommitInfo {
        chunk_count: u16,
        commitment: [u8; 32],
    }

    let mut commits: HashMap<[u8; 32], CommitInfo> = HashMap::new();
    let mut chunks: HashMap<[u8; 32], Vec<Option<[u8; 32]>>> = HashMap::new();

    for tx in txs {
        match tx.tx_kind {
            TX_KIND_DA_COMMIT => {
                let f: &DACommitFields = tx
                    .da_commit
                    .as_ref()
                    .ok_or_else(|| BLOCK_ERR_DA_SET_INVALID.to_string())?;
                let commitment_output = tx
                    .outputs
                    .iter()
                    .find(|o| o.covenant_type == CORE_DA_COMMIT)
                    .ok_or_else(|| BLOCK_ERR_DA_SET_INVALID.to_string())?;
                if commitment_output.covenant_data.len() != 32 {
                    return Err(BLOCK_ERR_DA_SET_INVALID.into());
                }
                let mut commitment = [0u8; 32];
                commitment.copy_from_slice(&commitment_output.covenant_data);
                if commits
                    .insert(
                        f.da_id,
                        CommitInfo {
                            chunk_count: f.chunk_count,
                            commitment,
                        },
                    )
                    .is_some()
                {
                    return Err(BLOCK_ERR_DA_SET_INVALID.into());
                }
            }
            TX_KIND_DA_CHUNK => {
                let f: &DAChunkFields = tx
                    .da_chunk
                    .as_ref()
                    .ok_or_else(|| BLOCK_ERR_DA_SET_INVALID.to_string())?;
                let payload_hash = provider.sha3_256(&tx.da_payload)?;
                if payload_hash != f.chunk_hash {
                    return Err(BLOCK_ERR_DA_CHUNK_HASH_INVALID.into());
                }
                let entry = chunks.entry(f.da_id).or_default();
                let idx = f.chunk_index as usize;
                if idx >= entry.len() {
                    entry.resize(idx + 1, None);
                }
                if entry[idx].is_some() {
                    return Err(BLOCK_ERR_DA_SET_INVALID.into());
                }
                entry[idx] = Some(f.chunk_hash);
            }
            _ => {}
        }
    }

    for da_id in chunks.keys() {
        if !commits.contains_key(da_id) {
            return Err(BLOCK_ERR_DA_SET_INVALID.into());
        }
    }

    for (da_id, commit) in &commits {
        let chunk_list = chunks
            .get(da_id)
            .ok_or_else(|| BLOCK_ERR_DA_INCOMPLETE.to_string())?;
        if chunk_list.len() != commit.chunk_count as usize || chunk_list.iter().any(|c| c.is_none()) {
            return Err(BLOCK_ERR_DA_INCOMPLETE.into());
        }
        let mut concat = Vec::with_capacity(32 * chunk_list.len());
        for c in chunk_list {
            concat.extend_from_slice(&c.expect("checked above"));
        }
        let computed = provider.sha3_256(&concat)?;
        if computed != commit.commitment {
            return Err(BLOCK_ERR_DA_SET_INVALID.into());
        }
    }

    Ok(())
}

fn tx_sums(tx: &Tx, utxo: &HashMap<TxOutPoint, UtxoEntry>) -> Result<(u64, u64), String> {
    let mut input_sum = 0u64;
    let mut output_sum = 0u64;
    for input in &tx.inputs {
        let prev = TxOutPoint {
            txid: input.prev_txid,
            vout: input.prev_vout,
        };
        let entry = utxo
            .get(&prev)
            .ok_or_else(|| "TX_ERR_MISSING_UTXO".to_string())?;
        input_sum = add_u64(input_sum, entry.output.value)?;
    }
    for output in &tx.outputs {
        output_sum = add_u64(output_sum, output.value)?;
    }
    Ok((input_sum, output_sum))
}

/// Validates and applies `block` against `utxo`, mutating it to the post-block set.
/// Returns the subsidy-only portion of the coinbase actually paid (coinbase value minus
/// fees collected), which callers accumulate into `already_generated` for future heights.
pub fn apply_block(
    provider: &dyn CryptoProvider,
    chain_id: &[u8; 32],
    block: &Block,
    utxo: &mut HashMap<TxOutPoint, UtxoEntry>,
    ctx: &BlockValidationContext,
) -> Result<u64, String> {
    if block.transactions.is_empty() {
        return Err(BLOCK_ERR_COINBASE_INVALID.into());
    }

    if ctx.height > 0 && ctx.ancestor_headers.is_empty() {
        return Err(BLOCK_ERR_LINKAGE_INVALID.into());
    }

    if ctx.height == 0 {
        if block.header.prev_block_hash != [0u8; 32] {
            return Err(BLOCK_ERR_LINKAGE_INVALID.into());
        }
    } else {
        let parent = ctx
            .ancestor_headers
            .last()
            .ok_or_else(|| BLOCK_ERR_LINKAGE_INVALID.to_string())?;
        let parent_hash = block_header_hash(provider, parent)?;
        if block.header.prev_block_hash != parent_hash {
            return Err(BLOCK_ERR_LINKAGE_INVALID.into());
        }
    }

    let expected_target =
        block_expected_target(&ctx.ancestor_headers, ctx.height, &block.header.target)?;
    if expected_target != block.header.target {
        return Err(BLOCK_ERR_TARGET_INVALID.into());
    }

    let bhash = block_header_hash(provider, &block.header)?;
    if bhash.as_slice() >= block.header.target.as_slice() {
        return Err(BLOCK_ERR_POW_INVALID.into());
    }

    let merkle = merkle_root_txids(provider, &block.transactions)?;
    if merkle != block.header.merkle_root {
        return Err(BLOCK_ERR_MERKLE_INVALID.into());
    }

    if ctx.height > 0 {
        let median_ts = median_past_timestamp(&ctx.ancestor_headers, ctx.height)?;
        if block.header.timestamp <= median_ts {
            return Err(BLOCK_ERR_TIMESTAMP_OLD.into());
        }
        if ctx.local_time_set && block.header.timestamp > ctx.local_time + MAX_FUTURE_DRIFT {
            return Err(BLOCK_ERR_TIMESTAMP_FUTURE.into());
        }
    }

    let mut coinbase_count = 0u64;
    for (i, tx) in block.transactions.iter().enumerate() {
        if is_coinbase_tx(tx, ctx.height) {
            coinbase_count += 1;
            if i != 0 {
                return Err(BLOCK_ERR_COINBASE_INVALID.into());
            }
        }
    }
    if coinbase_count != 1 {
        return Err(BLOCK_ERR_COINBASE_INVALID.into());
    }

    let witness_merkle_root = witness_merkle_root_wtxids(provider, &block.transactions)?;
    let mut commitment_preimage = Vec::with_capacity(14 + 32);
    commitment_preimage.extend_from_slice(b"RUBIN-WITNESS/");
    commitment_preimage.extend_from_slice(&witness_merkle_root);
    let expected_commitment = provider.sha3_256(&commitment_preimage)?;
    let matching_anchors = block.transactions[0]
        .outputs
        .iter()
        .filter(|out| {
            out.covenant_type == CORE_ANCHOR && out.covenant_data.as_slice() == expected_commitment
        })
        .count();
    if matching_anchors != 1 {
        return Err(BLOCK_ERR_WITNESS_COMMITMENT.into());
    }

    validate_da_set(provider, &block.transactions)?;

    let mut working_utxo = utxo.clone();
    let mut total_weight = 0u64;
    let mut total_anchor_bytes = 0u64;
    let mut total_fees = 0u64;
    let mut seen_nonces: HashSet<u64> = HashSet::with_capacity(block.transactions.len());

    for tx in &block.transactions {
        total_weight = add_u64(total_weight, tx_weight(tx)?)?;

        let is_coinbase = is_coinbase_tx(tx, ctx.height);
        if !is_coinbase {
            if tx.tx_nonce == TX_NONCE_ZERO {
                return Err(TX_ERR_TX_NONCE_INVALID.into());
            }
            if seen_nonces.contains(&tx.tx_nonce) {
                return Err(TX_ERR_NONCE_REPLAY.into());
            }
            seen_nonces.insert(tx.tx_nonce);
        }

        apply_tx(
            provider,
            chain_id,
            tx,
            &working_utxo,
            ctx.height,
            block.header.timestamp,
            ctx.htlc_v2_active,
            ctx.suite_id_02_active,
        )?;

        if !is_coinbase {
            let (in_sum, out_sum) = tx_sums(tx, &working_utxo)?;
            let fee = sub_u64(in_sum, out_sum)?;
            total_fees = add_u64(total_fees, fee)?;

            for input in &tx.inputs {
                working_utxo.remove(&TxOutPoint {
                    txid: input.prev_txid,
                    vout: input.prev_vout,
                });
            }
        }

        let txid_v = txid(provider, tx)?;
        for (vout, out) in tx.outputs.iter().enumerate() {
            if out.covenant_type == CORE_ANCHOR {
                total_anchor_bytes = add_u64(total_anchor_bytes, out.covenant_data.len() as u64)?;
                continue;
            }
            working_utxo.insert(
                TxOutPoint {
                    txid: txid_v,
                    vout: vout as u32,
                },
                UtxoEntry {
                    output: out.clone(),
                    creation_height: ctx.height,
                    created_by_coinbase: is_coinbase,
                },
            );
        }
    }

    if total_weight > MAX_BLOCK_WEIGHT {
        return Err(BLOCK_ERR_WEIGHT_EXCEEDED.into());
    }
    if total_anchor_bytes > MAX_ANCHOR_BYTES_PER_BLOCK {
        return Err(BLOCK_ERR_ANCHOR_BYTES_EXCEEDED.into());
    }

    let mut coinbase_value = 0u64;
    for out in &block.transactions[0].outputs {
        coinbase_value = add_u64(coinbase_value, out.value)?;
    }
    if ctx.height != 0 {
        let reward = block_reward_for_height(ctx.height, ctx.already_generated);
        let max_coinbase = add_u64(reward, total_fees)?;
        if coinbase_value > max_coinbase {
            return Err(BLOCK_ERR_SUBSIDY_EXCEEDED.into());
        }
    }
    let subsidy_paid = coinbase_value.saturating_sub(total_fees);

    utxo.clear();
    for (k, v) in working_utxo {
        utxo.insert(k, v);
    }
    Ok(subsidy_paid)
}

#[allow(clippy::too_many_arguments)]
pub fn validate_input_authorization(
    provider: &dyn CryptoProvider,
    chain_id: &[u8; 32],
    tx: &Tx,
    input_index: usize,
    prev_value: u64,
    prevout: &TxOutput,
    _prev_creation_height: u64,
    chain_height: u64,
    chain_timestamp: u64,
    htlc_v2_active: bool,
    suite_id_02_active: bool,
    witnesses: &[WitnessItem],
) -> Result<(), String> {
    if tx.inputs.is_empty() || input_index >= tx.inputs.len() {
        return Err("TX_ERR_PARSE".into());
    }
    if witnesses.is_empty() {
        return Err("TX_ERR_PARSE".into());
    }
    let input = &tx.inputs[input_index];
    let witness = &witnesses[0];

    match prevout.covenant_type {
        CORE_P2PK => {
            is_script_sig_zero_len("CORE_P2PK", input.script_sig.len())?;
            if witness.suite_id == SUITE_ID_SENTINEL {
                return Err("TX_ERR_SIG_ALG_INVALID".into());
            }
            check_witness_format(witness, suite_id_02_active)?;

            if prevout.covenant_data.len() != 33 {
                return Err("TX_ERR_PARSE".into());
            }
            let suite_id = prevout.covenant_data[0];
            if suite_id != witness.suite_id {
                return Err("TX_ERR_SIG_INVALID".into());
            }
            let expected_key_id = &prevout.covenant_data[1..33];
            let actual_key_id = compute_key_id(provider, &witness.pubkey)?;
            if actual_key_id.as_slice() != expected_key_id {
                return Err("TX_ERR_SIG_INVALID".into());
            }
        }
        CORE_TIMELOCK_V1 => {
            is_script_sig_zero_len("CORE_TIMELOCK_V1", input.script_sig.len())?;
            if witness.suite_id != SUITE_ID_SENTINEL {
                return Err("TX_ERR_SIG_ALG_INVALID".into());
            }
            if prevout.covenant_data.len() != 9 {
                return Err("TX_ERR_PARSE".into());
            }
            let lock_mode = prevout.covenant_data[0];
            let lock_value = parse_u64_le(&prevout.covenant_data, 1, "covenant_lock_value")?;
            satisfy_lock(lock_mode, lock_value, chain_height, chain_timestamp)?;
            return Ok(());
        }
        CORE_HTLC_V1 => {
            is_script_sig_zero_len("CORE_HTLC_V1", input.script_sig.len())?;
            if witnesses.len() != 2 {
                return Err("TX_ERR_PARSE".into());
            }
            let path = parse_htlc_path_item(&witnesses[0])?;
            let sig_item = &witnesses[1];
            if sig_item.suite_id == SUITE_ID_SENTINEL {
                return Err("TX_ERR_SIG_ALG_INVALID".into());
            }
            check_witness_format(sig_item, suite_id_02_active)?;

            if prevout.covenant_data.len() != 105 {
                return Err("TX_ERR_PARSE".into());
            }
            let expected_hash = &prevout.covenant_data[0..32];
            let lock_mode = prevout.covenant_data[32];
            if lock_mode != TIMELOCK_MODE_HEIGHT && lock_mode != TIMELOCK_MODE_TIMESTAMP {
                return Err("TX_ERR_PARSE".into());
            }
            let lock_value = parse_u64_le(&prevout.covenant_data, 33, "htlc_lock_value")?;
            let claim_key_id = &prevout.covenant_data[41..73];
            let refund_key_id = &prevout.covenant_data[73..105];
            if claim_key_id == refund_key_id {
                return Err("TX_ERR_PARSE".into());
            }

            match path {
                HtlcPath::Claim(preimage) => {
                    let preimage_hash = provider.sha3_256(&preimage)?;
                    if preimage_hash.as_slice() != expected_hash {
                        return Err("TX_ERR_SIG_INVALID".into());
                    }
                    let actual_key_id = compute_key_id(provider, &sig_item.pubkey)?;
                    if actual_key_id.as_slice() != claim_key_id {
                        return Err("TX_ERR_SIG_INVALID".into());
                    }
                }
                HtlcPath::Refund => {
                    let actual_key_id = compute_key_id(provider, &sig_item.pubkey)?;
                    if actual_key_id.as_slice() != refund_key_id {
                        return Err("TX_ERR_SIG_INVALID".into());
                    }
                    satisfy_lock(lock_mode, lock_value, chain_height, chain_timestamp)?;
                }
            }
            return verify_single_signature(provider, chain_id, tx, input_index, prev_value, sig_item);
        }
        CORE_HTLC_V2 => {
            if !htlc_v2_active {
                return Err("TX_ERR_DEPLOYMENT_INACTIVE".into());
            }
            is_script_sig_zero_len("CORE_HTLC_V2", input.script_sig.len())?;
            if witnesses.len() != 2 {
                return Err("TX_ERR_PARSE".into());
            }
            let path = parse_htlc_path_item(&witnesses[0])?;
            let sig_item = &witnesses[1];
            if sig_item.suite_id == SUITE_ID_SENTINEL {
                return Err("TX_ERR_SIG_ALG_INVALID".into());
            }
            check_witness_format(sig_item, suite_id_02_active)?;

            if prevout.covenant_data.len() != 105 {
                return Err("TX_ERR_PARSE".into());
            }
            let expected_hash = &prevout.covenant_data[0..32];
            let lock_mode = prevout.covenant_data[32];
            if lock_mode != TIMELOCK_MODE_HEIGHT && lock_mode != TIMELOCK_MODE_TIMESTAMP {
                return Err("TX_ERR_PARSE".into());
            }
            let lock_value = parse_u64_le(&prevout.covenant_data, 33, "htlc2_lock_value")?;
            let claim_key_id = &prevout.covenant_data[41..73];
            let refund_key_id = &prevout.covenant_data[73..105];
            if claim_key_id == refund_key_id {
                return Err("TX_ERR_PARSE".into());
            }

            match path {
                HtlcPath::Claim(preimage) => {
                    let preimage_hash = provider.sha3_256(&preimage)?;
                    if preimage_hash.as_slice() != expected_hash {
                        return Err("TX_ERR_SIG_INVALID".into());
                    }
                    let actual_key_id = compute_key_id(provider, &sig_item.pubkey)?;
                    if actual_key_id.as_slice() != claim_key_id {
                        return Err("TX_ERR_SIG_INVALID".into());
                    }
                }
                HtlcPath::Refund => {
                    let actual_key_id = compute_key_id(provider, &sig_item.pubkey)?;
                    if actual_key_id.as_slice() != refund_key_id {
                        return Err("TX_ERR_SIG_INVALID".into());
                    }
                    satisfy_lock(lock_mode, lock_value, chain_height, chain_timestamp)?;
                }
            }
            return verify_single_signature(provider, chain_id, tx, input_index, prev_value, sig_item);
        }
        CORE_VAULT_V1 => {
            is_script_sig_zero_len("CORE_VAULT_V1", input.script_sig.len())?;
            let covenant = parse_vault_covenant_data(&prevout.covenant_data)
                .map_err(|_| TX_ERR_VAULT_MALFORMED.to_string())?;
            if witnesses.len() != covenant.threshold as usize {
                return Err(TX_ERR_VAULT_PARAMS_INVALID.into());
            }
            let mut used_key_ids: HashSet<[u8; 32]> = HashSet::with_capacity(witnesses.len());
            for w in witnesses {
                if w.suite_id == SUITE_ID_SENTINEL {
                    return Err("TX_ERR_SIG_ALG_INVALID".into());
                }
                check_witness_format(w, suite_id_02_active)?;
                let key_id = compute_key_id(provider, &w.pubkey)?;
                if !covenant.keys.iter().any(|k| k == &key_id) {
                    return Err("TX_ERR_SIG_INVALID".into());
                }
                if !used_key_ids.insert(key_id) {
                    return Err("TX_ERR_SIG_INVALID".into());
                }
            }
            verify_threshold_signatures(provider, chain_id, tx, input_index, prev_value, witnesses)?;
            return Ok(());
        }
        CORE_MULTISIG => {
            is_script_sig_zero_len("CORE_MULTISIG", input.script_sig.len())?;
            let covenant = parse_multisig_covenant_data(&prevout.covenant_data)?;
            if witnesses.len() != covenant.threshold as usize {
                return Err("TX_ERR_PARSE".into());
            }
            let mut used_key_ids: HashSet<[u8; 32]> = HashSet::with_capacity(witnesses.len());
            for w in witnesses {
                if w.suite_id == SUITE_ID_SENTINEL {
                    return Err("TX_ERR_SIG_ALG_INVALID".into());
                }
                check_witness_format(w, suite_id_02_active)?;
                let key_id = compute_key_id(provider, &w.pubkey)?;
                if !covenant.keys.iter().any(|k| k == &key_id) {
                    return Err("TX_ERR_SIG_INVALID".into());
                }
                if !used_key_ids.insert(key_id) {
                    return Err("TX_ERR_SIG_INVALID".into());
                }
            }
            verify_threshold_signatures(provider, chain_id, tx, input_index, prev_value, witnesses)?;
            return Ok(());
        }
        CORE_ANCHOR => return Err("TX_ERR_MISSING_UTXO".into()),
        CORE_RESERVED_FUTURE => return Err("TX_ERR_COVENANT_TYPE_INVALID".into()),
        _ => return Err("TX_ERR_COVENANT_TYPE_INVALID".into()),
    };

    verify_single_signature(provider, chain_id, tx, input_index, prev_value, witness)
}

/// Enforces the VAULT tx-wide rules that span more than one input/output and so
/// cannot be checked from a single input's `validate_input_authorization` call: at
/// most one vault input, an owner-authorized non-vault input whose lock all
/// fee-sponsor inputs must share, no vault-to-vault recursion, every output
/// whitelisted by descriptor hash, and strict value conservation of the vault's
/// committed value.
fn validate_vault_tx_constraints(
    provider: &dyn CryptoProvider,
    tx: &Tx,
    utxo: &HashMap<TxOutPoint, UtxoEntry>,
) -> Result<(), String> {
    let mut vault_covenant: Option<VaultCovenant> = None;
    let mut vault_input_count = 0usize;
    let mut vault_input_value = 0u64;
    let mut non_vault_lock_ids: Vec<Option<[u8; 32]>> = Vec::new();

    for input in &tx.inputs {
        let prevout = TxOutPoint {
            txid: input.prev_txid,
            vout: input.prev_vout,
        };
        let entry = match utxo.get(&prevout) {
            Some(e) => e,
            None => return Ok(()), // surfaced as TX_ERR_MISSING_UTXO by the main input loop
        };
        if entry.output.covenant_type == CORE_VAULT_V1 {
            vault_input_count += 1;
            if vault_input_count > 1 {
                return Err(TX_ERR_VAULT_MULTI_INPUT_FORBIDDEN.into());
            }
            vault_covenant = Some(
                parse_vault_covenant_data(&entry.output.covenant_data)
                    .map_err(|_| TX_ERR_VAULT_MALFORMED.to_string())?,
            );
            vault_input_value = entry.output.value;
        } else if entry.output.covenant_type == CORE_P2PK && entry.output.covenant_data.len() == 33 {
            let mut key_id = [0u8; 32];
            key_id.copy_from_slice(&entry.output.covenant_data[1..33]);
            non_vault_lock_ids.push(Some(key_id));
        } else {
            non_vault_lock_ids.push(None);
        }
    }

    let covenant = match vault_covenant {
        Some(c) => c,
        None => return Ok(()),
    };

    let has_owner_auth = non_vault_lock_ids
        .iter()
        .any(|id| id.as_ref() == Some(&covenant.owner_lock_id));
    if !has_owner_auth {
        return Err(TX_ERR_VAULT_OWNER_AUTH_REQUIRED.into());
    }
    if non_vault_lock_ids
        .iter()
        .any(|id| id.as_ref() != Some(&covenant.owner_lock_id))
    {
        return Err(TX_ERR_VAULT_FEE_SPONSOR_FORBIDDEN.into());
    }

    for output in &tx.outputs {
        if output.covenant_type == CORE_VAULT_V1 {
            return Err(TX_ERR_VAULT_OUTPUT_NOT_WHITELISTED.into());
        }
        let descriptor_hash = output_descriptor_hash(provider, output)?;
        if !covenant.whitelist.iter().any(|w| w == &descriptor_hash) {
            return Err(TX_ERR_VAULT_OUTPUT_NOT_WHITELISTED.into());
        }
    }

    let sum_out = tx
        .outputs
        .iter()
        .try_fold(0u64, |acc, o| add_u64(acc, o.value))?;
    if sum_out < vault_input_value {
        return Err("TX_ERR_VALUE_CONSERVATION".into());
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn apply_tx(
    provider: &dyn CryptoProvider,
    chain_id: &[u8; 32],
    tx: &Tx,
    utxo: &HashMap<TxOutPoint, UtxoEntry>,
    chain_height: u64,
    chain_timestamp: u64,
    htlc_v2_active: bool,
    suite_id_02_active: bool,
) -> Result<(), String> {
    if tx.inputs.len() > MAX_TX_INPUTS || tx.outputs.len() > MAX_TX_OUTPUTS {
        return Err("TX_ERR_PARSE".to_string());
    }
    if tx.witness.witnesses.len() > MAX_WITNESS_ITEMS {
        return Err(TX_ERR_WITNESS_OVERFLOW.to_string());
    }
    if witness_bytes(&tx.witness).len() > MAX_WITNESS_BYTES_PER_TX {
        return Err(TX_ERR_WITNESS_OVERFLOW.to_string());
    }
    if is_coinbase_tx(tx, chain_height) {
        validate_coinbase_tx_inputs(tx)?;
        for out in &tx.outputs {
            validate_output_covenant_constraints(out)?;
        }
        return Ok(());
    }

    if tx.tx_nonce == TX_NONCE_ZERO {
        return Err(TX_ERR_TX_NONCE_INVALID.to_string());
    }
    for out in &tx.outputs {
        validate_output_covenant_constraints(out)?;
    }
    validate_vault_tx_constraints(provider, tx, utxo)?;

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    let mut total_inputs = 0u64;
    let mut total_outputs = 0u64;
    let mut witness_cursor = 0usize;

    for (input_index, input) in tx.inputs.iter().enumerate() {
        if input.sequence == TX_COINBASE_PREVOUT_VOUT || input.sequence > TX_MAX_SEQUENCE {
            return Err(TX_ERR_SEQUENCE_INVALID.to_string());
        }
        let prevout = TxOutPoint {
            txid: input.prev_txid,
            vout: input.prev_vout,
        };
        if is_zero_outpoint(&prevout.txid, prevout.vout) {
            return Err("TX_ERR_PARSE".to_string());
        }
        if !seen.insert(prevout.clone()) {
            return Err("TX_ERR_PARSE".to_string());
        }

        let prev = utxo
            .get(&prevout)
            .ok_or_else(|| "TX_ERR_MISSING_UTXO".to_string())?;

        let needed = witness_items_needed(prev.output.covenant_type, &prev.output.covenant_data)?;
        if witness_cursor + needed > tx.witness.witnesses.len() {
            return Err("TX_ERR_PARSE".to_string());
        }
        let witnesses = &tx.witness.witnesses[witness_cursor..witness_cursor + needed];
        witness_cursor += needed;

        validate_input_authorization(
            provider,
            chain_id,
            tx,
            input_index,
            prev.output.value,
            &prev.output,
            prev.creation_height,
            chain_height,
            chain_timestamp,
            htlc_v2_active,
            suite_id_02_active,
            witnesses,
        )?;

        if prev.created_by_coinbase && chain_height < prev.creation_height + COINBASE_MATURITY {
            return Err(TX_ERR_COINBASE_IMMATURE.to_string());
        }

        total_inputs = add_u64(total_inputs, prev.output.value)?;
    }

    if witness_cursor != tx.witness.witnesses.len() {
        return Err("TX_ERR_PARSE".to_string());
    }

    for output in &tx.outputs {
        total_outputs = add_u64(total_outputs, output.value)?;
    }

    if total_outputs > total_inputs {
        return Err("TX_ERR_VALUE_CONSERVATION".into());
    }
    Ok(())
}
