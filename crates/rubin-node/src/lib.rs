pub mod blockstore;
pub mod chainstate;
pub mod sync;

pub use blockstore::{block_store_path, BlockStore, BLOCK_STORE_DIR_NAME};
pub use chainstate::{
    chain_state_path, load_chain_state, ChainState, ChainStateConnectSummary, CHAIN_STATE_FILE_NAME,
};
pub use sync::{
    default_sync_config, HeaderRequest, SyncConfig, SyncEngine, DEFAULT_IBD_LAG_SECONDS,
};
