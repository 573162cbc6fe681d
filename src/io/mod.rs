pub mod config_io;
pub mod local_store;
pub mod lock;
pub mod recovery;
pub mod refresh;
pub mod shared_store;
pub mod store;

pub use local_store::LocalStore;
pub use refresh::{MarkerRefresh, NoRefresh, RefreshHook};
pub use shared_store::{SharedStore, SharedTxn};
pub use store::{KvStore, StoreError, keys};
