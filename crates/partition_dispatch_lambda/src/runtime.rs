pub use partition_dispatch_core::{aggregate, batching, contract, keys, retry};
