pub mod classify;
pub mod clock;
pub mod heap;
pub mod net;
pub mod packet;
pub mod pipeline;
pub mod relay;
pub mod stats;

pub use classify::{Endpoints, Ingress};
pub use heap::MinHeap;
pub use packet::{DeferredPacket, Direction, DirectionMask, MAX_PKT_LEN, MIN_PKT_LEN, TRUNCATED_BIT};
pub use pipeline::{apply_link, LinkProfile, Verdict};
pub use relay::{Relay, RelayConfig};
pub use stats::RelayStats;
