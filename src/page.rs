use serde::{Deserialize, Serialize};

/// Logical identifier of a fixed-size page in the data file.
///
/// Ids are minted monotonically per buffer pool instance and never reused.
/// In a sharded pool of N instances, instance `k` owns exactly the ids
/// congruent to `k` modulo N.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
