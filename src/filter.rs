//! Category filters deciding which fetched records are kept

use crate::DetailRecord;

/// Queue id of ranked solo/duo games
pub const RANKED_SOLO_QUEUE_ID: u32 = 420;

/// Decides whether a fetched record belongs to the wanted category.
pub trait CategoryFilter: Send + Sync {
    /// `true` if the record should be appended to the sink
    fn is_wanted(&self, record: &DetailRecord) -> bool;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Keeps records whose queue id is in an allow-list.
///
/// Records without a queue id are rejected.
#[derive(Debug, Clone)]
pub struct QueueFilter {
    queues: Vec<u32>,
}

impl QueueFilter {
    /// Filter accepting the given queues
    pub fn new(queues: impl IntoIterator<Item = u32>) -> Self {
        Self {
            queues: queues.into_iter().collect(),
        }
    }

    /// Ranked solo/duo only
    pub fn ranked_solo() -> Self {
        Self::new([RANKED_SOLO_QUEUE_ID])
    }

    /// Accepted queue ids
    pub fn queues(&self) -> &[u32] {
        &self.queues
    }
}

impl Default for QueueFilter {
    fn default() -> Self {
        Self::ranked_solo()
    }
}

impl CategoryFilter for QueueFilter {
    fn is_wanted(&self, record: &DetailRecord) -> bool {
        record
            .queue_id
            .map(|q| self.queues.contains(&q))
            .unwrap_or(false)
    }

    fn describe(&self) -> String {
        let queues: Vec<String> = self.queues.iter().map(u32::to_string).collect();
        format!("queue in [{}]", queues.join(", "))
    }
}

/// Keeps everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CategoryFilter for AcceptAll {
    fn is_wanted(&self, _record: &DetailRecord) -> bool {
        true
    }

    fn describe(&self) -> String {
        "all records".to_string()
    }
}
