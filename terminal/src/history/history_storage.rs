use crate::{
    listener::SynchronizationListener,
    models::{Deal, Order},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Store of history orders and deals. It listens to the same synchronization events
/// as the terminal state and outlives reconnects; its watermarks tell the server where
/// to resume history synchronization.
#[async_trait]
pub trait HistoryStorage: SynchronizationListener {
    /// Latest `done_time` among stored history orders, or the Unix epoch.
    async fn last_history_order_time(&self) -> DateTime<Utc>;

    /// Latest `time` among stored deals, or the Unix epoch.
    async fn last_deal_time(&self) -> DateTime<Utc>;

    fn order_synchronization_finished(&self) -> bool;

    fn deal_synchronization_finished(&self) -> bool;

    /// The same object as a listener, for registration with the client.
    fn as_listener(self: Arc<Self>) -> Arc<dyn SynchronizationListener>;
}

/// Element of a history sequence ordered by (time, id).
pub trait HistoryRecord {
    fn sort_time(&self) -> DateTime<Utc>;

    fn record_id(&self) -> &str;

    /// Equal on time, id and kind, i.e. a re-delivery of the same record.
    fn same_record(&self, other: &Self) -> bool;
}

impl HistoryRecord for Order {
    fn sort_time(&self) -> DateTime<Utc> {
        self.done_time.unwrap_or_else(time::epoch)
    }

    fn record_id(&self) -> &str {
        &self.id
    }

    fn same_record(&self, other: &Self) -> bool {
        self.sort_time() == other.sort_time()
            && self.id == other.id
            && self.order_type == other.order_type
    }
}

impl HistoryRecord for Deal {
    fn sort_time(&self) -> DateTime<Utc> {
        self.time.unwrap_or_else(time::epoch)
    }

    fn record_id(&self) -> &str {
        &self.id
    }

    fn same_record(&self, other: &Self) -> bool {
        self.sort_time() == other.sort_time()
            && self.id == other.id
            && self.entry_type == other.entry_type
    }
}

/// Inserts `record` right after the last element whose (time, id) is not greater, or
/// replaces an element holding the same record.
pub fn merge_insert<T: HistoryRecord>(records: &mut Vec<T>, record: T) {
    let time = record.sort_time();
    let index = records.partition_point(|r| (r.sort_time(), r.record_id()) <= (time, record.record_id()));

    // elements with an equal key sit right before the insertion point
    let mut i = index;
    while i > 0 {
        let candidate = &records[i - 1];
        if candidate.sort_time() != time || candidate.record_id() != record.record_id() {
            break;
        }
        if candidate.same_record(&record) {
            records[i - 1] = record;
            return;
        }
        i -= 1;
    }
    records.insert(index, record);
}
