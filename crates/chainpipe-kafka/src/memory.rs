//! In-process producer that holds records until flushed. Used in tests and
//! dry runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::record::{DeliveryCallback, KafkaError, Record, RecordProducer};

#[derive(Default)]
struct State {
    pending: Vec<(Record, DeliveryCallback)>,
    delivered: Vec<Record>,
    failed: Vec<Record>,
}

/// [`RecordProducer`] that keeps everything in memory.
///
/// Records stay pending until [`RecordProducer::flush`], which "delivers"
/// them all and fires their callbacks.
#[derive(Default)]
pub struct MemoryProducer {
    state: Mutex<State>,
    fail_deliveries: AtomicBool,
    closed: AtomicBool,
}

impl MemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delivery report a broker error.
    pub fn fail_deliveries(&self, fail: bool) {
        self.fail_deliveries.store(fail, Ordering::SeqCst);
    }

    pub fn pending(&self) -> Vec<Record> {
        let state = self.state.lock().unwrap();
        state.pending.iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn delivered(&self) -> Vec<Record> {
        self.state.lock().unwrap().delivered.clone()
    }

    pub fn failed(&self) -> Vec<Record> {
        self.state.lock().unwrap().failed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordProducer for MemoryProducer {
    fn produce(&self, record: Record, on_delivery: DeliveryCallback) -> Result<(), KafkaError> {
        if self.is_closed() {
            return Err(KafkaError::Produce {
                topic: record.topic,
                reason: "producer is closed".into(),
            });
        }
        self.state.lock().unwrap().pending.push((record, on_delivery));
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), KafkaError> {
        let fail = self.fail_deliveries.load(Ordering::SeqCst);
        let batch = std::mem::take(&mut self.state.lock().unwrap().pending);

        // Callbacks run outside the lock.
        let mut outcomes = Vec::with_capacity(batch.len());
        for (record, callback) in batch {
            if fail {
                callback(Err(format!("simulated broker error for {}", record.topic)));
            } else {
                callback(Ok(()));
            }
            outcomes.push(record);
        }

        let mut state = self.state.lock().unwrap();
        if fail {
            state.failed.extend(outcomes);
        } else {
            state.delivered.extend(outcomes);
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn record(key: &str) -> Record {
        Record {
            topic: "t".into(),
            key: key.into(),
            value: vec![],
            partition: None,
        }
    }

    #[tokio::test]
    async fn flush_fires_each_callback_once() {
        let producer = MemoryProducer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for key in ["1", "2"] {
            let calls = calls.clone();
            producer
                .produce(
                    record(key),
                    Box::new(move |outcome| {
                        assert!(outcome.is_ok());
                        calls.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap();
        }
        assert_eq!(producer.pending().len(), 2);

        producer.flush(Duration::from_secs(1)).await.unwrap();
        producer.flush(Duration::from_secs(1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(producer.delivered().len(), 2);
    }

    #[test]
    fn closed_producer_rejects_records() {
        let producer = MemoryProducer::new();
        producer.close();
        let err = producer.produce(record("1"), Box::new(|_| {})).unwrap_err();
        assert!(matches!(err, KafkaError::Produce { .. }));
    }
}
