//! 레코드 브로드캐스트 허브
//!
//! `tokio::sync::broadcast` 채널 위에 [`RecordPublisher`]를 구현합니다.
//! 느린 구독자는 `Lagged`로 레코드를 잃을 뿐 수집 경로를 막지 않습니다.

use std::sync::Arc;

use tokio::sync::broadcast;

use asterix_core::metrics as m;
use asterix_core::pipeline::RecordPublisher;
use asterix_core::types::IngestedRecord;

/// 기본 채널 용량
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// 레코드 브로드캐스트 허브
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<Arc<IngestedRecord>>,
}

impl BroadcastHub {
    /// 지정한 용량으로 허브를 생성합니다. 0은 1로 보정됩니다.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 새 구독자를 등록합니다. 등록 이후 발행된 레코드만 받습니다.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<IngestedRecord>> {
        self.sender.subscribe()
    }

    /// 현재 구독자 수
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl RecordPublisher for BroadcastHub {
    fn publish(&self, record: Arc<IngestedRecord>) -> usize {
        // 구독자가 없으면 Err: 전달 보장이 없으므로 0으로 취급
        let delivered = self.sender.send(record).unwrap_or(0);
        if delivered > 0 {
            metrics::counter!(m::PIPELINE_BROADCAST_DELIVERIES_TOTAL).increment(delivered as u64);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Arc<IngestedRecord> {
        Arc::new(IngestedRecord::new(json!({}), "{}".to_owned(), "test"))
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let hub = BroadcastHub::default();
        assert_eq!(hub.publish(record()), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives_record() {
        let hub = BroadcastHub::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        let r = record();
        assert_eq!(hub.publish(Arc::clone(&r)), 2);
        assert_eq!(a.recv().await.unwrap().id, r.id);
        assert_eq!(b.recv().await.unwrap().id, r.id);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_without_blocking() {
        let hub = BroadcastHub::new(2);
        let mut rx = hub.subscribe();
        for _ in 0..5 {
            hub.publish(record());
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
    }
}
