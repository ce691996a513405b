//! 협력자 trait -- 수집 파이프라인의 확장 지점 정의
//!
//! 수집 파이프라인은 레코드를 만들어 두 협력자에게 넘깁니다.
//! - [`RecordStore`]: 순서 보존, 추가 전용 저장소
//! - [`RecordPublisher`]: 현재 접속한 구독자에게 보내는 fire-and-forget 브로드캐스트

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::AsterixError;
use crate::types::IngestedRecord;

/// dyn-compatible trait에서 사용하는 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 레코드 저장소 trait
///
/// 중복 제거 없이 추가 순서를 보존합니다.
/// 레코드는 `clear()`로만 삭제됩니다.
pub trait RecordStore: Send + Sync {
    /// 레코드를 끝에 추가합니다.
    fn append(&self, record: Arc<IngestedRecord>) -> Result<(), AsterixError>;

    /// 저장된 모든 레코드를 추가 순서대로 반환합니다.
    fn list(&self) -> Vec<Arc<IngestedRecord>>;

    /// ID로 레코드를 조회합니다.
    fn get(&self, id: &Uuid) -> Option<Arc<IngestedRecord>>;

    /// 모든 레코드를 삭제합니다.
    fn clear(&self);

    /// 저장된 레코드 수
    fn count(&self) -> usize;
}

/// 레코드 브로드캐스트 trait
///
/// 전달 보장이 없고, 느린 구독자가 수집 경로를 막아서는 안 됩니다.
pub trait RecordPublisher: Send + Sync {
    /// 현재 구독자 모두에게 레코드를 보냅니다. 받은 구독자 수를 반환합니다.
    fn publish(&self, record: Arc<IngestedRecord>) -> usize;
}
