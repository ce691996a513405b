//! 인메모리 레코드 저장소
//!
//! [`MemoryRecordStore`]는 수집된 레코드를 추가 순서대로 보관합니다.
//!
//! # 용량 정책
//! `max_records`가 0이면 무제한입니다. 0보다 크면 가득 찼을 때
//! 가장 오래된 레코드를 드롭하고 새 레코드를 추가합니다.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use asterix_core::error::AsterixError;
use asterix_core::metrics as m;
use asterix_core::pipeline::RecordStore;
use asterix_core::types::IngestedRecord;

/// 인메모리 레코드 저장소
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<VecDeque<Arc<IngestedRecord>>>,
    /// 최대 보관 수 (0 = 무제한)
    max_records: usize,
}

impl MemoryRecordStore {
    /// 무제한 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 최대 보관 수를 지정하여 생성합니다.
    pub fn with_max_records(max_records: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            max_records,
        }
    }

    /// 최대 보관 수 (0 = 무제한)
    pub fn max_records(&self) -> usize {
        self.max_records
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<Arc<IngestedRecord>>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<Arc<IngestedRecord>>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl RecordStore for MemoryRecordStore {
    fn append(&self, record: Arc<IngestedRecord>) -> Result<(), AsterixError> {
        let mut records = self.write();
        if self.max_records > 0 && records.len() >= self.max_records {
            records.pop_front();
            tracing::debug!(
                capacity = self.max_records,
                "record store full, dropped oldest record"
            );
        }
        records.push_back(record);
        metrics::gauge!(m::PIPELINE_STORED_RECORDS).set(records.len() as f64);
        Ok(())
    }

    fn list(&self) -> Vec<Arc<IngestedRecord>> {
        self.read().iter().cloned().collect()
    }

    fn get(&self, id: &Uuid) -> Option<Arc<IngestedRecord>> {
        self.read().iter().find(|r| &r.id == id).cloned()
    }

    fn clear(&self) {
        self.write().clear();
        metrics::gauge!(m::PIPELINE_STORED_RECORDS).set(0.0);
    }

    fn count(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(n: u64) -> Arc<IngestedRecord> {
        let data = json!({ "n": n });
        Arc::new(IngestedRecord::new(data.clone(), data.to_string(), format!("#{n}")))
    }

    #[test]
    fn preserves_append_order() {
        let store = MemoryRecordStore::new();
        for n in 0..5 {
            store.append(record(n)).unwrap();
        }
        let listed: Vec<_> = store.list().iter().map(|r| r.data["n"].as_u64().unwrap()).collect();
        assert_eq!(listed, vec![0, 1, 2, 3, 4]);
        assert_eq!(store.count(), 5);
    }

    #[test]
    fn does_not_deduplicate() {
        let store = MemoryRecordStore::new();
        let r = record(1);
        store.append(Arc::clone(&r)).unwrap();
        store.append(r).unwrap();
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn get_by_id() {
        let store = MemoryRecordStore::new();
        let r = record(7);
        store.append(Arc::clone(&r)).unwrap();
        assert_eq!(store.get(&r.id).unwrap().metadata, "#7");
        assert!(store.get(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn clear_removes_everything() {
        let store = MemoryRecordStore::new();
        store.append(record(1)).unwrap();
        store.clear();
        assert_eq!(store.count(), 0);
        assert!(store.list().is_empty());
    }

    #[test]
    fn bounded_store_drops_oldest() {
        let store = MemoryRecordStore::with_max_records(3);
        for n in 0..5 {
            store.append(record(n)).unwrap();
        }
        let listed: Vec<_> = store.list().iter().map(|r| r.data["n"].as_u64().unwrap()).collect();
        assert_eq!(listed, vec![2, 3, 4]);
    }
}
