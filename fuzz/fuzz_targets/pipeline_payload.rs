#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;

use asterix_core::pipeline::RecordStore;
use asterix_receiver::{BroadcastHub, IngestionPipeline, MemoryRecordStore};

fuzz_target!(|data: &[u8]| {
    let store = Arc::new(MemoryRecordStore::new());
    let pipeline = IngestionPipeline::new(store.clone(), Arc::new(BroadcastHub::new(1)));

    if let Ok(record) = pipeline.process(data) {
        // 정규 직렬화 형태는 항상 다시 파싱 가능해야 함
        let reparsed: serde_json::Value = serde_json::from_str(&record.json_data)
            .expect("json_data must be valid JSON");
        assert_eq!(reparsed, record.data);
    }
    assert_eq!(store.count(), 1);
});
