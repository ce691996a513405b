//! 수집 파이프라인 -- 원시 페이로드를 레코드로 정규화
//!
//! [`IngestionPipeline`]은 소스가 전달한 페이로드 하나마다:
//! 1. UTF-8 JSON 디코딩을 시도하고, 객체면 `metadata` 필드를 보장합니다.
//! 2. 디코딩에 실패하면 base64 바이너리 레코드로 감쌉니다.
//! 3. 새 ID와 현재 시각으로 [`IngestedRecord`]를 만들어 저장 후 브로드캐스트합니다.
//!
//! 한 레코드의 실패는 로그와 메트릭으로만 남고 수신 루프에 전파되지 않습니다.

use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde_json::{Map, Value, json};

use asterix_core::error::{AsterixError, PipelineError};
use asterix_core::metrics as m;
use asterix_core::pipeline::{RecordPublisher, RecordStore};
use asterix_core::types::IngestedRecord;

use crate::source::PayloadCallback;

/// 메타데이터 필드 이름
pub const METADATA_FIELD: &str = "metadata";

/// 수집 파이프라인
#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn RecordPublisher>,
}

impl IngestionPipeline {
    /// 저장소와 발행자를 연결하여 파이프라인을 생성합니다.
    pub fn new(store: Arc<dyn RecordStore>, publisher: Arc<dyn RecordPublisher>) -> Self {
        Self { store, publisher }
    }

    /// 연결된 저장소
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// 페이로드 하나를 처리하여 저장, 발행된 레코드를 반환합니다.
    pub fn process(&self, payload: &[u8]) -> Result<Arc<IngestedRecord>, AsterixError> {
        let started = Instant::now();
        let (data, metadata, format) = normalize(payload);

        let json_data =
            serde_json::to_string(&data).map_err(|e| PipelineError::Encode(e.to_string()))?;
        let record = Arc::new(IngestedRecord::new(data, json_data, metadata));

        self.store.append(Arc::clone(&record))?;
        let delivered = self.publisher.publish(Arc::clone(&record));

        metrics::counter!(m::PIPELINE_RECORDS_INGESTED_TOTAL, m::LABEL_FORMAT => format)
            .increment(1);
        metrics::histogram!(m::PIPELINE_PROCESSING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        tracing::trace!(id = %record.id, format, delivered, "record ingested");

        Ok(record)
    }

    /// 실패를 삼키는 처리. 수신 루프에서 호출됩니다.
    pub fn ingest(&self, payload: &[u8]) {
        if let Err(e) = self.process(payload) {
            metrics::counter!(m::PIPELINE_FAILURES_TOTAL).increment(1);
            tracing::warn!(error = %e, len = payload.len(), "dropping record");
        }
    }

    /// 소스에 등록할 페이로드 콜백을 만듭니다.
    pub fn callback(&self) -> PayloadCallback {
        let pipeline = self.clone();
        Arc::new(move |payload: Bytes| pipeline.ingest(&payload))
    }
}

/// 페이로드를 (구조화 값, 메타데이터 요약, 형식 레이블)로 변환합니다.
fn normalize(payload: &[u8]) -> (Value, String, &'static str) {
    let decoded = std::str::from_utf8(payload)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(text).ok());

    match decoded {
        Some(Value::Object(mut object)) => {
            let metadata = match find_key(&object, METADATA_FIELD) {
                Some(key) => display_value(&object[key]),
                None => {
                    let summary = summarize(&object);
                    object.insert(METADATA_FIELD.to_owned(), Value::String(summary.clone()));
                    summary
                }
            };
            (Value::Object(object), metadata, "json")
        }
        Some(Value::Array(items)) => {
            let metadata = format!("JSON array ({} items)", items.len());
            (Value::Array(items), metadata, "json")
        }
        Some(other) => (other, "JSON value".to_owned(), "json"),
        None => {
            let metadata = format!("Binary data packet ({} bytes)", payload.len());
            let data = json!({
                "type": "binary",
                "length": payload.len(),
                "data": BASE64.encode(payload),
                METADATA_FIELD: metadata.clone(),
            });
            (data, metadata, "binary")
        }
    }
}

/// 대소문자 구분 없이 키를 찾습니다.
fn find_key<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    object
        .keys()
        .find(|k| k.eq_ignore_ascii_case(name))
        .map(String::as_str)
}

fn summarize(object: &Map<String, Value>) -> String {
    let mut parts = Vec::with_capacity(3);
    if let Some(key) = find_key(object, "type") {
        parts.push(format!("Type: {}", display_value(&object[key])));
    }
    if let Some(key) = find_key(object, "message") {
        parts.push(format!("Message: {}", display_value(&object[key])));
    }
    parts.push(format!("Properties: {}", object.len()));
    parts.join(", ")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
