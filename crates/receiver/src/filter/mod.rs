//! 패킷 필터 -- 캡처 파일 모드에서 패킷을 선별합니다.
//!
//! # 구성
//! - [`parser`]: 필터 표현식(`udp.port == 5000 and not tcp`) 파서
//! - [`eval`]: 디코딩된 패킷에 대한 표현식 평가
//! - [`PacketFilter`]: 필터 문자열 분류 (캡처 필터 vs 표현식)
//!
//! # 분류 규칙
//! 점으로 이어진 필드 참조(`word.word`)가 있으면 표현식 문법으로,
//! 없으면 캡처 필터 문법으로 취급합니다. 캡처 필터 컴파일에 실패하면
//! 같은 문자열을 표현식으로 다시 해석합니다.

pub mod eval;
pub mod parser;

pub use eval::{FieldValue, evaluate, resolve_field};
pub use parser::{CompareOp, FilterExpr};

use tracing::{debug, warn};

use crate::capture_filter::CaptureFilter;
use crate::decode::PacketView;
use crate::error::ReceiverError;

/// 컴파일된 필터 표현식
///
/// 파싱에 실패한 표현식은 모든 패킷에 대해 거짓으로 평가됩니다.
/// 필터 오류가 캡처 루프를 중단시키지 않도록 하기 위함입니다.
#[derive(Debug, Clone)]
pub struct FilterExpression {
    source: String,
    compiled: Compiled,
}

#[derive(Debug, Clone)]
enum Compiled {
    MatchAll,
    Expr(FilterExpr),
    Invalid(String),
}

impl FilterExpression {
    /// 표현식을 엄격하게 파싱합니다. 빈 문자열은 모든 패킷과 일치합니다.
    pub fn parse(source: &str) -> Result<Self, ReceiverError> {
        let trimmed = source.trim();
        let compiled = if trimmed.is_empty() {
            Compiled::MatchAll
        } else {
            Compiled::Expr(parser::parse(trimmed)?)
        };
        Ok(Self {
            source: trimmed.to_owned(),
            compiled,
        })
    }

    /// 표현식을 파싱하되, 실패하면 경고를 남기고 아무것도 일치하지 않는 필터를 만듭니다.
    pub fn lenient(source: &str) -> Self {
        Self::parse(source).unwrap_or_else(|e| {
            warn!(filter = source, error = %e, "invalid filter expression, no packet will match");
            Self {
                source: source.trim().to_owned(),
                compiled: Compiled::Invalid(e.to_string()),
            }
        })
    }

    /// 원본 표현식 문자열을 반환합니다.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 파싱 실패 사유를 반환합니다.
    pub fn error(&self) -> Option<&str> {
        match &self.compiled {
            Compiled::Invalid(reason) => Some(reason),
            _ => None,
        }
    }

    /// 패킷이 표현식과 일치하는지 평가합니다.
    pub fn matches(&self, packet: &PacketView<'_>) -> bool {
        match &self.compiled {
            Compiled::MatchAll => true,
            Compiled::Expr(expr) => evaluate(expr, packet),
            Compiled::Invalid(_) => false,
        }
    }
}

/// 캡처 소스에 적용되는 필터
#[derive(Debug, Clone)]
pub enum PacketFilter {
    /// 필터 없음
    None,
    /// 읽기 경로에 컴파일된 캡처 필터
    Capture(CaptureFilter),
    /// 패킷별로 평가하는 필터 표현식
    Expression(FilterExpression),
}

impl PacketFilter {
    /// 필터 문자열을 분류하고 컴파일합니다.
    pub fn from_filter(filter: Option<&str>) -> Self {
        let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
            return Self::None;
        };

        if looks_like_expression(filter) {
            debug!(filter, "using filter expression syntax");
            return Self::Expression(FilterExpression::lenient(filter));
        }

        match CaptureFilter::compile(filter) {
            Ok(compiled) => {
                debug!(filter, "compiled capture filter");
                Self::Capture(compiled)
            }
            Err(e) => {
                warn!(
                    filter,
                    error = %e,
                    "capture filter failed to compile, falling back to filter expression"
                );
                Self::Expression(FilterExpression::lenient(filter))
            }
        }
    }

    /// 필터 종류 이름 (none, capture, expression)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Capture(_) => "capture",
            Self::Expression(_) => "expression",
        }
    }

    /// 패킷이 필터를 통과하는지 확인합니다.
    pub fn matches(&self, packet: &PacketView<'_>) -> bool {
        match self {
            Self::None => true,
            Self::Capture(f) => f.matches(packet),
            Self::Expression(f) => f.matches(packet),
        }
    }
}

/// 점으로 이어진 단어(`\w+\.\w+`)가 있으면 표현식 문법으로 판단합니다.
///
/// IP 리터럴(`host 10.0.0.1`)도 이 규칙에 걸려 표현식으로 분류됩니다.
pub fn looks_like_expression(filter: &str) -> bool {
    let bytes = filter.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    (1..bytes.len().saturating_sub(1))
        .any(|i| bytes[i] == b'.' && is_word(bytes[i - 1]) && is_word(bytes[i + 1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LINKTYPE_ETHERNET;
    use crate::decode::test_frames::*;

    #[test]
    fn classification_heuristic() {
        assert!(looks_like_expression("udp.port == 5000"));
        assert!(looks_like_expression("tcp.flags.syn"));
        assert!(looks_like_expression("host 10.0.0.1"));
        assert!(!looks_like_expression("udp and port 5000"));
        assert!(!looks_like_expression("udp"));
        assert!(!looks_like_expression("."));
        assert!(!looks_like_expression("a. b"));
    }

    #[test]
    fn empty_filter_is_none() {
        assert_eq!(PacketFilter::from_filter(None).kind(), "none");
        assert_eq!(PacketFilter::from_filter(Some("  ")).kind(), "none");
    }

    #[test]
    fn capture_syntax_compiles_to_capture_filter() {
        assert_eq!(
            PacketFilter::from_filter(Some("udp and port 8600")).kind(),
            "capture"
        );
    }

    #[test]
    fn dotted_filter_uses_expression() {
        assert_eq!(
            PacketFilter::from_filter(Some("udp.port == 8600")).kind(),
            "expression"
        );
    }

    #[test]
    fn failed_capture_filter_falls_back_to_expression() {
        // 캡처 필터로는 컴파일되지 않지만 표현식으로는 유효
        let filter = PacketFilter::from_filter(Some("tcp && !icmp || udp != 0"));
        assert_eq!(filter.kind(), "expression");
    }

    #[test]
    fn ip_literal_capture_filter_is_evaluated_as_expression() {
        // 분류 규칙상 표현식으로 해석되고, 파싱에 실패하므로 아무것도 일치하지 않음
        let filter = PacketFilter::from_filter(Some("host 10.0.0.1"));
        assert_eq!(filter.kind(), "expression");
        let frame = udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"x");
        assert!(!filter.matches(&PacketView::decode(LINKTYPE_ETHERNET, &frame)));
    }

    #[test]
    fn deeply_nested_filter_falls_back_without_overflow() {
        let filter = PacketFilter::from_filter(Some(&format!("{}udp", "!".repeat(20_000))));
        assert_eq!(filter.kind(), "expression");
        let frame = udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"x");
        assert!(!filter.matches(&PacketView::decode(LINKTYPE_ETHERNET, &frame)));
    }

    #[test]
    fn ip_proto_keyword_filter() {
        let filter = PacketFilter::from_filter(Some("ip.proto == udp"));
        assert_eq!(filter.kind(), "expression");
        let datagram = udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"x");
        let segment = tcp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, TCP_ACK, b"x");
        assert!(filter.matches(&PacketView::decode(LINKTYPE_ETHERNET, &datagram)));
        assert!(!filter.matches(&PacketView::decode(LINKTYPE_ETHERNET, &segment)));
    }

    #[test]
    fn invalid_expression_matches_nothing() {
        let expr = FilterExpression::lenient("udp.port ==");
        assert!(expr.error().is_some());
        let frame = udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"x");
        assert!(!expr.matches(&PacketView::decode(LINKTYPE_ETHERNET, &frame)));
    }

    #[test]
    fn empty_expression_matches_everything() {
        let expr = FilterExpression::parse("").unwrap();
        let frame = udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"x");
        assert!(expr.matches(&PacketView::decode(LINKTYPE_ETHERNET, &frame)));
    }
}
