//! 필터 표현식 평가기
//!
//! 필드 이름을 [`PacketView`]의 값으로 해석한 뒤 비교합니다.
//! 해석할 수 없는 필드(알 수 없는 이름, 해당 프로토콜이 아닌 패킷)는
//! "없음"으로 취급되어 비교와 존재 검사 모두 거짓이 됩니다.

use std::net::IpAddr;

use crate::decode::{PacketView, Transport};

use super::parser::{CompareOp, FilterExpr};

/// 숫자 동등 비교 허용 오차
pub const NUMERIC_TOLERANCE: f64 = 1e-4;

/// 패킷에서 해석된 필드 값
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// 숫자 필드 (포트, 길이, TTL 등)
    Number(f64),
    /// 불리언 필드 (프로토콜 존재, TCP 플래그)
    Bool(bool),
    /// 단일 주소 (ip.src, ip.dst)
    Addr(IpAddr),
    /// 출발지/목적지 쌍 (ip.addr)
    AddrPair(IpAddr, IpAddr),
    /// IP 프로토콜 번호. 번호나 소문자 이름(`udp`, `tcp` ...)과 비교됩니다.
    Protocol(u8),
}

/// 표현식을 패킷에 대해 평가합니다.
pub fn evaluate(expr: &FilterExpr, packet: &PacketView<'_>) -> bool {
    match expr {
        FilterExpr::Not(inner) => !evaluate(inner, packet),
        FilterExpr::And(left, right) => evaluate(left, packet) && evaluate(right, packet),
        FilterExpr::Or(left, right) => evaluate(left, packet) || evaluate(right, packet),
        FilterExpr::Presence(field) => match resolve_field(field, packet) {
            Some(FieldValue::Bool(b)) => b,
            Some(_) => true,
            None => false,
        },
        FilterExpr::Comparison { field, op, value } => match resolve_field(field, packet) {
            Some(actual) => compare(actual, *op, value),
            None => false,
        },
    }
}

/// 필드 이름을 패킷 값으로 해석합니다.
pub fn resolve_field(field: &str, packet: &PacketView<'_>) -> Option<FieldValue> {
    let num = |n: u16| Some(FieldValue::Number(f64::from(n)));

    match field {
        // 프로토콜 이름은 존재 여부로 해석
        "udp" => Some(FieldValue::Bool(packet.is_udp())),
        "tcp" => Some(FieldValue::Bool(packet.is_tcp())),
        "icmp" => Some(FieldValue::Bool(packet.is_icmp())),
        "ip" => Some(FieldValue::Bool(packet.ip.is_some())),
        "ipv6" => Some(FieldValue::Bool(packet.ip.is_some_and(|ip| ip.version == 6))),

        "frame.len" => Some(FieldValue::Number(packet.frame.len() as f64)),

        "ip.src" => packet.ip.map(|ip| FieldValue::Addr(ip.src)),
        "ip.dst" => packet.ip.map(|ip| FieldValue::Addr(ip.dst)),
        "ip.addr" => packet.ip.map(|ip| FieldValue::AddrPair(ip.src, ip.dst)),
        "ip.len" | "ip.length" => packet.ip.and_then(|ip| num(ip.total_len)),
        "ip.ttl" => packet.ip.and_then(|ip| num(u16::from(ip.ttl))),
        "ip.proto" | "ip.protocol" => packet.ip.map(|ip| FieldValue::Protocol(ip.protocol)),
        "ip.version" => packet.ip.and_then(|ip| num(u16::from(ip.version))),

        _ => resolve_transport_field(field, packet.transport.as_ref()?),
    }
}

fn resolve_transport_field(field: &str, transport: &Transport<'_>) -> Option<FieldValue> {
    let num = |n: u16| Some(FieldValue::Number(f64::from(n)));

    match (field, transport) {
        ("udp.port" | "udp.dstport", Transport::Udp { dst_port, .. }) => num(*dst_port),
        ("udp.srcport", Transport::Udp { src_port, .. }) => num(*src_port),
        ("udp.length" | "udp.len", Transport::Udp { length, .. }) => num(*length),

        ("tcp.port" | "tcp.dstport", Transport::Tcp { dst_port, .. }) => num(*dst_port),
        ("tcp.srcport", Transport::Tcp { src_port, .. }) => num(*src_port),
        ("tcp.len", Transport::Tcp { header_len, .. }) => num(*header_len),
        ("tcp.flags.syn", Transport::Tcp { flags, .. }) => Some(FieldValue::Bool(flags.syn)),
        ("tcp.flags.ack", Transport::Tcp { flags, .. }) => Some(FieldValue::Bool(flags.ack)),
        ("tcp.flags.fin", Transport::Tcp { flags, .. }) => Some(FieldValue::Bool(flags.fin)),
        ("tcp.flags.rst", Transport::Tcp { flags, .. }) => Some(FieldValue::Bool(flags.rst)),
        ("tcp.flags.psh", Transport::Tcp { flags, .. }) => Some(FieldValue::Bool(flags.psh)),
        ("tcp.flags.urg", Transport::Tcp { flags, .. }) => Some(FieldValue::Bool(flags.urg)),

        ("icmp.type", Transport::Icmp { icmp_type, .. }) => num(u16::from(*icmp_type)),
        ("icmp.code", Transport::Icmp { code, .. }) => num(u16::from(*code)),

        _ => None,
    }
}

fn compare(actual: FieldValue, op: CompareOp, literal: &str) -> bool {
    match actual {
        FieldValue::Number(n) => compare_number_or_text(n, op, literal),
        FieldValue::Bool(b) => {
            let n = if b { 1.0 } else { 0.0 };
            match parse_bool_literal(literal) {
                Some(expected) => compare_numbers(n, op, if expected { 1.0 } else { 0.0 }),
                None => compare_number_or_text(n, op, literal),
            }
        }
        FieldValue::Addr(addr) => match op {
            CompareOp::Eq => addr_matches(addr, literal),
            CompareOp::Ne => !addr_matches(addr, literal),
            _ => false,
        },
        // 양방향 주소: == 는 둘 중 하나, != 는 둘 다 불일치
        FieldValue::AddrPair(src, dst) => match op {
            CompareOp::Eq => addr_matches(src, literal) || addr_matches(dst, literal),
            CompareOp::Ne => !addr_matches(src, literal) && !addr_matches(dst, literal),
            _ => false,
        },
        FieldValue::Protocol(number) => match protocol_name(number) {
            Some(name) if literal.trim().parse::<f64>().is_err() => match op {
                CompareOp::Eq => name.eq_ignore_ascii_case(literal.trim()),
                CompareOp::Ne => !name.eq_ignore_ascii_case(literal.trim()),
                _ => false,
            },
            _ => compare_number_or_text(f64::from(number), op, literal),
        },
    }
}

/// IP 프로토콜 번호의 이름
fn protocol_name(number: u8) -> Option<&'static str> {
    match number {
        0 => Some("ipv6hopbyhop"),
        1 => Some("icmp"),
        2 => Some("igmp"),
        4 => Some("ipip"),
        6 => Some("tcp"),
        17 => Some("udp"),
        41 => Some("ipv6"),
        47 => Some("gre"),
        50 => Some("esp"),
        51 => Some("ah"),
        58 => Some("icmpv6"),
        132 => Some("sctp"),
        _ => None,
    }
}

fn compare_number_or_text(n: f64, op: CompareOp, literal: &str) -> bool {
    match literal.trim().parse::<f64>() {
        Ok(expected) if expected.is_finite() => compare_numbers(n, op, expected),
        // 숫자가 아닌 값은 대소문자 무시 문자열 비교 (== / != 만)
        _ => {
            let text = format_number(n);
            match op {
                CompareOp::Eq => text.eq_ignore_ascii_case(literal),
                CompareOp::Ne => !text.eq_ignore_ascii_case(literal),
                _ => false,
            }
        }
    }
}

fn compare_numbers(actual: f64, op: CompareOp, expected: f64) -> bool {
    let equal = (actual - expected).abs() < NUMERIC_TOLERANCE;
    match op {
        CompareOp::Eq => equal,
        CompareOp::Ne => !equal,
        CompareOp::Gt => actual > expected,
        CompareOp::Lt => actual < expected,
        CompareOp::Ge => actual > expected || equal,
        CompareOp::Le => actual < expected || equal,
    }
}

fn parse_bool_literal(literal: &str) -> Option<bool> {
    if literal.eq_ignore_ascii_case("true") {
        Some(true)
    } else if literal.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn addr_matches(addr: IpAddr, literal: &str) -> bool {
    match literal.trim().parse::<IpAddr>() {
        Ok(expected) => addr == expected,
        Err(_) => addr.to_string().eq_ignore_ascii_case(literal.trim()),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
