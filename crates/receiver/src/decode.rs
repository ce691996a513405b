//! 패킷 디코딩 -- 캡처 프레임에서 필터와 페이로드 추출에 필요한 필드만 읽습니다.
//!
//! 링크 계층 → IP(v4/v6) → UDP/TCP/ICMP 순서로 `etherparse` 헤더 슬라이스를 사용해
//! 해석하며, 해석할 수 없는 계층부터는 `None`으로 남깁니다.
//! 디코딩 실패는 에러가 아니라 "필드 없음"으로 취급됩니다.

use std::net::IpAddr;

use etherparse::{
    Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice, TcpHeaderSlice, UdpHeaderSlice,
};

// --- 링크 타입 (pcap LINKTYPE_*) ---

/// BSD loopback (4바이트 주소 체계 헤더)
pub const LINKTYPE_NULL: u32 = 0;
/// Ethernet II
pub const LINKTYPE_ETHERNET: u32 = 1;
/// Raw IP (OpenBSD 값)
pub const LINKTYPE_RAW_OPENBSD: u32 = 12;
/// Raw IP
pub const LINKTYPE_RAW: u32 = 101;
/// Linux cooked capture v1 (16바이트 헤더)
pub const LINKTYPE_LINUX_SLL: u32 = 113;
/// Raw IPv4
pub const LINKTYPE_IPV4: u32 = 228;
/// Raw IPv6
pub const LINKTYPE_IPV6: u32 = 229;
/// Linux cooked capture v2 (20바이트 헤더)
pub const LINKTYPE_LINUX_SLL2: u32 = 276;

// --- IP 프로토콜 번호 ---

/// ICMP
pub const IPPROTO_ICMP: u8 = 1;
/// TCP
pub const IPPROTO_TCP: u8 = 6;
/// UDP
pub const IPPROTO_UDP: u8 = 17;
/// ICMPv6
pub const IPPROTO_ICMPV6: u8 = 58;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88A8;

/// 디코딩된 패킷 뷰
///
/// 원본 프레임 버퍼를 빌려서 사용하며, 페이로드는 프레임의 하위 슬라이스입니다.
#[derive(Debug, Clone)]
pub struct PacketView<'a> {
    /// 캡처된 원본 프레임
    pub frame: &'a [u8],
    /// IP 계층 정보
    pub ip: Option<IpInfo>,
    /// 전송 계층 정보
    pub transport: Option<Transport<'a>>,
}

/// IP 헤더 요약
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpInfo {
    /// IP 버전 (4 또는 6)
    pub version: u8,
    /// 출발지 주소
    pub src: IpAddr,
    /// 목적지 주소
    pub dst: IpAddr,
    /// TTL (IPv6는 hop limit)
    pub ttl: u8,
    /// 헤더 포함 전체 길이
    pub total_len: u16,
    /// 상위 프로토콜 번호
    pub protocol: u8,
}

/// TCP 플래그
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub urg: bool,
}

/// 전송 계층 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport<'a> {
    /// UDP 데이터그램
    Udp {
        src_port: u16,
        dst_port: u16,
        /// UDP 헤더의 length 필드 (헤더 포함)
        length: u16,
        payload: &'a [u8],
    },
    /// TCP 세그먼트
    Tcp {
        src_port: u16,
        dst_port: u16,
        /// 옵션 포함 TCP 헤더 길이 (data offset * 4)
        header_len: u16,
        flags: TcpFlags,
        payload: &'a [u8],
    },
    /// ICMP / ICMPv6
    Icmp { icmp_type: u8, code: u8 },
}

impl<'a> PacketView<'a> {
    /// 링크 타입에 따라 프레임을 디코딩합니다.
    pub fn decode(link_type: u32, frame: &'a [u8]) -> Self {
        let ip_bytes = strip_link_layer(link_type, frame);
        let (ip, transport) = match ip_bytes {
            Some(bytes) => decode_ip(bytes),
            None => (None, None),
        };
        Self {
            frame,
            ip,
            transport,
        }
    }

    /// 전송 계층 페이로드가 비어 있지 않으면 그것을, 아니면 프레임 전체를 반환합니다.
    pub fn payload(&self) -> &'a [u8] {
        match &self.transport {
            Some(Transport::Udp { payload, .. }) | Some(Transport::Tcp { payload, .. })
                if !payload.is_empty() =>
            {
                *payload
            }
            _ => self.frame,
        }
    }

    /// UDP 패킷인지 확인합니다.
    pub fn is_udp(&self) -> bool {
        matches!(self.transport, Some(Transport::Udp { .. }))
    }

    /// TCP 패킷인지 확인합니다.
    pub fn is_tcp(&self) -> bool {
        matches!(self.transport, Some(Transport::Tcp { .. }))
    }

    /// ICMP 패킷인지 확인합니다.
    pub fn is_icmp(&self) -> bool {
        matches!(self.transport, Some(Transport::Icmp { .. }))
    }

    /// (출발지, 목적지) 포트를 반환합니다.
    pub fn ports(&self) -> Option<(u16, u16)> {
        match self.transport {
            Some(Transport::Udp {
                src_port, dst_port, ..
            })
            | Some(Transport::Tcp {
                src_port, dst_port, ..
            }) => Some((src_port, dst_port)),
            _ => None,
        }
    }
}

/// 링크 계층 헤더를 제거하고 IP 패킷 바이트를 반환합니다.
fn strip_link_layer(link_type: u32, frame: &[u8]) -> Option<&[u8]> {
    match link_type {
        LINKTYPE_ETHERNET => {
            let eth = Ethernet2HeaderSlice::from_slice(frame).ok()?;
            let mut ether_type = eth.ether_type().0;
            let mut offset = eth.slice().len();
            // 802.1Q / QinQ 태그는 최대 두 겹까지 벗겨냄
            for _ in 0..2 {
                if ether_type != ETHERTYPE_VLAN && ether_type != ETHERTYPE_QINQ {
                    break;
                }
                let tag = frame.get(offset..offset + 4)?;
                ether_type = u16::from_be_bytes([tag[2], tag[3]]);
                offset += 4;
            }
            match ether_type {
                ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => frame.get(offset..),
                _ => None,
            }
        }
        LINKTYPE_NULL => frame.get(4..),
        LINKTYPE_LINUX_SLL => {
            let proto = frame.get(14..16)?;
            match u16::from_be_bytes([proto[0], proto[1]]) {
                ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => frame.get(16..),
                _ => None,
            }
        }
        LINKTYPE_LINUX_SLL2 => {
            let proto = frame.get(0..2)?;
            match u16::from_be_bytes([proto[0], proto[1]]) {
                ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => frame.get(20..),
                _ => None,
            }
        }
        LINKTYPE_RAW | LINKTYPE_RAW_OPENBSD | LINKTYPE_IPV4 | LINKTYPE_IPV6 => Some(frame),
        _ => None,
    }
}

fn decode_ip(bytes: &[u8]) -> (Option<IpInfo>, Option<Transport<'_>>) {
    match bytes.first().map(|b| b >> 4) {
        Some(4) => decode_ipv4(bytes),
        Some(6) => decode_ipv6(bytes),
        _ => (None, None),
    }
}

fn decode_ipv4(bytes: &[u8]) -> (Option<IpInfo>, Option<Transport<'_>>) {
    let Ok(header) = Ipv4HeaderSlice::from_slice(bytes) else {
        return (None, None);
    };

    let info = IpInfo {
        version: 4,
        src: IpAddr::V4(header.source_addr()),
        dst: IpAddr::V4(header.destination_addr()),
        ttl: header.ttl(),
        total_len: header.total_len(),
        protocol: header.protocol().0,
    };

    // 첫 조각이 아닌 fragment에는 전송 계층 헤더가 없음
    let frag_offset = u16::from_be_bytes([bytes[6], bytes[7]]) & 0x1FFF;
    if frag_offset != 0 {
        return (Some(info), None);
    }

    let header_len = header.slice().len();
    let end = usize::from(info.total_len).clamp(header_len, bytes.len());
    let transport = decode_transport(info.protocol, &bytes[header_len..end]);
    (Some(info), transport)
}

fn decode_ipv6(bytes: &[u8]) -> (Option<IpInfo>, Option<Transport<'_>>) {
    let Ok(header) = Ipv6HeaderSlice::from_slice(bytes) else {
        return (None, None);
    };

    let header_len = header.slice().len();
    let payload_len = header.payload_length();
    let info = IpInfo {
        version: 6,
        src: IpAddr::V6(header.source_addr()),
        dst: IpAddr::V6(header.destination_addr()),
        ttl: header.hop_limit(),
        total_len: payload_len.saturating_add(header_len as u16),
        protocol: header.next_header().0,
    };

    let end = (header_len + usize::from(payload_len)).min(bytes.len());
    let transport = decode_transport(info.protocol, &bytes[header_len..end]);
    (Some(info), transport)
}

fn decode_transport(protocol: u8, bytes: &[u8]) -> Option<Transport<'_>> {
    match protocol {
        IPPROTO_UDP => {
            let udp = UdpHeaderSlice::from_slice(bytes).ok()?;
            let header_len = udp.slice().len();
            let declared = usize::from(udp.length());
            let end = if declared >= header_len {
                declared.min(bytes.len())
            } else {
                bytes.len()
            };
            Some(Transport::Udp {
                src_port: udp.source_port(),
                dst_port: udp.destination_port(),
                length: udp.length(),
                payload: &bytes[header_len..end],
            })
        }
        IPPROTO_TCP => {
            let tcp = TcpHeaderSlice::from_slice(bytes).ok()?;
            let header_len = tcp.slice().len();
            Some(Transport::Tcp {
                src_port: tcp.source_port(),
                dst_port: tcp.destination_port(),
                header_len: header_len as u16,
                flags: TcpFlags {
                    syn: tcp.syn(),
                    ack: tcp.ack(),
                    fin: tcp.fin(),
                    rst: tcp.rst(),
                    psh: tcp.psh(),
                    urg: tcp.urg(),
                },
                payload: &bytes[header_len..],
            })
        }
        IPPROTO_ICMP | IPPROTO_ICMPV6 => {
            let head = bytes.get(..2)?;
            Some(Transport::Icmp {
                icmp_type: head[0],
                code: head[1],
            })
        }
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::test_frames::*;
    use super::*;

    #[test]
    fn decodes_ethernet_ipv4_udp() {
        let frame = udp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 5000, b"hello");
        let view = PacketView::decode(LINKTYPE_ETHERNET, &frame);

        let ip = view.ip.unwrap();
        assert_eq!(ip.version, 4);
        assert_eq!(ip.src, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(ip.dst, "10.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(ip.ttl, 64);
        assert_eq!(ip.protocol, IPPROTO_UDP);
        assert_eq!(ip.total_len, 20 + 8 + 5);

        assert!(view.is_udp());
        assert_eq!(view.ports(), Some((40000, 5000)));
        assert_eq!(view.payload(), b"hello");
    }

    #[test]
    fn decodes_tcp_flags_and_header_len() {
        let frame = tcp([1, 1, 1, 1], [2, 2, 2, 2], 1234, 80, TCP_SYN | TCP_ACK, b"");
        let view = PacketView::decode(LINKTYPE_ETHERNET, &frame);
        match view.transport {
            Some(Transport::Tcp {
                header_len, flags, ..
            }) => {
                assert_eq!(header_len, 20);
                assert!(flags.syn);
                assert!(flags.ack);
                assert!(!flags.fin);
            }
            other => panic!("expected tcp, got {other:?}"),
        }
    }

    #[test]
    fn empty_transport_payload_falls_back_to_frame() {
        let frame = tcp([1, 1, 1, 1], [2, 2, 2, 2], 1234, 80, TCP_SYN, b"");
        let view = PacketView::decode(LINKTYPE_ETHERNET, &frame);
        assert_eq!(view.payload(), frame.as_slice());
    }

    #[test]
    fn icmp_payload_is_full_frame() {
        let frame = icmp_echo([1, 1, 1, 1], [2, 2, 2, 2]);
        let view = PacketView::decode(LINKTYPE_ETHERNET, &frame);
        assert!(view.is_icmp());
        assert_eq!(view.payload().len(), frame.len());
    }

    #[test]
    fn raw_ip_link_type_skips_link_header() {
        let frame = udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"x");
        let view = PacketView::decode(LINKTYPE_RAW, &frame[14..]);
        assert!(view.is_udp());
        assert_eq!(view.payload(), b"x");
    }

    #[test]
    fn linux_sll_link_type() {
        let frame = udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"sll");
        let mut sll = vec![0u8; 14];
        sll.extend_from_slice(&[0x08, 0x00]);
        sll.extend_from_slice(&frame[14..]);
        let view = PacketView::decode(LINKTYPE_LINUX_SLL, &sll);
        assert_eq!(view.payload(), b"sll");
    }

    #[test]
    fn vlan_tagged_frame() {
        let frame = udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"vlan");
        let mut tagged = frame[..12].to_vec();
        tagged.extend_from_slice(&[0x81, 0x00, 0x00, 0x64, 0x08, 0x00]);
        tagged.extend_from_slice(&frame[14..]);
        let view = PacketView::decode(LINKTYPE_ETHERNET, &tagged);
        assert_eq!(view.payload(), b"vlan");
    }

    #[test]
    fn garbage_frame_has_no_layers() {
        let frame = [0u8; 6];
        let view = PacketView::decode(LINKTYPE_ETHERNET, &frame);
        assert!(view.ip.is_none());
        assert!(view.transport.is_none());
        assert_eq!(view.payload(), &frame);
    }

    #[test]
    fn unknown_link_type_has_no_layers() {
        let frame = udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"x");
        let view = PacketView::decode(9999, &frame);
        assert!(view.ip.is_none());
    }
}
