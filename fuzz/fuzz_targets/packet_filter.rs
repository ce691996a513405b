#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use asterix_receiver::{PacketFilter, PacketView};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 필터 문자열 (캡처 필터 또는 표현식)
    filter: String,
    /// 링크 타입 선택
    link: FuzzLink,
    /// 임의 프레임 바이트
    frame: Vec<u8>,
}

#[derive(Arbitrary, Debug)]
enum FuzzLink {
    Null,
    Ethernet,
    Raw,
    LinuxSll,
    Ipv4,
    Ipv6,
    Unknown(u32),
}

impl FuzzLink {
    fn link_type(&self) -> u32 {
        match self {
            Self::Null => 0,
            Self::Ethernet => 1,
            Self::Raw => 101,
            Self::LinuxSll => 113,
            Self::Ipv4 => 228,
            Self::Ipv6 => 229,
            Self::Unknown(v) => *v,
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    // 디코딩과 필터 평가는 어떤 입력에도 패닉하지 않아야 함
    let filter = PacketFilter::from_filter(Some(&input.filter));
    let view = PacketView::decode(input.link.link_type(), &input.frame);
    let _ = filter.matches(&view);
    let _ = view.payload();
});
