//! 캡처 필터 -- tcpdump 스타일 프리미티브를 읽기 경로에 컴파일합니다.
//!
//! 패킷 디코딩 직후, 페이로드 추출 전에 적용됩니다.
//!
//! # 지원 문법
//! - 프로토콜: `ip`, `ip6`, `udp`, `tcp`, `icmp`
//! - 호스트: `[src|dst] host ADDR`, `src ADDR`, `dst ADDR`
//! - 포트: `[tcp|udp] [src|dst] port N`, `[tcp|udp] [src|dst] portrange A-B`
//! - 길이: `less N`, `greater N`
//! - 결합: `and`/`&&`, `or`/`||`, `not`/`!`, 괄호
//!
//! 이 밖의 문법은 컴파일에 실패하며, 호출자는 필터 표현식 평가로 대체합니다.

use std::net::IpAddr;

use crate::decode::PacketView;
use crate::error::ReceiverError;

/// 구문 트리 높이와 파서 재귀의 한도 (스택 보호)
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Src,
    Dst,
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Proto {
    Ip4,
    Ip6,
    Udp,
    Tcp,
    Icmp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Primitive {
    Proto(Proto),
    Host {
        dir: Direction,
        addr: IpAddr,
    },
    Port {
        proto: Option<Proto>,
        dir: Direction,
        lo: u16,
        hi: u16,
    },
    Less(usize),
    Greater(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Prim(Primitive),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

/// 컴파일된 캡처 필터
#[derive(Debug, Clone)]
pub struct CaptureFilter {
    source: String,
    root: Node,
}

impl CaptureFilter {
    /// 필터 문자열을 컴파일합니다.
    pub fn compile(filter: &str) -> Result<Self, ReceiverError> {
        let tokens = tokenize(filter)?;
        if tokens.is_empty() {
            return Err(ReceiverError::Filter("empty capture filter".to_owned()));
        }

        let mut parser = Parser { tokens, pos: 0 };
        let (root, _) = parser.parse_or(0)?;
        if let Some(extra) = parser.peek() {
            return Err(ReceiverError::Filter(format!(
                "unexpected token {extra:?} in capture filter"
            )));
        }

        Ok(Self {
            source: filter.trim().to_owned(),
            root,
        })
    }

    /// 원본 필터 문자열을 반환합니다.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 패킷이 필터를 통과하는지 확인합니다.
    pub fn matches(&self, packet: &PacketView<'_>) -> bool {
        eval_node(&self.root, packet)
    }
}

fn eval_node(node: &Node, packet: &PacketView<'_>) -> bool {
    match node {
        Node::Prim(p) => eval_primitive(p, packet),
        Node::Not(inner) => !eval_node(inner, packet),
        Node::And(l, r) => eval_node(l, packet) && eval_node(r, packet),
        Node::Or(l, r) => eval_node(l, packet) || eval_node(r, packet),
    }
}

fn eval_primitive(prim: &Primitive, packet: &PacketView<'_>) -> bool {
    match prim {
        Primitive::Proto(proto) => proto_matches(*proto, packet),
        Primitive::Host { dir, addr } => packet.ip.is_some_and(|ip| match dir {
            Direction::Src => ip.src == *addr,
            Direction::Dst => ip.dst == *addr,
            Direction::Either => ip.src == *addr || ip.dst == *addr,
        }),
        Primitive::Port { proto, dir, lo, hi } => {
            if proto.is_some_and(|p| !proto_matches(p, packet)) {
                return false;
            }
            let in_range = |port: u16| (*lo..=*hi).contains(&port);
            packet.ports().is_some_and(|(src, dst)| match dir {
                Direction::Src => in_range(src),
                Direction::Dst => in_range(dst),
                Direction::Either => in_range(src) || in_range(dst),
            })
        }
        Primitive::Less(n) => packet.frame.len() <= *n,
        Primitive::Greater(n) => packet.frame.len() >= *n,
    }
}

fn proto_matches(proto: Proto, packet: &PacketView<'_>) -> bool {
    match proto {
        Proto::Ip4 => packet.ip.is_some_and(|ip| ip.version == 4),
        Proto::Ip6 => packet.ip.is_some_and(|ip| ip.version == 6),
        Proto::Udp => packet.is_udp(),
        Proto::Tcp => packet.is_tcp(),
        Proto::Icmp => packet.is_icmp(),
    }
}

// --- 토크나이저 ---

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Word(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, ReceiverError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(i, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' | '|' => {
                chars.next();
                match chars.next() {
                    Some((_, next)) if next == c => {
                        tokens.push(if c == '&' { Token::And } else { Token::Or });
                    }
                    _ => {
                        return Err(ReceiverError::Filter(format!(
                            "unexpected '{c}' at offset {i} in capture filter"
                        )));
                    }
                }
            }
            _ => {
                let mut end = i;
                while let Some(&(j, ch)) = chars.peek() {
                    if ch.is_whitespace() || "()!&|".contains(ch) {
                        break;
                    }
                    end = j + ch.len_utf8();
                    chars.next();
                }
                let word = &input[i..end];
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Word(word.to_owned()),
                });
            }
        }
    }

    Ok(tokens)
}

// --- 파서 ---

fn within_limit(depth: usize) -> Result<usize, ReceiverError> {
    if depth > MAX_DEPTH {
        return Err(ReceiverError::Filter(format!(
            "capture filter nested deeper than {MAX_DEPTH} levels"
        )));
    }
    Ok(depth)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_word(&self) -> Option<String> {
        match self.peek() {
            Some(Token::Word(w)) => Some(w.to_ascii_lowercase()),
            _ => None,
        }
    }

    fn expect_word(&mut self, what: &str) -> Result<String, ReceiverError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            other => Err(ReceiverError::Filter(format!(
                "expected {what} in capture filter, found {other:?}"
            ))),
        }
    }

    // 각 parse_* 는 노드와 그 높이를 반환합니다.
    // depth는 재귀 깊이, 높이는 평가와 해제 시의 재귀 깊이를 제한합니다.

    fn parse_or(&mut self, depth: usize) -> Result<(Node, usize), ReceiverError> {
        let (mut node, mut height) = self.parse_and(depth)?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let (rhs, rhs_height) = self.parse_and(depth)?;
            height = within_limit(height.max(rhs_height) + 1)?;
            node = Node::Or(Box::new(node), Box::new(rhs));
        }
        Ok((node, height))
    }

    fn parse_and(&mut self, depth: usize) -> Result<(Node, usize), ReceiverError> {
        let (mut node, mut height) = self.parse_not(depth)?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let (rhs, rhs_height) = self.parse_not(depth)?;
            height = within_limit(height.max(rhs_height) + 1)?;
            node = Node::And(Box::new(node), Box::new(rhs));
        }
        Ok((node, height))
    }

    fn parse_not(&mut self, depth: usize) -> Result<(Node, usize), ReceiverError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let (inner, height) = self.parse_not(within_limit(depth + 1)?)?;
            return Ok((Node::Not(Box::new(inner)), within_limit(height + 1)?));
        }
        self.parse_primary(depth)
    }

    fn parse_primary(&mut self, depth: usize) -> Result<(Node, usize), ReceiverError> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or(within_limit(depth + 1)?)?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ReceiverError::Filter(
                        "missing ')' in capture filter".to_owned(),
                    )),
                }
            }
            Some(Token::Word(_)) => Ok((Node::Prim(self.parse_primitive()?), 1)),
            other => Err(ReceiverError::Filter(format!(
                "unexpected token {other:?} in capture filter"
            ))),
        }
    }

    fn parse_primitive(&mut self) -> Result<Primitive, ReceiverError> {
        let word = self.expect_word("primitive")?.to_ascii_lowercase();
        match word.as_str() {
            "ip" => Ok(Primitive::Proto(Proto::Ip4)),
            "ip6" => Ok(Primitive::Proto(Proto::Ip6)),
            "icmp" => Ok(Primitive::Proto(Proto::Icmp)),
            "udp" | "tcp" => {
                let proto = if word == "udp" { Proto::Udp } else { Proto::Tcp };
                match self.peek_word().as_deref() {
                    Some("src" | "dst" | "port" | "portrange") => {
                        let dir = self.parse_direction();
                        self.parse_port(Some(proto), dir)
                    }
                    _ => Ok(Primitive::Proto(proto)),
                }
            }
            "src" | "dst" => {
                let dir = if word == "src" {
                    Direction::Src
                } else {
                    Direction::Dst
                };
                match self.peek_word().as_deref() {
                    Some("host") => {
                        self.pos += 1;
                        self.parse_host(dir)
                    }
                    Some("port" | "portrange") => self.parse_port(None, dir),
                    _ => self.parse_host(dir),
                }
            }
            "host" => self.parse_host(Direction::Either),
            "port" | "portrange" => {
                self.pos -= 1;
                self.parse_port(None, Direction::Either)
            }
            "less" => Ok(Primitive::Less(self.parse_number("length")?)),
            "greater" => Ok(Primitive::Greater(self.parse_number("length")?)),
            other => Err(ReceiverError::Filter(format!(
                "unknown capture filter primitive '{other}'"
            ))),
        }
    }

    fn parse_direction(&mut self) -> Direction {
        match self.peek_word().as_deref() {
            Some("src") => {
                self.pos += 1;
                Direction::Src
            }
            Some("dst") => {
                self.pos += 1;
                Direction::Dst
            }
            _ => Direction::Either,
        }
    }

    fn parse_host(&mut self, dir: Direction) -> Result<Primitive, ReceiverError> {
        let raw = self.expect_word("host address")?;
        let addr = raw.parse::<IpAddr>().map_err(|_| {
            ReceiverError::Filter(format!("invalid host address '{raw}' in capture filter"))
        })?;
        Ok(Primitive::Host { dir, addr })
    }

    fn parse_port(&mut self, proto: Option<Proto>, dir: Direction) -> Result<Primitive, ReceiverError> {
        let keyword = self.expect_word("'port' or 'portrange'")?.to_ascii_lowercase();
        let (lo, hi) = match keyword.as_str() {
            "port" => {
                let port = parse_port_number(&self.expect_word("port number")?)?;
                (port, port)
            }
            "portrange" => {
                let raw = self.expect_word("port range")?;
                let (a, b) = raw.split_once('-').ok_or_else(|| {
                    ReceiverError::Filter(format!("invalid port range '{raw}'"))
                })?;
                let (lo, hi) = (parse_port_number(a)?, parse_port_number(b)?);
                if lo > hi {
                    return Err(ReceiverError::Filter(format!(
                        "port range '{raw}' is reversed"
                    )));
                }
                (lo, hi)
            }
            other => {
                return Err(ReceiverError::Filter(format!(
                    "expected 'port' or 'portrange', found '{other}'"
                )));
            }
        };
        Ok(Primitive::Port { proto, dir, lo, hi })
    }

    fn parse_number(&mut self, what: &str) -> Result<usize, ReceiverError> {
        let raw = self.expect_word(what)?;
        raw.parse::<usize>()
            .map_err(|_| ReceiverError::Filter(format!("invalid {what} '{raw}' in capture filter")))
    }
}

fn parse_port_number(raw: &str) -> Result<u16, ReceiverError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| ReceiverError::Filter(format!("invalid port '{raw}' in capture filter")))
}
