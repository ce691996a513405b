//! 필터 표현식 파서
//!
//! 우선순위가 낮은 연산자부터 찾아 분할하는 재귀 하강 방식입니다.
//!
//! 1. 바깥쪽 괄호 한 쌍이 전체를 감싸면 제거
//! 2. 최상위(괄호 밖) 마지막 `or`/`||` 위치에서 분할 (좌결합)
//! 3. 최상위 마지막 `and`/`&&` 위치에서 분할
//! 4. 접두 `not`/`!` 처리
//! 5. `field op value` 비교 또는 필드 존재 검사

use crate::error::ReceiverError;

/// 중첩 허용 한도 (스택 보호)
const MAX_DEPTH: usize = 256;

/// 비교 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    /// 연산자 기호를 반환합니다.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

/// 필터 표현식 AST
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// 논리 부정
    Not(Box<FilterExpr>),
    /// 논리곱
    And(Box<FilterExpr>, Box<FilterExpr>),
    /// 논리합
    Or(Box<FilterExpr>, Box<FilterExpr>),
    /// 필드 비교 (필드명은 소문자, 값은 따옴표 제거됨)
    Comparison {
        field: String,
        op: CompareOp,
        value: String,
    },
    /// 필드 존재/참 검사
    Presence(String),
}

/// 필터 문자열을 AST로 파싱합니다.
pub fn parse(input: &str) -> Result<FilterExpr, ReceiverError> {
    parse_expr(input, 0)
}

fn parse_expr(input: &str, depth: usize) -> Result<FilterExpr, ReceiverError> {
    if depth > MAX_DEPTH {
        return Err(ReceiverError::Filter(format!(
            "expression nested deeper than {MAX_DEPTH} levels"
        )));
    }

    let s = strip_outer_parens(input.trim())?;
    if s.is_empty() {
        return Err(ReceiverError::Filter("empty expression".to_owned()));
    }

    if let Some((at, len)) = find_last_operator(s, b"or", b"||")? {
        let left = parse_expr(&s[..at], depth + 1)?;
        let right = parse_expr(&s[at + len..], depth + 1)?;
        return Ok(FilterExpr::Or(Box::new(left), Box::new(right)));
    }

    if let Some((at, len)) = find_last_operator(s, b"and", b"&&")? {
        let left = parse_expr(&s[..at], depth + 1)?;
        let right = parse_expr(&s[at + len..], depth + 1)?;
        return Ok(FilterExpr::And(Box::new(left), Box::new(right)));
    }

    if let Some(rest) = strip_not(s) {
        let inner = parse_expr(rest, depth + 1)?;
        return Ok(FilterExpr::Not(Box::new(inner)));
    }

    parse_comparison(s)
}

/// 전체를 감싸는 바깥쪽 괄호를 반복해서 제거합니다.
fn strip_outer_parens(mut s: &str) -> Result<&str, ReceiverError> {
    loop {
        if !s.starts_with('(') {
            return Ok(s);
        }
        let close = matching_paren(s.as_bytes())?;
        if close + 1 != s.len() {
            return Ok(s);
        }
        s = s[1..close].trim();
    }
}

/// 첫 바이트 `(`에 대응하는 `)`의 위치를 찾습니다.
fn matching_paren(bytes: &[u8]) -> Result<usize, ReceiverError> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'(') => depth += 1,
            (None, b')') => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(ReceiverError::Filter("unbalanced parentheses".to_owned()))
}

/// 괄호/따옴표 밖에서 마지막으로 나타나는 논리 연산자 위치와 길이를 찾습니다.
fn find_last_operator(
    s: &str,
    keyword: &[u8],
    symbol: &[u8],
) -> Result<Option<(usize, usize)>, ReceiverError> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut found = None;

    for i in 0..bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ReceiverError::Filter("unbalanced parentheses".to_owned()));
                }
            }
            _ if depth == 0 => {
                if bytes[i..].starts_with(symbol) {
                    found = Some((i, symbol.len()));
                } else if is_keyword_at(bytes, i, keyword) {
                    found = Some((i, keyword.len()));
                }
            }
            _ => {}
        }
    }

    if depth != 0 || quote.is_some() {
        return Err(ReceiverError::Filter(
            "unbalanced parentheses or quotes".to_owned(),
        ));
    }
    Ok(found)
}

/// `bytes[i..]`가 독립된 단어 `keyword`로 시작하는지 확인합니다 (대소문자 무시).
fn is_keyword_at(bytes: &[u8], i: usize, keyword: &[u8]) -> bool {
    let end = i + keyword.len();
    if end > bytes.len() || !bytes[i..end].eq_ignore_ascii_case(keyword) {
        return false;
    }
    let before_ok = i == 0 || is_boundary(bytes[i - 1]);
    let after_ok = end == bytes.len() || is_boundary(bytes[end]);
    before_ok && after_ok
}

fn is_boundary(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'(' || b == b')'
}

/// 접두 부정 연산자를 제거한 나머지를 반환합니다.
fn strip_not(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    if is_keyword_at(bytes, 0, b"not") {
        return Some(&s[3..]);
    }
    if bytes.first() == Some(&b'!') && bytes.get(1) != Some(&b'=') {
        return Some(&s[1..]);
    }
    None
}

fn parse_comparison(s: &str) -> Result<FilterExpr, ReceiverError> {
    let Some((at, op, len)) = find_comparison_operator(s) else {
        let field = parse_field(s)?;
        return Ok(FilterExpr::Presence(field));
    };

    let field = parse_field(&s[..at])?;
    let value = unquote(s[at + len..].trim());
    if value.is_empty() {
        return Err(ReceiverError::Filter(format!(
            "missing value after '{}' for field '{field}'",
            op.symbol()
        )));
    }

    Ok(FilterExpr::Comparison {
        field,
        op,
        value: value.to_owned(),
    })
}

/// 따옴표 밖에서 가장 왼쪽의 비교 연산자를 찾습니다.
fn find_comparison_operator(s: &str) -> Option<(usize, CompareOp, usize)> {
    let bytes = s.as_bytes();
    let mut quote: Option<u8> = None;
    for i in 0..bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        let next = bytes.get(i + 1).copied();
        let found = match (b, next) {
            (b'"' | b'\'', _) => {
                quote = Some(b);
                None
            }
            (b'=', Some(b'=')) => Some((CompareOp::Eq, 2)),
            (b'!', Some(b'=')) => Some((CompareOp::Ne, 2)),
            (b'>', Some(b'=')) => Some((CompareOp::Ge, 2)),
            (b'<', Some(b'=')) => Some((CompareOp::Le, 2)),
            (b'>', _) => Some((CompareOp::Gt, 1)),
            (b'<', _) => Some((CompareOp::Lt, 1)),
            _ => None,
        };
        if let Some((op, len)) = found {
            return Some((i, op, len));
        }
    }
    None
}

fn parse_field(raw: &str) -> Result<String, ReceiverError> {
    let field = raw.trim();
    let valid = !field.is_empty()
        && field
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
        && !field.starts_with('.')
        && !field.ends_with('.');
    if !valid {
        return Err(ReceiverError::Filter(format!(
            "invalid field reference '{field}'"
        )));
    }
    Ok(field.to_ascii_lowercase())
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &value[1..value.len() - 1];
        }
    }
    value
}
