//! 学号校验位（模 11）

use regex::Regex;
use std::sync::OnceLock;

fn matches_body(body: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[0-9]{7,8}$").ok())
        .as_ref()
        .map_or(false, |re| re.is_match(body))
}

/// 计算校验位：权重从右往左 2..7 循环，余数 11 记为 `0`，10 记为 `K`
pub fn compute(body: &str) -> Option<char> {
    let body = normalize(body);
    if !matches_body(&body) {
        return None;
    }

    let sum: u32 = body
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .zip((2..=7).cycle())
        .map(|(digit, weight)| digit * weight)
        .sum();

    match 11 - sum % 11 {
        11 => Some('0'),
        10 => Some('K'),
        n => char::from_digit(n, 10),
    }
}

pub fn is_valid(body: &str, check_digit: char) -> bool {
    compute(body) == Some(check_digit.to_ascii_uppercase())
}

fn normalize(body: &str) -> String {
    body.trim().chars().filter(|c| *c != '.').collect()
}
