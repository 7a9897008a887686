//! Identifier case conversion.
//!
//! Declaration-style names (`UserID`, `HTTPServerURL`) are converted to
//! snake_case table and column names. Recognized initialisms are kept as a
//! single word, so `UserID` becomes `user_id` rather than `user_i_d`.

/// Initialisms treated as one word during conversion.
pub const COMMON_INITIALISMS: &[&str] = &[
    "ACL", "API", "ASCII", "CPU", "CSS", "DNS", "EOF", "GUID", "HTML", "HTTP", "HTTPS", "ID",
    "IP", "JSON", "LHS", "QPS", "RAM", "RHS", "RPC", "SKU", "SLA", "SMTP", "SQL", "SSH", "TCP",
    "TLS", "TTL", "UDP", "UI", "UID", "URI", "URL", "UTF8", "UUID", "VM", "XML", "XMPP",
    "XSRF", "XSS",
];

/// Convert an identifier to snake_case.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if !ch.is_alphanumeric() {
            flush(&mut words, &mut current);
            i += 1;
            continue;
        }

        if ch.is_uppercase() {
            if let Some(len) = match_initialism(&chars[i..]) {
                flush(&mut words, &mut current);
                words.push(chars[i..i + len].iter().collect::<String>().to_lowercase());
                i += len;
                continue;
            }

            if !current.is_empty() {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
                if prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next_is_lower)
                {
                    flush(&mut words, &mut current);
                }
            }
        }

        current.extend(ch.to_lowercase());
        i += 1;
    }

    flush(&mut words, &mut current);
    words.join("_")
}

fn flush(words: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}

/// Length of the longest initialism at the start of `rest` that ends on a
/// word boundary. A trailing plural `s` is absorbed (`IDs` -> `ids`).
fn match_initialism(rest: &[char]) -> Option<usize> {
    let mut best: Option<usize> = None;

    for initialism in COMMON_INITIALISMS {
        let len = initialism.chars().count();
        if rest.len() < len || !rest.iter().zip(initialism.chars()).all(|(a, b)| *a == b) {
            continue;
        }

        let matched = match rest.get(len) {
            None => Some(len),
            Some(c) if !c.is_lowercase() => Some(len),
            Some(&'s') if rest.get(len + 1).is_none_or(|c| !c.is_lowercase()) => Some(len + 1),
            _ => None,
        };

        if let Some(matched) = matched {
            if best.is_none_or(|b| matched > b) {
                best = Some(matched);
            }
        }
    }

    best
}
