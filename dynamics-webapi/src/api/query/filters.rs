//! Filter normalization and percent-encoding

/// Remove the braces around `{8-4-4-4-12}` GUIDs that sit outside single-quoted literals
///
/// Quoted spans are toggled on every `'`, so the OData escape `''` leaves the
/// scanner inside the literal. Text inside quotes, braces included, is kept
/// verbatim. Running this on its own output is a no-op.
pub fn normalize_guids(filter: &str) -> String {
    let bytes = filter.as_bytes();
    let mut normalized = String::with_capacity(filter.len());
    let mut in_quotes = false;
    let mut copied_until = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                in_quotes = !in_quotes;
                i += 1;
            }
            b'{' if !in_quotes && is_braced_guid(&bytes[i..]) => {
                normalized.push_str(&filter[copied_until..i]);
                normalized.push_str(&filter[i + 1..i + 37]);
                i += 38;
                copied_until = i;
            }
            _ => i += 1,
        }
    }

    normalized.push_str(&filter[copied_until..]);
    normalized
}

/// Percent-encode like a URI component encoder: everything except
/// `A-Z a-z 0-9 - _ . ! ~ * ' ( )` is escaped
pub fn encode_component(value: &str) -> String {
    urlencoding::encode(value)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}

/// Normalize then encode a `$filter` value
pub fn render_filter(filter: &str) -> String {
    encode_component(&normalize_guids(filter))
}

fn is_braced_guid(bytes: &[u8]) -> bool {
    if bytes.len() < 38 || bytes[0] != b'{' || bytes[37] != b'}' {
        return false;
    }
    bytes[1..37].iter().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => *b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}
