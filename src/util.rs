use base64::Engine;

/// Strip a `data:image/...;base64,` prefix if present and return the payload.
pub fn parse_data_uri(input: &str) -> Option<String> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(rest) = s.strip_prefix("data:") {
        // data:image/png;base64,....
        let (_, b64) = rest.split_once(',')?;
        return Some(b64.trim().to_string());
    }
    // assume plain base64
    Some(s.to_string())
}

pub fn b64_decode(input: &str) -> Option<Vec<u8>> {
    let b64 = parse_data_uri(input)?;
    let engine = base64::engine::general_purpose::STANDARD;
    engine.decode(b64.as_bytes()).ok()
}

pub fn truncate_with_ellipsis(mut s: String, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s;
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let cut = s
        .char_indices()
        .nth(max_len - 3)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s.truncate(cut);
    s.push_str("...");
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_prefix_is_stripped() {
        assert_eq!(
            parse_data_uri("data:image/png;base64,aGVsbG8=").as_deref(),
            Some("aGVsbG8=")
        );
    }

    #[test]
    fn bare_base64_passes_through() {
        assert_eq!(b64_decode("aGVsbG8=").as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn empty_and_garbage_inputs_fail() {
        assert!(b64_decode("").is_none());
        assert!(b64_decode("data:image/png;base64,!!!not-base64!!!").is_none());
    }

    #[test]
    fn truncation_keeps_short_strings() {
        assert_eq!(truncate_with_ellipsis("MARIA SANTOS".into(), 20), "MARIA SANTOS");
        assert_eq!(
            truncate_with_ellipsis("A VERY LONG NAME THAT OVERFLOWS".into(), 20),
            "A VERY LONG NAME ..."
        );
    }
}
