// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use once_cell::sync::Lazy;
use regex::Regex;

/// Output beyond this is truncated before it ever reaches a WebSocket client. A pathological
/// submission looping on `print` should not be able to blow up a browser tab or the KVS entry
/// that carries the result.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;
const TRUNCATION_NOTICE: &str = "\n... [output truncated]";

static ABSOLUTE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:/sandbox|/home/\w+|/root|/tmp/[\w.\-]+)(?:/[\w.\-]+)*").unwrap());
static IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap());
static HEX_BLOB: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9a-fA-F]{16,}\b").unwrap());

/// Strips container-internal detail out of captured stdout/stderr before it is shown to a
/// browser: control characters that don't render sanely in a terminal widget, absolute
/// filesystem paths that leak the sandbox's internal layout, anything IPv4-shaped even though
/// the sandbox has no network, and long hex blobs (memory addresses, pointers) that are never
/// meaningful to a submitter and are occasionally someone's attempt to smuggle out container
/// internals via a crash dump.
pub fn sanitize_output(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let stripped: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let stripped = ABSOLUTE_PATH.replace_all(&stripped, "<path>");
    let stripped = IPV4.replace_all(&stripped, "<ip>");
    let stripped = HEX_BLOB.replace_all(&stripped, "<hex>");

    if stripped.len() <= MAX_OUTPUT_BYTES {
        stripped.into_owned()
    } else {
        let mut truncated = stripped[..MAX_OUTPUT_BYTES].to_owned();
        while !truncated.is_char_boundary(truncated.len()) {
            truncated.pop();
        }
        truncated.push_str(TRUNCATION_NOTICE);
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters_but_keeps_newlines() {
        let out = sanitize_output(b"hello\x07world\nsecond line");
        assert_eq!(out, "helloworld\nsecond line");
    }

    #[test]
    fn redacts_absolute_sandbox_paths() {
        let out = sanitize_output(b"Traceback: /sandbox/main.py line 3");
        assert!(out.contains("<path>"));
        assert!(!out.contains("/sandbox/main.py"));
    }

    #[test]
    fn redacts_ipv4_looking_tokens() {
        let out = sanitize_output(b"connecting to 10.0.0.5 failed");
        assert_eq!(out, "connecting to <ip> failed");
    }

    #[test]
    fn truncates_past_the_byte_budget() {
        let huge = vec![b'a'; MAX_OUTPUT_BYTES + 100];
        let out = sanitize_output(&huge);
        assert!(out.ends_with(TRUNCATION_NOTICE));
        assert!(out.len() < huge.len());
    }
}
