// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use base64::{Engine, engine::general_purpose::STANDARD};

/// Formats `value` as lowercase hex, zero-padded to at least eight digits.
///
/// The service uses this as the action path of a test step.
pub fn to_eight_digit_hex(value: u64) -> String {
    format!("{value:08x}")
}

/// Turns a test title into a file name by replacing each run of whitespace with `_`.
pub(crate) fn screenshot_file_name(title: &str) -> String {
    let mut out = String::with_capacity(title.len() + 4);
    let mut in_whitespace = false;
    for c in title.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
        } else {
            // Path separators would escape the screenshot directory.
            out.push(if c == '/' || c == '\\' { '-' } else { c });
            in_whitespace = false;
        }
    }
    out.push_str(".png");
    out
}

/// The `Authorization` header value for a personal access token.
pub(crate) fn basic_auth_header(pat: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!(":{pat}")))
}

/// Percent-encodes `segment` for use in a URL path. Every byte outside the unreserved set
/// (`A-Z a-z 0-9 - . _ ~`) is escaped, so non-ASCII names are sent as escaped UTF-8.
pub(crate) fn encode_path_segment(segment: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push('%');
            out.push(char::from(HEX[usize::from(byte >> 4)]));
            out.push(char::from(HEX[usize::from(byte & 0xf)]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_eight_digit_hex() {
        let tests: &[(u64, &str)] = &[
            (0, "00000000"),
            (1, "00000001"),
            (2, "00000002"),
            (255, "000000ff"),
            (0xdead_beef, "deadbeef"),
            (0xffff_ffff, "ffffffff"),
            (0x1_0000_0000, "100000000"),
        ];

        for (input, output) in tests {
            assert_eq!(to_eight_digit_hex(*input), *output, "for input {input}");
        }
    }

    #[test]
    fn test_eight_digit_hex_is_fixed_width() {
        for value in [0, 7, 16, 4096, 65_536, 0x00ff_ffff, 0xffff_ffff] {
            assert_eq!(to_eight_digit_hex(value).len(), 8, "for value {value}");
        }
    }

    #[test]
    fn test_screenshot_file_name() {
        let tests: &[(&str, &str)] = &[
            ("C42 logs in", "C42_logs_in.png"),
            ("C42  logs\tin ", "C42_logs_in_.png"),
            ("a/b\\c", "a-b-c.png"),
            ("", ".png"),
        ];

        for (input, output) in tests {
            assert_eq!(screenshot_file_name(input), *output, "for input {input:?}");
        }
    }

    #[test]
    fn test_basic_auth_header() {
        // base64(":secret")
        assert_eq!(basic_auth_header("secret"), "Basic OnNlY3JldA==");
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("My Project"), "My%20Project");
        assert_eq!(encode_path_segment("contoso"), "contoso");
        assert_eq!(encode_path_segment("a#b?c"), "a%23b%3Fc");
        assert_eq!(encode_path_segment("R&D+QA [eu]"), "R%26D%2BQA%20%5Beu%5D");
        assert_eq!(encode_path_segment("Café"), "Caf%C3%A9");
        assert_eq!(encode_path_segment("team-1.x_y~z"), "team-1.x_y~z");
    }
}
