// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Escape sequence decoding for obfuscated commands
//!
//! Decodes `\xHH` byte escapes and `\uHHHH` code point escapes the way a
//! shell `printf` or `echo -e` would expand them, so the decoded text can be
//! run through the literal catalog.
//!
//! # Architecture
//! Each escape form is a small nom parser. The decoder walks the input,
//! trying the escape parser at every position and copying everything else
//! through unchanged. It is single-pass: an escape that decodes into another
//! escape is not expanded again.

use nom::{
    bytes::complete::{tag, take_while_m_n},
    combinator::map_res,
    sequence::preceded,
    IResult, Parser,
};

/// Parses `\xHH` into the byte it names
fn hex_escape(input: &str) -> IResult<&str, u8> {
    map_res(
        preceded(
            tag("\\x"),
            take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        ),
        |digits: &str| u8::from_str_radix(digits, 16),
    )
    .parse(input)
}

/// Parses `\uHHHH` into a code point (not yet validated as a `char`)
fn unicode_escape(input: &str) -> IResult<&str, u32> {
    map_res(
        preceded(
            tag("\\u"),
            take_while_m_n(4, 4, |c: char| c.is_ascii_hexdigit()),
        ),
        |digits: &str| u32::from_str_radix(digits, 16),
    )
    .parse(input)
}

/// Replaces every `\xHH` escape with its byte
///
/// Returns `None` when the input holds no hex escape. Decoded bytes that do
/// not form valid UTF-8 are replaced with U+FFFD.
///
/// # Examples
///
/// ```
/// use shellwarden::filter::escapes::decode_hex_escapes;
///
/// assert_eq!(decode_hex_escapes(r"\x72\x6d -rf"), Some("rm -rf".to_string()));
/// assert_eq!(decode_hex_escapes("plain text"), None);
/// ```
pub fn decode_hex_escapes(input: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(input.len());
    let mut rest = input;
    let mut decoded_any = false;

    while let Some(ch) = rest.chars().next() {
        if let Ok((next, byte)) = hex_escape(rest) {
            bytes.push(byte);
            decoded_any = true;
            rest = next;
            continue;
        }

        let mut buf = [0u8; 4];
        bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        rest = &rest[ch.len_utf8()..];
    }

    decoded_any.then(|| String::from_utf8_lossy(&bytes).into_owned())
}

/// Replaces every `\uHHHH` escape with its character
///
/// Returns `None` when no escape decodes to a valid `char`. An escape naming
/// a surrogate is copied through verbatim, like an incomplete one, so the
/// escapes around it still decode.
///
/// # Examples
///
/// ```
/// use shellwarden::filter::escapes::decode_unicode_escapes;
///
/// assert_eq!(decode_unicode_escapes(r"\ud800\u0072\u006d"), Some(r"\ud800rm".to_string()));
/// assert_eq!(decode_unicode_escapes(r"\ud800"), None);
/// ```
pub fn decode_unicode_escapes(input: &str) -> Option<String> {
    let mut decoded = String::with_capacity(input.len());
    let mut rest = input;
    let mut decoded_any = false;

    while let Some(ch) = rest.chars().next() {
        if let Ok((next, code_point)) = unicode_escape(rest) {
            match char::from_u32(code_point) {
                Some(c) => {
                    decoded.push(c);
                    decoded_any = true;
                }
                None => decoded.push_str(&rest[..rest.len() - next.len()]),
            }
            rest = next;
            continue;
        }

        decoded.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    decoded_any.then_some(decoded)
}
