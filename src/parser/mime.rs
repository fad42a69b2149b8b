//! MIME body decoding and flattening.
//!
//! A raw message is decoded into a [`Body`] tree once, then flattened into
//! its leaf parts in document order.

use std::collections::BTreeMap;

use mail_parser::decoders::base64::base64_decode;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{Encoding, MessageParser, MimeHeaders, PartType};

use crate::error::{Result, SyncError};
use crate::model::message::Body;
use crate::parser::mbox::skip_from_line;

/// Maximum depth for recursive multipart parsing (to prevent stack overflow on adversarial input).
const MAX_DEPTH: usize = 32;

/// Content type assumed for parts without a usable `Content-Type` header.
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Decode a raw message (with or without its `From ` line) into a body tree.
///
/// Leaves carry their transfer-decoded content: base64 and quoted-printable
/// are removed, but text stays in its declared charset. Multipart containers and embedded
/// `message/rfc822` parts become [`Body::Composite`] nodes.
pub fn parse_body(raw_message: &[u8]) -> Result<Body> {
    let message_bytes = skip_from_line(raw_message);
    let msg = MessageParser::default()
        .parse(message_bytes)
        .ok_or_else(|| SyncError::Decode("message could not be parsed".into()))?;
    message_body(&msg, 0)
}

/// Body tree of a (possibly embedded) message, starting at its root part.
fn message_body(msg: &mail_parser::Message<'_>, depth: usize) -> Result<Body> {
    if msg.parts.is_empty() {
        return Err(SyncError::Decode("message has no parts".into()));
    }
    part_body(msg, 0, depth)
}

fn part_body(msg: &mail_parser::Message<'_>, part_id: usize, depth: usize) -> Result<Body> {
    if depth > MAX_DEPTH {
        return Err(SyncError::Decode(format!(
            "MIME nesting deeper than {MAX_DEPTH} levels"
        )));
    }
    let part = msg
        .parts
        .get(part_id)
        .ok_or_else(|| SyncError::Decode(format!("dangling MIME part reference {part_id}")))?;

    match &part.body {
        PartType::Multipart(children) => {
            let parts = children
                .iter()
                .map(|&child| part_body(msg, child, depth + 1))
                .collect::<Result<Vec<_>>>()?;
            Ok(Body::composite(parts))
        }
        PartType::Message(inner) => Ok(Body::composite(vec![message_body(inner, depth + 1)?])),
        PartType::Text(_) | PartType::Html(_) | PartType::Binary(_) | PartType::InlineBinary(_)
            if part.is_encoding_problem =>
        {
            Err(SyncError::Decode(format!(
                "part {part_id} ({}) has a broken transfer encoding",
                content_type_of(part)
            )))
        }
        PartType::Text(_) | PartType::Html(_) => Ok(Body::leaf(
            content_type_of(part),
            transfer_decoded(msg, part, part_id)?,
        )),
        PartType::Binary(_) | PartType::InlineBinary(_) => {
            Ok(Body::leaf(content_type_of(part), part.contents()))
        }
    }
}

/// Body bytes of a text part with only the transfer encoding removed.
///
/// mail-parser converts text parts to UTF-8, so the payload is decoded again
/// from the raw message to keep the bytes in their declared charset.
fn transfer_decoded(
    msg: &mail_parser::Message<'_>,
    part: &mail_parser::MessagePart<'_>,
    part_id: usize,
) -> Result<Vec<u8>> {
    let raw = msg
        .raw_message
        .get(part.offset_body..part.offset_end)
        .ok_or_else(|| SyncError::Decode(format!("part {part_id} has no body bytes")))?;
    let decoded = match part.encoding {
        Encoding::None => Some(raw.to_vec()),
        Encoding::Base64 => base64_decode(raw),
        Encoding::QuotedPrintable => quoted_printable_decode(raw),
    };
    decoded.ok_or_else(|| {
        SyncError::Decode(format!(
            "part {part_id} ({}) has a broken transfer encoding",
            content_type_of(part)
        ))
    })
}

/// Lowercase `type/subtype` of a part, defaulting to `text/plain`.
fn content_type_of(part: &mail_parser::MessagePart<'_>) -> String {
    part.content_type()
        .and_then(|ct| {
            ct.subtype()
                .map(|sub| format!("{}/{}", ct.ctype(), sub).to_lowercase())
        })
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

/// Flatten a body tree into its leaves, pre-order and left to right.
pub fn flatten(body: &Body) -> Vec<(&str, &[u8])> {
    let mut out = Vec::new();
    collect_leaves(body, &mut out);
    out
}

fn collect_leaves<'a>(body: &'a Body, out: &mut Vec<(&'a str, &'a [u8])>) {
    match body {
        Body::Leaf {
            content_type,
            bytes,
        } => out.push((content_type.as_str(), bytes.as_slice())),
        Body::Composite { parts } => {
            for part in parts {
                collect_leaves(part, out);
            }
        }
    }
}

/// Text leaves keyed by content type (`text/plain`, `text/html`, …).
///
/// When a content type occurs more than once, the last occurrence wins.
pub fn text_payloads(body: &Body) -> BTreeMap<&str, &[u8]> {
    flatten(body)
        .into_iter()
        .filter(|(content_type, _)| content_type.starts_with("text"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALTERNATIVE: &[u8] = b"From: shop@example.com\r\n\
Subject: Order\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
plain body\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>html body</p>\r\n\
--b1--\r\n";

    const NESTED: &[u8] = b"From: shop@example.com\r\n\
Subject: Order\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain\r\n\
\r\n\
nested plain\r\n\
--inner\r\n\
Content-Type: text/html\r\n\
\r\n\
<b>nested html</b>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--outer--\r\n";

    #[test]
    fn test_flatten_single_leaf() {
        let body = Body::leaf("text/plain", b"hello".to_vec());
        let leaves = flatten(&body);
        assert_eq!(leaves, vec![("text/plain", &b"hello"[..])]);
    }

    #[test]
    fn test_flatten_preorder() {
        let body = Body::composite(vec![
            Body::leaf("text/plain", b"1".to_vec()),
            Body::composite(vec![
                Body::leaf("text/html", b"2".to_vec()),
                Body::leaf("image/png", b"3".to_vec()),
            ]),
            Body::leaf("application/pdf", b"4".to_vec()),
        ]);
        let order: Vec<&[u8]> = flatten(&body).into_iter().map(|(_, b)| b).collect();
        assert_eq!(order, vec![&b"1"[..], b"2", b"3", b"4"]);
    }

    #[test]
    fn test_flatten_empty_composite() {
        assert!(flatten(&Body::composite(Vec::new())).is_empty());
    }

    #[test]
    fn test_text_payloads_last_wins() {
        let body = Body::composite(vec![
            Body::leaf("text/plain", b"first".to_vec()),
            Body::leaf("image/png", b"png".to_vec()),
            Body::leaf("text/plain", b"second".to_vec()),
        ]);
        let payloads = text_payloads(&body);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads["text/plain"], b"second");
    }

    #[test]
    fn test_parse_single_part() {
        let raw = b"From someone@example.com Sat Jan 02 03:04:05 2021\nFrom: a@b.com\nSubject: Hi\n\nHello";
        let body = parse_body(raw).unwrap();
        match body {
            Body::Leaf {
                content_type,
                bytes,
            } => {
                assert_eq!(content_type, "text/plain");
                assert_eq!(bytes, b"Hello");
            }
            other => panic!("expected a leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_alternative() {
        let body = parse_body(ALTERNATIVE).unwrap();
        let leaves = flatten(&body);
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].0, "text/plain");
        assert_eq!(leaves[1].0, "text/html");

        let payloads = text_payloads(&body);
        let plain = String::from_utf8_lossy(payloads["text/plain"]);
        let html = String::from_utf8_lossy(payloads["text/html"]);
        assert_eq!(plain.trim_end(), "plain body");
        assert_eq!(html.trim_end(), "<p>html body</p>");
    }

    #[test]
    fn test_parse_nested_multipart() {
        let body = parse_body(NESTED).unwrap();
        let types: Vec<&str> = flatten(&body).into_iter().map(|(ct, _)| ct).collect();
        assert_eq!(types, vec!["text/plain", "text/html", "application/pdf"]);

        let leaves = flatten(&body);
        assert_eq!(leaves[2].1, b"%PDF-");

        let payloads = text_payloads(&body);
        assert_eq!(payloads.len(), 2);
        assert!(String::from_utf8_lossy(payloads["text/html"]).contains("nested html"));
    }

    #[test]
    fn test_8bit_text_keeps_declared_charset() {
        let raw = b"From: a@b.com\nContent-Type: text/plain; charset=iso-8859-1\nContent-Transfer-Encoding: 8bit\n\nCaf\xe9\n";
        let body = parse_body(raw).unwrap();
        assert_eq!(text_payloads(&body)["text/plain"], b"Caf\xe9\n");
    }

    #[test]
    fn test_base64_text_keeps_declared_charset() {
        // "Caf\xe9 \x80 5" in windows-1252
        let raw = b"From: a@b.com\nContent-Type: text/plain; charset=windows-1252\nContent-Transfer-Encoding: base64\n\nQ2Fm6SCAIDU=\n";
        let body = parse_body(raw).unwrap();
        assert_eq!(text_payloads(&body)["text/plain"], b"Caf\xe9 \x80 5");
    }

    #[test]
    fn test_quoted_printable_text_in_multipart() {
        let raw = b"From: a@b.com\n\
MIME-Version: 1.0\n\
Content-Type: multipart/alternative; boundary=\"q\"\n\
\n\
--q\n\
Content-Type: text/plain; charset=iso-8859-1\n\
Content-Transfer-Encoding: quoted-printable\n\
\n\
Total: 5 =80 caf=E9=\n\
!\n\
--q\n\
Content-Type: text/html; charset=iso-8859-1\n\
\n\
<p>caf\xe9</p>\n\
--q--\n";
        let body = parse_body(raw).unwrap();
        let payloads = text_payloads(&body);
        assert_eq!(payloads["text/plain"], b"Total: 5 \x80 caf\xe9!");
        assert_eq!(payloads["text/html"], b"<p>caf\xe9</p>");
    }

    #[test]
    fn test_content_type_is_lowercased() {
        let raw = b"From: a@b.com\nContent-Type: TEXT/HTML\n\n<p>x</p>";
        let body = parse_body(raw).unwrap();
        assert_eq!(flatten(&body)[0].0, "text/html");
    }
}
