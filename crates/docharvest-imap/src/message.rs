//! Fully parsed messages and their attachment buffers.

use async_imap::imap_proto::types::Envelope;
use chrono::{DateTime, Utc};
use mail_parser::{Message, MessageParser, MimeHeaders};

use crate::session::MessageRef;
use crate::{Error, Result};

/// An attachment extracted from a fully fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAttachment {
    /// Declared filename, if the part carried one.
    pub filename: Option<String>,
    /// Declared content type (`type/subtype`, lowercased).
    pub content_type: String,
    /// Decoded content.
    pub data: Vec<u8>,
}

/// Sender, subject and date of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    /// Sender display name, if present.
    pub sender_name: Option<String>,
    /// Sender address, if present.
    pub sender_email: Option<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// Date header.
    pub date: Option<DateTime<Utc>>,
}

impl MessageHeaders {
    /// Decodes the headers carried by an IMAP `ENVELOPE`.
    ///
    /// The envelope fields are reassembled into a header block and parsed
    /// like a full message, so encoded words and dates decode the same way.
    #[must_use]
    pub fn from_envelope(envelope: &Envelope<'_>) -> Self {
        let mut block = Vec::new();

        if let Some(subject) = envelope.subject.as_deref() {
            push_header(&mut block, b"Subject", subject);
        }
        if let Some(date) = envelope.date.as_deref() {
            push_header(&mut block, b"Date", date);
        }
        if let Some(from) = envelope.from.as_ref().and_then(|list| list.first()) {
            let mut value = Vec::new();
            if let Some(name) = from.name.as_deref() {
                value.push(b'"');
                value.extend(name.iter().filter(|b| **b != b'"'));
                value.extend_from_slice(b"\" ");
            }
            if let (Some(mailbox), Some(host)) = (from.mailbox.as_deref(), from.host.as_deref()) {
                value.push(b'<');
                value.extend_from_slice(mailbox);
                value.push(b'@');
                value.extend_from_slice(host);
                value.push(b'>');
            }
            push_header(&mut block, b"From", &value);
        }

        if block.is_empty() {
            return Self::default();
        }
        block.extend_from_slice(b"\r\n");

        MessageParser::default()
            .parse(&block)
            .map(|message| headers_of(&message))
            .unwrap_or_default()
    }
}

/// A fully fetched and parsed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Identifier the message was fetched with.
    pub id: MessageRef,
    /// Sender, subject and date.
    pub headers: MessageHeaders,
    /// Plain-text body.
    pub body_text: Option<String>,
    /// Attachments in MIME order.
    pub attachments: Vec<ParsedAttachment>,
}

/// Parses a raw RFC 5322 message.
///
/// # Errors
///
/// Returns `Error::Protocol` if the bytes are not a parseable message.
pub fn parse_message(id: MessageRef, raw: &[u8]) -> Result<ParsedMessage> {
    if raw.is_empty() {
        return Err(Error::Protocol(format!("message {id} has an empty body")));
    }

    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Protocol(format!("message {id} could not be parsed")))?;

    let attachments = message
        .attachments()
        .map(|part| ParsedAttachment {
            filename: part.attachment_name().map(str::to_string),
            content_type: part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{sub}", ct.ctype()),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string())
                .to_ascii_lowercase(),
            data: part.contents().to_vec(),
        })
        .collect();

    Ok(ParsedMessage {
        id,
        headers: headers_of(&message),
        body_text: message.body_text(0).map(|text| text.into_owned()),
        attachments,
    })
}

fn headers_of(message: &Message<'_>) -> MessageHeaders {
    let sender = message.from().and_then(|addr| addr.first());

    MessageHeaders {
        sender_name: sender.and_then(|a| a.name()).map(str::to_string),
        sender_email: sender.and_then(|a| a.address()).map(str::to_string),
        subject: message.subject().map(str::to_string),
        date: message
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
    }
}

fn push_header(block: &mut Vec<u8>, name: &[u8], value: &[u8]) {
    block.extend_from_slice(name);
    block.extend_from_slice(b": ");
    block.extend_from_slice(value);
    block.extend_from_slice(b"\r\n");
}
