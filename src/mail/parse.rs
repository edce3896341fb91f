use mailparse::{MailAddr, MailHeaderMap, ParsedMail};

use crate::error::StoreError;
use crate::mail::{Message, MessageId};

const HTML_WRAP_WIDTH: usize = 100;

/// Builds a [`Message`] from a raw RFC 822 payload.
pub fn parse_message(id: MessageId, raw: &[u8]) -> Result<Message, StoreError> {
    let parsed = mailparse::parse_mail(raw).map_err(|e| StoreError::Parse {
        id,
        reason: e.to_string(),
    })?;

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    Ok(Message {
        id,
        subject,
        senders: senders(&parsed),
        body: extract_body(&parsed),
    })
}

fn senders(m: &ParsedMail) -> Vec<String> {
    let Some(header) = m.headers.get_first_header("From") else {
        return vec![];
    };

    match mailparse::addrparse_header(header) {
        Ok(list) => {
            let mut out = Vec::new();
            for addr in list.iter() {
                match addr {
                    MailAddr::Single(info) => out.push(info.addr.clone()),
                    MailAddr::Group(group) => {
                        out.extend(group.addrs.iter().map(|info| info.addr.clone()))
                    }
                }
            }
            out
        }
        // unparseable address list: keep whatever text was there
        Err(_) => {
            let raw = header.get_value();
            let raw = raw.trim();
            if raw.is_empty() {
                vec![]
            } else {
                vec![raw.to_string()]
            }
        }
    }
}

/// Plain text parts joined, or the HTML parts rendered as text when the
/// message carries no plain part.
pub fn extract_body(m: &ParsedMail) -> String {
    let plain = collect_parts(m, "text/plain");
    if !plain.trim().is_empty() {
        return plain;
    }

    let html = collect_parts(m, "text/html");
    if html.trim().is_empty() {
        return String::new();
    }

    html2text::from_read(html.as_bytes(), HTML_WRAP_WIDTH).unwrap_or(html)
}

fn collect_parts(m: &ParsedMail, mimetype: &str) -> String {
    if !m.subparts.is_empty() {
        let mut out = String::new();
        for sp in &m.subparts {
            let t = collect_parts(sp, mimetype);
            if !t.trim().is_empty() {
                if !out.is_empty() {
                    out.push_str("\n\n");
                }
                out.push_str(&t);
            }
        }
        return out;
    }

    if m.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
        if let Ok(body) = m.get_body() {
            return body;
        }
    }

    String::new()
}
