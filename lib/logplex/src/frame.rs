//! Syslog framing for logplex batches

use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;

/// Append one octet-counted syslog message to `buf`:
/// `<len> <PRI>1 <timestamp> <host> <token> <procid> <msgid> - <body>`
#[allow(clippy::too_many_arguments)]
pub fn frame_message(
    buf: &mut Vec<u8>,
    priority: u8,
    time: DateTime<Utc>,
    host: &str,
    token: &str,
    procid: &str,
    msgid: &str,
    body: &[u8],
) {
    let header = format!(
        "<{}>1 {} {} {} {} {} - ",
        priority,
        time.to_rfc3339_opts(SecondsFormat::Micros, false),
        host,
        token,
        procid,
        msgid,
    );
    let len = header.len() + body.len();

    // Writes into a Vec cannot fail.
    let _ = write!(buf, "{} {}", len, header);
    buf.extend_from_slice(body);
}
