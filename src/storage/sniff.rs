use crate::types::error::StorageError;
use std::io::Cursor;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, Chain};

/// Maximum number of bytes inspected when sniffing content
pub const SNIFF_LEN: usize = 512;

const OCTET_STREAM: &str = "application/octet-stream";

/// The peeked prefix followed by the rest of the original reader
pub type Peeked<R> = Chain<Cursor<Vec<u8>>, R>;

/// Media types callers store most often
const MEDIA_TYPES: &[(&str, &str)] = &[
    ("ts", "video/mp2t"),
    ("m3u8", "application/x-mpegURL"),
    ("mp4", "video/mp4"),
    ("m4s", "video/iso.segment"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("mp3", "audio/mpeg"),
    ("aac", "audio/aac"),
    ("json", "application/json"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
];

/// Classify `data` without losing any of its bytes.
///
/// Up to [`SNIFF_LEN`] bytes are read ahead; a short or empty stream is fine.
/// The returned reader yields exactly the bytes `data` would have produced.
pub async fn peek_content_type<R>(
    file_name: &str,
    mut data: R,
) -> Result<(Peeked<R>, String), StorageError>
where
    R: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut data)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await?;

    let content_type = type_by_extension(file_name).unwrap_or_else(|| detect_content_type(&head));
    tracing::debug!(
        "Detected content type {} for {} ({} bytes peeked)",
        content_type,
        file_name,
        head.len()
    );

    Ok((Cursor::new(head).chain(data), content_type))
}

/// Look up a MIME type from the file name's extension
pub fn type_by_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();

    MEDIA_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| mime.to_string())
        .or_else(|| mime_guess::from_ext(&ext).first().map(|m| m.to_string()))
}

/// Guess a MIME type from leading magic bytes
pub fn detect_content_type(head: &[u8]) -> String {
    let head = &head[..head.len().min(SNIFF_LEN)];

    let signatures: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b\x08", "application/x-gzip"),
        (b"OggS\x00", "application/ogg"),
        (b"\x1a\x45\xdf\xa3", "video/webm"),
        (b"ID3", "audio/mpeg"),
        (b"#EXTM3U", "application/x-mpegURL"),
    ];
    if let Some((_, mime)) = signatures.iter().find(|(magic, _)| head.starts_with(magic)) {
        return mime.to_string();
    }

    if head.len() >= 12 && head.starts_with(b"RIFF") {
        match &head[8..12] {
            b"WEBP" => return "image/webp".to_string(),
            b"WAVE" => return "audio/wave".to_string(),
            b"AVI " => return "video/avi".to_string(),
            _ => {}
        }
    }

    if head.len() >= 8 && &head[4..8] == b"ftyp" {
        return "video/mp4".to_string();
    }

    // MPEG transport stream: sync byte every 188 bytes
    if head.len() > 188 && head[0] == 0x47 && head[188] == 0x47 {
        return "video/mp2t".to_string();
    }

    let text = trim_leading_whitespace(head);
    if starts_with_ignore_case(text, b"<!doctype html") || starts_with_ignore_case(text, b"<html") {
        return "text/html; charset=utf-8".to_string();
    }
    if text.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8".to_string();
    }

    if !head.is_empty() && is_text(head) {
        return "text/plain; charset=utf-8".to_string();
    }

    OCTET_STREAM.to_string()
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    &data[start..]
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// UTF-8 without control bytes. A multi-byte sequence cut off at the end
/// of the peek window still counts as text.
fn is_text(data: &[u8]) -> bool {
    let valid = match std::str::from_utf8(data) {
        Ok(s) => s,
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&data[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return false,
    };
    valid
        .chars()
        .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t' | '\x0c'))
}
