//! Just enough `multipart/form-data` to pull one file field out of a body.

use anyhow::{anyhow, Result};

#[derive(Debug, PartialEq, Eq)]
pub struct FilePart<'a> {
    /// `filename` from the part's Content-Disposition, if present.
    pub filename: Option<String>,
    pub data: &'a [u8],
}

/// Boundary parameter of a multipart content type, if it is one.
pub fn boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Find the part named `field`. `Ok(None)` when the body has no such part.
pub fn find_file<'a>(body: &'a [u8], boundary: &str, field: &str) -> Result<Option<FilePart<'a>>> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut rest = match find(body, &delimiter) {
        Some(pos) => &body[pos + delimiter.len()..],
        None => return Err(anyhow!("multipart body has no boundary")),
    };

    loop {
        if rest.starts_with(b"--") {
            return Ok(None);
        }
        let rest_after_crlf = rest.strip_prefix(b"\r\n").unwrap_or(rest);
        let head_end = find(rest_after_crlf, b"\r\n\r\n")
            .ok_or_else(|| anyhow!("multipart part has no header terminator"))?;
        let head = String::from_utf8_lossy(&rest_after_crlf[..head_end]);
        let content = &rest_after_crlf[head_end + 4..];

        let mut closing = b"\r\n".to_vec();
        closing.extend_from_slice(&delimiter);
        let end = find(content, &closing)
            .ok_or_else(|| anyhow!("multipart part is not terminated"))?;
        let data = &content[..end];

        if let Some((name, filename)) = disposition(&head) {
            if name == field {
                return Ok(Some(FilePart { filename, data }));
            }
        }
        rest = &content[end + closing.len()..];
    }
}

/// `(name, filename)` from a part's Content-Disposition header.
fn disposition(head: &str) -> Option<(String, Option<String>)> {
    let line = head.split("\r\n").find(|line| {
        line.split_once(':')
            .is_some_and(|(k, _)| k.trim().eq_ignore_ascii_case("content-disposition"))
    })?;
    let (_, value) = line.split_once(':')?;
    let mut name = None;
    let mut filename = None;
    for param in value.split(';').skip(1) {
        if let Some((key, val)) = param.split_once('=') {
            let val = val.trim().trim_matches('"').to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => name = Some(val),
                "filename" => filename = Some(val),
                _ => {}
            }
        }
    }
    Some((name?, filename))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(b"--XyZ\r\n");
            let disposition = match filename {
                Some(f) => format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n"
                ),
                None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"--XyZ--\r\n");
        body
    }

    #[test]
    fn boundary_is_read_from_content_type() {
        assert_eq!(
            boundary("multipart/form-data; boundary=\"XyZ\"").as_deref(),
            Some("XyZ")
        );
        assert_eq!(boundary("image/png"), None);
    }

    #[test]
    fn file_field_is_found_among_others() -> Result<()> {
        let body = form(&[
            ("note", None, &b"hi"[..]),
            ("file", Some("cat.png"), &b"\x89PNG\r\n\x1a\nrest"[..]),
        ]);
        let part = find_file(&body, "XyZ", "file")?.expect("file part");
        assert_eq!(part.filename.as_deref(), Some("cat.png"));
        assert_eq!(part.data, b"\x89PNG\r\n\x1a\nrest");
        Ok(())
    }

    #[test]
    fn missing_field_and_empty_filename() -> Result<()> {
        let body = form(&[("note", None, &b"hi"[..])]);
        assert!(find_file(&body, "XyZ", "file")?.is_none());

        let body = form(&[("file", Some(""), &b""[..])]);
        let part = find_file(&body, "XyZ", "file")?.expect("file part");
        assert_eq!(part.filename.as_deref(), Some(""));
        assert!(part.data.is_empty());
        Ok(())
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(find_file(b"no boundary here", "XyZ", "file").is_err());
    }
}
