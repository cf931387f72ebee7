//! Filename and content-type resolution for downloaded artifacts.
//!
//! Filename precedence: the response's `Content-Disposition`, then the
//! artifact's declared filename, then `{job_id}_{artifact_id}.{ext}`.
//! Content-type precedence: the response's `Content-Type`, then the MIME type
//! of the artifact's declared format. Every filename, whatever its source, is
//! sanitized before it touches the filesystem.

use std::path::{Component, Path, PathBuf};

use crate::job::ArtifactRef;
use crate::request::OutputFormat;

/// Used when sanitizing leaves nothing usable.
const FALLBACK_FILENAME: &str = "visual.bin";

/// Longest filename kept, in bytes. Leaves room under the common 255-byte
/// limit for the `.{name}.{tag}.part` download name and a `_N` suffix.
pub(crate) const MAX_FILENAME_BYTES: usize = 230;

/// Resolves the filename for an artifact download.
pub(crate) fn resolve_filename(disposition: Option<&str>, artifact: &ArtifactRef) -> String {
    disposition
        .and_then(parse_content_disposition)
        .or_else(|| artifact.filename.clone())
        .map(|name| sanitize_filename(&name))
        .filter(|name| is_usable(name))
        .unwrap_or_else(|| synthesize_filename(&artifact.job_id, &artifact.id, artifact.format))
}

/// Resolves the content type for an artifact download.
pub(crate) fn resolve_content_type(header: Option<&str>, format: OutputFormat) -> String {
    header
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .map_or_else(|| format.mime_type().to_string(), str::to_ascii_lowercase)
}

/// Builds `{job_id}_{artifact_id}.{ext}` for artifacts with no other name.
pub(crate) fn synthesize_filename(job_id: &str, artifact_id: &str, format: OutputFormat) -> String {
    let name = sanitize_filename(&format!("{job_id}_{artifact_id}.{}", format.extension()));
    if is_usable(&name) {
        name
    } else {
        FALLBACK_FILENAME.to_string()
    }
}

/// Parses a `Content-Disposition` header value to extract the filename.
///
/// Handles both:
/// - `attachment; filename="visual.svg"` and `attachment; filename=visual.svg`
/// - `attachment; filename*=UTF-8''caf%C3%A9.svg` (RFC 5987), which wins
///   when both forms are present
///
/// Parameter names match case-insensitively.
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets valid for `header`.
    let lowered = header.to_ascii_lowercase();

    if let Some(pos) = lowered.find("filename*=") {
        let value = header[pos + 10..].trim_start();
        let end = value.find(';').unwrap_or(value.len());
        let value = value[..end].trim().trim_matches('"');
        // Format: charset'language'encoded_value
        if let Some(quote_pos) = value.find('\'')
            && let Some(second) = value[quote_pos + 1..].find('\'')
        {
            let charset = &value[..quote_pos];
            let encoded = &value[quote_pos + 1 + second + 1..];
            if let Some(decoded) = decode_extended_value(charset, encoded)
                && !decoded.trim().is_empty()
            {
                return Some(decoded);
            }
        }
    }

    let mut search_from = 0;
    while let Some(offset) = lowered[search_from..].find("filename=") {
        let pos = search_from + offset;
        search_from = pos + 9;
        // Skip matches inside a longer parameter name such as `xfilename=`.
        if pos > 0
            && lowered[..pos]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric())
        {
            continue;
        }

        let value = header[pos + 9..].trim_start();
        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                let name = &stripped[..end];
                if !name.trim().is_empty() {
                    return Some(name.to_string());
                }
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let name = value[..end].trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
        break;
    }

    None
}

fn decode_extended_value(charset: &str, encoded: &str) -> Option<String> {
    if charset.eq_ignore_ascii_case("utf-8") || charset.is_empty() {
        return urlencoding::decode(encoded).ok().map(|s| s.into_owned());
    }
    if charset.eq_ignore_ascii_case("iso-8859-1") {
        // Latin-1 bytes map one-to-one onto the first 256 code points.
        let bytes = urlencoding::decode_binary(encoded.as_bytes());
        return Some(bytes.iter().map(|&b| char::from(b)).collect());
    }
    None
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters, and rewrites dot segments so
/// the name can never address a parent directory.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    let safe = if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    };
    truncate_filename(&safe, MAX_FILENAME_BYTES)
}

/// Shortens `name` to at most `max_bytes`, cutting the stem on a char
/// boundary and keeping the extension.
fn truncate_filename(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(pos) if pos > 0 && name.len() - pos <= max_bytes / 2 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    };
    let budget = max_bytes - ext.len();
    let mut end = budget.min(stem.len());
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{ext}", &stem[..end])
}

/// Resolves a unique file path, adding a numeric suffix if the file exists.
///
/// Example: `visual.svg`, then `visual_1.svg`, `visual_2.svg`, ...
pub(crate) fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let base_path = dir.join(filename);
    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    };

    for i in 1..1000 {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    // Fallback (extremely unlikely)
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

fn is_usable(name: &str) -> bool {
    !name.trim_matches(|c| c == '_' || c == '.').is_empty()
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
