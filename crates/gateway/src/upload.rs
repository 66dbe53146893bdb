//! Multipart parsing and upload staging for the media endpoints.

use std::path::Path;

use {
    axum::extract::multipart::{Field, Multipart, MultipartError},
    tempfile::TempPath,
    tokio::io::AsyncWriteExt,
    tracing::debug,
    wabridge_session::{MediaKind, media::extension_of},
};

use crate::error::ApiError;

const MIB: u64 = 1024 * 1024;

/// An upload written to a uniquely named file. Removed on drop.
#[derive(Debug)]
pub struct StagedFile {
    pub path: TempPath,
    /// Sanitized client-supplied name.
    pub file_name: String,
    pub size: u64,
}

impl StagedFile {
    pub fn size_kb(&self) -> f64 {
        (self.size as f64 / 1024.0 * 100.0).round() / 100.0
    }
}

/// Fields accepted by every media endpoint.
#[derive(Debug, Default)]
pub struct MediaForm {
    pub phone: Option<String>,
    pub caption: Option<String>,
    pub file: Option<StagedFile>,
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(e.body_text())
    }
}

/// Read the form, streaming `file` into `upload_dir` under the kind's limits.
pub async fn read_media_form(
    mut multipart: Multipart,
    kind: MediaKind,
    upload_dir: &Path,
) -> Result<MediaForm, ApiError> {
    let mut form = MediaForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("phone") => form.phone = Some(field.text().await.map_err(multipart_error)?),
            Some("caption") => form.caption = Some(field.text().await.map_err(multipart_error)?),
            Some("file") => form.file = Some(stage_file(field, kind, upload_dir).await?),
            other => debug!(field = ?other, "ignoring multipart field"),
        }
    }

    Ok(form)
}

async fn stage_file(
    mut field: Field<'_>,
    kind: MediaKind,
    upload_dir: &Path,
) -> Result<StagedFile, ApiError> {
    let original = field.file_name().unwrap_or_default().to_string();
    if original.is_empty() {
        return Err(ApiError::bad_request("No file selected"));
    }

    let profile = kind.profile();
    if !kind.accepts(&original) {
        return Err(ApiError::bad_request(format!(
            "Invalid file type. Allowed: {}",
            profile.extensions.join(", ")
        )));
    }
    let ext = extension_of(&original).unwrap_or_default();

    let staged = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&format!(".{ext}"))
        .tempfile_in(upload_dir)?;
    let (file, path) = staged.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut size = 0_u64;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        size += chunk.len() as u64;
        if size > profile.max_bytes {
            return Err(ApiError::bad_request(format!(
                "File too large. Max size for {kind}: {}MB",
                profile.max_bytes / MIB
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    if size == 0 {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    debug!(%kind, path = %path.display(), size, "upload staged");
    Ok(StagedFile {
        path,
        file_name: sanitize_filename(&original, &ext),
        size,
    })
}

/// Reduce a client file name to a safe basename.
fn sanitize_filename(name: &str, ext: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let sanitized: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') => Some(c),
            _ => None,
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    match sanitized.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => sanitized.to_string(),
        _ => format!("upload.{ext}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("report.pdf", "pdf", "report.pdf")]
    #[case("Q3 Report.PDF", "pdf", "Q3_Report.PDF")]
    #[case("../../etc/passwd.txt", "txt", "passwd.txt")]
    #[case("C:\\Users\\me\\photo.jpg", "jpg", "photo.jpg")]
    #[case("..hidden.png", "png", "hidden.png")]
    #[case("фото.jpg", "jpg", "upload.jpg")]
    fn sanitizes_file_names(#[case] raw: &str, #[case] ext: &str, #[case] expected: &str) {
        assert_eq!(sanitize_filename(raw, ext), expected);
    }

    #[test]
    fn size_kb_rounds_to_two_places() {
        let staged = StagedFile {
            path: tempfile::NamedTempFile::new().unwrap().into_temp_path(),
            file_name: "a.webp".into(),
            size: 1_500,
        };
        assert_eq!(staged.size_kb(), 1.46);
    }
}
