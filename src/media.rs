// media.rs — base64 data-URL image uploads.
//
// Clients send images inline as `data:image/<ext>;base64,<payload>`. The
// payload is decoded and written under the media directory with a UUID file
// name; the database stores only the relative path (e.g. `recipes/<id>.png`).

use anyhow::{Context as _, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::path::Path;
use uuid::Uuid;

pub const AVATAR_SUBDIR: &str = "users";
pub const RECIPE_SUBDIR: &str = "recipes";

pub struct DecodedImage {
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Decode a `data:image/...;base64,...` string.
///
/// Returns a human-readable reason on rejection so callers can surface it as
/// a 400 without leaking internals.
pub fn decode_data_url(data: &str) -> Result<DecodedImage, String> {
    let rest = data
        .strip_prefix("data:image/")
        .ok_or_else(|| "expected a data:image/...;base64,... payload".to_string())?;
    let (extension, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| "image payload must be base64-encoded".to_string())?;

    if extension.is_empty()
        || extension.len() > 8
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(format!("unsupported image format: {extension}"));
    }

    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|_| "invalid base64 image data".to_string())?;
    if bytes.is_empty() {
        return Err("empty image payload".to_string());
    }

    Ok(DecodedImage {
        extension: extension.to_ascii_lowercase(),
        bytes,
    })
}

/// Write a decoded image under `{media_dir}/{subdir}/` and return the
/// relative path stored in the database.
pub async fn save_image(media_dir: &Path, subdir: &str, image: &DecodedImage) -> Result<String> {
    let dir = media_dir.join(subdir);
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("cannot create media directory {}", dir.display()))?;

    let file_name = format!(
        "{}.{}",
        Uuid::new_v4().to_string().replace('-', ""),
        image.extension
    );
    let path = dir.join(&file_name);
    tokio::fs::write(&path, &image.bytes)
        .await
        .with_context(|| format!("cannot write image {}", path.display()))?;

    Ok(format!("{subdir}/{file_name}"))
}

/// Public URL for a stored relative media path.
pub fn media_url(relative: &str) -> String {
    format!("/media/{relative}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG
    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn decodes_valid_data_url() {
        let img = decode_data_url(&format!("data:image/png;base64,{PIXEL}")).unwrap();
        assert_eq!(img.extension, "png");
        assert!(!img.bytes.is_empty());
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(decode_data_url(PIXEL).is_err());
        assert!(decode_data_url("data:text/plain;base64,aGk=").is_err());
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(decode_data_url("data:image/png;base64,!!not-base64!!").is_err());
    }

    #[test]
    fn rejects_odd_extension() {
        assert!(decode_data_url("data:image/p/n/g;base64,aGk=").is_err());
        assert!(decode_data_url("data:image/;base64,aGk=").is_err());
    }

    #[tokio::test]
    async fn saves_under_subdir_with_uuid_name() {
        let dir = tempfile::tempdir().unwrap();
        let img = decode_data_url(&format!("data:image/png;base64,{PIXEL}")).unwrap();
        let rel = save_image(dir.path(), RECIPE_SUBDIR, &img).await.unwrap();
        assert!(rel.starts_with("recipes/"));
        assert!(rel.ends_with(".png"));
        assert!(dir.path().join(&rel).exists());
        assert_eq!(media_url(&rel), format!("/media/{rel}"));
    }
}
