use bytes::Bytes;
use uuid::Uuid;

use crate::{error::AuthError, storage::StorageClient};

pub const MAX_UPLOAD_BYTES: usize = 1_000_000;

/// Extension/MIME allow-list for profile images.
const ALLOWED_EXTENSIONS: [&str; 4] = ["jpeg", "jpg", "png", "gif"];
const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/gif"];

fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Validates one multipart file field against the image allow-list and size
/// cap. Returns the generated filename to attach to the user record.
pub fn validate_profile_image(
    original_filename: &str,
    content_type: &str,
    body: &Bytes,
) -> Result<String, AuthError> {
    let ext = extension_of(original_filename)
        .filter(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()))
        .ok_or_else(|| {
            AuthError::UploadRejected("Images only (jpeg, jpg, png, gif)".to_string())
        })?;

    if !ALLOWED_MIME_TYPES.contains(&content_type) {
        return Err(AuthError::UploadRejected(
            "Images only (jpeg, jpg, png, gif)".to_string(),
        ));
    }

    if body.len() > MAX_UPLOAD_BYTES {
        return Err(AuthError::UploadRejected(
            "Image exceeds the 1 MB size limit".to_string(),
        ));
    }

    Ok(format!("profileImg-{}.{}", Uuid::new_v4(), ext))
}

/// Validate and persist a profile image, returning the stored filename.
pub async fn store_profile_image(
    storage: &dyn StorageClient,
    original_filename: &str,
    content_type: &str,
    body: Bytes,
) -> Result<String, AuthError> {
    let filename = validate_profile_image(original_filename, content_type, &body)?;
    storage.put_object(&filename, body).await?;
    Ok(filename)
}
