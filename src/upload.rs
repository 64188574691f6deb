//! Client-side checks run before any upload leaves the browser.

use crate::error::UploadError;
use crate::http::MultipartFile;

pub const AVATAR_MAX_BYTES: usize = 5 * 1024 * 1024;
pub const MODEL_MAX_BYTES: usize = 100 * 1024 * 1024;
pub const MODEL_EXTENSIONS: &[&str] = &["stl", "3mf", "glb", "gltf", "obj"];

/// A file the user picked, fully read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    /// Builds a selection, guessing the MIME type from the extension.
    pub fn from_name(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self { name, mime, bytes }
    }

    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }

    pub fn into_multipart(self, field: &str) -> MultipartFile {
        MultipartFile {
            field: field.to_string(),
            file_name: self.name,
            mime: self.mime,
            bytes: self.bytes,
        }
    }
}

pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Avatars must be images no larger than 5 MiB.
pub fn validate_avatar(file: &SelectedFile) -> Result<(), UploadError> {
    if file.bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if !file.mime.starts_with("image/") {
        return Err(UploadError::NotAnImage {
            file_name: file.name.clone(),
        });
    }
    if file.bytes.len() > AVATAR_MAX_BYTES {
        return Err(UploadError::TooLarge {
            file_name: file.name.clone(),
            size: file.bytes.len(),
            limit: AVATAR_MAX_BYTES,
        });
    }
    Ok(())
}

/// Model uploads are limited to the mesh formats the print pipeline accepts.
pub fn validate_model(file: &SelectedFile) -> Result<(), UploadError> {
    if file.bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    let extension = file.extension().unwrap_or_default();
    if !MODEL_EXTENSIONS.contains(&extension.as_str()) {
        return Err(UploadError::UnsupportedExtension {
            extension,
            allowed: MODEL_EXTENSIONS.join(", "),
        });
    }
    if file.bytes.len() > MODEL_MAX_BYTES {
        return Err(UploadError::TooLarge {
            file_name: file.name.clone(),
            size: file.bytes.len(),
            limit: MODEL_MAX_BYTES,
        });
    }
    Ok(())
}
