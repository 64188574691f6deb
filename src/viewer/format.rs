use std::fmt;

use crate::error::ViewerError;

/// Mesh container formats the viewer can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshFormat {
    Stl,
    /// `.glb` or `.gltf`.
    Gltf,
    ThreeMf,
}

impl MeshFormat {
    /// Picks the loader from the URL's extension, ignoring query and fragment.
    pub fn from_url(url: &str) -> Result<Self, ViewerError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ViewerError::MissingUrl);
        }
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let file = path.rsplit('/').next().unwrap_or_default();
        let extension = file
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "stl" => Ok(Self::Stl),
            "glb" | "gltf" => Ok(Self::Gltf),
            "3mf" => Ok(Self::ThreeMf),
            "" => Err(ViewerError::UnsupportedFormat("(no extension)".into())),
            other => Err(ViewerError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Stl => "STL",
            Self::Gltf => "glTF",
            Self::ThreeMf => "3MF",
        }
    }
}

impl fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://cdn.example/parts/benchy.stl", MeshFormat::Stl)]
    #[case("/m/BENCHY.STL?v=3", MeshFormat::Stl)]
    #[case("scene.glb#node", MeshFormat::Gltf)]
    #[case("scene.gltf", MeshFormat::Gltf)]
    #[case("/files/plate.3mf", MeshFormat::ThreeMf)]
    fn supported(#[case] url: &str, #[case] expected: MeshFormat) {
        assert_eq!(MeshFormat::from_url(url), Ok(expected));
    }

    #[rstest]
    #[case("/m/part.obj", ".obj")]
    #[case("/m/part", "(no extension)")]
    #[case("https://example.stl/download", "(no extension)")]
    fn unsupported(#[case] url: &str, #[case] ext: &str) {
        assert_eq!(
            MeshFormat::from_url(url),
            Err(ViewerError::UnsupportedFormat(ext.into()))
        );
    }

    #[test]
    fn blank_url_is_missing() {
        assert_eq!(MeshFormat::from_url("  "), Err(ViewerError::MissingUrl));
    }
}
