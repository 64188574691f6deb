//! 3D model preview: loading, framing and GPU lifetime.

mod format;
mod framing;
mod geometry;
mod gl;
mod handle;
mod loaders;
mod widget;

pub use format::MeshFormat;
pub use framing::{FitOptions, Framing, OrbitCamera, fit_distance, horizontal_fov};
pub use geometry::{Aabb, MeshGeometry};
pub use gl::{GlowBackend, GpuMesh};
pub use handle::{AssetFetcher, RenderBackend, RenderHandle, ResizeWatcher, ViewerOptions, ViewerStatus};
pub use loaders::parse;
pub use widget::ModelViewer;
