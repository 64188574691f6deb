//! Lifetime of one on-screen model.
//!
//! A [`RenderHandle`] is opened for a URL and owns everything the model needs:
//! the pending download, GPU buffers, the resize watcher and the frame
//! request. `close` (or dropping the handle) releases all of it, in a fixed
//! order, exactly once.

use std::cell::RefCell;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use nalgebra::Matrix4;

use super::framing::{FitOptions, Framing, OrbitCamera};
use super::geometry::{Aabb, MeshGeometry};
use super::{MeshFormat, loaders};
use crate::cancel::CancelToken;
use crate::error::ViewerError;
use crate::http::HttpClient;
use crate::task;

/// GPU side of the viewer.
pub trait RenderBackend {
    /// Replaces any previous geometry with `mesh`.
    fn upload(&mut self, mesh: &MeshGeometry) -> Result<(), ViewerError>;
    /// Frees buffers, vertex arrays and shader programs.
    fn release_geometry(&mut self);
    /// Lets go of the rendering context.
    fn release_context(&mut self);
    fn surface_attached(&self) -> bool;
    fn detach_surface(&mut self);
}

/// Downloads model bytes.
pub trait AssetFetcher {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, ViewerError>>;
}

impl AssetFetcher for HttpClient {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, ViewerError>> {
        let client = self.clone();
        let url = url.to_string();
        Box::pin(async move {
            client
                .fetch_bytes(&url)
                .await
                .map_err(|e| ViewerError::Download(e.to_string()))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerOptions {
    pub fit: FitOptions,
    /// Refit the camera when the viewport changes size.
    pub auto_fit: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            fit: FitOptions::default(),
            auto_fit: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerStatus {
    Loading,
    Ready { triangles: usize },
    Failed(ViewerError),
    Closed,
}

/// Watches the viewport size between frames.
#[derive(Debug, Clone, Default)]
pub struct ResizeWatcher {
    last: Option<(u32, u32)>,
    disconnected: bool,
}

impl ResizeWatcher {
    /// Records the current size; true when it differs from the last one seen.
    pub fn observe(&mut self, width: f32, height: f32) -> bool {
        if self.disconnected {
            return false;
        }
        let size = (width.max(0.0).round() as u32, height.max(0.0).round() as u32);
        let changed = self.last != Some(size);
        self.last = Some(size);
        changed
    }

    pub fn disconnect(&mut self) {
        self.disconnected = true;
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnected
    }
}

type LoadResult = Rc<RefCell<Option<Result<Vec<u8>, ViewerError>>>>;

struct PendingLoad {
    format: MeshFormat,
    token: CancelToken,
    result: LoadResult,
}

pub struct RenderHandle<B: RenderBackend> {
    url: String,
    options: ViewerOptions,
    backend: B,
    status: ViewerStatus,
    pending: Option<PendingLoad>,
    bounds: Option<Aabb>,
    framing: Option<Framing>,
    camera: OrbitCamera,
    aspect: f32,
    watcher: ResizeWatcher,
    frame_requested: bool,
    closed: bool,
}

impl<B: RenderBackend> RenderHandle<B> {
    /// Starts loading `url`. An empty URL or an unknown extension fails
    /// immediately and never reaches the fetcher.
    pub fn open(url: &str, options: ViewerOptions, backend: B, fetcher: &dyn AssetFetcher) -> Self {
        let mut handle = Self {
            url: String::new(),
            options,
            backend,
            status: ViewerStatus::Loading,
            pending: None,
            bounds: None,
            framing: None,
            camera: OrbitCamera::default(),
            aspect: 1.0,
            watcher: ResizeWatcher::default(),
            frame_requested: false,
            closed: false,
        };
        handle.load(url, fetcher);
        handle
    }

    /// Switches to another model. A load still running for the old URL is
    /// cancelled and its result discarded.
    pub fn set_url(&mut self, url: &str, fetcher: &dyn AssetFetcher) {
        if self.closed || url == self.url {
            return;
        }
        self.load(url, fetcher);
    }

    fn load(&mut self, url: &str, fetcher: &dyn AssetFetcher) {
        if let Some(previous) = self.pending.take() {
            previous.token.cancel();
        }
        self.url = url.to_string();
        self.camera.reset();

        let format = match MeshFormat::from_url(url) {
            Ok(format) => format,
            Err(e) => {
                log::warn!("viewer: {e}");
                self.fail(e);
                return;
            }
        };

        self.status = ViewerStatus::Loading;
        self.frame_requested = true;
        let token = CancelToken::new();
        let result: LoadResult = Rc::new(RefCell::new(None));
        let download = fetcher.fetch(url);
        {
            let token = token.clone();
            let result = Rc::clone(&result);
            task::spawn_local(async move {
                let bytes = download.await;
                if !token.is_cancelled() {
                    *result.borrow_mut() = Some(bytes);
                }
            });
        }
        self.pending = Some(PendingLoad {
            format,
            token,
            result,
        });
    }

    /// Applies a finished download. Call once per frame.
    pub fn pump(&mut self) {
        let Some(pending) = &self.pending else {
            return;
        };
        let Some(result) = pending.result.borrow_mut().take() else {
            return;
        };
        let format = pending.format;
        self.pending = None;

        let mesh = match result.and_then(|bytes| loaders::parse(format, &bytes)) {
            Ok(mesh) => mesh,
            Err(e) => {
                log::warn!("viewer: {} -> {e}", self.url);
                self.fail(e);
                return;
            }
        };

        if let Err(e) = self.backend.upload(&mesh) {
            log::error!("viewer: upload of {} failed: {e}", self.url);
            self.backend.release_geometry();
            self.fail(e);
            return;
        }

        self.bounds = mesh.bounds();
        self.refit();
        self.status = ViewerStatus::Ready {
            triangles: mesh.triangle_count(),
        };
        log::info!("viewer: {} ready ({} triangles)", self.url, mesh.triangle_count());
    }

    fn fail(&mut self, error: ViewerError) {
        self.status = ViewerStatus::Failed(error);
        self.frame_requested = false;
        self.bounds = None;
        self.framing = None;
    }

    /// Reports the viewport size; refits when it changed and auto-fit is on.
    pub fn resize(&mut self, width: f32, height: f32) {
        if !self.watcher.observe(width, height) || height <= 0.0 {
            return;
        }
        self.aspect = width / height;
        if self.options.auto_fit {
            self.refit();
        }
    }

    /// Frames the camera on the current geometry.
    pub fn refit(&mut self) {
        self.framing = self
            .bounds
            .map(|b| Framing::fit(&b, self.aspect, &self.options.fit));
    }

    pub fn reset_view(&mut self) {
        self.camera.reset();
        self.refit();
    }

    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    pub fn view_projection(&self) -> Option<Matrix4<f32>> {
        let framing = self.framing.as_ref()?;
        Some(self.camera.view_projection(framing, self.aspect))
    }

    pub fn framing(&self) -> Option<&Framing> {
        self.framing.as_ref()
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_loading(&self) -> bool {
        self.status == ViewerStatus::Loading
    }

    /// Whether the render loop wants another frame.
    pub fn wants_frame(&self) -> bool {
        self.frame_requested && !self.closed
    }

    /// Releases everything. Safe to call more than once.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.frame_requested = false;
        if let Some(pending) = self.pending.take() {
            pending.token.cancel();
        }
        self.watcher.disconnect();
        self.backend.release_geometry();
        self.backend.release_context();
        if self.backend.surface_attached() {
            self.backend.detach_surface();
        }
        self.status = ViewerStatus::Closed;
        log::debug!("viewer: closed {}", self.url);
    }
}

impl<B: RenderBackend> Drop for RenderHandle<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::loaders::fixtures;
    use futures::channel::oneshot;
    use std::collections::HashMap;

    type Log = Rc<RefCell<Vec<String>>>;

    struct RecordingBackend {
        log: Log,
        attached: bool,
        fail_upload: bool,
    }

    impl RecordingBackend {
        fn new(log: &Log) -> Self {
            Self {
                log: Rc::clone(log),
                attached: true,
                fail_upload: false,
            }
        }
    }

    impl RenderBackend for RecordingBackend {
        fn upload(&mut self, mesh: &MeshGeometry) -> Result<(), ViewerError> {
            self.log
                .borrow_mut()
                .push(format!("upload {}", mesh.triangle_count()));
            if self.fail_upload {
                Err(ViewerError::Gpu("out of memory".into()))
            } else {
                Ok(())
            }
        }
        fn release_geometry(&mut self) {
            self.log.borrow_mut().push("release_geometry".into());
        }
        fn release_context(&mut self) {
            self.log.borrow_mut().push("release_context".into());
        }
        fn surface_attached(&self) -> bool {
            self.attached
        }
        fn detach_surface(&mut self) {
            self.attached = false;
            self.log.borrow_mut().push("detach_surface".into());
        }
    }

    /// Serves fixed bytes per URL and counts requests.
    #[derive(Default)]
    struct StaticFetcher {
        files: HashMap<String, Vec<u8>>,
        requests: RefCell<Vec<String>>,
    }

    impl AssetFetcher for StaticFetcher {
        fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, ViewerError>> {
            self.requests.borrow_mut().push(url.to_string());
            let result = self
                .files
                .get(url)
                .cloned()
                .ok_or_else(|| ViewerError::Download("404 not found".into()));
            Box::pin(async move { result })
        }
    }

    /// Hands out downloads that finish only when the test says so.
    #[derive(Default)]
    struct ManualFetcher {
        senders: RefCell<HashMap<String, oneshot::Sender<Vec<u8>>>>,
    }

    impl ManualFetcher {
        fn finish(&self, url: &str, bytes: Vec<u8>) {
            let sender = self.senders.borrow_mut().remove(url).unwrap();
            sender.send(bytes).unwrap();
        }
    }

    impl AssetFetcher for ManualFetcher {
        fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, ViewerError>> {
            let (tx, rx) = oneshot::channel();
            self.senders.borrow_mut().insert(url.to_string(), tx);
            Box::pin(async move { rx.await.map_err(|_| ViewerError::Download("aborted".into())) })
        }
    }

    fn triangle_stl() -> Vec<u8> {
        fixtures::binary_stl(&[[[0.0, 0.0, 0.0], [30.0, 0.0, 0.0], [0.0, 10.0, 0.0]]])
    }

    fn fetcher_with(url: &str, bytes: Vec<u8>) -> StaticFetcher {
        let mut fetcher = StaticFetcher::default();
        fetcher.files.insert(url.to_string(), bytes);
        fetcher
    }

    #[test]
    fn loads_uploads_and_frames() {
        let log = Log::default();
        let fetcher = fetcher_with("/m/a.stl", triangle_stl());
        let mut handle = RenderHandle::open(
            "/m/a.stl",
            ViewerOptions::default(),
            RecordingBackend::new(&log),
            &fetcher,
        );
        assert!(handle.is_loading());
        assert!(handle.wants_frame());

        task::pump();
        handle.pump();
        assert_eq!(handle.status(), &ViewerStatus::Ready { triangles: 1 });
        assert!(handle.view_projection().is_some());
        assert_eq!(log.borrow().as_slice(), ["upload 1"]);
    }

    #[test]
    fn unsupported_extension_never_fetches() {
        let log = Log::default();
        let fetcher = StaticFetcher::default();
        let handle = RenderHandle::open(
            "/m/part.step",
            ViewerOptions::default(),
            RecordingBackend::new(&log),
            &fetcher,
        );
        assert_eq!(
            handle.status(),
            &ViewerStatus::Failed(ViewerError::UnsupportedFormat(".step".into()))
        );
        assert!(fetcher.requests.borrow().is_empty());
        assert!(!handle.wants_frame());
    }

    #[test]
    fn missing_url_never_fetches() {
        let log = Log::default();
        let fetcher = StaticFetcher::default();
        let handle =
            RenderHandle::open("", ViewerOptions::default(), RecordingBackend::new(&log), &fetcher);
        let ViewerStatus::Failed(err) = handle.status() else {
            panic!("expected failure");
        };
        assert_eq!(err.to_string(), "no model URL provided");
        assert!(fetcher.requests.borrow().is_empty());
    }

    #[test]
    fn download_and_parse_failures_surface() {
        let log = Log::default();
        let fetcher = fetcher_with("/m/bad.3mf", b"not a zip".to_vec());

        let mut bad = RenderHandle::open(
            "/m/bad.3mf",
            ViewerOptions::default(),
            RecordingBackend::new(&log),
            &fetcher,
        );
        let mut missing = RenderHandle::open(
            "/m/missing.stl",
            ViewerOptions::default(),
            RecordingBackend::new(&log),
            &fetcher,
        );
        task::pump();
        bad.pump();
        missing.pump();

        assert!(matches!(bad.status(), ViewerStatus::Failed(ViewerError::Parse { format: "3MF", .. })));
        assert!(matches!(missing.status(), ViewerStatus::Failed(ViewerError::Download(_))));
        assert!(!bad.is_loading() && !missing.is_loading());
    }

    #[test]
    fn teardown_order_and_idempotence() {
        let log = Log::default();
        let fetcher = fetcher_with("/m/a.stl", triangle_stl());
        let mut handle = RenderHandle::open(
            "/m/a.stl",
            ViewerOptions::default(),
            RecordingBackend::new(&log),
            &fetcher,
        );
        task::pump();
        handle.pump();
        handle.teardown();
        handle.teardown();
        assert!(!handle.wants_frame());
        assert!(!handle.watcher.is_connected());
        assert_eq!(handle.status(), &ViewerStatus::Closed);
        drop(handle);

        assert_eq!(
            log.borrow().as_slice(),
            ["upload 1", "release_geometry", "release_context", "detach_surface"]
        );
    }

    #[test]
    fn drop_releases_and_skips_detached_surface() {
        let log = Log::default();
        let fetcher = StaticFetcher::default();
        let mut backend = RecordingBackend::new(&log);
        backend.attached = false;
        let handle = RenderHandle::open("x.stl", ViewerOptions::default(), backend, &fetcher);
        drop(handle);
        assert_eq!(log.borrow().as_slice(), ["release_geometry", "release_context"]);
    }

    #[test]
    fn failed_upload_releases_partial_geometry() {
        let log = Log::default();
        let fetcher = fetcher_with("/m/a.stl", triangle_stl());
        let mut backend = RecordingBackend::new(&log);
        backend.fail_upload = true;
        let mut handle = RenderHandle::open("/m/a.stl", ViewerOptions::default(), backend, &fetcher);
        task::pump();
        handle.pump();
        assert!(matches!(handle.status(), ViewerStatus::Failed(ViewerError::Gpu(_))));
        handle.close();
        assert_eq!(
            log.borrow().as_slice(),
            [
                "upload 1",
                "release_geometry",
                "release_geometry",
                "release_context",
                "detach_surface"
            ]
        );
    }

    #[test]
    fn stale_load_does_not_clobber_newer_one() {
        let log = Log::default();
        let fetcher = ManualFetcher::default();
        let mut handle = RenderHandle::open(
            "/m/old.stl",
            ViewerOptions::default(),
            RecordingBackend::new(&log),
            &fetcher,
        );
        handle.set_url("/m/new.stl", &fetcher);

        let big = fixtures::binary_stl(&[
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
        ]);
        fetcher.finish("/m/new.stl", triangle_stl());
        fetcher.finish("/m/old.stl", big);
        task::pump();
        handle.pump();
        handle.pump();

        assert_eq!(handle.url(), "/m/new.stl");
        assert_eq!(handle.status(), &ViewerStatus::Ready { triangles: 1 });
        assert_eq!(log.borrow().as_slice(), ["upload 1"]);
    }

    #[test]
    fn resize_refits_only_when_enabled() {
        let log = Log::default();
        let fetcher = fetcher_with("/m/a.stl", triangle_stl());
        let mut handle = RenderHandle::open(
            "/m/a.stl",
            ViewerOptions::default(),
            RecordingBackend::new(&log),
            &fetcher,
        );
        task::pump();
        handle.pump();
        let square = handle.framing().unwrap().distance;
        handle.resize(200.0, 800.0);
        let tall = handle.framing().unwrap().distance;
        assert!(tall > square, "narrow viewport needs more distance");

        let mut fixed = RenderHandle::open(
            "/m/a.stl",
            ViewerOptions {
                auto_fit: false,
                ..ViewerOptions::default()
            },
            RecordingBackend::new(&log),
            &fetcher,
        );
        task::pump();
        fixed.pump();
        let before = fixed.framing().unwrap().distance;
        fixed.resize(200.0, 800.0);
        assert_eq!(fixed.framing().unwrap().distance, before);
    }

    #[test]
    fn watcher_reports_changes_only() {
        let mut watcher = ResizeWatcher::default();
        assert!(watcher.observe(100.0, 50.0));
        assert!(!watcher.observe(100.2, 49.9));
        assert!(watcher.observe(120.0, 50.0));
        watcher.disconnect();
        assert!(!watcher.observe(10.0, 10.0));
    }
}
