use std::sync::Arc;

use eframe::egui;

use super::gl::GlowBackend;
use super::handle::{AssetFetcher, RenderHandle, ViewerOptions, ViewerStatus};

/// egui widget around a [`RenderHandle`] on the app's glow context.
pub struct ModelViewer {
    handle: Option<RenderHandle<GlowBackend>>,
    options: ViewerOptions,
}

impl ModelViewer {
    pub fn new(options: ViewerOptions) -> Self {
        Self {
            handle: None,
            options,
        }
    }

    pub fn status(&self) -> Option<&ViewerStatus> {
        self.handle.as_ref().map(RenderHandle::status)
    }

    /// Releases the GPU side; the next `show` opens a fresh handle.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
    }

    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        url: &str,
        gl: Option<&Arc<glow::Context>>,
        fetcher: &dyn AssetFetcher,
    ) {
        let size = egui::vec2(ui.available_width(), ui.available_width().min(420.0) * 0.75);
        let (rect, response) = ui.allocate_exact_size(size, egui::Sense::click_and_drag());
        ui.painter()
            .rect_filled(rect, 6.0, ui.visuals().extreme_bg_color);

        let Some(gl) = gl else {
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "3D preview unavailable",
                egui::FontId::proportional(14.0),
                ui.visuals().weak_text_color(),
            );
            return;
        };

        match &mut self.handle {
            Some(handle) => handle.set_url(url, fetcher),
            None => {
                self.handle = Some(RenderHandle::open(
                    url,
                    self.options,
                    GlowBackend::new(Arc::clone(gl)),
                    fetcher,
                ));
            }
        }
        let Some(handle) = self.handle.as_mut() else {
            return;
        };

        handle.pump();
        handle.resize(rect.width(), rect.height());

        if response.dragged() {
            let delta = response.drag_delta();
            handle.camera_mut().drag(delta.x, delta.y);
        }
        if response.hovered() {
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            if scroll.abs() > 0.0 {
                handle.camera_mut().scroll(scroll);
            }
        }
        if response.double_clicked() {
            handle.reset_view();
        }

        let message = match handle.status() {
            ViewerStatus::Loading => Some("Loading model…".to_string()),
            ViewerStatus::Failed(e) => Some(e.to_string()),
            ViewerStatus::Closed => Some("Viewer closed".to_string()),
            ViewerStatus::Ready { .. } => None,
        };

        match message {
            Some(text) => {
                ui.painter().text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    text,
                    egui::FontId::proportional(14.0),
                    ui.visuals().weak_text_color(),
                );
            }
            None => {
                if let Some(callback) = handle
                    .view_projection()
                    .and_then(|mvp| handle.backend().paint_callback(rect, mvp))
                {
                    ui.painter().add(callback);
                }
            }
        }

        if handle.wants_frame() {
            ui.ctx().request_repaint();
        }
    }
}

impl Default for ModelViewer {
    fn default() -> Self {
        Self::new(ViewerOptions::default())
    }
}
