use eframe::egui;

use super::{AsyncSlot, PageCtx, busy, pick_file};
use crate::catalog::{self, ModelSummary};
use crate::error::UploadFlowError;
use crate::router::Route;
use crate::upload::{self, MODEL_EXTENSIONS, MODEL_MAX_BYTES, SelectedFile};

#[derive(Default)]
pub struct UploadPage {
    picker: AsyncSlot<Option<SelectedFile>>,
    upload: AsyncSlot<Result<ModelSummary, UploadFlowError>>,
    last_error: Option<String>,
}

impl UploadPage {
    /// Checks the file locally and starts the upload; rejected files never
    /// reach the network.
    fn submit(&mut self, file: SelectedFile, ctx: &PageCtx<'_>) {
        if let Err(e) = upload::validate_model(&file) {
            ctx.toasts.error(e.to_string());
            self.last_error = Some(e.to_string());
            return;
        }
        self.last_error = None;
        let client = ctx.client().clone();
        self.upload
            .start(async move { catalog::upload_model(&client, file).await });
    }

    fn update(&mut self, ctx: &mut PageCtx<'_>) {
        if let Some(Some(file)) = self.picker.poll() {
            self.submit(file, ctx);
        }
        match self.upload.poll() {
            Some(Ok(model)) => {
                ctx.toasts.success(format!("Uploaded {}", model.name));
                ctx.go(Route::Model { id: model.id });
            }
            Some(Err(e)) => {
                ctx.toasts.error(format!("Upload failed: {e}"));
                self.last_error = Some(e.to_string());
            }
            None => {}
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &mut PageCtx<'_>) {
        self.update(ctx);
        ui.heading("Upload a model");
        ui.label(format!(
            "Accepted formats: {}. Up to {} MB.",
            MODEL_EXTENSIONS.join(", "),
            MODEL_MAX_BYTES / (1024 * 1024)
        ));
        ui.add_space(8.0);

        if self.upload.is_running() {
            busy(ui, "Uploading…");
        } else if ui.button("Choose file…").clicked() {
            pick_file(&mut self.picker, "3D models", MODEL_EXTENSIONS);
        }
        if let Some(error) = &self.last_error {
            super::error_label(ui, error);
        }
    }
}
