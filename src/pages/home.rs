use eframe::egui;

use super::{AsyncSlot, PageCtx, busy, error_label};
use crate::catalog::{self, ModelSummary};
use crate::cart::format_price;
use crate::error::ApiError;
use crate::router::Route;

#[derive(Default)]
pub struct HomePage {
    models: Option<Vec<ModelSummary>>,
    error: Option<String>,
    query: String,
    load: AsyncSlot<Result<Vec<ModelSummary>, ApiError>>,
}

impl HomePage {
    fn update(&mut self, ctx: &PageCtx<'_>) {
        if self.models.is_none() && self.error.is_none() && !self.load.is_running() {
            let client = ctx.client().clone();
            self.load.start(async move { catalog::list_models(&client).await });
        }
        match self.load.poll() {
            Some(Ok(models)) => {
                log::debug!("{} models in catalog", models.len());
                self.models = Some(models);
            }
            Some(Err(e)) => self.error = Some(e.to_string()),
            None => {}
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &mut PageCtx<'_>) {
        self.update(ctx);
        ui.heading("Models");
        ui.horizontal(|ui| {
            ui.label("Search");
            ui.text_edit_singleline(&mut self.query);
        });
        ui.add_space(8.0);

        if let Some(error) = &self.error {
            error_label(ui, &format!("Could not load models: {error}"));
            if ui.button("Retry").clicked() {
                self.error = None;
            }
            return;
        }
        let Some(models) = &self.models else {
            busy(ui, "Loading models…");
            return;
        };

        let matches = catalog::search(models, &self.query);
        if matches.is_empty() {
            ui.weak("No models match your search.");
            return;
        }
        egui::ScrollArea::vertical().show(ui, |ui| {
            for model in matches {
                egui::Frame::group(ui.style()).show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.horizontal(|ui| {
                        ui.strong(&model.name);
                        if let Some(price) = model.price {
                            ui.label(format_price(price));
                        }
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.button("View").clicked() {
                                ctx.go(Route::Model {
                                    id: model.id.clone(),
                                });
                            }
                        });
                    });
                    if let Some(description) = &model.description {
                        ui.weak(description);
                    }
                });
            }
        });
    }
}
