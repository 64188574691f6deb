use eframe::egui;

use super::{AsyncSlot, PageCtx, busy, error_label};
use crate::cart::{self, format_price};
use crate::catalog::{self, ModelSummary};
use crate::config::config;
use crate::error::ApiError;
use crate::estimate::{self, Estimate, EstimateRequest, LAYER_HEIGHTS};
use crate::filament::{self, AMS_SLOTS, Filament, SlotDisplay};
use crate::viewer::ModelViewer;

pub struct ModelPage {
    id: String,
    model: Option<ModelSummary>,
    missing: bool,
    filaments: Vec<Filament>,
    request: EstimateRequest,
    use_ams: bool,
    estimate: Option<Estimate>,
    error: Option<String>,
    viewer: ModelViewer,
    models_load: AsyncSlot<Result<Vec<ModelSummary>, ApiError>>,
    filaments_load: AsyncSlot<Result<Vec<Filament>, ApiError>>,
    estimate_load: AsyncSlot<Result<Estimate, ApiError>>,
}

impl ModelPage {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            request: EstimateRequest::new(id.clone()),
            id,
            model: None,
            missing: false,
            filaments: Vec::new(),
            use_ams: false,
            estimate: None,
            error: None,
            viewer: ModelViewer::default(),
            models_load: AsyncSlot::default(),
            filaments_load: AsyncSlot::default(),
            estimate_load: AsyncSlot::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn start(&mut self, ctx: &PageCtx<'_>) {
        let client = ctx.client().clone();
        self.models_load
            .start(async move { catalog::list_models(&client).await });
        let client = ctx.client().clone();
        self.filaments_load
            .start(async move { filament::list_filaments(&client).await });
    }

    fn update(&mut self, ctx: &PageCtx<'_>) {
        if self.model.is_none() && !self.missing && !self.models_load.is_running() {
            self.start(ctx);
        }
        match self.models_load.poll() {
            Some(Ok(models)) => {
                self.model = models.into_iter().find(|m| m.id == self.id);
                self.missing = self.model.is_none();
            }
            Some(Err(e)) => {
                ctx.toasts.error(format!("Could not load model: {e}"));
                self.missing = true;
            }
            None => {}
        }
        match self.filaments_load.poll() {
            Some(Ok(filaments)) => self.filaments = filaments,
            Some(Err(e)) => ctx.toasts.error(format!("Could not load filaments: {e}")),
            None => {}
        }
        match self.estimate_load.poll() {
            Some(Ok(estimate)) => {
                self.estimate = Some(estimate);
                self.error = None;
            }
            Some(Err(e)) => self.error = Some(e.to_string()),
            None => {}
        }
    }

    fn request_estimate(&mut self, ctx: &PageCtx<'_>) {
        let mut request = self.request.clone().normalized();
        if self.use_ams {
            request.filament_id = None;
        } else {
            request.ams = Default::default();
        }
        if !request.has_material() {
            self.error = Some("Choose a filament first.".into());
            return;
        }
        self.request = request.clone();
        self.estimate = None;
        let client = ctx.client().clone();
        self.estimate_load
            .start(async move { estimate::request_estimate(&client, &request).await });
    }

    fn add_to_cart(&mut self, ctx: &mut PageCtx<'_>) {
        let (Some(estimate), Some(model)) = (&self.estimate, &self.model) else {
            return;
        };
        let item = estimate.to_cart_item(&self.request, &model.name);
        ctx.toasts.success(format!("Added {} to cart", item.name));
        ctx.cart.add(item.clone());
        if ctx.auth.is_authenticated() {
            let client = ctx.client().clone();
            crate::task::spawn_local(async move {
                if let Err(e) = cart::push_item(&client, &item).await {
                    log::warn!("could not sync cart item {}: {e}", item.id);
                }
            });
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &mut PageCtx<'_>) {
        self.update(ctx);

        if self.missing {
            ui.heading("Model not found");
            return;
        }
        let Some(model) = self.model.clone() else {
            busy(ui, "Loading model…");
            return;
        };

        ui.heading(&model.name);
        if let Some(description) = &model.description {
            ui.label(description);
        }
        ui.add_space(6.0);
        self.viewer
            .show(ui, &config().asset_url(&model.file_url), ctx.gl, ctx.client());
        ui.weak("Drag to orbit, scroll to zoom, double-click to reset");
        ui.separator();

        self.options_ui(ui);
        ui.add_space(6.0);
        ui.horizontal(|ui| {
            let running = self.estimate_load.is_running();
            if ui
                .add_enabled(!running, egui::Button::new("Get estimate"))
                .clicked()
            {
                self.request_estimate(ctx);
            }
            if running {
                ui.spinner();
            }
        });
        if let Some(error) = &self.error {
            error_label(ui, error);
        }
        if let Some(estimate) = &self.estimate {
            egui::Grid::new("estimate").num_columns(2).show(ui, |ui| {
                ui.label("Material");
                ui.label(format!("{:.1} g", estimate.grams));
                ui.end_row();
                ui.label("Print time");
                ui.label(estimate.duration_label());
                ui.end_row();
                ui.label("Price");
                ui.strong(format_price(estimate.price));
                ui.end_row();
            });
            if ui.button("Add to cart").clicked() {
                self.add_to_cart(ctx);
            }
        }
    }

    fn options_ui(&mut self, ui: &mut egui::Ui) {
        egui::Grid::new("print_options").num_columns(2).show(ui, |ui| {
            ui.label("Layer height");
            egui::ComboBox::from_id_salt("layer_height")
                .selected_text(format!("{:.2} mm", self.request.layer_height))
                .show_ui(ui, |ui| {
                    for h in LAYER_HEIGHTS {
                        ui.selectable_value(&mut self.request.layer_height, *h, format!("{h:.2} mm"));
                    }
                });
            ui.end_row();

            ui.label("Infill");
            ui.add(egui::Slider::new(&mut self.request.infill_percent, 0..=100).suffix(" %"));
            ui.end_row();

            ui.label("Quantity");
            ui.add(egui::DragValue::new(&mut self.request.quantity).range(1..=100));
            ui.end_row();

            ui.label("Multi-material (AMS)");
            ui.checkbox(&mut self.use_ams, "");
            ui.end_row();

            if !self.use_ams {
                ui.label("Filament");
                let selected = self
                    .request
                    .filament_id
                    .as_ref()
                    .and_then(|id| self.filaments.iter().find(|f| &f.id == id))
                    .map_or("Choose…".to_string(), filament_label);
                egui::ComboBox::from_id_salt("filament")
                    .selected_text(selected)
                    .show_ui(ui, |ui| {
                        for f in self.filaments.iter().filter(|f| f.in_stock) {
                            ui.selectable_value(
                                &mut self.request.filament_id,
                                Some(f.id.clone()),
                                filament_label(f),
                            );
                        }
                    });
                ui.end_row();
            }
        });

        if self.use_ams {
            self.ams_ui(ui);
        }
    }

    fn ams_ui(&mut self, ui: &mut egui::Ui) {
        let displays = self.request.ams.resolve(&self.filaments);
        for slot in 1..=AMS_SLOTS as u8 {
            ui.horizontal(|ui| {
                let display = displays.get(usize::from(slot - 1));
                if let Some(SlotDisplay::Loaded { filament, .. }) = display {
                    swatch(ui, filament);
                } else {
                    ui.add_space(16.0);
                }
                let text = match display {
                    Some(SlotDisplay::Loaded { filament, .. }) => filament_label(filament),
                    Some(SlotDisplay::Unknown { filament_id, .. }) => {
                        format!("Unknown filament ({filament_id})")
                    }
                    _ => "Empty".to_string(),
                };
                let mut chosen = self.request.ams.get(slot).ok().flatten().map(str::to_string);
                let before = chosen.clone();
                egui::ComboBox::from_id_salt(("ams_slot", slot))
                    .selected_text(text)
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut chosen, None, "Empty");
                        for f in self.filaments.iter().filter(|f| f.in_stock) {
                            ui.selectable_value(&mut chosen, Some(f.id.clone()), filament_label(f));
                        }
                    });
                ui.label(format!("Slot {slot}"));
                if chosen != before {
                    if let Err(e) = self.request.ams.assign(slot, chosen) {
                        log::error!("{e}");
                    }
                }
            });
        }
    }
}

fn filament_label(f: &Filament) -> String {
    format!("{} {}", f.material, f.name)
}

fn swatch(ui: &mut egui::Ui, filament: &Filament) {
    let [r, g, b] = filament.rgb().unwrap_or([128, 128, 128]);
    let (rect, _) = ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
    ui.painter()
        .rect_filled(rect, 2.0, egui::Color32::from_rgb(r, g, b));
}
