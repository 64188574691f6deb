//! Print estimate requests.

use serde::{Deserialize, Serialize};

use crate::cart::CartItem;
use crate::error::ApiError;
use crate::filament::AmsSlots;
use crate::http::HttpClient;

pub const LAYER_HEIGHTS: &[f32] = &[0.08, 0.12, 0.16, 0.20, 0.24, 0.28];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateRequest {
    pub model_id: String,
    pub filament_id: Option<String>,
    pub layer_height: f32,
    pub infill_percent: u8,
    pub quantity: u32,
    /// Multi-material jobs send the AMS mapping instead of one filament.
    #[serde(skip_serializing_if = "AmsSlots::is_empty")]
    pub ams: AmsSlots,
}

impl EstimateRequest {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            filament_id: None,
            layer_height: 0.20,
            infill_percent: 15,
            quantity: 1,
            ams: AmsSlots::default(),
        }
    }

    /// Clamps user input into what the printers accept.
    pub fn normalized(mut self) -> Self {
        self.infill_percent = self.infill_percent.min(100);
        self.quantity = self.quantity.clamp(1, 100);
        self.layer_height = self.layer_height.clamp(0.08, 0.28);
        self
    }

    pub fn has_material(&self) -> bool {
        self.filament_id.is_some() || !self.ams.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Estimate {
    #[serde(alias = "weight_grams")]
    pub grams: f64,
    #[serde(alias = "print_time_minutes")]
    pub minutes: u32,
    /// Price for the whole quantity.
    #[serde(alias = "total_price")]
    pub price: f64,
}

impl Estimate {
    pub fn duration_label(&self) -> String {
        let (h, m) = (self.minutes / 60, self.minutes % 60);
        if h == 0 { format!("{m} min") } else { format!("{h} h {m:02} min") }
    }

    /// The cart line for this estimate.
    pub fn to_cart_item(&self, request: &EstimateRequest, model_name: &str) -> CartItem {
        let material = request.filament_id.as_deref().unwrap_or("multi-material");
        CartItem {
            id: format!(
                "{}:{}:{:.2}:{}",
                request.model_id, material, request.layer_height, request.infill_percent
            ),
            name: format!("{model_name} ({material})"),
            price: self.price / f64::from(request.quantity.max(1)),
            quantity: request.quantity.max(1),
        }
    }
}

pub async fn request_estimate(
    client: &HttpClient,
    request: &EstimateRequest,
) -> Result<Estimate, ApiError> {
    client.post_json("/estimate", request).await
}
