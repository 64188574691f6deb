use eframe::egui;
use serde_json::Value;

use super::{AsyncSlot, PageCtx, busy, error_label};
use crate::error::ApiError;

#[derive(Default)]
pub struct AdminPage {
    stats: Option<Value>,
    denied: bool,
    error: Option<String>,
    load: AsyncSlot<Result<Value, ApiError>>,
    requested: bool,
}

impl AdminPage {
    fn update(&mut self, ctx: &PageCtx<'_>) {
        if !self.requested {
            self.requested = true;
            let client = ctx.client().clone();
            self.load
                .start(async move { client.get_json::<Value>("/admin/stats").await });
        }
        match self.load.poll() {
            Some(Ok(stats)) => self.stats = Some(stats),
            Some(Err(e)) if e.is_auth() => self.denied = true,
            Some(Err(e)) => self.error = Some(e.to_string()),
            None => {}
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &mut PageCtx<'_>) {
        self.update(ctx);
        ui.heading("Admin");
        if self.denied {
            error_label(ui, "Admins only");
            return;
        }
        if let Some(error) = &self.error {
            error_label(ui, error);
            if ui.button("Retry").clicked() {
                self.error = None;
                self.requested = false;
            }
            return;
        }
        let Some(stats) = &self.stats else {
            busy(ui, "Loading statistics…");
            return;
        };
        egui::Grid::new("admin_stats")
            .num_columns(2)
            .striped(true)
            .show(ui, |ui| {
                for (key, value) in stat_rows(stats) {
                    ui.label(key);
                    ui.monospace(value);
                    ui.end_row();
                }
            });
    }
}

/// Flattens the stats payload into label/value rows.
fn stat_rows(stats: &Value) -> Vec<(String, String)> {
    match stats {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let shown = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.replace('_', " "), shown)
            })
            .collect(),
        other => vec![("stats".into(), other.to_string())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ApiResponse;
    use crate::http::testing::ScriptedTransport;
    use crate::pages::testing::Harness;
    use crate::task;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(401)]
    #[case(403)]
    fn non_admins_are_turned_away(#[case] status: u16) {
        let transport = ScriptedTransport::new(move |_| Ok(ApiResponse::new(status, "")));
        let mut harness = Harness::new(transport);
        let mut page = AdminPage::default();
        page.update(&harness.ctx());
        task::pump();
        page.update(&harness.ctx());
        assert!(page.denied);
        assert!(page.stats.is_none());
        assert_eq!(harness.transport.total(), 1);
    }

    #[test]
    fn stats_render_as_rows() {
        let transport = ScriptedTransport::new(|_| {
            Ok(ApiResponse::json(200, &json!({ "total_users": 12, "top_model": "Benchy" })))
        });
        let mut harness = Harness::new(transport);
        let mut page = AdminPage::default();
        page.update(&harness.ctx());
        task::pump();
        page.update(&harness.ctx());

        let rows = stat_rows(page.stats.as_ref().unwrap());
        assert!(rows.contains(&("total users".into(), "12".into())));
        assert!(rows.contains(&("top model".into(), "Benchy".into())));
    }
}
