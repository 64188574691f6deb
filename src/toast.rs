//! Short-lived notifications stacked in the bottom-right corner.

use std::cell::RefCell;
use std::rc::Rc;

use eframe::egui;

const TOAST_SECONDS: f64 = 4.0;
const MAX_TOASTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub kind: ToastKind,
    pub text: String,
    /// Seconds of app time; set on first display.
    shown_at: Option<f64>,
}

/// Cloneable sink so async tasks can report back to the UI.
#[derive(Debug, Clone, Default)]
pub struct Toasts {
    queue: Rc<RefCell<Vec<Toast>>>,
}

impl Toasts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, kind: ToastKind, text: impl Into<String>) {
        let text = text.into();
        match kind {
            ToastKind::Error => log::warn!("toast: {text}"),
            _ => log::debug!("toast: {text}"),
        }
        let mut queue = self.queue.borrow_mut();
        queue.push(Toast {
            kind,
            text,
            shown_at: None,
        });
        let overflow = queue.len().saturating_sub(MAX_TOASTS);
        queue.drain(..overflow);
    }

    pub fn info(&self, text: impl Into<String>) {
        self.push(ToastKind::Info, text);
    }

    pub fn success(&self, text: impl Into<String>) {
        self.push(ToastKind::Success, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.push(ToastKind::Error, text);
    }

    pub fn snapshot(&self) -> Vec<Toast> {
        self.queue.borrow().clone()
    }

    /// Stamps new toasts with `now` and drops expired ones.
    pub fn expire(&self, now: f64) {
        let mut queue = self.queue.borrow_mut();
        for toast in queue.iter_mut() {
            toast.shown_at.get_or_insert(now);
        }
        queue.retain(|t| t.shown_at.is_some_and(|at| now - at < TOAST_SECONDS));
    }

    pub fn show(&self, ctx: &egui::Context) {
        self.expire(ctx.input(|i| i.time));
        let toasts = self.snapshot();
        if toasts.is_empty() {
            return;
        }
        egui::Area::new(egui::Id::new("toasts"))
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-12.0, -12.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                for toast in &toasts {
                    let color = match toast.kind {
                        ToastKind::Info => ui.visuals().text_color(),
                        ToastKind::Success => egui::Color32::from_rgb(70, 170, 90),
                        ToastKind::Error => ui.visuals().error_fg_color,
                    };
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.colored_label(color, &toast.text);
                    });
                }
            });
        ctx.request_repaint_after(std::time::Duration::from_millis(250));
    }
}
