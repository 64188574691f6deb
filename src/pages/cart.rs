use eframe::egui;

use super::{AsyncSlot, PageCtx, busy, error_label};
use crate::cart::{self, CartItem, CheckoutSession, display_items, format_price, subtotal};
use crate::error::ApiError;
use crate::router::{self, Route};

/// Loads the server cart for signed-in users. The local cart, when it has
/// anything in it, is what gets shown and checked out.
#[derive(Default)]
struct ServerCart {
    items: Vec<CartItem>,
    requested: bool,
    load: AsyncSlot<Result<Vec<CartItem>, ApiError>>,
}

impl ServerCart {
    fn update(&mut self, ctx: &PageCtx<'_>) {
        if !self.requested && ctx.auth.is_authenticated() {
            self.requested = true;
            let client = ctx.client().clone();
            self.load
                .start(async move { cart::fetch_server_cart(&client).await });
        }
        match self.load.poll() {
            Some(Ok(items)) => self.items = items,
            Some(Err(e)) => log::warn!("server cart unavailable: {e}"),
            None => {}
        }
    }

    fn display<'a>(&'a self, ctx: &'a PageCtx<'_>) -> &'a [CartItem] {
        display_items(ctx.cart.items(), &self.items)
    }
}

#[derive(Default)]
pub struct CartPage {
    server: ServerCart,
}

impl CartPage {
    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &mut PageCtx<'_>) {
        self.server.update(ctx);
        ui.heading("Cart");

        let items = self.server.display(ctx).to_vec();
        let editable = !ctx.cart.is_empty();
        if items.is_empty() {
            if self.server.load.is_running() {
                busy(ui, "Loading cart…");
            } else {
                ui.weak("Your cart is empty.");
            }
            return;
        }

        egui::Grid::new("cart_items")
            .num_columns(5)
            .striped(true)
            .show(ui, |ui| {
                ui.strong("Item");
                ui.strong("Price");
                ui.strong("Qty");
                ui.strong("Total");
                ui.end_row();
                for item in &items {
                    ui.label(&item.name);
                    ui.label(format_price(item.price));
                    if editable {
                        let mut quantity = item.quantity;
                        if ui
                            .add(egui::DragValue::new(&mut quantity).range(0..=100))
                            .changed()
                        {
                            ctx.cart.set_quantity(&item.id, quantity);
                        }
                    } else {
                        ui.label(item.quantity.to_string());
                    }
                    ui.label(format_price(item.line_total()));
                    if editable && ui.small_button("Remove").clicked() {
                        ctx.cart.remove(&item.id);
                    }
                    ui.end_row();
                }
            });

        ui.separator();
        ui.horizontal(|ui| {
            ui.strong(format!("Subtotal {}", format_price(subtotal(&items))));
            if ui.button("Checkout").clicked() {
                ctx.go(Route::Checkout);
            }
            if editable && ui.button("Clear").clicked() {
                ctx.cart.clear();
            }
        });
    }
}

#[derive(Default)]
pub struct CheckoutPage {
    server: ServerCart,
    session: AsyncSlot<Result<CheckoutSession, ApiError>>,
    error: Option<String>,
}

impl CheckoutPage {
    fn pay(&mut self, ctx: &PageCtx<'_>) {
        let items = self.server.display(ctx).to_vec();
        if items.is_empty() {
            self.error = Some("Your cart is empty.".into());
            return;
        }
        self.error = None;
        let client = ctx.client().clone();
        self.session
            .start(async move { cart::create_checkout_session(&client, &items).await });
    }

    fn update(&mut self, ctx: &mut PageCtx<'_>) {
        self.server.update(ctx);
        match self.session.poll() {
            Some(Ok(session)) => {
                log::info!("redirecting to checkout session {:?}", session.id);
                ctx.cart.clear();
                router::open_external(&session.url);
            }
            Some(Err(e)) => self.error = Some(e.to_string()),
            None => {}
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &mut PageCtx<'_>) {
        self.update(ctx);
        ui.heading("Checkout");
        let items = self.server.display(ctx);
        for item in items {
            ui.label(format!(
                "{} × {}  {}",
                item.quantity,
                item.name,
                format_price(item.line_total())
            ));
        }
        ui.strong(format!("Total {}", format_price(subtotal(items))));
        ui.add_space(8.0);

        if self.session.is_running() {
            busy(ui, "Creating payment session…");
        } else if ui.button("Pay now").clicked() {
            self.pay(ctx);
        }
        if let Some(error) = &self.error {
            error_label(ui, error);
        }
    }
}
