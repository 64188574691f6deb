// Native development build. The browser build starts from `printforge::start`.

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let options = eframe::NativeOptions {
        depth_buffer: 24,
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("PrintForge")
            .with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native(
        "PrintForge",
        options,
        Box::new(|cc| Ok(Box::new(printforge::StorefrontApp::new(cc)))),
    )
    .map_err(|e| anyhow::anyhow!("event loop failed: {e}"))
}

#[cfg(target_arch = "wasm32")]
fn main() {}
