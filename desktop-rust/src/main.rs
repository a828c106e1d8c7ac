mod app;
mod backend;
mod io;
mod model;
mod thumbs;

use anyhow::Context;
use app::{configure_fonts, DesktopApp};
use backend::Backend;
use store_review::config::Config;

fn main() -> anyhow::Result<()> {
    store_review::logging::init(false);

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config unreadable, using defaults");
        Config::default()
    });
    let overlay_path = config.overlay_file().context("resolve overlay path")?;
    let (backend, rx) = Backend::new(&config)?;

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "门店检查审核",
        options,
        Box::new(move |cc| {
            configure_fonts(&cc.egui_ctx);
            backend.attach(cc.egui_ctx.clone());
            Box::new(DesktopApp::new(config, backend, rx, overlay_path))
        }),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))
}
