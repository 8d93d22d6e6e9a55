//cargo run --package cutout --bin cutout_demo -- [output_dir] [config.toml]
use std::path::PathBuf;

use cutout::{
    Document, DirectoryWriter, EngineConfig, LayeredExport, LayeredWriter, ViewTransform,
};
use image::{Rgba, RgbaImage};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .finish()
        .init();

    let mut args = std::env::args().skip(1);
    let output = PathBuf::from(args.next().unwrap_or_else(|| "cutout_demo_output".to_string()));
    let config = match args.next() {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::default(),
    };

    // 100x100 opaque red, top-left quadrant lassoed out
    let mut document = Document::with_config(RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 255])), config);
    let view = ViewTransform::identity(100, 100);
    let quadrant = [[0.0, 0.0], [50.0, 0.0], [50.0, 50.0], [0.0, 50.0]];
    let layer = document.extract_lasso(&quadrant, &view)?;
    tracing::info!(%layer, layers = document.layers().len(), "Quadrant extracted");

    let preparation = document.inpaint_preparation();
    tracing::info!(
        size = preparation.placement.size,
        has_holes = preparation.has_holes(),
        "Prepared inpainting input"
    );

    document.fill_local()?;
    std::fs::create_dir_all(&output)?;
    document.render().save(output.join("composite.png"))?;

    DirectoryWriter::new(output.join("layers")).write(&LayeredExport::from_document(&document))?;
    tracing::info!(path = %output.display(), "Demo finished");
    Ok(())
}
