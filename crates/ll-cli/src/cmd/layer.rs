//! Layer archive commands

use std::path::Path;

use anyhow::{Context as _, Result};
use crossterm::style::Stylize;
use ll_core::layer::{ErofsBackend, LayerDir, LayerFile, LayerPackager};

use crate::context::Context;

fn packager(ctx: &Context) -> Result<LayerPackager> {
    let backend = ErofsBackend::locate().context("layer tools unavailable")?;
    Ok(LayerPackager::new(&ctx.layout().cache_dir(), Box::new(backend))?)
}

pub fn pack(ctx: &Context, source: &Path, output: &Path) -> Result<()> {
    let layer = packager(ctx)?.pack(&LayerDir::borrowed(source), output)?;
    println!(
        "{} {} ({} bytes of metadata)",
        "packed".green(),
        layer.path().display(),
        layer.size_of_info()
    );
    Ok(())
}

pub fn unpack(ctx: &Context, layer: &Path, dest: &Path) -> Result<()> {
    let layer = LayerFile::open(layer)?;
    let mut dir = packager(ctx)?.unpack(&layer, dest)?;
    dir.set_clean_status(false);
    println!("{} {}", "unpacked".green(), dir.path().display());
    Ok(())
}

/// Print the embedded `info.json` and the image offset
pub fn inspect(layer: &Path) -> Result<()> {
    let layer = LayerFile::open(layer)?;
    let info: serde_json::Value = serde_json::from_slice(layer.raw_info())
        .with_context(|| format!("metadata of {}", layer.path().display()))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    println!("image offset: {}", layer.binary_data_offset());
    Ok(())
}
