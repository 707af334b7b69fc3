//! Info command

use std::path::Path;

use anyhow::Result;
use crossterm::style::Stylize;
use ll_core::layer::LayerDir;

/// Show `info.json` of a package directory
pub fn info(path: &Path, json: bool) -> Result<()> {
    let dir = LayerDir::borrowed(path);
    let info = dir.info()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let lw = 12;
    println!();
    println!("  {} {}", info.appid.as_str().white().bold(), info.version.as_str().dark_grey());
    if let Some(description) = &info.description {
        println!("  {description}");
    }
    println!();
    if !info.name.is_empty() {
        println!("  {:<lw$}{}", "name", info.name);
    }
    if !info.kind.is_empty() {
        println!("  {:<lw$}{}", "kind", info.kind);
    }
    if !info.arch.is_empty() {
        println!("  {:<lw$}{}", "arch", info.arch.join(", "));
    }
    for (label, value) in [
        ("channel", &info.channel),
        ("module", &info.module),
        ("base", &info.base),
        ("runtime", &info.runtime),
    ] {
        if let Some(value) = value {
            println!("  {label:<lw$}{value}");
        }
    }
    if let Some(command) = &info.command {
        println!("  {:<lw$}{}", "command", command.join(" "));
    }
    Ok(())
}
