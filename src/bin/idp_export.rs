use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;

use idp_portal::config::PortalConfig;
use idp_portal::export::export_workbook;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let out_path = parse_out_arg().unwrap_or_else(|| {
        PathBuf::from(format!(
            "idp_export_{}.xlsx",
            Local::now().format("%Y%m%d_%H%M%S")
        ))
    });

    let config = PortalConfig::from_env();
    let store = config.open_store().context("open record store")?;
    let report = export_workbook(&store, &out_path)?;

    println!("IDP export complete");
    println!("File: {}", out_path.display());
    println!("Sheets: {}", report.sheets);
    println!("Rows exported: {}", report.rows);
    if !report.errors.is_empty() {
        println!("Errors: {}", report.errors.len());
        for err in report.errors.iter().take(8) {
            println!(" - {err}");
        }
    }

    Ok(())
}

fn parse_out_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--out=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--out" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
