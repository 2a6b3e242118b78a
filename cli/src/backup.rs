//! Note backup files
//!
//! A backup is a JSON array of note records. It holds note secrets, so it is
//! written once (never overwritten) with owner-only permissions.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use shroud_core::{NoteRecord, NoteStore};

pub async fn export(store: &NoteStore, file: &Path) -> Result<()> {
    let records = store.export().await;
    let json = serde_json::to_string_pretty(&records)?;

    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(file)
        .with_context(|| format!("refusing to write {}", file.display()))?;
    out.write_all(json.as_bytes())?;
    out.write_all(b"\n")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(file, fs::Permissions::from_mode(0o600))?;
    }

    info!("exported {} notes to {}", records.len(), file.display());
    println!("✅ Exported {} notes to {}", records.len(), file.display());
    println!("   Keep this file private: it can spend every note in it.");
    Ok(())
}

pub async fn import(store: &NoteStore, file: &Path) -> Result<()> {
    let records = read_records(file)?;
    let summary = store.import(records).await?;

    println!(
        "✅ Imported {} notes ({} already present)",
        summary.added, summary.skipped
    );
    Ok(())
}

fn read_records(file: &Path) -> Result<Vec<NoteRecord>> {
    let contents =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a note backup", file.display()))
}
