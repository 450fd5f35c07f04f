//! # Garbage Collection
//!
//! Reports blobs no file references and, with `--delete`, removes them.

use anyhow::Result;
use clap::Args;
use hashfs::HashFs;

#[derive(Args, Debug)]
pub struct GcArgs {
    /// Actually delete blobs (default is dry-run)
    #[arg(long)]
    delete: bool,
}

pub fn run(fs: &HashFs, args: GcArgs) -> Result<()> {
    let before = fs.blobs().stats()?;
    let report = fs.collect_garbage(!args.delete)?;

    println!();
    println!("  HashFS Garbage Collection");
    println!("  =========================");
    println!("    Blobs scanned:     {}", report.scanned);
    println!("    Referenced hashes: {}", report.referenced);
    println!("    Orphaned blobs:    {}", report.orphaned);

    if report.dry_run {
        if report.orphaned > 0 {
            println!();
            println!("  Dry run. Re-run with --delete to remove orphans.");
        }
        return Ok(());
    }

    let after = fs.blobs().stats()?;
    println!("    Deleted:           {}", report.deleted);
    println!(
        "    Reclaimed:         {} bytes",
        before.total_bytes.saturating_sub(after.total_bytes)
    );
    Ok(())
}
