//! Trace buffer dump.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Write the first `trace_size` bytes of `words` to `path`, one zero-padded
/// hex word per line.
pub fn write_out_trace(words: &[u32], trace_size: usize, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create trace file {}", path.display()))?;
    let mut out = BufWriter::new(file);

    let count = (trace_size / 4).min(words.len());
    for word in &words[..count] {
        writeln!(out, "{:08x}", word)?;
    }
    out.flush()?;

    log::info!("wrote {} trace words to {}", count, path.display());
    Ok(())
}
