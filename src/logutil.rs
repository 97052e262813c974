//! Logging helpers for raw bus traffic. Keeps byte dumps single-line and bounded
//! so a chatty debug session does not flood the log.

/// Render up to `max` bytes as space-separated lowercase hex, e.g. `55 0c`.
pub fn hex_preview(data: &[u8], max: usize) -> String {
    use std::fmt::Write;
    let shown = data.len().min(max);
    let mut out = String::with_capacity(shown * 3 + 4);
    for (i, b) in data.iter().take(shown).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(&mut out, "{:02x}", b);
    }
    if data.len() > shown {
        out.push('…');
    }
    out
}
