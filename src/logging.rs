//! Log sink setup: stderr via `env_logger`, optionally teed into a file.
//!
//! With `SAVE_LOG=true` every record also lands in `LOG_FILE`; the file is
//! trimmed to its last `MAX_LOG_LINES` lines once on startup so an unattended
//! deployment does not grow it without bound.

use crate::config::Config;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

pub fn init(cfg: &Config) -> Result<(), String> {
    let default_filter = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(default_filter);
    builder.format_timestamp_secs();

    if cfg.save_log {
        trim_log_file(&cfg.log_file, cfg.max_log_lines)
            .map_err(|e| format!("trimming log file {} failed: {}", cfg.log_file.display(), e))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.log_file)
            .map_err(|e| format!("opening log file {} failed: {}", cfg.log_file.display(), e))?;
        builder.target(env_logger::Target::Pipe(Box::new(TeeWriter { file })));
    }

    builder.init();
    Ok(())
}

/// Writes every record to stderr and the log file.
struct TeeWriter {
    file: fs::File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn trim_log_file(path: &Path, max_lines: usize) -> io::Result<()> {
    if !path.is_file() {
        return Ok(());
    }
    let content = fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= max_lines {
        return Ok(());
    }
    let mut kept = lines[lines.len() - max_lines..].join("\n");
    kept.push('\n');
    fs::write(path, kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_file(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tado-autoassist-log-{}-{}", tag, std::process::id()))
    }

    #[test]
    fn missing_file_is_left_alone() {
        let path = scratch_file("missing");
        let _ = fs::remove_file(&path);
        trim_log_file(&path, 10).expect("no-op");
        assert!(!path.exists());
    }

    #[test]
    fn short_file_is_not_rewritten() {
        let path = scratch_file("short");
        fs::write(&path, "a\nb\n").expect("write");
        trim_log_file(&path, 10).expect("trim");
        assert_eq!(fs::read_to_string(&path).expect("read"), "a\nb\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn long_file_keeps_only_the_tail() {
        let path = scratch_file("long");
        let lines: Vec<String> = (0..10).map(|i| format!("line {}", i)).collect();
        fs::write(&path, lines.join("\n") + "\n").expect("write");
        trim_log_file(&path, 3).expect("trim");
        assert_eq!(fs::read_to_string(&path).expect("read"), "line 7\nline 8\nline 9\n");
        let _ = fs::remove_file(&path);
    }
}
