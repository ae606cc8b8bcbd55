//! Log setup: `[YYYY-MM-DD HH:MM:SS] LEVEL message` lines on stdout and in
//! `debug.log`.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Copies every log line to stdout and, when it could be opened, the log file.
struct Tee {
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        if let Some(file) = &mut self.file {
            // A full disk must not stop the daemon
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = &mut self.file {
            let _ = file.flush();
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> Option<File> {
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Installs the global logger. Level defaults to `info`; `RUST_LOG` overrides.
pub fn init(log_file: &Path) {
    let tee = Tee {
        file: open_append(log_file),
    };

    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {:<5} {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(tee)))
        .try_init();
}

/// Logs panics to stderr and the log file before the default unwinding.
pub fn install_panic_hook(log_file: &Path) {
    let log_file = log_file.to_path_buf();
    std::panic::set_hook(Box::new(move |panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = if let Some(loc) = panic_info.location() {
            format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            String::new()
        };

        let line = format!(
            "[{}] PANIC{} {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            location,
            msg
        );
        eprint!("{}", line);
        if let Some(mut file) = open_append(&log_file) {
            let _ = file.write_all(line.as_bytes());
        }
    }));
}
