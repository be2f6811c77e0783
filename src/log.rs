//! Log sink — stdout plus the `VFSLog.log` file, torn down with the process.

use std::fs::File;
use std::io;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "VFSLog.log";

/// Install the subscriber: level from `RUST_LOG` (default `info`), output
/// teed to stdout and a freshly created [`LOG_FILE`].  Only the first call
/// in a process takes effect.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let _ = std::fs::remove_file(LOG_FILE);
    match File::create(LOG_FILE) {
        Ok(file) => {
            let _ = builder
                .with_writer(io::stdout.and(Mutex::new(file)))
                .try_init();
        }
        Err(_) => {
            let _ = builder.try_init();
        }
    }
}
