//! Debug error logging.

use std::ffi::OsStr;

use ansi_term::{Colour, ANSIString};


/// Sets the internal logger, so that warnings and errors always get printed,
/// and more gets printed if the given environment variable is set:
/// everything if it’s “trace”, and everything but trace messages if it’s
/// anything else.
pub fn configure<T: AsRef<OsStr>>(ev: Option<T>) {
    if let Err(e) = log::set_logger(GLOBAL_LOGGER) {
        eprintln!("Failed to initialise logger: {}", e);
        return;
    }

    let level = match ev {
        Some(ev) if ev.as_ref() == "trace"  => log::LevelFilter::Trace,
        Some(ev) if ! ev.as_ref().is_empty() => log::LevelFilter::Debug,
        _                                    => log::LevelFilter::Warn,
    };

    log::set_max_level(level);
}

/// Prints more messages for every time the verbose flag was given. This
/// only ever adds to what the environment variable asked for.
pub fn raise_verbosity(count: usize) {
    let level = match count {
        0 => return,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if level > log::max_level() {
        log::set_max_level(level);
    }
}


#[derive(Debug)]
struct Logger;

const GLOBAL_LOGGER: &Logger = &Logger;

impl log::Log for Logger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true  // no need to filter after using ‘set_max_level’.
    }

    fn log(&self, record: &log::Record<'_>) {
        if atty::is(atty::Stream::Stderr) {
            let open = Colour::Fixed(243).paint("[");
            let level = level(record.level());
            let close = Colour::Fixed(243).paint("]");

            eprintln!("{}{} {}{} {}", open, level, record.target(), close, record.args());
        }
        else {
            eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {
        // no need to flush with ‘eprintln!’.
    }
}

fn level(level: log::Level) -> ANSIString<'static> {
    match level {
        log::Level::Error => Colour::Red.paint("ERROR"),
        log::Level::Warn  => Colour::Yellow.paint("WARN"),
        log::Level::Info  => Colour::Cyan.paint("INFO"),
        log::Level::Debug => Colour::Blue.paint("DEBUG"),
        log::Level::Trace => Colour::Fixed(245).paint("TRACE"),
    }
}
