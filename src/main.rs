//! hostsd, the caching DNS server for hosts files.

#![warn(deprecated_in_future)]
#![warn(future_incompatible)]
#![warn(missing_copy_implementations)]
#![warn(missing_docs)]
#![warn(nonstandard_style)]
#![warn(rust_2018_compatibility)]
#![warn(rust_2018_idioms)]
#![warn(single_use_lifetimes)]
#![warn(trivial_casts, trivial_numeric_casts)]
#![warn(unused)]

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::wildcard_imports)]

#![deny(unsafe_code)]

use std::sync::mpsc;
use std::thread;

use log::*;

mod cache;
mod logger;
mod resolve;
mod server;
mod worker;

mod options;
use self::options::*;

use self::cache::NameCache;
use self::resolve::{Resolver, ResolutionError};
use self::server::{Server, ServerConfig};


/// Configures logging, parses the command-line options, and handles any
/// errors before passing control over to the server.
fn main() {
    use std::env;
    use std::process::exit;

    logger::configure(env::var_os("HOSTSD_DEBUG"));

    #[cfg(windows)]
    if let Err(e) = ansi_term::enable_ansi_support() {
        warn!("Failed to enable ANSI support: {}", e);
    }

    let use_colours = atty::is(atty::Stream::Stdout);

    match Options::getopts(env::args_os().skip(1)) {
        OptionsResult::Ok(options) => {
            info!("Running with options -> {:#?}", options);
            exit(run(options));
        }

        OptionsResult::Help => {
            if use_colours {
                print!("{}", include_str!(concat!(env!("OUT_DIR"), "/usage.pretty.txt")));
            }
            else {
                print!("{}", include_str!(concat!(env!("OUT_DIR"), "/usage.bland.txt")));
            }

            exit(exits::SUCCESS);
        }

        OptionsResult::Version => {
            if use_colours {
                print!("{}", include_str!(concat!(env!("OUT_DIR"), "/version.pretty.txt")));
            }
            else {
                print!("{}", include_str!(concat!(env!("OUT_DIR"), "/version.bland.txt")));
            }

            exit(exits::SUCCESS);
        }

        OptionsResult::InvalidOptionsFormat(oe) => {
            eprintln!("hostsd: Invalid options: {}", oe);
            exit(exits::OPTIONS_ERROR);
        }

        OptionsResult::InvalidOptions(why) => {
            eprintln!("hostsd: Invalid options: {}", why);
            exit(exits::OPTIONS_ERROR);
        }
    }
}


/// Runs hostsd with some options, returning the status to exit with.
fn run(Options { mode, hosts_file, limits }: Options) -> i32 {
    let cache = NameCache::new(limits.cache_size, limits.max_addresses);

    let resolver = match Resolver::open(&hosts_file, cache, limits.max_aliases) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("hostsd: {}: {}", hosts_file.display(), e);
            return exits::HOSTS_FILE_ERROR;
        }
    };

    match mode {
        Mode::Lookup(name) => {
            lookup(resolver, &name)
        }
        Mode::Serve { config, until_eof } => {
            serve(&config, resolver, until_eof)
        }
    }
}


/// Prints every address the hosts file has for the name.
fn lookup(mut resolver: Resolver, name: &str) -> i32 {
    match resolver.resolve(name) {
        Ok(addresses) => {
            for address in addresses {
                println!("{}", address);
            }

            exits::SUCCESS
        }
        Err(e @ ResolutionError::NotFound(_)) => {
            eprintln!("hostsd: {}", e);
            exits::NO_RESULTS
        }
        Err(e) => {
            eprintln!("hostsd: {}", e);
            exits::HOSTS_FILE_ERROR
        }
    }
}


/// Binds the sockets and serves until interrupted, or until standard input
/// gets closed if asked to.
fn serve(config: &ServerConfig, resolver: Resolver, until_eof: bool) -> i32 {
    let server = match Server::bind(config, resolver) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("hostsd: Failed to start server: {}", e);
            return exits::NETWORK_ERROR;
        }
    };

    let (stop_tx, stop_rx) = mpsc::channel();

    let signal_tx = stop_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Interrupted, shutting down");
        let _ = signal_tx.send(());
    }) {
        warn!("Failed to install signal handler: {}", e);
    }

    if until_eof {
        let eof_tx = stop_tx.clone();
        let spawned = thread::Builder::new()
            .name("stdin-watcher".into())
            .spawn(move || {
                wait_for_eof();
                let _ = eof_tx.send(());
            });

        if let Err(e) = spawned {
            eprintln!("hostsd: Failed to watch standard input: {}", e);
            return exits::NETWORK_ERROR;
        }
    }
    else {
        info!("Serving until interrupted");
    }

    // The sender stays alive until the server stops, so the receiver blocks
    // even when no signal handler could be installed.
    let result = server.serve_until(|| {
        let _ = stop_rx.recv();
    });
    drop(stop_tx);

    match result {
        Ok(()) => {
            exits::SUCCESS
        }
        Err(e) => {
            eprintln!("hostsd: Failed to start workers: {}", e);
            exits::NETWORK_ERROR
        }
    }
}

/// Blocks until standard input is closed, discarding anything written to it.
fn wait_for_eof() {
    use std::io;

    info!("Serving until standard input is closed");
    if let Err(e) = io::copy(&mut io::stdin().lock(), &mut io::sink()) {
        warn!("Error reading standard input: {}", e);
    }
}

/// The possible status numbers hostsd can exit with.
mod exits {

    /// Exit code for when everything turns out OK.
    pub const SUCCESS: i32 = 0;

    /// Exit code for when the sockets could not be set up.
    pub const NETWORK_ERROR: i32 = 1;

    /// Exit code for when a name being looked up is not in the hosts file.
    pub const NO_RESULTS: i32 = 2;

    /// Exit code for when the command-line options are invalid.
    pub const OPTIONS_ERROR: i32 = 3;

    /// Exit code for when the hosts file could not be opened or read.
    pub const HOSTS_FILE_ERROR: i32 = 4;
}
