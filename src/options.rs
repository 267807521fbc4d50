//! Command-line option parsing.

use std::ffi::OsStr;
use std::fmt;
use std::num::NonZeroUsize;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::*;

use crate::logger;
use crate::server::ServerConfig;


/// The command-line options used when running hostsd.
#[derive(PartialEq, Debug)]
pub struct Options {

    /// Whether to run the server, or just look a name up.
    pub mode: Mode,

    /// The hosts file to read names from.
    pub hosts_file: PathBuf,

    /// How much the resolver may keep and read.
    pub limits: Limits,
}

/// What hostsd should do once it has loaded the hosts file.
#[derive(PartialEq, Debug)]
pub enum Mode {

    /// Bind the sockets and serve queries.
    Serve {

        /// The ports and workers to use.
        config: ServerConfig,

        /// Whether to also stop once standard input gets closed, rather
        /// than only when interrupted.
        until_eof: bool,
    },

    /// Resolve the one name, print its addresses, and exit.
    Lookup(String),
}

/// Bounds on the cache and on how much of the hosts file gets read.
#[derive(PartialEq, Debug, Copy, Clone)]
pub struct Limits {

    /// The number of names the cache holds.
    pub cache_size: NonZeroUsize,

    /// The number of addresses each cached name holds.
    pub max_addresses: NonZeroUsize,

    /// The number of names read from each line of the hosts file.
    pub max_aliases: NonZeroUsize,
}


impl Options {

    /// Parses and interprets a set of options from the user’s command-line
    /// arguments.
    ///
    /// This returns an `Ok` set of options if successful and running
    /// normally, a `Help` or `Version` variant if one of those options is
    /// specified, or an error variant if there’s an invalid option or a
    /// value outside of what’s allowed.
    #[allow(unused_results)]
    pub fn getopts<C>(args: C) -> OptionsResult
    where C: IntoIterator,
          C::Item: AsRef<OsStr>,
    {
        let mut opts = getopts::Options::new();

        // Server options
        opts.optopt  ("",  "udp-workers",    "Number of workers serving UDP (0 to 50)", "N");
        opts.optopt  ("",  "tcp-workers",    "Number of workers serving TCP (0 to 50)", "N");
        opts.optopt  ("",  "udp-port",       "Port to receive UDP queries on", "PORT");
        opts.optopt  ("",  "tcp-port",       "Port to accept TCP connections on", "PORT");
        opts.optopt  ("",  "tcp-timeout",    "Seconds before an idle TCP connection is dropped (0 for never)", "SECS");
        opts.optflag ("",  "until-eof",      "Stop serving when standard input is closed");

        // Resolver options
        opts.optopt  ("",  "hosts-file",     "Path to the hosts file", "PATH");
        opts.optopt  ("",  "cache-size",     "Number of names to keep in the cache", "N");
        opts.optopt  ("",  "max-addresses",  "Number of addresses to keep for each name", "N");
        opts.optopt  ("",  "max-aliases",    "Number of names to read from each line of the hosts file", "N");
        opts.optopt  ("l", "lookup",         "Look up a name in the hosts file and exit", "NAME");

        // Meta options
        opts.optflag ("V", "version",        "Print version information");
        opts.optflagmulti ("v", "",          "Increase verbosity by adding multiple (-vv)");
        opts.optflag ("?", "help",           "Print list of command-line options");

        let matches = match opts.parse(args) {
            Ok(m)  => m,
            Err(e) => return OptionsResult::InvalidOptionsFormat(e),
        };

        logger::raise_verbosity(matches.opt_count("v"));

        if matches.opt_present("version") {
            OptionsResult::Version
        }
        else if matches.opt_present("help") {
            OptionsResult::Help
        }
        else {
            match Self::deduce(&matches) {
                Ok(opts) => OptionsResult::Ok(opts),
                Err(e)   => OptionsResult::InvalidOptions(e),
            }
        }
    }

    fn deduce(matches: &getopts::Matches) -> Result<Self, OptionsError> {
        if let Some(argument) = matches.free.first() {
            return Err(OptionsError::UnexpectedArgument(argument.clone()));
        }

        let hosts_file = matches.opt_str("hosts-file")
                                .map_or_else(|| PathBuf::from("/etc/hosts"), PathBuf::from);
        let limits = Limits::deduce(matches)?;
        let mode = Mode::deduce(matches)?;

        Ok(Self { mode, hosts_file, limits })
    }
}


impl Mode {
    fn deduce(matches: &getopts::Matches) -> Result<Self, OptionsError> {
        if let Some(name) = matches.opt_str("lookup") {
            let name = name.strip_suffix('.').unwrap_or(&name).to_owned();
            if name.is_empty() {
                return Err(OptionsError::EmptyLookup);
            }

            return Ok(Self::Lookup(name));
        }

        let config = ServerConfig::deduce(matches)?;
        let until_eof = matches.opt_present("until-eof");
        Ok(Self::Serve { config, until_eof })
    }
}


impl ServerConfig {
    fn deduce(matches: &getopts::Matches) -> Result<Self, OptionsError> {
        let udp_workers  = ranged(matches, "udp-workers", 1, 0 ..= 50)?;
        let tcp_workers  = ranged(matches, "tcp-workers", 5, 0 ..= 50)?;
        let udp_port     = ranged(matches, "udp-port",   53, 1 ..= 65000)?;
        let tcp_port     = ranged(matches, "tcp-port",   53, 1 ..= 65000)?;
        let tcp_timeout  = ranged(matches, "tcp-timeout", 2, 0 ..= 300)?;

        if udp_workers == 0 && tcp_workers == 0 {
            warn!("No workers configured, so no queries will be answered");
        }

        Ok(Self {
            udp_port,
            tcp_port,
            udp_workers,
            tcp_workers,
            tcp_timeout: Duration::from_secs(tcp_timeout),
        })
    }
}


impl Limits {
    fn deduce(matches: &getopts::Matches) -> Result<Self, OptionsError> {
        let cache_size     = nonzero(matches, "cache-size",    1024, 1_048_576)?;
        let max_addresses  = nonzero(matches, "max-addresses",    8,        64)?;
        let max_aliases    = nonzero(matches, "max-aliases",     16,       256)?;

        Ok(Self { cache_size, max_addresses, max_aliases })
    }
}


/// Reads the number given for an option, checking that it’s within range,
/// or returns the default if the option was not given.
fn ranged<T>(matches: &getopts::Matches, option: &'static str, default: T, range: RangeInclusive<T>) -> Result<T, OptionsError>
where T: FromStr + PartialOrd + fmt::Display,
      T::Err: fmt::Display,
{
    let input = match matches.opt_str(option) {
        Some(input)  => input,
        None         => return Ok(default),
    };

    match input.parse::<T>() {
        Ok(number) if range.contains(&number) => {
            Ok(number)
        }
        Ok(_) => {
            Err(OptionsError::OutOfRange {
                option,
                value: input,
                range: format!("{} to {}", range.start(), range.end()),
            })
        }
        Err(e) => {
            warn!("Error parsing number for --{}: {}", option, e);
            Err(OptionsError::InvalidNumber(option, input))
        }
    }
}

/// Reads the number given for an option that can never be zero.
fn nonzero(matches: &getopts::Matches, option: &'static str, default: usize, max: usize) -> Result<NonZeroUsize, OptionsError> {
    let number = ranged(matches, option, default, 1 ..= max)?;
    NonZeroUsize::new(number).ok_or_else(|| OptionsError::OutOfRange {
        option,
        value: number.to_string(),
        range: format!("1 to {}", max),
    })
}


/// The result of the `Options::getopts` function.
#[derive(PartialEq, Debug)]
pub enum OptionsResult {

    /// The options were parsed successfully.
    Ok(Options),

    /// There was an error (from `getopts`) parsing the arguments.
    InvalidOptionsFormat(getopts::Fail),

    /// There was an error with the values the user picked.
    InvalidOptions(OptionsError),

    /// Can’t run any checks because there’s help to display!
    Help,

    /// One of the arguments was `--version`, to display the version number.
    Version,
}

/// Something wrong with the values of the options the user has picked.
#[derive(PartialEq, Debug)]
pub enum OptionsError {
    InvalidNumber(&'static str, String),
    OutOfRange { option: &'static str, value: String, range: String },
    UnexpectedArgument(String),
    EmptyLookup,
}

impl fmt::Display for OptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNumber(option, value)           => write!(f, "Invalid number {:?} for --{}", value, option),
            Self::OutOfRange { option, value, range }    => write!(f, "Value {} for --{} is not in range ({})", value, option, range),
            Self::UnexpectedArgument(arg)                => write!(f, "Unexpected argument {:?}", arg),
            Self::EmptyLookup                            => write!(f, "No name to look up"),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    impl OptionsResult {
        fn unwrap(self) -> Options {
            match self {
                Self::Ok(o)  => o,
                _            => panic!("{:?}", self),
            }
        }
    }

    fn server_config(options: Options) -> (ServerConfig, bool) {
        match options.mode {
            Mode::Serve { config, until_eof }  => (config, until_eof),
            Mode::Lookup(name)                 => panic!("Lookup of {:?}", name),
        }
    }

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    // help tests

    #[test]
    fn help() {
        assert_eq!(Options::getopts(&[ "--help" ]),
                   OptionsResult::Help);
    }

    #[test]
    fn help_short() {
        assert_eq!(Options::getopts(&[ "-?" ]),
                   OptionsResult::Help);
    }

    #[test]
    fn version() {
        assert_eq!(Options::getopts(&[ "--version" ]),
                   OptionsResult::Version);
    }

    #[test]
    fn fail() {
        assert_eq!(Options::getopts(&[ "--pear" ]),
                   OptionsResult::InvalidOptionsFormat(getopts::Fail::UnrecognizedOption("pear".into())));
    }

    #[test]
    fn missing_value() {
        assert_eq!(Options::getopts(&[ "--udp-port" ]),
                   OptionsResult::InvalidOptionsFormat(getopts::Fail::ArgumentMissing("udp-port".into())));
    }

    // default tests

    #[test]
    fn empty() {
        let nothing: Vec<&str> = vec![];
        let options = Options::getopts(nothing).unwrap();

        assert_eq!(options.hosts_file, PathBuf::from("/etc/hosts"));
        assert_eq!(options.limits, Limits {
            cache_size:     nz(1024),
            max_addresses:  nz(8),
            max_aliases:    nz(16),
        });
        assert_eq!(server_config(options), (ServerConfig {
            udp_port:     53,
            tcp_port:     53,
            udp_workers:  1,
            tcp_workers:  5,
            tcp_timeout:  Duration::from_secs(2),
        }, false));
    }

    #[test]
    fn verbose() {
        let options = Options::getopts(&[ "-vv" ]).unwrap();
        assert!(matches!(options.mode, Mode::Serve { .. }));
    }

    // server tests

    #[test]
    fn all_server_options() {
        let options = Options::getopts(&[ "--udp-workers", "3", "--tcp-workers=0", "--udp-port", "5353",
                                          "--tcp-port", "5354", "--tcp-timeout", "0", "--until-eof" ]).unwrap();

        assert_eq!(server_config(options), (ServerConfig {
            udp_port:     5353,
            tcp_port:     5354,
            udp_workers:  3,
            tcp_workers:  0,
            tcp_timeout:  Duration::ZERO,
        }, true));
    }

    #[test]
    fn range_edges() {
        let options = Options::getopts(&[ "--udp-workers", "50", "--udp-port", "1", "--tcp-port", "65000", "--tcp-timeout", "300" ]).unwrap();
        let (config, _) = server_config(options);
        assert_eq!(config.udp_workers, 50);
        assert_eq!(config.udp_port, 1);
        assert_eq!(config.tcp_port, 65000);
        assert_eq!(config.tcp_timeout, Duration::from_secs(300));
    }

    #[test]
    fn too_many_workers() {
        assert_eq!(Options::getopts(&[ "--tcp-workers", "51" ]),
                   OptionsResult::InvalidOptions(OptionsError::OutOfRange {
                       option: "tcp-workers", value: "51".into(), range: "0 to 50".into(),
                   }));
    }

    #[test]
    fn port_zero() {
        assert_eq!(Options::getopts(&[ "--udp-port", "0" ]),
                   OptionsResult::InvalidOptions(OptionsError::OutOfRange {
                       option: "udp-port", value: "0".into(), range: "1 to 65000".into(),
                   }));
    }

    #[test]
    fn port_too_high() {
        assert_eq!(Options::getopts(&[ "--tcp-port", "65001" ]),
                   OptionsResult::InvalidOptions(OptionsError::OutOfRange {
                       option: "tcp-port", value: "65001".into(), range: "1 to 65000".into(),
                   }));
    }

    #[test]
    fn port_not_a_number() {
        assert_eq!(Options::getopts(&[ "--udp-port", "domain" ]),
                   OptionsResult::InvalidOptions(OptionsError::InvalidNumber("udp-port", "domain".into())));
    }

    #[test]
    fn port_beyond_u16() {
        assert_eq!(Options::getopts(&[ "--udp-port", "70000" ]),
                   OptionsResult::InvalidOptions(OptionsError::InvalidNumber("udp-port", "70000".into())));
    }

    #[test]
    fn negative_timeout() {
        assert_eq!(Options::getopts(&[ "--tcp-timeout=-1" ]),
                   OptionsResult::InvalidOptions(OptionsError::InvalidNumber("tcp-timeout", "-1".into())));
    }

    #[test]
    fn timeout_too_long() {
        assert_eq!(Options::getopts(&[ "--tcp-timeout", "301" ]),
                   OptionsResult::InvalidOptions(OptionsError::OutOfRange {
                       option: "tcp-timeout", value: "301".into(), range: "0 to 300".into(),
                   }));
    }

    // resolver tests

    #[test]
    fn resolver_options() {
        let options = Options::getopts(&[ "--hosts-file", "/tmp/hosts", "--cache-size", "2",
                                          "--max-addresses", "64", "--max-aliases", "1" ]).unwrap();

        assert_eq!(options.hosts_file, PathBuf::from("/tmp/hosts"));
        assert_eq!(options.limits, Limits {
            cache_size:     nz(2),
            max_addresses:  nz(64),
            max_aliases:    nz(1),
        });
    }

    #[test]
    fn zero_cache_size() {
        assert_eq!(Options::getopts(&[ "--cache-size", "0" ]),
                   OptionsResult::InvalidOptions(OptionsError::OutOfRange {
                       option: "cache-size", value: "0".into(), range: "1 to 1048576".into(),
                   }));
    }

    #[test]
    fn too_many_addresses() {
        assert_eq!(Options::getopts(&[ "--max-addresses", "65" ]),
                   OptionsResult::InvalidOptions(OptionsError::OutOfRange {
                       option: "max-addresses", value: "65".into(), range: "1 to 64".into(),
                   }));
    }

    // lookup tests

    #[test]
    fn lookup() {
        let options = Options::getopts(&[ "--lookup", "localhost" ]).unwrap();
        assert_eq!(options.mode, Mode::Lookup("localhost".into()));
    }

    #[test]
    fn lookup_trailing_dot() {
        let options = Options::getopts(&[ "-l", "localhost." ]).unwrap();
        assert_eq!(options.mode, Mode::Lookup("localhost".into()));
    }

    #[test]
    fn lookup_nothing() {
        assert_eq!(Options::getopts(&[ "--lookup", "" ]),
                   OptionsResult::InvalidOptions(OptionsError::EmptyLookup));
    }

    #[test]
    fn free_argument() {
        assert_eq!(Options::getopts(&[ "localhost" ]),
                   OptionsResult::InvalidOptions(OptionsError::UnexpectedArgument("localhost".into())));
    }
}
