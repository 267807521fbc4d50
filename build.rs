//! This build script gets run during every build. Its purpose is to put
//! together the files used for the `--help` and `--version`, which need to
//! come in both coloured and non-coloured variants. The main usage text is
//! contained in `src/usage.txt`; to make it easier to edit, backslashes (\)
//! are used instead of the beginning of ANSI escape codes.
//!
//! Debug builds also show the date they were compiled on, so it’s obvious
//! when an old binary is still running.

use std::env;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use datetime::{LocalDateTime, ISO};
use regex::Regex;


/// The build script entry point.
fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=src/usage.txt");

    let usage   = include_str!("src/usage.txt");
    let tagline = "hostsd \\1;32m●\\0m caching DNS server for hosts files";

    let ver = if is_development_version()? {
            format!("{}\nv{} built on {} \\1;31m(pre-release!)\\0m", tagline, cargo_version()?, build_date())
        }
        else {
            format!("{}\nv{}", tagline, cargo_version()?)
        };

    // We need to create these files in the Cargo output directory.
    let out = PathBuf::from(env_var("OUT_DIR")?);

    // The bits .txt files contain ANSI escape codes, ish.
    let control_code = Regex::new(r##"\\.+?m"##)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    // Pretty version text
    let mut f = File::create(&out.join("version.pretty.txt"))?;
    writeln!(f, "{}", ver.replace('\\', "\x1B["))?;

    // Bland version text
    let mut f = File::create(&out.join("version.bland.txt"))?;
    writeln!(f, "{}", control_code.replace_all(&ver, ""))?;

    // Pretty usage text
    let mut f = File::create(&out.join("usage.pretty.txt"))?;
    write!(f, "{}\n\n{}", tagline.replace('\\', "\x1B["), usage.replace('\\', "\x1B["))?;

    // Bland usage text
    let mut f = File::create(&out.join("usage.bland.txt"))?;
    write!(f, "{}\n\n{}", control_code.replace_all(tagline, ""), control_code.replace_all(usage, ""))?;

    Ok(())
}


/// Whether we should show pre-release info in the version string.
fn is_development_version() -> io::Result<bool> {
    Ok(cargo_version()?.ends_with("-pre") || env_var("PROFILE")? == "debug")
}


/// Retrieves the [package] version in Cargo.toml as a string.
fn cargo_version() -> io::Result<String> {
    env_var("CARGO_PKG_VERSION")
}


fn env_var(name: &str) -> io::Result<String> {
    env::var(name).map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{}: {}", name, e)))
}


/// Formats the current date as an ISO 8601 string.
fn build_date() -> String {
    let now = LocalDateTime::now();
    format!("{}", now.date().iso())
}
