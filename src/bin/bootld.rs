// JNode boot image linker
//
//  Copyright (C) 2014-2022 Ryan Specialty Group, LLC.
//
//  This file is part of bootld.
//
//  This program is free software: you can redistribute it and/or modify
//  it under the terms of the GNU General Public License as published by
//  the Free Software Foundation, either version 3 of the License, or
//  (at your option) any later version.
//
//  This program is distributed in the hope that it will be useful,
//  but WITHOUT ANY WARRANTY; without even the implied warranty of
//  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//  GNU General Public License for more details.
//
//  You should have received a copy of the GNU General Public License
//  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! This is the boot image linker,
//!   so named after the traditional `ld` Unix utility.
//! Its job is to take the boot class set described by a boot manifest and
//!   the natively assembled kernel blob and produce a single bootable
//!   image.
//!
//! For more information about the linker,
//!   see the [`bootld::ld`] module.

extern crate bootld;

use bootld::{
    boot::{read_manifest, ManifestError},
    fs::{File, PathFile},
    img::Word,
    ld::{
        ConfigError, ImageLinker, InitOrderKind, LinkConfig, LinkError,
        VbeMode,
    },
};
use getopts::{Fail, Options};
use std::{
    env,
    error::Error,
    fmt::{self, Display},
    fs,
    io::{self, BufReader},
};

/// Types of commands
enum Command {
    Link(LinkArgs),
    Usage,
}

/// Arguments of a link.
struct LinkArgs {
    manifest: String,
    kernel: String,
    output: String,
    list: Option<String>,
    config: LinkConfig,
}

/// Link the image described by `args`,
///   writing the image and optional listing.
fn link(args: &LinkArgs) -> Result<(), BootldError> {
    let file: PathFile<BufReader<fs::File>> = PathFile::open(&args.manifest)
        .map_err(|e| BootldError::Input(args.manifest.clone(), e))?;

    let set = read_manifest(file.into_inner())?;

    let kernel = fs::File::read_all(&args.kernel)
        .map_err(|e| BootldError::Input(args.kernel.clone(), e))?;

    let image = ImageLinker::new(args.config.clone()).link(&set, &kernel)?;

    match &args.list {
        Some(list) => image.write_with_listing(&args.output, list, &set)?,
        None => image.write(&args.output)?,
    }

    println!(
        "bootld: linked {} object(s) and {} label(s) into `{}` \
            ({} bytes at {:#010x})",
        image.objects().len(),
        image.labels().len(),
        args.output,
        image.len(),
        image.base(),
    );

    Ok(())
}

/// Entrypoint for the linker
pub fn main() {
    let args: Vec<String> = env::args().collect();
    let program = &args[0];
    let opts = get_opts();
    let usage = opts.usage(&format!(
        "Usage: {} [OPTIONS] MANIFEST -k KERNEL -o OUTPUT",
        program
    ));

    match parse_options(opts, args) {
        Ok(Command::Link(link_args)) => {
            if let Err(e) = link(&link_args) {
                eprintln!(
                    "error: {e}\nfatal: failed to link `{}`",
                    link_args.output
                );
                std::process::exit(1);
            }
        }
        Ok(Command::Usage) => {
            println!("{}", usage);
            std::process::exit(exitcode::OK);
        }
        Err(e) => {
            eprintln!("{}", e);
            println!("{}", usage);
            std::process::exit(exitcode::USAGE);
        }
    }
}

/// Get 'Options'
fn get_opts() -> Options {
    let mut opts = Options::new();
    opts.optopt("k", "kernel", "native kernel blob (ELF object)", "FILE");
    opts.optopt("o", "output", "set output file name", "NAME");
    opts.optopt("", "bits", "target word size (default 32)", "32|64");
    opts.optopt("", "base", "image load address (default 0x100000)", "ADDR");
    opts.optopt("", "list", "write a label listing", "FILE");
    opts.optopt("", "vbe", "request a video mode", "WxHxD");
    opts.optopt(
        "",
        "init-order",
        "static initializer order (default decl)",
        "decl|deps",
    );
    opts.optflag("h", "help", "print this help menu");

    opts
}

/// Option parser
fn parse_options(
    opts: Options,
    args: Vec<String>,
) -> Result<Command, BootldError> {
    let matches = opts.parse(&args[1..])?;

    if matches.opt_present("h") {
        return Ok(Command::Usage);
    }

    let manifest = match matches.free.len() {
        0 => return Err(Fail::OptionMissing(String::from("MANIFEST")).into()),
        1 => matches.free[0].clone(),
        _ => return Err(Fail::UnrecognizedOption(matches.free[1].clone()).into()),
    };

    let kernel = matches
        .opt_str("k")
        .ok_or_else(|| Fail::OptionMissing(String::from("--kernel")))?;

    let output = matches
        .opt_str("o")
        .ok_or_else(|| Fail::OptionMissing(String::from("--output")))?;

    let mut config = LinkConfig::default();

    if let Some(bits) = matches.opt_str("bits") {
        config.word = match &bits[..] {
            "32" => Word::W32,
            "64" => Word::W64,
            _ => return Err(BootldError::BadOption("--bits", bits)),
        };
    }

    if let Some(base) = matches.opt_str("base") {
        config.base =
            parse_addr(&base).ok_or(BootldError::BadOption("--base", base))?;
    }

    if let Some(vbe) = matches.opt_str("vbe") {
        config.vbe = vbe
            .parse::<VbeMode>()
            .map_err(|_| BootldError::BadOption("--vbe", vbe))?;
    }

    if let Some(order) = matches.opt_str("init-order") {
        config.init_order = order
            .parse::<InitOrderKind>()
            .map_err(|_| BootldError::BadOption("--init-order", order))?;
    }

    config.validate().map_err(BootldError::Config)?;

    Ok(Command::Link(LinkArgs {
        manifest,
        kernel,
        output,
        list: matches.opt_str("list"),
        config,
    }))
}

/// Parse an address in decimal or `0x`-prefixed hexadecimal.
fn parse_addr(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Linker (`bootld`) error.
///
/// This represents the aggregation of all possible errors that can occur
///   during a link,
///     including the invocation itself.
#[derive(Debug)]
pub enum BootldError {
    /// Command line could not be parsed.
    Opts(Fail),
    /// An option was given a value it does not accept.
    BadOption(&'static str, String),
    /// Options are inconsistent with one another.
    Config(ConfigError),
    /// An input file could not be read.
    Input(String, io::Error),
    Manifest(ManifestError),
    Link(LinkError),
}

impl From<Fail> for BootldError {
    fn from(e: Fail) -> Self {
        Self::Opts(e)
    }
}

impl From<ManifestError> for BootldError {
    fn from(e: ManifestError) -> Self {
        Self::Manifest(e)
    }
}

impl From<LinkError> for BootldError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl Display for BootldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opts(e) => Display::fmt(e, f),
            Self::BadOption(opt, value) => {
                write!(f, "invalid value `{value}` for option {opt}")
            }
            Self::Config(e) => Display::fmt(e, f),
            Self::Input(path, e) => write!(f, "failed to read `{path}`: {e}"),
            Self::Manifest(e) => write!(f, "invalid boot manifest: {e}"),
            Self::Link(e) => Display::fmt(e, f),
        }
    }
}

impl Error for BootldError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Opts(e) => Some(e),
            Self::Input(_, e) => Some(e),
            Self::Manifest(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Link(e) => Some(e),
            Self::BadOption(..) => None,
        }
    }
}
