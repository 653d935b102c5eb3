//! Host binary: drive a Mica file-system image from the command line.
//!
//! Flags are processed left to right, NachOS style:
//!
//! ```text
//! mica [-d IMAGE] [-dbg LETTERS] [-f] [OPS...]
//!
//!   -d IMAGE          disk image to operate on (default: DISK)
//!   -dbg LETTERS      debug tracing: s scheduler, f file system, d disk, + all
//!   -f                format the image before anything else
//!   -cp HOST TARGET   copy a host file into the file system
//!   -p TARGET         print the contents of a file
//!   -r TARGET         remove a file (or empty directory)
//!   -l TARGET         list a directory
//!   -lr TARGET        list a directory tree recursively
//!   -mkdir TARGET     create a directory
//!   -rr TARGET        remove a directory tree recursively
//!   -D                dump the whole file system
//! ```
//!
//! The multi-character single-dash flags are parsed by hand; they are the
//! historical surface and no argument-parsing crate speaks it.

use std::io::Write as _;

use anyhow::{bail, Context, Result};
use machine::Disk;
use mica_kernel::fs::FileSystem;
use mica_kernel::util::logger::{self, DebugFlags};

enum Op {
    Format,
    CopyIn(String, String),
    Print(String),
    Remove(String),
    List(String),
    ListRecursive(String),
    MakeDir(String),
    RemoveRecursive(String),
    Dump,
}

fn usage() -> &'static str {
    "usage: mica [-d IMAGE] [-dbg LETTERS] [-f] [-cp HOST TARGET] [-p TARGET] \
     [-r TARGET] [-l TARGET] [-lr TARGET] [-mkdir TARGET] [-rr TARGET] [-D]"
}

fn parse(args: &[String]) -> Result<(String, DebugFlags, Vec<Op>)> {
    let mut image = String::from("DISK");
    let mut flags = DebugFlags::empty();
    let mut ops = Vec::new();

    let mut iter = args.iter();
    let value = |flag: &str, iter: &mut std::slice::Iter<'_, String>| -> Result<String> {
        iter.next()
            .cloned()
            .with_context(|| format!("{flag} needs an argument\n{}", usage()))
    };

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-d" => image = value("-d", &mut iter)?,
            "-dbg" => flags = DebugFlags::parse(&value("-dbg", &mut iter)?),
            "-f" => ops.push(Op::Format),
            "-cp" => {
                let host = value("-cp", &mut iter)?;
                let target = value("-cp", &mut iter)?;
                ops.push(Op::CopyIn(host, target));
            }
            "-p" => ops.push(Op::Print(value("-p", &mut iter)?)),
            "-r" => ops.push(Op::Remove(value("-r", &mut iter)?)),
            "-l" => ops.push(Op::List(value("-l", &mut iter)?)),
            "-lr" => ops.push(Op::ListRecursive(value("-lr", &mut iter)?)),
            "-mkdir" => ops.push(Op::MakeDir(value("-mkdir", &mut iter)?)),
            "-rr" => ops.push(Op::RemoveRecursive(value("-rr", &mut iter)?)),
            "-D" => ops.push(Op::Dump),
            other => bail!("unknown flag '{other}'\n{}", usage()),
        }
    }
    Ok((image, flags, ops))
}

/// Copy a host file into the file system: create the target at the host
/// file's exact size, then stream the bytes in.
fn copy_in(fs: &mut FileSystem, host: &str, target: &str) -> Result<()> {
    let bytes = std::fs::read(host).with_context(|| format!("reading host file '{host}'"))?;
    fs.create(target, bytes.len())
        .with_context(|| format!("creating '{target}'"))?;
    let file = fs.open(target)?;
    let written = file.write_at(fs.disk(), &bytes, 0);
    assert_eq!(written, bytes.len(), "short write copying '{host}' in");
    Ok(())
}

/// Print a file's contents, escaping non-printable bytes as `\xx`.
fn print_file(fs: &FileSystem, target: &str) -> Result<()> {
    let file = fs.open(target)?;
    let bytes = file.read_all(fs.disk());
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for b in bytes {
        if (0x20..0x7f).contains(&b) || b == b'\n' || b == b'\t' {
            out.write_all(&[b])?;
        } else {
            write!(out, "\\{b:02x}")?;
        }
    }
    out.write_all(b"\n")?;
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        bail!("{}", usage());
    }
    let (image, flags, ops) = parse(&args)?;
    logger::init(flags);

    let disk = Disk::open(&image).with_context(|| format!("opening disk image '{image}'"))?;
    let mut fs = if ops.iter().any(|op| matches!(op, Op::Format)) {
        FileSystem::format(disk)
    } else {
        FileSystem::mount(disk)
    };

    for op in &ops {
        match op {
            Op::Format => {} // performed above, before any other operation
            Op::CopyIn(host, target) => copy_in(&mut fs, host, target)?,
            Op::Print(target) => print_file(&fs, target)?,
            Op::Remove(target) => fs
                .remove(target)
                .with_context(|| format!("removing '{target}'"))?,
            Op::List(target) => fs.list(target)?,
            Op::ListRecursive(target) => fs.recursive_list(target)?,
            Op::MakeDir(target) => fs
                .create_directory(target)
                .with_context(|| format!("creating directory '{target}'"))?,
            Op::RemoveRecursive(target) => fs
                .remove_recursive(target)
                .with_context(|| format!("recursively removing '{target}'"))?,
            Op::Dump => fs.print(),
        }
    }
    Ok(())
}
