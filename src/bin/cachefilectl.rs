//! Manual-testing CLI for the cache I/O engine. Not part of the library's public
//! contract — a development aid for poking at a cache root from a shell.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cachefile_io::{CacheConfig, Engine, EnumerateMode, HandleRef, Listener, OpenFlags};

#[derive(Parser)]
#[command(name = "cachefilectl", about = "Poke at a cachefile-io cache root")]
struct Cli {
    /// Cache root directory. Defaults to the platform cache directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create (or adopt) an entry and report its digest and size.
    Open {
        key: String,
        #[arg(long)]
        nohash: bool,
    },
    /// Write bytes (read from stdin) into an entry, creating it if missing.
    Write { key: String },
    /// Read an entry's full contents to stdout.
    Read { key: String },
    /// Doom an entry by key, whether or not it's currently open.
    Doom {
        key: String,
        #[arg(long)]
        nohash: bool,
    },
    /// List the entries or doomed files under the cache root.
    Enumerate {
        #[arg(long, value_enum, default_value = "entries")]
        mode: Mode,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum Mode {
    Entries,
    Doomed,
}

fn install_tracing() {
    tracing_log::LogTracer::init().expect("failed to install log -> tracing bridge");
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn main() -> Result<()> {
    install_tracing();
    let cli = Cli::parse();

    let root = match cli.root {
        Some(root) => root,
        None => CacheConfig::default_root().context("no explicit --root and no platform cache directory")?,
    };
    tracing::info!(root = %root.display(), "starting cachefilectl");
    let engine = Engine::start(CacheConfig::new(root));

    match cli.command {
        Command::Open { key, nohash } => {
            let flags = if nohash { OpenFlags::CREATE | OpenFlags::NOHASH } else { OpenFlags::CREATE };
            let handle = open_blocking(&engine, key, flags)?;
            println!("digest: {}", handle.digest());
            println!("path: {}", handle.path().display());
            println!("size: {}", handle.file_size());
        }
        Command::Write { key } => {
            let handle = open_blocking(&engine, key, OpenFlags::CREATE)?;
            let mut data = Vec::new();
            std::io::copy(&mut std::io::stdin(), &mut data)?;
            write_blocking(&engine, &handle, data)?;
            println!("wrote entry {}", handle.digest());
        }
        Command::Read { key } => {
            let handle = open_blocking(&engine, key, OpenFlags::OPEN)?;
            let size = handle.file_size().max(0) as usize;
            let data = read_blocking(&engine, &handle, size)?;
            std::io::stdout().write_all(&data)?;
        }
        Command::Doom { key, nohash } => {
            doom_blocking(&engine, key, nohash)?;
            println!("doomed");
        }
        Command::Enumerate { mode } => {
            let mode = match mode {
                Mode::Entries => EnumerateMode::Entries,
                Mode::Doomed => EnumerateMode::Doomed,
            };
            for path in engine.enumerate_entry_files(mode)? {
                println!("{}", path.display());
            }
        }
    }

    engine.shutdown();
    Ok(())
}

fn open_blocking(engine: &Engine, key: String, flags: OpenFlags) -> Result<HandleRef> {
    let (sender, receiver) = mpsc::channel();
    struct OnOpen(mpsc::Sender<cachefile_io::Result<HandleRef>>);
    impl Listener for OnOpen {
        fn on_file_opened(&self, result: cachefile_io::Result<HandleRef>) {
            let _ = self.0.send(result);
        }
    }
    engine.open_file(key, flags, OnOpen(sender))?;
    receiver.recv().context("worker never replied")?.context("open_file failed")
}

fn write_blocking(engine: &Engine, handle: &HandleRef, data: Vec<u8>) -> Result<usize> {
    let (sender, receiver) = mpsc::channel();
    struct OnWrite(mpsc::Sender<cachefile_io::Result<usize>>);
    impl Listener for OnWrite {
        fn on_data_written(&self, _handle: HandleRef, result: cachefile_io::Result<usize>) {
            let _ = self.0.send(result);
        }
    }
    engine.write(handle, 0, data, true, OnWrite(sender))?;
    receiver.recv().context("worker never replied")?.context("write failed")
}

fn read_blocking(engine: &Engine, handle: &HandleRef, size: usize) -> Result<Vec<u8>> {
    let (sender, receiver) = mpsc::channel();
    struct OnRead(mpsc::Sender<cachefile_io::Result<Vec<u8>>>);
    impl Listener for OnRead {
        fn on_data_read(&self, _handle: HandleRef, result: cachefile_io::Result<Vec<u8>>) {
            let _ = self.0.send(result);
        }
    }
    engine.read(handle, 0, size, OnRead(sender))?;
    receiver.recv().context("worker never replied")?.context("read failed")
}

fn doom_blocking(engine: &Engine, key: String, nohash: bool) -> Result<()> {
    let (sender, receiver) = mpsc::channel();
    struct OnDoom(mpsc::Sender<cachefile_io::Result<()>>);
    impl Listener for OnDoom {
        fn on_file_doomed(&self, _handle: Option<HandleRef>, result: cachefile_io::Result<()>) {
            let _ = self.0.send(result);
        }
    }
    engine.doom_file_by_key(key, nohash, false, OnDoom(sender))?;
    receiver.recv().context("worker never replied")?.context("doom failed")
}
