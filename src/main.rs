use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::error;
use serde_json::json;

use gopher::net;
use gopher::{Directory, DirectoryItem, GopherError, Limits, Type, DEFAULT_PORT};

/// Fetch a Gopher directory listing and print it
#[derive(Debug, Parser)]
#[command(name = "gopher-client", version)]
struct Args {
    /// Print entries as JSON and log the exchange
    #[arg(short, long)]
    verbose: bool,

    /// Fetch the selector as a plain resource and copy it to stdout
    #[arg(short, long)]
    file: bool,

    /// Hex dump the raw response instead of decoding it
    #[arg(short = 'x', long)]
    hex: bool,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "")]
    selector: String,

    /// Stop after this many entries
    #[arg(long, default_value_t = gopher::config::MAX_ENTRIES)]
    max_entries: usize,

    /// Read and write deadline in seconds, 0 to wait forever
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Deadline for the whole response in seconds, 0 to wait forever
    #[arg(long, default_value_t = 30)]
    response_timeout: u64,

    host: String,
}

impl Args {
    fn limits(&self) -> Limits {
        Limits::default()
            .with_max_entries(self.max_entries)
            .with_timeout(Some(Duration::from_secs(self.timeout)))
            .with_response_timeout(Some(Duration::from_secs(self.response_timeout)))
    }
}

fn glyph(t: Type) -> &'static str {
    match t {
        Type::File => "📄",
        Type::Directory => "📁",
        Type::CSOPhoneBook => "📓",
        Type::Error => "⚠",
        Type::BinHexed | Type::Binary => "💿",
        Type::BinArchive => "💻",
        Type::UUEncoded => "🕸",
        Type::SearchServer => "🔍",
        Type::TelnetSession | Type::Tn3270Session => "📞",
        Type::RedundantServer => "🗄",
        Type::GIF => "📹",
        Type::Image => "📷",
        Type::Unknown(_) => "?",
    }
}

fn print_listing<W: Write>(out: &mut W, directory: &Directory) -> io::Result<()> {
    for (n, item) in directory.iter().enumerate() {
        writeln!(out, "{:3}. {} {}", n, glyph(item.item_type), item.display)?;
    }
    Ok(())
}

fn item_json(id: usize, item: &DirectoryItem) -> serde_json::Value {
    json!({
        "id": id,
        "type": char::from(item.item_type.as_byte()).to_string(),
        "display": item.display,
        "selector": item.selector,
        "hostname": item.host,
        "port": item.port,
    })
}

fn print_json<W: Write>(out: &mut W, directory: &Directory) -> io::Result<()> {
    let items: Vec<_> = directory
        .iter()
        .enumerate()
        .map(|(id, item)| item_json(id, item))
        .collect();
    serde_json::to_writer_pretty(&mut *out, &items)?;
    writeln!(out)
}

/// Eight bytes per row, `0xNN` each
fn print_hex<W: Write>(out: &mut W, bytes: &[u8]) -> io::Result<()> {
    for row in bytes.chunks(8) {
        for b in row {
            write!(out, " 0x{:02X}", b)?;
        }
        writeln!(out)?;
    }
    writeln!(out)
}

fn run(args: &Args) -> Result<(), GopherError> {
    let limits = args.limits();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.file || args.hex {
        let bytes = net::read_resource(&args.host, args.port, &args.selector, &limits)?;
        if args.hex {
            print_hex(&mut out, &bytes)?;
        } else {
            out.write_all(&bytes)?;
        }
        return Ok(out.flush()?);
    }

    let directory = net::read_directory_with(&args.host, args.port, &args.selector, &limits)?;
    if args.verbose {
        print_json(&mut out, &directory)?;
    } else {
        print_listing(&mut out, &directory)?;
    }
    Ok(out.flush()?)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("gopher-client: {}", e);
            ExitCode::FAILURE
        }
    }
}
