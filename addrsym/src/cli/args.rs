//! CLI argument definitions

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "addrsym",
    about = "Resolve instruction addresses to images and symbols",
    after_help = "\
EXAMPLES:
    addrsym --pid 1234 0x55f3a2b4c780 0x7f8b3c1c2f10   Symbolicate addresses of process 1234
    addrsym --pid 1234 --list-images                   Show the images mapped into process 1234
    cat addrs.txt | addrsym --pid 1234 --json          Addresses from stdin, native frame JSON out"
)]
pub struct Args {
    /// Instruction addresses (0x-prefixed hex or decimal); read from stdin if omitted
    #[arg(value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Process whose images are used (defaults to this process)
    #[arg(short, long)]
    pub pid: Option<u32>,

    /// Print frames and debug images as JSON
    #[arg(long)]
    pub json: bool,

    /// Keep symbol names mangled
    #[arg(long)]
    pub no_demangle: bool,

    /// Use dladdr(3) instead of reading image files (own process only)
    #[arg(long, conflicts_with = "pid")]
    pub dladdr: bool,

    /// Print the loaded images
    #[arg(long)]
    pub list_images: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
