use std::fs::File;
use std::io::{BufReader, Cursor, Seek, SeekFrom};
use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use clap::{Args, Parser};
use cvmfs::{DirectoryListing, OverlayContext, OverlayState, OverlayTable, Region};
use cvmfs::iso9660::{DirectoryRecord, IsoDirectory};
use tracing::debug;
use tracing_subscriber::EnvFilter;


#[derive(Parser)]
enum ProgMode {
    Dump(DumpArgs),
    Find(FindArgs),
    Rewrite(RewriteArgs),
    Relink(RelinkArgs),
}

#[derive(Args)]
struct ListingArgs {
    pub input_file: PathBuf,

    /// Byte offset of the root directory listing (decimal or 0x-prefixed hex).
    #[arg(short, long, default_value = "0", value_parser = parse_offset)]
    pub offset: u64,

    /// Region of the disc build: unspecified, pal, ntsc or a number.
    #[arg(short, long, default_value = "unspecified")]
    pub region: Region,

    /// JSON file with overlay offsets per region; defaults to the known builds.
    #[arg(long)]
    pub overlay_table: Option<PathBuf>,
}

#[derive(Parser)]
struct DumpArgs {
    #[command(flatten)]
    pub listing: ListingArgs,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
struct FindArgs {
    #[command(flatten)]
    pub listing: ListingArgs,

    pub path: String,
}

#[derive(Parser)]
struct RewriteArgs {
    #[command(flatten)]
    pub listing: ListingArgs,

    pub output_file: PathBuf,
}

#[derive(Parser)]
struct RelinkArgs {
    #[command(flatten)]
    pub listing: ListingArgs,

    pub output_file: PathBuf,

    /// Byte offset of the ISO9660 root directory record (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_offset)]
    pub root_record_offset: u64,
}


fn parse_offset(text: &str) -> Result<u64, ParseIntError> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        text.parse()
    }
}

fn load_overlay_table(path: Option<&Path>) -> OverlayTable {
    match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .expect("failed to read overlay table");
            serde_json::from_str(&text)
                .expect("failed to parse overlay table")
        },
        None => OverlayTable::known_builds(),
    }
}

fn read_listing_from_file(args: &ListingArgs, table: &OverlayTable) -> DirectoryListing {
    let input_file = File::open(&args.input_file)
        .expect("failed to open input file");
    let mut reader = BufReader::new(input_file);
    let context = OverlayContext::new(table, args.region);
    cvmfs::read_root_listing(&mut reader, args.offset, &context)
        .expect("failed to read directory listing")
}

fn write_listing_into_image(
    image: Vec<u8>,
    listing: &DirectoryListing,
    args: &ListingArgs,
    table: &OverlayTable,
) -> Vec<u8> {
    let context = OverlayContext::new(table, args.region);
    let mut cursor = Cursor::new(image);
    cursor.seek(SeekFrom::Start(args.offset))
        .expect("failed to seek to directory listing");
    listing.write(&mut cursor, OverlayState::default(), &context)
        .expect("failed to write directory listing");
    cursor.into_inner()
}


fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mode = ProgMode::parse();
    match mode {
        ProgMode::Dump(args) => {
            let table = load_overlay_table(args.listing.overlay_table.as_deref());
            let listing = read_listing_from_file(&args.listing, &table);

            if args.json {
                let json = serde_json::to_string_pretty(&listing)
                    .expect("failed to serialize directory listing");
                println!("{}", json);
            } else {
                println!(
                    "root listing: {} entries, tag {}, directory record LBA {}",
                    listing.entries().len(), listing.tag(), listing.directory_record_lba(),
                );
                listing.walk(|path, entry| {
                    let kind = if entry.is_directory() { "dir" } else { "file" };
                    println!("{:>4} {:>10} {:>10} {}", kind, entry.lba, entry.file_size, path);
                });
            }
        },
        ProgMode::Find(args) => {
            let table = load_overlay_table(args.listing.overlay_table.as_deref());
            let listing = read_listing_from_file(&args.listing, &table);

            match listing.find(&args.path) {
                Some(entry) => {
                    println!("name: {}", entry.name());
                    println!("flags: {:?}", entry.flags);
                    println!("LBA: {}", entry.lba);
                    println!("size: {}", entry.file_size);
                    if let Some(sub_listing) = entry.listing() {
                        println!("directory record LBA: {}", sub_listing.directory_record_lba());
                        println!("entries: {}", sub_listing.entries().len());
                    }
                },
                None => {
                    eprintln!("{:?} not found", args.path);
                    std::process::exit(1);
                },
            }
        },
        ProgMode::Rewrite(args) => {
            let table = load_overlay_table(args.listing.overlay_table.as_deref());
            let image = std::fs::read(&args.listing.input_file)
                .expect("failed to read input file");
            let context = OverlayContext::new(&table, args.listing.region);
            let listing = cvmfs::read_root_listing(&mut Cursor::new(&image), args.listing.offset, &context)
                .expect("failed to read directory listing");

            let output = write_listing_into_image(image.clone(), &listing, &args.listing, &table);
            if output != image {
                debug!("rewritten image differs from the input");
            }
            std::fs::write(&args.output_file, &output)
                .expect("failed to write output file");
        },
        ProgMode::Relink(args) => {
            let table = load_overlay_table(args.listing.overlay_table.as_deref());
            let image = std::fs::read(&args.listing.input_file)
                .expect("failed to read input file");
            let mut cursor = Cursor::new(&image);

            let context = OverlayContext::new(&table, args.listing.region);
            let mut listing = cvmfs::read_root_listing(&mut cursor, args.listing.offset, &context)
                .expect("failed to read directory listing");

            cursor.seek(SeekFrom::Start(args.root_record_offset))
                .expect("failed to seek to root directory record");
            let root_record = DirectoryRecord::read(&mut cursor)
                .expect("failed to read root directory record")
                .expect("root directory record is empty");
            let root_directory = IsoDirectory::read_tree(&mut cursor, root_record)
                .expect("failed to read ISO9660 directory tree");

            listing.relink(&root_directory)
                .expect("failed to relink directory listing");

            let output = write_listing_into_image(image, &listing, &args.listing, &table);
            std::fs::write(&args.output_file, &output)
                .expect("failed to write output file");
        },
    }
}
