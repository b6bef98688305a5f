mod utils;

use anyhow::Context;
use clap::Parser;
use fat32util::disk::RawDisk;
use fat32util::fs::fat::{DirEntry, Fat32Volume, OpenMode, Whence};
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(about = "Interactive shell for FAT32 volume images")]
struct Options {
    #[clap(short, long, parse(from_occurrences))]
    pub verbose: u32,

    #[clap(name = "image", parse(from_os_str))]
    pub image: PathBuf,
}

fn main() -> anyhow::Result<()> {
    better_panic::install();
    let options = Options::parse();
    utils::setup_logging(options.verbose);

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&options.image)
        .with_context(|| format!("cannot open image {}", options.image.display()))?;
    let mut disk = RawDisk::open(file, 512)?;
    let mut volume = Fat32Volume::mount(&mut disk)?;

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("[fat32util] {}> ", volume.pwd());
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let args = tokenize(line.trim());
        if args.is_empty() {
            continue;
        }
        if args[0] == "exit" {
            break;
        }

        if let Err(e) = dispatch(&mut volume, &args) {
            println!("error: {}", e);
        }
    }

    drop(volume);
    disk.flush()?;

    Ok(())
}

fn dispatch(volume: &mut Fat32Volume, args: &[String]) -> anyhow::Result<()> {
    macro_rules! arg {
        ($i:expr) => {
            args.get($i)
                .map(String::as_str)
                .ok_or_else(|| anyhow::anyhow!("missing argument, see `help`"))?
        };
    }

    match args[0].as_str() {
        "info" => println!("{}", volume.bpb()),
        "ls" => {
            for entry in volume.list()? {
                print_entry(&entry);
            }
        }
        "cd" => volume.change_directory(arg!(1))?,
        "mkdir" => volume.create_directory(arg!(1))?,
        "creat" | "touch" => volume.create_file(arg!(1))?,
        "rm" => volume.remove_file(arg!(1))?,
        "rmdir" => volume.remove_directory(arg!(1))?,
        "open" => {
            let mode: OpenMode = arg!(2).parse().map_err(anyhow::Error::msg)?;
            volume.open(arg!(1), mode)?;
        }
        "close" => volume.close(arg!(1))?,
        "lsof" => {
            for (index, file) in volume.open_files().iter().enumerate() {
                println!(
                    "{:<3} {:<12} {:<3} {:>10} {}",
                    index,
                    file.name(),
                    file.mode(),
                    file.cursor(),
                    file.size()
                );
            }
        }
        "lseek" => {
            let whence: Whence = arg!(2).parse().map_err(anyhow::Error::msg)?;
            let offset: i64 = arg!(3).parse()?;
            let cursor = volume.seek(arg!(1), whence, offset)?;
            println!("cursor at {}", cursor);
        }
        "read" => {
            let count: usize = arg!(2).parse()?;
            let data = volume.read(arg!(1), count)?;
            io::stdout().write_all(&data)?;
            println!();
        }
        "write" => {
            let written = volume.write(arg!(1), arg!(2).as_bytes())?;
            println!("wrote {} bytes", written);
        }
        "help" => print_help(),
        other => println!("unknown command {:?}, see `help`", other),
    }

    Ok(())
}

fn print_entry(entry: &DirEntry) {
    println!(
        "{} {:>10} {}",
        if entry.is_directory() { "<DIR>" } else { "     " },
        entry.size,
        entry.display_name()
    );
}

fn print_help() {
    println!(
        "info                         dump boot sector fields
ls                           list the working directory
cd NAME                      enter a directory (`..` goes up)
mkdir NAME                   create a directory
creat NAME                   create an empty file
rm NAME                      delete a file and free its clusters
rmdir NAME                   delete an empty directory
open NAME -r|-w|-rw          open a file
close NAME                   close a file
lsof                         list open files
lseek NAME set|cur|end OFF   move a file cursor
read NAME COUNT              read COUNT bytes at the cursor
write NAME \"TEXT\"            write TEXT at the cursor
exit                         close the image and quit"
    );
}

/// Whitespace split with double-quoted strings kept as one argument.
fn tokenize(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }

    args
}
