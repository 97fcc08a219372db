use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use iscab::{Cabinet, ExtractMethod, V3Archive};

// ========================================================================= //

#[derive(Parser)]
#[command(name = "iscab")]
#[command(about = "Lists and extracts InstallShield cabinets and V3 archives")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lists the files in a cabinet set
    List {
        /// Any volume of the set (data1.hdr, data1.cab, ...)
        cab: PathBuf,
    },
    /// Extracts every valid file of a cabinet set
    Extract {
        /// Any volume of the set
        cab: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Splits compressed data at end-of-chunk markers
        #[arg(long, conflicts_with = "raw")]
        legacy: bool,
        /// Writes the stored bytes without decompressing them
        #[arg(long)]
        raw: bool,
    },
    /// Lists the file groups of a cabinet set
    Groups {
        /// Any volume of the set
        cab: PathBuf,
    },
    /// Lists the components of a cabinet set
    Components {
        /// Any volume of the set
        cab: PathBuf,
    },
    /// Lists the members of a V3 (.Z) archive
    V3List {
        /// The archive
        archive: PathBuf,
    },
    /// Extracts members of a V3 (.Z) archive
    V3Extract {
        /// The archive
        archive: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Member paths to extract (all members if omitted)
        members: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::List { cab } => list(&cab),
        Command::Extract { cab, output, legacy, raw } => {
            let method = if raw {
                ExtractMethod::Raw
            } else if legacy {
                ExtractMethod::Legacy
            } else {
                ExtractMethod::Chunked
            };
            extract(&cab, &output, method)
        }
        Command::Groups { cab } => groups(&cab),
        Command::Components { cab } => components(&cab),
        Command::V3List { archive } => v3_list(&archive),
        Command::V3Extract { archive, output, members } => {
            v3_extract(&archive, &output, &members)
        }
    }
}

// ========================================================================= //

fn open(path: &Path) -> anyhow::Result<Cabinet> {
    Cabinet::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

fn file_path(cabinet: &Cabinet, index: usize) -> PathBuf {
    let mut path = PathBuf::new();
    if let Some(directory) = cabinet.file_directory(index) {
        for part in directory.split(['\\', '/']).filter(|p| !p.is_empty()) {
            path.push(part);
        }
    }
    path.push(cabinet.file_name(index).unwrap_or_default());
    path
}

fn list(path: &Path) -> anyhow::Result<()> {
    let cabinet = open(path)?;
    println!(
        "Version {}, {} volume(s), {} file(s)",
        cabinet.major_version(),
        cabinet.volume_count(),
        cabinet.file_count()
    );
    for (index, file) in cabinet.files().enumerate() {
        if !file.is_valid() {
            continue;
        }
        println!(
            "{}{}{} {:>3} {:>10} {:>10} {}",
            if file.is_compressed() { 'C' } else { '-' },
            if file.is_obfuscated() { 'O' } else { '-' },
            if file.is_split() { 'S' } else { '-' },
            file.volume(),
            file.expanded_size(),
            file.compressed_size(),
            file_path(&cabinet, index).display()
        );
    }
    Ok(())
}

fn extract(
    path: &Path,
    output: &Path,
    method: ExtractMethod,
) -> anyhow::Result<()> {
    let cabinet = open(path)?;
    let mut failures = 0;
    for index in 0..cabinet.file_count() {
        if !cabinet.is_file_valid(index) {
            continue;
        }
        let target = output.join(file_path(&cabinet, index));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        match cabinet.extract_file(index, &target, method) {
            Ok(size) => println!("{} ({} bytes)", target.display(), size),
            Err(error) => {
                eprintln!("Failed to extract {}: {}", target.display(), error);
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{} file(s) failed to extract", failures);
    }
    Ok(())
}

fn groups(path: &Path) -> anyhow::Result<()> {
    let cabinet = open(path)?;
    for group in cabinet.file_groups() {
        let files = cabinet.file_group_files(group);
        println!(
            "{}: files {}-{} ({} present), {} bytes",
            group.name(),
            group.first_file(),
            group.last_file(),
            files.len(),
            group.expanded_size()
        );
    }
    Ok(())
}

fn components(path: &Path) -> anyhow::Result<()> {
    let cabinet = open(path)?;
    for component in cabinet.components() {
        match component.display_name() {
            Some(display_name) => {
                println!("{} ({})", component.name(), display_name)
            }
            None => println!("{}", component.name()),
        }
        for group in component.file_group_names() {
            println!("  {}", group);
        }
    }
    Ok(())
}

// ========================================================================= //

fn v3_list(path: &Path) -> anyhow::Result<()> {
    let archive = V3Archive::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    for file in archive.files() {
        let datetime = match file.datetime() {
            Some(datetime) => datetime.to_string(),
            None => "invalid datetime".to_string(),
        };
        println!(
            "{:>10} {:>10} {} {}",
            file.uncompressed_size(),
            file.compressed_size(),
            datetime,
            file.path()
        );
    }
    Ok(())
}

fn v3_extract(
    path: &Path,
    output: &Path,
    members: &[String],
) -> anyhow::Result<()> {
    let mut archive = V3Archive::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let members: Vec<String> = if members.is_empty() {
        archive.files().map(|file| file.path().to_string()).collect()
    } else {
        members.to_vec()
    };
    for member in members {
        let target = output.join(member.replace('\\', "/"));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = io::BufWriter::new(fs::File::create(&target)?);
        let size = archive.extract_to(&member, &mut writer)?;
        writer.flush()?;
        println!("{} ({} bytes)", target.display(), size);
    }
    Ok(())
}

// ========================================================================= //
