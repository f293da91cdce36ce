use clap::{Parser, Subcommand};
use csv::ReaderBuilder;
use env_logger::{Builder, Env};
use log::{error, info};
use prettytable::{Table, row};
use std::path::{Path, PathBuf};
use thiserror::Error;

use rbfm::{
    FileHandle, Record, RecordBasedFileManager, RecordDescriptor, RecordError, RecordResult, Value,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Record(#[from] RecordError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV delimiter must be a single ASCII character, got {0:?}")]
    InvalidDelimiter(char),
}

#[derive(Debug, Parser)]
#[command(name = "rbfm", about = "Create, load and inspect record-based page files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an empty record file
    Create { file: PathBuf },
    /// Delete a record file
    Destroy { file: PathBuf },
    /// Show the slot directory summary of every page
    Stats { file: PathBuf },
    /// Insert CSV rows as records
    Load {
        file: PathBuf,
        /// JSON array of {"name", "type"} attributes
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Print every live record
    Dump {
        file: PathBuf,
        #[arg(long)]
        schema: PathBuf,
    },
    /// Reclaim space left by deleted and shrunk records
    Compact { file: PathBuf },
}

fn init_logger() {
    // RUST_LOG overrides the default level, e.g. RUST_LOG=debug rbfm stats t1
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run(Cli::parse()) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let rbfm = RecordBasedFileManager::new();

    match cli.command {
        Command::Create { file } => rbfm.create_file(&file)?,
        Command::Destroy { file } => rbfm.destroy_file(&file)?,
        Command::Stats { file } => with_open_file(&rbfm, &file, |handle| {
            let mut table = Table::new();
            table.add_row(row!["page", "slots", "live", "deleted", "free", "reclaimable"]);
            for stats in rbfm.page_stats(handle)? {
                table.add_row(row![
                    stats.page_num,
                    stats.slot_count,
                    stats.live_records,
                    stats.tombstones,
                    stats.free_space,
                    stats.reclaimable
                ]);
            }
            table.printstd();
            print_counters(handle)
        })?,
        Command::Load {
            file,
            schema,
            csv,
            delimiter,
        } => {
            let descriptor = RecordDescriptor::from_json_file(&schema)?;
            let inserted = with_open_file(&rbfm, &file, |handle| {
                let inserted = load_csv(&rbfm, handle, &descriptor, &csv, delimiter)?;
                print_counters(handle)?;
                Ok(inserted)
            })?;
            info!("loaded {} records into {}", inserted, file.display());
        }
        Command::Dump { file, schema } => {
            let descriptor = RecordDescriptor::from_json_file(&schema)?;
            with_open_file(&rbfm, &file, |handle| {
                for (rid, record) in rbfm.scan(handle, &descriptor)? {
                    print!("{}    ", rid);
                    rbfm.print_record(&descriptor, &record);
                }
                Ok(())
            })?;
        }
        Command::Compact { file } => {
            let reclaimed = with_open_file(&rbfm, &file, |handle| {
                let mut reclaimed = 0;
                for page_num in 0..handle.number_of_pages().map_err(RecordError::from)? {
                    reclaimed += rbfm.compact_page(handle, page_num)?;
                }
                Ok(reclaimed)
            })?;
            info!("reclaimed {} bytes in {}", reclaimed, file.display());
        }
    }

    Ok(())
}

/// Open `path`, run `f` on the bound handle and close it again
fn with_open_file<T>(
    rbfm: &RecordBasedFileManager,
    path: &Path,
    f: impl FnOnce(&mut FileHandle) -> Result<T, CliError>,
) -> Result<T, CliError> {
    let mut handle = FileHandle::new();
    rbfm.open_file(path, &mut handle)?;
    let result = f(&mut handle);
    rbfm.close_file(&mut handle)?;
    result
}

fn load_csv(
    rbfm: &RecordBasedFileManager,
    handle: &mut FileHandle,
    descriptor: &RecordDescriptor,
    csv_path: &Path,
    delimiter: char,
) -> Result<usize, CliError> {
    let delimiter = ascii_delimiter(delimiter)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_path(csv_path)?;

    let mut inserted = 0;
    for row in reader.records() {
        let row = row?;
        if row.len() != descriptor.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "CSV row {} has {} fields, expected {}",
                inserted + 1,
                row.len(),
                descriptor.len()
            ))
            .into());
        }

        let values = descriptor
            .attributes()
            .iter()
            .zip(row.iter())
            .map(|(attr, field)| Value::parse(field, &attr.data_type))
            .collect::<RecordResult<Vec<_>>>()?;
        rbfm.insert_record(handle, descriptor, &Record::new(values))?;
        inserted += 1;
    }

    Ok(inserted)
}

fn ascii_delimiter(delimiter: char) -> Result<u8, CliError> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or(CliError::InvalidDelimiter(delimiter))
}

fn print_counters(handle: &FileHandle) -> Result<(), CliError> {
    let counters = handle.collect_counter_values();
    println!("{}", serde_json::to_string(&counters)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_delimiter() {
        assert_eq!(ascii_delimiter(',').unwrap(), b',');
        assert_eq!(ascii_delimiter('\t').unwrap(), b'\t');
        // Latin-1 range would truncate to a different byte
        assert!(matches!(
            ascii_delimiter('é'),
            Err(CliError::InvalidDelimiter('é'))
        ));
        assert!(matches!(
            ascii_delimiter('‖'),
            Err(CliError::InvalidDelimiter(_))
        ));
    }

    #[test]
    fn test_load_rejects_non_ascii_delimiter() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("t");
        let csv_path = temp_dir.path().join("rows.csv");
        std::fs::write(&csv_path, "1,ab\n").unwrap();

        let rbfm = RecordBasedFileManager::new();
        rbfm.create_file(&file).unwrap();
        let descriptor = RecordDescriptor::from_json(
            r#"[{"name":"id","type":"int"},{"name":"name","type":{"varchar":10}}]"#,
        )
        .unwrap();

        let result = with_open_file(&rbfm, &file, |handle| {
            load_csv(&rbfm, handle, &descriptor, &csv_path, 'é')
        });
        assert!(matches!(result, Err(CliError::InvalidDelimiter('é'))));

        let loaded = with_open_file(&rbfm, &file, |handle| {
            load_csv(&rbfm, handle, &descriptor, &csv_path, ',')
        })
        .unwrap();
        assert_eq!(loaded, 1);
    }
}
