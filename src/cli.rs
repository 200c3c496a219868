use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use crate::error::Error;
use crate::format::Soffice;
use crate::output::ResultRecord;
use crate::pipeline::{self, Job};
use crate::table::HeaderRow;
use crate::DecryptOptions;

/// Command-line arguments of the `xlsx-decrypt` binary.
#[derive(Parser, Debug)]
#[command(
    name = "xlsx-decrypt",
    version,
    about = "Decrypt a password-protected spreadsheet and export its first sheet as CSV and JSON."
)]
pub struct Args {
    /// Input spreadsheet (.xlsx, or legacy .xls which is converted first).
    #[arg(long = "in", value_name = "PATH")]
    pub input: PathBuf,

    /// Decryption password. Ignored for unprotected files; may be empty.
    #[arg(long, allow_hyphen_values = true)]
    pub password: String,

    /// Output prefix; `.xlsx`, `.csv` and `.json` are appended.
    #[arg(long = "out", value_name = "PREFIX")]
    pub out_prefix: PathBuf,

    /// 1-based row holding the column headers.
    #[arg(
        long,
        value_name = "ROW",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub start_row: u32,

    /// Verify the package HMAC before accepting the decrypted data.
    #[arg(long)]
    pub verify_integrity: bool,

    /// LibreOffice executable used to convert legacy workbooks.
    #[arg(
        long,
        value_name = "PROGRAM",
        env = "XLSX_DECRYPT_SOFFICE",
        default_value = "soffice"
    )]
    pub soffice: PathBuf,
}

impl Args {
    pub fn job(&self) -> Result<Job, Error> {
        let header_row = HeaderRow::new(self.start_row)
            .ok_or_else(|| Error::Usage("--start-row must be at least 1".to_string()))?;
        Ok(Job::new(&self.input, self.password.as_str(), &self.out_prefix)
            .with_header_row(header_row)
            .with_options(DecryptOptions {
                verify_integrity: self.verify_integrity,
            }))
    }
}

/// Stderr logging, silent unless `RUST_LOG` asks for more.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("off");
    let _ = env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stderr)
        .try_init();
}

/// Run one job described by `args` and build its result record.
pub fn run_with_args(args: &Args) -> ResultRecord {
    let converter = Soffice::new(&args.soffice);
    let result = args.job().and_then(|job| pipeline::run(&job, &converter));
    if let Err(err) = &result {
        log::error!("{}", err);
    }
    ResultRecord::from(result)
}

// clap's rendering carries a usage block; keep only the message itself.
fn usage_message(err: &clap::Error) -> String {
    let text = err.to_string();
    let message = text.split("\n\nUsage:").next().unwrap_or(&text);
    message
        .trim_start_matches("error: ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_record(record: &ResultRecord) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer(&mut handle, record)?;
    handle.write_all(b"\n")?;
    handle.flush()
}

/// Entry point of the binary: parse, run, print exactly one record.
pub fn run() -> ExitCode {
    init_logging();

    let record = match Args::try_parse() {
        Ok(args) => run_with_args(&args),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                let _ = err.print();
                return ExitCode::SUCCESS;
            }
            _ => ResultRecord::failure(Error::Usage(usage_message(&err))),
        },
    };

    if let Err(err) = print_record(&record) {
        log::error!("failed to print result: {}", err);
        return ExitCode::FAILURE;
    }
    if record.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
