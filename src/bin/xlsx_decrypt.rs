use std::process::ExitCode;

fn main() -> ExitCode {
    xlsx_decrypt::cli::run()
}
