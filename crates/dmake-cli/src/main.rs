use std::process::ExitCode;

fn main() -> ExitCode {
    let matches = dmake_cli::cli().get_matches();
    match dmake_cli::dispatch(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
