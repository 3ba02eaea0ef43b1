fn main() {
    // run() prints everything, including errors; main only sets the exit code.
    if let Err(code) = shipwright::cli::run() {
        std::process::exit(code.as_i32());
    }
}
