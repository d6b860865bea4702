fn main() {
    if let Err(e) = sentiment_shift_cli::run() {
        sentiment_shift_cli::report_error(&e);
        std::process::exit(1);
    }
}
