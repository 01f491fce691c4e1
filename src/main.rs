fn main() {
    if let Err(err) = csv_dbload::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
