fn main() {
    if let Err(err) = topograph::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
