fn main() {
    if let Err(err) = multi_lookup::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
