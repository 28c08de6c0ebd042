fn main() {
    if let Err(err) = csv_cube::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
