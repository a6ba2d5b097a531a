fn main() {
    env_logger::init();

    if let Err(err) = orilabel::run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
