fn main() {
    if let Err(e) = chameleon::cli::main() {
        eprintln!("❌ Error: {e}");
        std::process::exit(1);
    }
}
