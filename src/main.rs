fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    updater_erp::cli::run_cli(args);
}
