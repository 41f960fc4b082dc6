fn main() -> std::process::ExitCode {
    kathir_cli::run()
}
