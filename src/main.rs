fn main() {
    match k8s2ai::cli::run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            k8s2ai::ui::eprintln_error(&err);
            std::process::exit(k8s2ai::exit::exit_code(&err));
        }
    }
}
