fn main() {
    if let Err(err) = graphview_layout::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
